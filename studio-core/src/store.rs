//! Shared document storage.
//!
//! [`DocumentStore`] holds the page document the builder edits. It is cheap to
//! clone and can be shared between the sync bridge, HTTP routes and the
//! render session. Edits arrive as patches and merge last-writer-wins per
//! field: whichever patch is applied later decides the value of every field
//! it sets.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::data_source::{DataSource, DataSourceId};
use crate::instance::{Instance, InstanceChild, InstanceId, Instances};
use crate::page::{Asset, Page, PageId, Pages};
use crate::prop::{Prop, PropId};
use crate::{StudioError, StudioResult};

/// Everything the builder ships to the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageDocument {
    /// Pages of the project.
    pub pages: Pages,
    /// Instance graph for every page.
    #[serde(default)]
    pub instances: Instances,
    /// Prop bindings.
    #[serde(default)]
    pub props: Vec<Prop>,
    /// Declared data sources.
    #[serde(default)]
    pub data_sources: Vec<DataSource>,
    /// Uploaded assets.
    #[serde(default)]
    pub assets: Vec<Asset>,
}

impl PageDocument {
    /// A document with a home page and nothing else.
    #[must_use]
    pub fn new(home_page: Page) -> Self {
        Self {
            pages: Pages::new(home_page),
            instances: Instances::new(),
            props: Vec::new(),
            data_sources: Vec::new(),
            assets: Vec::new(),
        }
    }

    /// Parse a document from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`StudioError::Serialization`] if the JSON is invalid.
    pub fn from_json(json: &str) -> StudioResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns [`StudioError::Serialization`] if serialization fails.
    pub fn to_json(&self) -> StudioResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Partial update of one instance. Unset fields keep their current value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceUpdate {
    /// Target instance.
    pub id: InstanceId,
    /// New component.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    /// New children.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<InstanceChild>>,
    /// New label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl From<Instance> for InstanceUpdate {
    fn from(instance: Instance) -> Self {
        Self {
            id: instance.id,
            component: Some(instance.component),
            children: Some(instance.children),
            label: instance.label,
        }
    }
}

/// Instance edits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstancesPatch {
    /// Created or changed instances.
    #[serde(default)]
    pub updates: Vec<InstanceUpdate>,
    /// Removed instances.
    #[serde(default)]
    pub removals: Vec<InstanceId>,
}

/// Prop binding edits; a prop is replaced as a whole.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropsPatch {
    /// Created or replaced props.
    #[serde(default)]
    pub upserts: Vec<Prop>,
    /// Removed props.
    #[serde(default)]
    pub removals: Vec<PropId>,
}

/// Data source declaration edits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSourcesPatch {
    /// Created or replaced declarations.
    #[serde(default)]
    pub upserts: Vec<DataSource>,
    /// Removed declarations.
    #[serde(default)]
    pub removals: Vec<DataSourceId>,
}

/// Instances whose record changed as a result of a patch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstancesChange {
    /// Instances that did not exist before.
    pub added: Vec<(InstanceId, String)>,
    /// Existing instances that changed.
    pub updated: Vec<InstanceId>,
    /// Instances that were removed.
    pub removed: Vec<InstanceId>,
}

#[derive(Debug)]
struct DocumentState {
    document: PageDocument,
    selected_page: PageId,
    revision: u64,
}

/// Thread-safe document storage.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    state: Arc<RwLock<DocumentState>>,
}

impl DocumentStore {
    /// Create a store holding `document` with its home page selected.
    #[must_use]
    pub fn new(document: PageDocument) -> Self {
        let selected_page = document.pages.home_page.id.clone();
        Self {
            state: Arc::new(RwLock::new(DocumentState {
                document,
                selected_page,
                revision: 0,
            })),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, DocumentState> {
        self.state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, DocumentState> {
        self.state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Replace the whole document. The selected page is kept if it still
    /// exists, otherwise the home page is selected.
    pub fn load(&self, document: PageDocument) {
        let mut state = self.write();
        if document.pages.get(&state.selected_page).is_none() {
            state.selected_page = document.pages.home_page.id.clone();
        }
        state.document = document;
        state.revision += 1;
        tracing::info!(
            instances = state.document.instances.len(),
            props = state.document.props.len(),
            revision = state.revision,
            "Loaded document"
        );
    }

    /// Snapshot of the document.
    #[must_use]
    pub fn document(&self) -> PageDocument {
        self.read().document.clone()
    }

    /// Snapshot of the instance graph.
    #[must_use]
    pub fn instances(&self) -> Instances {
        self.read().document.instances.clone()
    }

    /// Snapshot of every prop binding.
    #[must_use]
    pub fn props(&self) -> Vec<Prop> {
        self.read().document.props.clone()
    }

    /// The selected page.
    #[must_use]
    pub fn selected_page(&self) -> Page {
        let state = self.read();
        state
            .document
            .pages
            .get(&state.selected_page)
            .unwrap_or(&state.document.pages.home_page)
            .clone()
    }

    /// Select a page.
    ///
    /// # Errors
    ///
    /// Returns [`StudioError::PageNotFound`] if no page has this id.
    pub fn select_page(&self, page_id: &str) -> StudioResult<()> {
        let mut state = self.write();
        if state.document.pages.get(page_id).is_none() {
            return Err(StudioError::PageNotFound(page_id.to_string()));
        }
        state.selected_page = page_id.to_string();
        state.revision += 1;
        Ok(())
    }

    /// Bumps on every change.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.read().revision
    }

    /// Apply instance edits.
    ///
    /// The patch is applied to a copy of the graph and checked before it
    /// replaces the stored one, so either all of it applies or none of it.
    /// A removed instance must also be dropped from its parent's children in
    /// the same patch.
    ///
    /// # Errors
    ///
    /// Returns [`StudioError::InvalidGraph`] if an update creates an instance
    /// without naming its component, introduces a cycle or leaves a removed
    /// instance referenced, and [`StudioError::InstanceNotFound`] if a child
    /// reference names no instance.
    pub fn apply_instances_patch(&self, patch: InstancesPatch) -> StudioResult<InstancesChange> {
        let mut state = self.write();
        let mut instances = state.document.instances.clone();
        let mut change = InstancesChange::default();
        let mut edited = Vec::with_capacity(patch.updates.len());

        for update in patch.updates {
            match instances.get(&update.id).cloned() {
                Some(mut instance) => {
                    if let Some(component) = update.component {
                        instance.component = component;
                    }
                    if let Some(children) = update.children {
                        instance.children = children;
                    }
                    if update.label.is_some() {
                        instance.label = update.label;
                    }
                    change.updated.push(instance.id.clone());
                    edited.push(instance.id.clone());
                    instances.insert(instance);
                }
                None => {
                    let Some(component) = update.component else {
                        return Err(StudioError::InvalidGraph(format!(
                            "new instance {} has no component",
                            update.id
                        )));
                    };
                    let mut instance = Instance::new(update.id, component);
                    instance.children = update.children.unwrap_or_default();
                    instance.label = update.label;
                    change
                        .added
                        .push((instance.id.clone(), instance.component.clone()));
                    edited.push(instance.id.clone());
                    instances.insert(instance);
                }
            }
        }
        for id in patch.removals {
            if instances.remove(&id).is_some() {
                change.removed.push(id);
            }
        }

        if let Err(e) = instances.validate_edit(&edited, &change.removed) {
            tracing::warn!(error = %e, "Rejected instances patch");
            return Err(e);
        }

        state.document.instances = instances;
        state.revision += 1;
        tracing::debug!(
            added = change.added.len(),
            updated = change.updated.len(),
            removed = change.removed.len(),
            "Applied instances patch"
        );
        Ok(change)
    }

    /// Apply prop edits. Returns the instances whose bindings changed.
    pub fn apply_props_patch(&self, patch: PropsPatch) -> Vec<InstanceId> {
        let mut state = self.write();
        let props = &mut state.document.props;
        let mut touched = Vec::new();
        for prop in patch.upserts {
            touched.push(prop.instance_id.clone());
            match props.iter_mut().find(|p| p.id == prop.id) {
                Some(existing) => {
                    if existing.instance_id != prop.instance_id {
                        touched.push(existing.instance_id.clone());
                    }
                    *existing = prop;
                }
                None => props.push(prop),
            }
        }
        props.retain(|p| {
            let removed = patch.removals.contains(&p.id);
            if removed {
                touched.push(p.instance_id.clone());
            }
            !removed
        });
        touched.sort();
        touched.dedup();
        state.revision += 1;
        touched
    }

    /// Apply data source declaration edits.
    pub fn apply_data_sources_patch(&self, patch: &DataSourcesPatch) {
        let mut state = self.write();
        let sources = &mut state.document.data_sources;
        for source in &patch.upserts {
            match sources.iter_mut().find(|s| s.id == source.id) {
                Some(existing) => *existing = source.clone(),
                None => sources.push(source.clone()),
            }
        }
        sources.retain(|s| !patch.removals.contains(&s.id));
        state.revision += 1;
    }
}
