//! Render session - one page document wired to the engine.
//!
//! ```text
//!  patches ──► DocumentStore ──┐
//!                              ├─► Scheduler ──► flush() ──► build()
//!  values  ──► DataSourceEngine┘         (next turn)
//! ```
//!
//! Mutations never render. They mark the session stale and the owner calls
//! [`RenderSession::flush`] once it is done processing the current batch.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::codec::VariablesMap;
use crate::data_source::{DataSourceEngine, DataSourceId, ValuesChanged};
use crate::expression::ExpressionEvaluator;
use crate::indexes::{indexes_within_ancestors, IndexesWithinAncestors};
use crate::instance::InstanceId;
use crate::page::{Page, Params};
use crate::props::{PropsResolver, ResolvedProp};
use crate::reactive::{Invalidation, Scheduler};
use crate::registry::{ComponentRegistry, HookEvent};
use crate::store::{
    DataSourcesPatch, DocumentStore, InstancesChange, InstancesPatch, PageDocument, PropsPatch,
};
use crate::tree::{self, BuildConfig, BuildOutput, RenderMode};
use crate::value::Value;
use crate::{StudioError, StudioResult};

#[derive(Debug, Clone, PartialEq, Eq)]
struct IndexKey {
    registry: u64,
    document: u64,
    root: InstanceId,
}

/// A document plus everything needed to render it.
pub struct RenderSession {
    registry: Arc<ComponentRegistry>,
    store: DocumentStore,
    data: Arc<DataSourceEngine>,
    resolver: PropsResolver,
    scheduler: Scheduler,
    changes: broadcast::Receiver<ValuesChanged>,
    indexes: Option<(IndexKey, IndexesWithinAncestors)>,
}

impl std::fmt::Debug for RenderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderSession")
            .field("registry", &self.registry)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl RenderSession {
    /// Create a session for `document` using the built-in interpreter.
    #[must_use]
    pub fn new(registry: Arc<ComponentRegistry>, document: PageDocument, params: Params) -> Self {
        Self::with_data(registry, document, params, Arc::new(DataSourceEngine::default()))
    }

    /// Create a session that runs actions with `evaluator`.
    #[must_use]
    pub fn with_evaluator(
        registry: Arc<ComponentRegistry>,
        document: PageDocument,
        params: Params,
        evaluator: Arc<dyn ExpressionEvaluator>,
    ) -> Self {
        Self::with_data(
            registry,
            document,
            params,
            Arc::new(DataSourceEngine::new(evaluator)),
        )
    }

    fn with_data(
        registry: Arc<ComponentRegistry>,
        document: PageDocument,
        params: Params,
        data: Arc<DataSourceEngine>,
    ) -> Self {
        let changes = data.subscribe();
        let mut session = Self {
            registry,
            store: DocumentStore::new(document.clone()),
            resolver: PropsResolver::new(Arc::clone(&data), params),
            data,
            scheduler: Scheduler::new(),
            changes,
            indexes: None,
        };
        session.load(document);
        session
    }

    /// Replace the whole document and re-mount its data sources.
    pub fn load(&mut self, document: PageDocument) {
        self.data.mount(document.data_sources.iter().cloned());
        self.resolver.set_props(&document.props);
        self.resolver.set_pages(&document.pages);
        self.resolver.set_assets(document.assets.iter().cloned());
        self.store.load(document);
        self.scheduler.schedule(Invalidation::Document);
    }

    /// Component registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    /// Document store.
    #[must_use]
    pub const fn store(&self) -> &DocumentStore {
        &self.store
    }

    /// Data source engine.
    #[must_use]
    pub fn data(&self) -> &Arc<DataSourceEngine> {
        &self.data
    }

    /// Props resolver.
    #[must_use]
    pub const fn resolver(&self) -> &PropsResolver {
        &self.resolver
    }

    /// Replace the render parameters.
    pub fn set_params(&mut self, params: Params) {
        self.resolver.set_params(params);
        self.scheduler.schedule(Invalidation::Props);
    }

    /// The selected page.
    #[must_use]
    pub fn selected_page(&self) -> Page {
        self.store.selected_page()
    }

    /// Select a page.
    ///
    /// # Errors
    ///
    /// Returns [`StudioError::PageNotFound`] if no page has this id.
    pub fn select_page(&mut self, page_id: &str) -> StudioResult<()> {
        self.store.select_page(page_id)?;
        self.scheduler.schedule(Invalidation::SelectedPage);
        Ok(())
    }

    /// Apply instance edits and fire the structural hooks.
    ///
    /// # Errors
    ///
    /// Returns [`StudioError::InvalidGraph`] if the patch is rejected.
    pub fn apply_instances_patch(&mut self, patch: InstancesPatch) -> StudioResult<InstancesChange> {
        let change = self.store.apply_instances_patch(patch)?;
        for (instance_id, component) in &change.added {
            self.registry.dispatch_hook(&HookEvent::InstanceAdded {
                instance_id: instance_id.clone(),
                component: component.clone(),
            });
        }
        for instance_id in &change.removed {
            self.registry.dispatch_hook(&HookEvent::InstanceRemoved {
                instance_id: instance_id.clone(),
            });
        }
        self.scheduler.schedule(Invalidation::Instances);
        Ok(change)
    }

    /// Apply prop binding edits.
    pub fn apply_props_patch(&mut self, patch: PropsPatch) {
        let removals = patch.removals.clone();
        let upserts = patch.upserts.clone();
        self.store.apply_props_patch(patch);
        self.resolver.upsert_props(upserts);
        self.resolver.remove_props(&removals);
        self.scheduler.schedule(Invalidation::Props);
    }

    /// Apply data source declaration edits.
    pub fn apply_data_sources_patch(&mut self, patch: &DataSourcesPatch) {
        self.store.apply_data_sources_patch(patch);
        if !patch.upserts.is_empty() {
            self.data.upsert_sources(patch.upserts.iter().cloned());
        }
        if !patch.removals.is_empty() {
            self.data.remove_sources(&patch.removals);
        }
        self.scheduler.schedule(Invalidation::DataSources);
    }

    /// Apply new data source values atomically.
    pub fn set_values(&self, values: VariablesMap) -> Vec<DataSourceId> {
        self.data.set_values(values)
    }

    /// Set one data source's value.
    ///
    /// # Errors
    ///
    /// Returns [`StudioError::UnresolvedDataSource`] if `id` is not declared.
    pub fn update_data_source(&self, id: &str, value: Value) -> StudioResult<()> {
        if !self.data.contains(id) {
            return Err(StudioError::UnresolvedDataSource(id.to_string()));
        }
        let mut values = VariablesMap::new();
        values.insert(id.to_string(), value);
        self.data.set_values(values);
        Ok(())
    }

    /// Run the action bound to `prop` on an instance.
    ///
    /// # Errors
    ///
    /// Returns [`StudioError::NotAnAction`] if the prop is not an action and
    /// [`StudioError::ExpressionExecutionFailure`] if the action fails.
    pub fn run_action(
        &self,
        instance_id: &str,
        prop: &str,
        args: VariablesMap,
    ) -> StudioResult<Vec<DataSourceId>> {
        let props = self.resolver.resolve_props(instance_id);
        let action = props
            .get(prop)
            .and_then(ResolvedProp::as_action)
            .ok_or_else(|| StudioError::NotAnAction {
                instance: instance_id.to_string(),
                prop: prop.to_string(),
            })?;
        self.data.run_action(&action.expression, args)
    }

    /// Instance and its ancestors, for selection hooks.
    #[must_use]
    pub fn instance_path(&self, instance_id: &str) -> Vec<InstanceId> {
        self.store.instances().path_to_root(instance_id)
    }

    /// Record that something outside the session made the render stale.
    pub fn invalidate(&self, invalidation: Invalidation) {
        self.scheduler.schedule(invalidation);
    }

    /// Build the selected page.
    pub fn build(&mut self, mode: RenderMode) -> BuildOutput {
        let instances = self.store.instances();
        let page = self.store.selected_page();
        let root = page.root_instance_id;
        let key = IndexKey {
            registry: self.registry.revision(),
            document: self.store.revision(),
            root: root.clone(),
        };
        let indexes = match self.indexes.take() {
            Some((cached, indexes)) if cached == key => indexes,
            _ => {
                tracing::debug!(root = %root, "Recomputing indexes within ancestors");
                indexes_within_ancestors(
                    &self.registry.metas(),
                    &instances,
                    std::slice::from_ref(&root),
                )
            }
        };
        let output = tree::build(BuildConfig {
            mode,
            instances: &instances,
            root_instance_id: Some(&root),
            registry: &self.registry,
            resolver: &self.resolver,
            indexes: &indexes,
        });
        self.indexes = Some((key, indexes));
        output
    }

    /// Process everything that became stale since the last flush and rebuild
    /// if needed.
    pub fn flush(&mut self, mode: RenderMode) -> Option<BuildOutput> {
        loop {
            match self.changes.try_recv() {
                Ok(_) | Err(TryRecvError::Lagged(_)) => {
                    self.scheduler.schedule(Invalidation::DataSources);
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        let pending = self.scheduler.take();
        if pending.is_empty() {
            return None;
        }
        tracing::debug!(?pending, "Flushing invalidations");
        Some(self.build(mode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::DataSource;
    use crate::instance::Instance;
    use crate::library::base_library;
    use crate::prop::Prop;
    use crate::registry::{ComponentRegistration, HookKind, Hooks};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn document() -> PageDocument {
        let mut document = PageDocument::new(Page::new("home", "", "body"));
        document.instances = [
            Instance::new("body", "Body").with_child("counter").with_child("button"),
            Instance::new("counter", "Text"),
            Instance::new("button", "Box"),
        ]
        .into_iter()
        .collect();
        document.props = vec![
            Prop::bound("counter", "title", "count"),
            Prop::action("button", "onClick", "count = count + 1", &[]),
        ];
        document.data_sources = vec![DataSource::variable("count", 0)];
        document
    }

    fn session() -> RenderSession {
        let registry = Arc::new(ComponentRegistry::new());
        registry.register(base_library());
        RenderSession::new(registry, document(), Params::default())
    }

    #[test]
    fn test_flush_after_load_then_idle() {
        let mut session = session();
        assert!(session.flush(RenderMode::Preview).is_some());
        assert!(session.flush(RenderMode::Preview).is_none());
    }

    #[test]
    fn test_action_rerenders_on_next_flush() {
        let mut session = session();
        let _ = session.flush(RenderMode::Preview);

        let applied = session
            .run_action("button", "onClick", VariablesMap::new())
            .expect("action");
        assert_eq!(applied, vec!["count".to_string()]);

        let output = session.flush(RenderMode::Preview).expect("stale");
        let counter = output.root.find("counter").expect("counter");
        assert_eq!(counter.attributes.get("title"), Some(&Value::Number(1.0)));
    }

    #[test]
    fn test_run_action_on_non_action() {
        let session = session();
        assert!(matches!(
            session.run_action("counter", "title", VariablesMap::new()),
            Err(StudioError::NotAnAction { .. })
        ));
    }

    #[test]
    fn test_update_unknown_data_source() {
        let session = session();
        assert!(matches!(
            session.update_data_source("nope", Value::Null),
            Err(StudioError::UnresolvedDataSource(_))
        ));
        session
            .update_data_source("count", Value::from(5))
            .expect("declared");
        assert_eq!(session.data().get_value("count"), Some(Value::from(5)));
    }

    #[test]
    fn test_instances_patch_fires_hooks() {
        let mut session = session();
        let added = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&added);
        session.registry().register(ComponentRegistration::new().with_hooks(Hooks::new().on(
            HookKind::InstanceAdded,
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        )));
        session
            .apply_instances_patch(InstancesPatch {
                updates: vec![Instance::new("extra", "Text").into()],
                removals: vec![],
            })
            .expect("patch");
        assert_eq!(added.load(Ordering::SeqCst), 1);
        assert_eq!(session.instance_path("counter"), vec!["counter", "body"]);
    }

    #[test]
    fn test_props_patch_updates_render() {
        let mut session = session();
        let _ = session.flush(RenderMode::Preview);
        session.apply_props_patch(PropsPatch {
            upserts: vec![Prop::literal("button", "id", "cta")],
            removals: vec![],
        });
        let output = session.flush(RenderMode::Preview).expect("stale");
        let button = output.root.find("button").expect("button");
        assert_eq!(button.attributes.get("id"), Some(&Value::from("cta")));
        assert!(button.actions.contains_key("onClick"));
    }
}
