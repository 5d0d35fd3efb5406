//! Instances - the nodes of a page's component tree.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{StudioError, StudioResult};

/// Unique identifier of an instance.
pub type InstanceId = String;

/// A child slot of an instance: another instance or literal text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum InstanceChild {
    /// Reference to a child instance.
    Id(InstanceId),
    /// Literal text rendered as a leaf.
    Text(String),
}

/// One node in the serialized page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    /// Unique identifier.
    pub id: InstanceId,
    /// Component name, optionally qualified as `namespace:Name`.
    pub component: String,
    /// Ordered children.
    #[serde(default)]
    pub children: Vec<InstanceChild>,
    /// Optional label shown in the navigator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Instance {
    /// Create an instance with no children.
    #[must_use]
    pub fn new(id: impl Into<InstanceId>, component: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            component: component.into(),
            children: Vec::new(),
            label: None,
        }
    }

    /// Append a child instance reference.
    #[must_use]
    pub fn with_child(mut self, id: impl Into<InstanceId>) -> Self {
        self.children.push(InstanceChild::Id(id.into()));
        self
    }

    /// Append a literal text child.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(InstanceChild::Text(text.into()));
        self
    }

    /// Iterate over the ids of child instances, skipping text.
    pub fn child_ids(&self) -> impl Iterator<Item = &InstanceId> {
        self.children.iter().filter_map(|child| match child {
            InstanceChild::Id(id) => Some(id),
            InstanceChild::Text(_) => None,
        })
    }
}

/// The instance graph, keyed by instance id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Instances {
    instances: HashMap<InstanceId, Instance>,
}

impl Instances {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an instance. Returns the previous record.
    pub fn insert(&mut self, instance: Instance) -> Option<Instance> {
        self.instances.insert(instance.id.clone(), instance)
    }

    /// Remove an instance. Parents still referencing it are left as-is.
    pub fn remove(&mut self, id: &str) -> Option<Instance> {
        self.instances.remove(id)
    }

    /// Get an instance by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Instance> {
        self.instances.get(id)
    }

    /// Whether the graph contains `id`.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.instances.contains_key(id)
    }

    /// Number of instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Whether the graph is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Iterate over all instances in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &Instance> {
        self.instances.values()
    }

    /// Collect `root` and every instance reachable from it, depth first.
    #[must_use]
    pub fn descendants(&self, root: &str) -> Vec<InstanceId> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![root.to_string()];
        while let Some(id) = stack.pop() {
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(instance) = self.instances.get(&id) {
                let children: Vec<InstanceId> = instance.child_ids().cloned().collect();
                out.push(id);
                stack.extend(children.into_iter().rev());
            }
        }
        out
    }

    /// The path from `id` up to the root: `id` first, then its parent and so
    /// on. Empty if `id` does not exist.
    #[must_use]
    pub fn path_to_root(&self, id: &str) -> Vec<InstanceId> {
        if !self.contains(id) {
            return Vec::new();
        }
        let parents: HashMap<&str, &str> = self
            .instances
            .values()
            .flat_map(|parent| parent.child_ids().map(move |child| (child.as_str(), parent.id.as_str())))
            .collect();
        let mut path = vec![id.to_string()];
        let mut current = id;
        while let Some(&parent) = parents.get(current) {
            if path.iter().any(|p| p == parent) {
                break;
            }
            path.push(parent.to_string());
            current = parent;
        }
        path
    }

    /// Check the graph after `edited` instances changed and `removed` ones
    /// went away: every child of an edited instance exists, no edited
    /// instance reaches itself, and nothing still references a removed one.
    ///
    /// # Errors
    ///
    /// Returns [`StudioError::InstanceNotFound`] for a dangling reference and
    /// [`StudioError::InvalidGraph`] for a cycle or a removed instance that
    /// is still a child.
    pub fn validate_edit(&self, edited: &[InstanceId], removed: &[InstanceId]) -> StudioResult<()> {
        for id in edited {
            let Some(instance) = self.instances.get(id) else {
                continue;
            };
            for child in instance.child_ids() {
                if !self.contains(child) {
                    return Err(StudioError::InstanceNotFound(child.clone()));
                }
                if self.descendants(child).contains(id) {
                    return Err(StudioError::InvalidGraph(format!(
                        "{id} would contain itself through {child}"
                    )));
                }
            }
        }
        for id in removed {
            if let Some(parent) = self.iter().find(|p| p.child_ids().any(|c| c == id)) {
                return Err(StudioError::InvalidGraph(format!(
                    "removed instance {id} is still a child of {}",
                    parent.id
                )));
            }
        }
        Ok(())
    }
}

impl FromIterator<Instance> for Instances {
    fn from_iter<T: IntoIterator<Item = Instance>>(iter: T) -> Self {
        let mut instances = Self::new();
        for instance in iter {
            instances.insert(instance);
        }
        instances
    }
}
