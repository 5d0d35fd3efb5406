//! Positional indexes derived from the instance graph.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::instance::{InstanceId, Instances};
use crate::registry::ComponentMeta;

/// Where an instance sits in the tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexWithinAncestors {
    /// Ordinal among instance siblings at every level, starting below the
    /// root.
    pub path: Vec<usize>,
    /// Ordinal among same-component instances inside the nearest ancestor
    /// named by the component's `index_within_ancestor` meta.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub within_ancestor: Option<usize>,
}

/// Indexes keyed by instance id.
pub type IndexesWithinAncestors = HashMap<InstanceId, IndexWithinAncestors>;

struct Frame {
    component: String,
    counters: HashMap<String, usize>,
}

enum Step<'a> {
    Enter(&'a str, Vec<usize>),
    Exit(&'a str),
}

/// Compute indexes for every instance reachable from `root_ids`.
///
/// Must be recomputed whenever metas, instances or the root change. Walks
/// with an explicit stack, so nesting depth is bounded by the heap.
#[must_use]
pub fn indexes_within_ancestors(
    metas: &HashMap<String, ComponentMeta>,
    instances: &Instances,
    root_ids: &[InstanceId],
) -> IndexesWithinAncestors {
    let mut indexes = IndexesWithinAncestors::new();
    for root in root_ids {
        walk(metas, instances, root, &mut indexes);
    }
    indexes
}

fn walk<'a>(
    metas: &HashMap<String, ComponentMeta>,
    instances: &'a Instances,
    root: &'a str,
    indexes: &mut IndexesWithinAncestors,
) {
    let mut frames: Vec<Frame> = Vec::new();
    let mut on_path: HashSet<&str> = HashSet::new();
    let mut stack = vec![Step::Enter(root, Vec::new())];

    while let Some(step) = stack.pop() {
        let (id, path) = match step {
            Step::Enter(id, path) => (id, path),
            Step::Exit(id) => {
                frames.pop();
                on_path.remove(id);
                continue;
            }
        };
        let Some(instance) = instances.get(id) else {
            continue;
        };
        if !on_path.insert(id) {
            continue;
        }

        let within_ancestor = metas
            .get(&instance.component)
            .and_then(|meta| meta.index_within_ancestor.as_deref())
            .and_then(|ancestor| frames.iter_mut().rev().find(|f| f.component == ancestor))
            .map(|frame| {
                let counter = frame.counters.entry(instance.component.clone()).or_insert(0);
                let index = *counter;
                *counter += 1;
                index
            });

        frames.push(Frame {
            component: instance.component.clone(),
            counters: HashMap::new(),
        });
        stack.push(Step::Exit(id));
        let children: Vec<&InstanceId> = instance.child_ids().collect();
        for (ordinal, child) in children.into_iter().enumerate().rev() {
            let mut child_path = path.clone();
            child_path.push(ordinal);
            stack.push(Step::Enter(child, child_path));
        }

        indexes.insert(
            id.to_string(),
            IndexWithinAncestors {
                path,
                within_ancestor,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::Instance;
    use crate::registry::ComponentKind;

    fn tabs_metas() -> HashMap<String, ComponentMeta> {
        let mut trigger = ComponentMeta::new(ComponentKind::Container);
        trigger.index_within_ancestor = Some("Tabs".to_string());
        let mut metas = HashMap::new();
        metas.insert("Tabs".to_string(), ComponentMeta::new(ComponentKind::Container));
        metas.insert("TabsTrigger".to_string(), trigger);
        metas
    }

    #[test]
    fn test_index_within_nearest_ancestor() {
        let instances: Instances = [
            Instance::new("root", "Body").with_child("tabs"),
            Instance::new("tabs", "Tabs")
                .with_child("list")
                .with_child("t3"),
            Instance::new("list", "Box").with_child("t1").with_child("t2"),
            Instance::new("t1", "TabsTrigger"),
            Instance::new("t2", "TabsTrigger"),
            Instance::new("t3", "TabsTrigger"),
        ]
        .into_iter()
        .collect();

        let indexes = indexes_within_ancestors(&tabs_metas(), &instances, &["root".to_string()]);
        assert_eq!(indexes["t1"].within_ancestor, Some(0));
        assert_eq!(indexes["t2"].within_ancestor, Some(1));
        assert_eq!(indexes["t3"].within_ancestor, Some(2));
        assert_eq!(indexes["list"].within_ancestor, None);
        assert_eq!(indexes["t2"].path, vec![0, 0, 1]);
        assert!(indexes["root"].path.is_empty());
    }

    #[test]
    fn test_nested_ancestors_restart_numbering() {
        let instances: Instances = [
            Instance::new("outer", "Tabs").with_child("a").with_child("inner"),
            Instance::new("a", "TabsTrigger"),
            Instance::new("inner", "Tabs").with_child("b"),
            Instance::new("b", "TabsTrigger"),
        ]
        .into_iter()
        .collect();

        let indexes = indexes_within_ancestors(&tabs_metas(), &instances, &["outer".to_string()]);
        assert_eq!(indexes["a"].within_ancestor, Some(0));
        assert_eq!(indexes["b"].within_ancestor, Some(0));
    }

    #[test]
    fn test_cycle_terminates() {
        let instances: Instances = [
            Instance::new("a", "Box").with_child("b"),
            Instance::new("b", "Box").with_child("a"),
        ]
        .into_iter()
        .collect();
        let indexes = indexes_within_ancestors(&HashMap::new(), &instances, &["a".to_string()]);
        assert_eq!(indexes.len(), 2);
    }

    #[test]
    fn test_deep_chain() {
        const DEPTH: usize = 5_000;
        let instances: Instances = (0..DEPTH)
            .map(|n| {
                let instance = Instance::new(format!("n{n}"), "Box");
                if n + 1 < DEPTH {
                    instance.with_child(format!("n{}", n + 1))
                } else {
                    instance
                }
            })
            .collect();
        let indexes = indexes_within_ancestors(&HashMap::new(), &instances, &["n0".to_string()]);
        assert_eq!(indexes.len(), DEPTH);
        assert_eq!(indexes["n3"].path, vec![0, 0, 0]);
    }
}
