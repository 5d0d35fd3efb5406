//! Prop bindings attached to instances.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::data_source::DataSourceId;
use crate::instance::InstanceId;
use crate::page::PageId;
use crate::value::{AssetId, Value};

/// Unique identifier of a prop record.
pub type PropId = String;

/// What a prop is bound to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropValue {
    /// A literal value.
    Literal(Value),
    /// The current value of a data source.
    DataSource(DataSourceId),
    /// An effectful action, run when the component fires the event.
    Expression(ExpressionRef),
    /// An uploaded asset.
    Asset(AssetId),
    /// Another page of the project, optionally with a `#hash`.
    Page {
        /// Target page.
        page_id: PageId,
        /// Optional section anchor.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hash: Option<String>,
    },
}

/// Source of an effectful action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpressionRef {
    /// Statements, e.g. `count = count + 1`.
    pub code: String,
    /// Names of the arguments the component passes when firing.
    #[serde(default)]
    pub args: Vec<String>,
}

/// A named binding on an instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prop {
    /// Unique identifier.
    pub id: PropId,
    /// Owning instance.
    pub instance_id: InstanceId,
    /// Prop name as the component sees it.
    pub name: String,
    /// Bound value.
    pub value: PropValue,
}

impl Prop {
    /// Create a prop with a fresh id.
    #[must_use]
    pub fn new(instance_id: impl Into<InstanceId>, name: impl Into<String>, value: PropValue) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            instance_id: instance_id.into(),
            name: name.into(),
            value,
        }
    }

    /// Shorthand for a literal prop.
    #[must_use]
    pub fn literal(
        instance_id: impl Into<InstanceId>,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Self::new(instance_id, name, PropValue::Literal(value.into()))
    }

    /// Shorthand for a data-source-bound prop.
    #[must_use]
    pub fn bound(
        instance_id: impl Into<InstanceId>,
        name: impl Into<String>,
        data_source_id: impl Into<DataSourceId>,
    ) -> Self {
        Self::new(instance_id, name, PropValue::DataSource(data_source_id.into()))
    }

    /// Shorthand for an action prop.
    #[must_use]
    pub fn action(
        instance_id: impl Into<InstanceId>,
        name: impl Into<String>,
        code: impl Into<String>,
        args: &[&str],
    ) -> Self {
        Self::new(
            instance_id,
            name,
            PropValue::Expression(ExpressionRef {
                code: code.into(),
                args: args.iter().map(ToString::to_string).collect(),
            }),
        )
    }
}

/// Props grouped by owning instance, preserving declaration order.
#[derive(Debug, Clone, Default)]
pub struct PropsIndex {
    by_instance: HashMap<InstanceId, Vec<Prop>>,
}

impl PropsIndex {
    /// Build the index from a flat list of props.
    #[must_use]
    pub fn from_props<'a>(props: impl IntoIterator<Item = &'a Prop>) -> Self {
        let mut by_instance: HashMap<InstanceId, Vec<Prop>> = HashMap::new();
        for prop in props {
            by_instance
                .entry(prop.instance_id.clone())
                .or_default()
                .push(prop.clone());
        }
        Self { by_instance }
    }

    /// Instances that have at least one prop.
    pub fn instance_ids(&self) -> impl Iterator<Item = &InstanceId> {
        self.by_instance.keys()
    }

    /// Every prop, grouped by instance.
    pub fn iter(&self) -> impl Iterator<Item = &Prop> {
        self.by_instance.values().flatten()
    }

    /// Props of one instance, in declaration order.
    #[must_use]
    pub fn props_of(&self, instance_id: &str) -> &[Prop] {
        self.by_instance
            .get(instance_id)
            .map_or(&[][..], Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prop_json_shape() {
        let prop = Prop::bound("i1", "href", "x");
        let json = serde_json::to_value(&prop).expect("serialize");
        assert_eq!(json["value"]["type"], "data_source");
        assert_eq!(json["value"]["value"], "x");
        let back: Prop = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, prop);
    }

    #[test]
    fn test_index_preserves_order() {
        let props = vec![
            Prop::literal("a", "first", 1),
            Prop::literal("b", "other", 2),
            Prop::literal("a", "second", 3),
        ];
        let index = PropsIndex::from_props(&props);
        let names: Vec<_> = index.props_of("a").iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
        assert!(index.props_of("missing").is_empty());
    }
}
