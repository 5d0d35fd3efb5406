//! Elements tree builder - compiles the instance graph into a render tree.
//!
//! ```text
//! Instances ──► resolve component ──► resolve props ──► RenderNode
//!     │               │                                    │
//!     │        unknown: placeholder (design)               │
//!     │                 omitted    (preview)               ▼
//!     └──────────── children, in order ──────────► Document wrapper
//! ```
//!
//! The build is pure: the same instances, bindings, values and registry
//! always produce the same tree.

use std::collections::HashSet;
use std::fmt::Write as _;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::indexes::{IndexWithinAncestors, IndexesWithinAncestors};
use crate::instance::{InstanceChild, InstanceId, Instances};
use crate::props::{ActionRef, PropsResolver};
use crate::registry::{ComponentRegistry, RenderInput};
use crate::value::Value;
use crate::StudioError;

/// Environment bootstrap markers carried by the document node in every mode.
pub const BOOTSTRAP_MARKERS: &[&str] = &["scroll-restoration", "scripts"];

/// Whether the tree is built for editing or for a faithful preview.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Editable canvas with selection, drop targets and interception.
    Design,
    /// What visitors see.
    #[default]
    Preview,
}

impl std::fmt::Display for RenderMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Design => write!(f, "design"),
            Self::Preview => write!(f, "preview"),
        }
    }
}

impl std::str::FromStr for RenderMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "design" | "canvas" => Ok(Self::Design),
            "preview" => Ok(Self::Preview),
            other => Err(format!("unknown render mode: {other}")),
        }
    }
}

/// Editing affordances attached to nodes in design mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Affordances {
    /// Can be selected and hovered.
    pub selectable: bool,
    /// Accepts dropped children.
    pub droppable: bool,
    /// User interactions are intercepted instead of reaching the component.
    pub intercept_events: bool,
}

/// A rendered instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementNode {
    /// Instance id; unique among siblings.
    pub key: InstanceId,
    /// Qualified component name.
    pub component: String,
    /// Host tag.
    pub tag: String,
    /// Host attributes.
    pub attributes: IndexMap<String, Value>,
    /// Live handlers by prop name.
    pub actions: IndexMap<String, ActionRef>,
    /// Position in the tree.
    pub index: IndexWithinAncestors,
    /// Editing affordances (design mode only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affordances: Option<Affordances>,
    /// Children in instance order.
    pub children: Vec<RenderNode>,
}

/// A node of the render tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RenderNode {
    /// The wrapper around the page root.
    Document {
        /// Environment bootstrap markers.
        markers: Vec<String>,
        /// The page root, if any.
        children: Vec<RenderNode>,
    },
    /// A rendered instance.
    Element(ElementNode),
    /// Literal text.
    Text {
        /// The text.
        text: String,
    },
    /// Stand-in for an instance whose component is not registered.
    Placeholder {
        /// Instance id.
        key: InstanceId,
        /// The missing component.
        component: String,
    },
}

impl RenderNode {
    /// Children of this node.
    #[must_use]
    pub fn children(&self) -> &[Self] {
        match self {
            Self::Document { children, .. } => children,
            Self::Element(element) => &element.children,
            Self::Text { .. } | Self::Placeholder { .. } => &[],
        }
    }

    /// The element, if this node is one.
    #[must_use]
    pub const fn as_element(&self) -> Option<&ElementNode> {
        match self {
            Self::Element(element) => Some(element),
            _ => None,
        }
    }

    /// Find an element by instance id, depth first.
    #[must_use]
    pub fn find(&self, key: &str) -> Option<&ElementNode> {
        if let Self::Element(element) = self {
            if element.key == key {
                return Some(element);
            }
        }
        self.children().iter().find_map(|child| child.find(key))
    }

    /// Concatenated text of every text node below.
    #[must_use]
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        if let Self::Text { text } = self {
            out.push_str(text);
        }
        for child in self.children() {
            child.collect_text(out);
        }
    }

    /// The same tree with every affordance removed.
    #[must_use]
    pub fn without_affordances(&self) -> Self {
        let mut node = self.clone();
        node.strip_affordances();
        node
    }

    fn strip_affordances(&mut self) {
        match self {
            Self::Document { children, .. } => children.iter_mut().for_each(Self::strip_affordances),
            Self::Element(element) => {
                element.affordances = None;
                element.children.iter_mut().for_each(Self::strip_affordances);
            }
            Self::Text { .. } | Self::Placeholder { .. } => {}
        }
    }

    /// Render as HTML text.
    #[must_use]
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        match self {
            Self::Document { markers, children } => {
                out.push_str("<!doctype html>");
                for child in children {
                    child.write_html(out);
                }
                for marker in markers {
                    let _ = write!(out, "<!--{marker}-->");
                }
            }
            Self::Element(element) => {
                let tag = if is_valid_name(&element.tag) {
                    element.tag.as_str()
                } else {
                    tracing::warn!(tag = %element.tag, key = %element.key, "Invalid tag name, using div");
                    "div"
                };
                let _ = write!(
                    out,
                    "<{tag} data-instance-id=\"{}\"",
                    escape_html(&element.key)
                );
                for (name, value) in &element.attributes {
                    if is_valid_name(name) {
                        write_attribute(out, name, value);
                    } else {
                        tracing::warn!(attribute = %name, key = %element.key, "Skipping invalid attribute name");
                    }
                }
                for name in element.actions.keys() {
                    if is_valid_name(name) {
                        let _ = write!(out, " data-action-{}=\"\"", name.to_lowercase());
                    } else {
                        tracing::warn!(action = %name, key = %element.key, "Skipping invalid action name");
                    }
                }
                if let Some(affordances) = element.affordances {
                    out.push_str(" data-selectable=\"true\"");
                    if affordances.droppable {
                        out.push_str(" data-droppable=\"true\"");
                    }
                }
                out.push('>');
                if !is_void(tag) {
                    for child in &element.children {
                        child.write_html(out);
                    }
                    let _ = write!(out, "</{tag}>");
                }
            }
            Self::Text { text } => out.push_str(&escape_html(text)),
            Self::Placeholder { key, component } => {
                let _ = write!(
                    out,
                    "<div data-instance-id=\"{}\" data-unknown-component=\"{}\">Unknown component: {}</div>",
                    escape_html(key),
                    escape_html(component),
                    escape_html(component)
                );
            }
        }
    }
}

/// Tag and attribute names are emitted unquoted, so only a safe subset passes.
fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b':' | b'.'))
}

fn write_attribute(out: &mut String, name: &str, value: &Value) {
    match value {
        Value::Undefined | Value::Null | Value::Bool(false) => {}
        Value::Bool(true) => {
            let _ = write!(out, " {name}");
        }
        Value::String(s) => {
            let _ = write!(out, " {name}=\"{}\"", escape_html(s));
        }
        Value::Asset(asset) => {
            let url = asset.url.as_deref().unwrap_or(&asset.name);
            let _ = write!(out, " {name}=\"{}\"", escape_html(url));
        }
        other => {
            let _ = write!(out, " {name}=\"{}\"", escape_html(&other.to_string()));
        }
    }
}

fn is_void(tag: &str) -> bool {
    matches!(tag, "img" | "br" | "hr" | "input" | "meta" | "link")
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Inputs of one build.
#[derive(Debug, Clone, Copy)]
pub struct BuildConfig<'a> {
    /// Render mode.
    pub mode: RenderMode,
    /// Instance graph.
    pub instances: &'a Instances,
    /// Root of the selected page; `None` renders an empty document.
    pub root_instance_id: Option<&'a str>,
    /// Component registry.
    pub registry: &'a ComponentRegistry,
    /// Props resolver over the live values.
    pub resolver: &'a PropsResolver,
    /// Positional indexes for the same root.
    pub indexes: &'a IndexesWithinAncestors,
}

/// Result of a build.
#[derive(Debug)]
pub struct BuildOutput {
    /// The document node.
    pub root: RenderNode,
    /// Unknown components, one per component name.
    pub errors: Vec<StudioError>,
}

impl BuildOutput {
    /// Names of the unknown components reported by the build.
    #[must_use]
    pub fn unknown_components(&self) -> Vec<&str> {
        self.errors
            .iter()
            .filter_map(|e| match e {
                StudioError::UnknownComponent(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }
}

struct Builder<'a> {
    config: BuildConfig<'a>,
    on_path: HashSet<InstanceId>,
    reported: HashSet<String>,
    errors: Vec<StudioError>,
}

/// An element whose children are still being built.
struct Open<'a> {
    id: &'a str,
    element: ElementNode,
    children: std::slice::Iter<'a, InstanceChild>,
}

enum Visit<'a> {
    Leaf(RenderNode),
    Open(Open<'a>),
}

/// Build the render tree for one page.
#[must_use]
pub fn build(config: BuildConfig<'_>) -> BuildOutput {
    let mut builder = Builder {
        config,
        on_path: HashSet::new(),
        reported: HashSet::new(),
        errors: Vec::new(),
    };
    let children = config
        .root_instance_id
        .and_then(|root| builder.tree(root))
        .into_iter()
        .collect();
    tracing::debug!(
        mode = %config.mode,
        root = config.root_instance_id.unwrap_or_default(),
        errors = builder.errors.len(),
        "Built elements tree"
    );
    BuildOutput {
        root: RenderNode::Document {
            markers: BOOTSTRAP_MARKERS.iter().map(ToString::to_string).collect(),
            children,
        },
        errors: builder.errors,
    }
}

impl<'a> Builder<'a> {
    /// Depth-first over an explicit stack of open elements.
    fn tree(&mut self, root: &'a str) -> Option<RenderNode> {
        let mut stack = match self.visit(root)? {
            Visit::Leaf(node) => return Some(node),
            Visit::Open(open) => vec![open],
        };
        while let Some(top) = stack.last_mut() {
            match top.children.next() {
                Some(InstanceChild::Text(text)) => {
                    top.element.children.push(RenderNode::Text { text: text.clone() });
                }
                Some(InstanceChild::Id(child_id)) => match self.visit(child_id) {
                    Some(Visit::Leaf(node)) => top.element.children.push(node),
                    Some(Visit::Open(open)) => stack.push(open),
                    None => {}
                },
                None => {
                    let Some(done) = stack.pop() else { break };
                    self.on_path.remove(done.id);
                    let node = RenderNode::Element(done.element);
                    match stack.last_mut() {
                        Some(parent) => parent.element.children.push(node),
                        None => return Some(node),
                    }
                }
            }
        }
        None
    }

    fn visit(&mut self, id: &'a str) -> Option<Visit<'a>> {
        let instances = self.config.instances;
        let Some(instance) = instances.get(id) else {
            tracing::warn!(instance = %id, "Child instance does not exist");
            return None;
        };
        if self.on_path.contains(id) {
            tracing::warn!(instance = %id, "Skipping instance already on the current path");
            return None;
        }

        let entry = match self.config.registry.resolve_qualified(&instance.component) {
            Ok(entry) => entry,
            Err(e) => {
                if self.reported.insert(instance.component.clone()) {
                    tracing::warn!(component = %instance.component, "Unknown component");
                    self.errors.push(e);
                }
                return match self.config.mode {
                    RenderMode::Design => Some(Visit::Leaf(RenderNode::Placeholder {
                        key: instance.id.clone(),
                        component: instance.component.clone(),
                    })),
                    RenderMode::Preview => None,
                };
            }
        };

        let props = self.config.resolver.resolve_props(id);
        let rendered = entry.component.render(&RenderInput {
            instance,
            props: &props,
            params: self.config.resolver.params(),
            mode: self.config.mode,
        });
        let actions = props
            .iter()
            .filter_map(|(name, prop)| prop.as_action().map(|a| (name.clone(), a.clone())))
            .collect();
        let affordances = (self.config.mode == RenderMode::Design).then(|| Affordances {
            selectable: true,
            droppable: entry.meta.accepts_children(),
            intercept_events: true,
        });

        self.on_path.insert(id.to_string());
        Some(Visit::Open(Open {
            id,
            element: ElementNode {
                key: instance.id.clone(),
                component: instance.component.clone(),
                tag: rendered.tag,
                attributes: rendered.attributes,
                actions,
                index: self.config.indexes.get(id).cloned().unwrap_or_default(),
                affordances,
                children: Vec::with_capacity(instance.children.len()),
            },
            children: instance.children.iter(),
        }))
    }
}
