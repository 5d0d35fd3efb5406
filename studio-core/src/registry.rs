//! Component registry - maps (namespace, name) to renderers and metadata.
//!
//! Pluggable component libraries contribute a [`ComponentRegistration`]. The
//! registry merges them in order: a later registration for the same
//! qualified name replaces the renderer and metadata, while hooks accumulate
//! in a shared [`HookTable`] and fire regardless of which library declared
//! them.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::instance::{Instance, InstanceId};
use crate::page::Params;
use crate::props::ResolvedProps;
use crate::tree::RenderMode;
use crate::value::Value;
use crate::{StudioError, StudioResult};

/// Separator between namespace and component name.
pub const NAMESPACE_SEPARATOR: char = ':';

/// Build a qualified component name.
#[must_use]
pub fn qualified_name(namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(ns) if !ns.is_empty() => format!("{ns}{NAMESPACE_SEPARATOR}{name}"),
        _ => name.to_string(),
    }
}

/// Split a qualified component name into (namespace, name).
#[must_use]
pub fn split_qualified(component: &str) -> (Option<&str>, &str) {
    match component.rsplit_once(NAMESPACE_SEPARATOR) {
        Some((ns, name)) => (Some(ns), name),
        None => (None, component),
    }
}

/// Everything a component needs to render one instance.
#[derive(Debug)]
pub struct RenderInput<'a> {
    /// The instance being rendered.
    pub instance: &'a Instance,
    /// Its resolved props.
    pub props: &'a ResolvedProps,
    /// Asset URL parameters.
    pub params: &'a Params,
    /// Render mode.
    pub mode: RenderMode,
}

/// What a component renders for one instance; children are added by the
/// tree builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rendered {
    /// Host element tag.
    pub tag: String,
    /// Host element attributes.
    pub attributes: IndexMap<String, Value>,
}

impl Rendered {
    /// Create an element with no attributes.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: IndexMap::new(),
        }
    }

    /// Add an attribute.
    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

/// A renderer contributed by a component library.
pub trait Component: Send + Sync {
    /// Render one instance.
    fn render(&self, input: &RenderInput<'_>) -> Rendered;
}

impl<F> Component for F
where
    F: Fn(&RenderInput<'_>) -> Rendered + Send + Sync,
{
    fn render(&self, input: &RenderInput<'_>) -> Rendered {
        self(input)
    }
}

/// Broad category of a component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComponentKind {
    /// Accepts instance children.
    #[default]
    Container,
    /// Leaf control without children.
    Control,
    /// Accepts only text and inline children.
    RichText,
    /// Embeds external content.
    Embed,
}

/// Metadata describing a component's structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentMeta {
    /// Component category.
    #[serde(default)]
    pub kind: ComponentKind,
    /// Human-readable label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Named slots the component exposes.
    #[serde(default)]
    pub slots: Vec<String>,
    /// Components allowed as direct children; `None` allows any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_children: Option<Vec<String>>,
    /// Ancestor component within which instances of this component are
    /// numbered (e.g. tab triggers within their tabs).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_within_ancestor: Option<String>,
}

impl ComponentMeta {
    /// Metadata for a component of `kind`.
    #[must_use]
    pub fn new(kind: ComponentKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    /// Whether instances of this component can receive dropped children.
    #[must_use]
    pub const fn accepts_children(&self) -> bool {
        matches!(self.kind, ComponentKind::Container | ComponentKind::RichText)
    }

    /// Whether `component` may be a direct child.
    #[must_use]
    pub fn allows_child(&self, component: &str) -> bool {
        self.accepts_children()
            && self
                .allowed_children
                .as_ref()
                .map_or(true, |allowed| allowed.iter().any(|c| c == component))
    }
}

/// Type of a prop as shown in the props panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropKind {
    /// Free text.
    String,
    /// Number.
    Number,
    /// Checkbox.
    Boolean,
    /// Page, asset or free URL.
    Url,
    /// Uploaded asset.
    Asset,
    /// Effectful action.
    Action,
    /// Arbitrary structured value.
    Json,
}

/// Description of one prop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropMeta {
    /// Prop type.
    pub kind: PropKind,
    /// Whether the prop must be set.
    #[serde(default)]
    pub required: bool,
    /// Default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl PropMeta {
    /// An optional prop of `kind`.
    #[must_use]
    pub const fn optional(kind: PropKind) -> Self {
        Self {
            kind,
            required: false,
            default: None,
        }
    }
}

/// Description of a component's props.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropsMeta {
    /// Props by name, in panel order.
    #[serde(default)]
    pub props: IndexMap<String, PropMeta>,
    /// Props shown initially in the panel.
    #[serde(default)]
    pub initial_props: Vec<String>,
}

impl PropsMeta {
    /// Add a prop description.
    #[must_use]
    pub fn prop(mut self, name: impl Into<String>, meta: PropMeta) -> Self {
        self.props.insert(name.into(), meta);
        self
    }
}

/// Structural events hooks can react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookEvent {
    /// The canvas mounted its component libraries.
    Mount,
    /// An instance was added to the graph.
    InstanceAdded {
        /// The new instance.
        instance_id: InstanceId,
        /// Its qualified component.
        component: String,
    },
    /// An instance was removed from the graph.
    InstanceRemoved {
        /// The removed instance.
        instance_id: InstanceId,
    },
    /// The selected instance changed; the path runs from the instance up to
    /// the root and is empty when the selection was cleared.
    SelectionChanged {
        /// Selected instance and its ancestors.
        instance_path: Vec<InstanceId>,
    },
}

impl HookEvent {
    /// The hook kind this event triggers.
    #[must_use]
    pub const fn kind(&self) -> HookKind {
        match self {
            Self::Mount => HookKind::Mount,
            Self::InstanceAdded { .. } => HookKind::InstanceAdded,
            Self::InstanceRemoved { .. } => HookKind::InstanceRemoved,
            Self::SelectionChanged { .. } => HookKind::SelectionChanged,
        }
    }
}

/// Kinds of lifecycle hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    /// See [`HookEvent::Mount`].
    Mount,
    /// See [`HookEvent::InstanceAdded`].
    InstanceAdded,
    /// See [`HookEvent::InstanceRemoved`].
    InstanceRemoved,
    /// See [`HookEvent::SelectionChanged`].
    SelectionChanged,
}

/// A lifecycle callback.
pub type HookFn = Arc<dyn Fn(&HookEvent) + Send + Sync>;

/// Lifecycle callbacks contributed by one library.
#[derive(Clone, Default)]
pub struct Hooks {
    entries: Vec<(HookKind, HookFn)>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds: Vec<_> = self.entries.iter().map(|(kind, _)| kind).collect();
        f.debug_struct("Hooks").field("kinds", &kinds).finish()
    }
}

impl Hooks {
    /// No hooks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a callback for `kind`.
    #[must_use]
    pub fn on(mut self, kind: HookKind, hook: impl Fn(&HookEvent) + Send + Sync + 'static) -> Self {
        self.entries.push((kind, Arc::new(hook)));
        self
    }

    /// Shorthand for a [`HookKind::Mount`] callback.
    #[must_use]
    pub fn on_mount(self, hook: impl Fn(&HookEvent) + Send + Sync + 'static) -> Self {
        self.on(HookKind::Mount, hook)
    }

    /// Number of callbacks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no callbacks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Every registered hook, grouped by kind.
#[derive(Default)]
pub struct HookTable {
    hooks: HashMap<HookKind, Vec<(Option<String>, HookFn)>>,
}

impl fmt::Debug for HookTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<_, _> = self.hooks.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("HookTable").field("counts", &counts).finish()
    }
}

impl HookTable {
    fn subscribe(&mut self, namespace: Option<&str>, hooks: &Hooks) {
        for (kind, hook) in &hooks.entries {
            self.hooks
                .entry(*kind)
                .or_default()
                .push((namespace.map(str::to_string), Arc::clone(hook)));
        }
    }

    /// Number of hooks registered for `kind`.
    #[must_use]
    pub fn count(&self, kind: HookKind) -> usize {
        self.hooks.get(&kind).map_or(0, Vec::len)
    }

    fn callbacks(&self, kind: HookKind) -> Vec<HookFn> {
        self.hooks
            .get(&kind)
            .map(|hooks| hooks.iter().map(|(_, hook)| Arc::clone(hook)).collect())
            .unwrap_or_default()
    }
}

/// A component library's contribution to the registry.
#[derive(Default)]
pub struct ComponentRegistration {
    /// Namespace prefixing every name; `None` registers into the default
    /// namespace.
    pub namespace: Option<String>,
    /// Renderers by name.
    pub components: IndexMap<String, Arc<dyn Component>>,
    /// Structural metadata by name.
    pub metas: IndexMap<String, ComponentMeta>,
    /// Props metadata by name.
    pub props_metas: IndexMap<String, PropsMeta>,
    /// Lifecycle callbacks.
    pub hooks: Option<Hooks>,
}

impl fmt::Debug for ComponentRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistration")
            .field("namespace", &self.namespace)
            .field("components", &self.components.keys().collect::<Vec<_>>())
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

impl ComponentRegistration {
    /// Start a registration in the default namespace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a registration in `namespace`.
    #[must_use]
    pub fn namespaced(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            ..Self::default()
        }
    }

    /// Add a component with its metadata.
    #[must_use]
    pub fn component(
        mut self,
        name: impl Into<String>,
        component: impl Component + 'static,
        meta: ComponentMeta,
        props_meta: PropsMeta,
    ) -> Self {
        let name = name.into();
        self.components.insert(name.clone(), Arc::new(component));
        self.metas.insert(name.clone(), meta);
        self.props_metas.insert(name, props_meta);
        self
    }

    /// Add only a renderer, keeping any previously registered metadata.
    #[must_use]
    pub fn renderer(mut self, name: impl Into<String>, component: impl Component + 'static) -> Self {
        self.components.insert(name.into(), Arc::new(component));
        self
    }

    /// Attach lifecycle hooks.
    #[must_use]
    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = Some(hooks);
        self
    }
}

/// A resolved registry entry.
#[derive(Clone)]
pub struct RendererEntry {
    /// Qualified name.
    pub name: String,
    /// Renderer.
    pub component: Arc<dyn Component>,
    /// Structural metadata (default if none was registered).
    pub meta: ComponentMeta,
    /// Props metadata (default if none was registered).
    pub props_meta: PropsMeta,
}

impl fmt::Debug for RendererEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RendererEntry")
            .field("name", &self.name)
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct RegistryState {
    components: HashMap<String, Arc<dyn Component>>,
    metas: HashMap<String, ComponentMeta>,
    props_metas: HashMap<String, PropsMeta>,
    namespaces: Vec<Option<String>>,
    hooks: HookTable,
    revision: u64,
}

/// Process-scoped component registry.
///
/// Created once at mount, shared by reference (usually `Arc`), and only ever
/// appended to.
#[derive(Default)]
pub struct ComponentRegistry {
    state: RwLock<RegistryState>,
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.read();
        f.debug_struct("ComponentRegistry")
            .field("components", &state.components.len())
            .field("hooks", &state.hooks)
            .field("revision", &state.revision)
            .finish()
    }
}

impl ComponentRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RegistryState> {
        self.state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, RegistryState> {
        self.state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Merge a registration.
    pub fn register(&self, registration: ComponentRegistration) {
        let ComponentRegistration {
            namespace,
            components,
            metas,
            props_metas,
            hooks,
        } = registration;
        let ns = namespace.as_deref();
        let mut state = self.write();

        let count = components.len();
        for (name, component) in components {
            let qualified = qualified_name(ns, &name);
            if state.components.insert(qualified.clone(), component).is_some() {
                tracing::debug!(component = %qualified, "Overriding registered renderer");
            }
        }
        for (name, meta) in metas {
            state.metas.insert(qualified_name(ns, &name), meta);
        }
        for (name, props_meta) in props_metas {
            state.props_metas.insert(qualified_name(ns, &name), props_meta);
        }
        if let Some(hooks) = &hooks {
            state.hooks.subscribe(ns, hooks);
        }
        if !state.namespaces.contains(&namespace) {
            state.namespaces.push(namespace.clone());
        }
        state.revision += 1;
        tracing::info!(
            namespace = ns.unwrap_or("<default>"),
            components = count,
            hooks = hooks.as_ref().map_or(0, Hooks::len),
            "Registered component library"
        );
    }

    /// Resolve a component by namespace and name.
    ///
    /// # Errors
    ///
    /// Returns [`StudioError::UnknownComponent`] if no renderer is registered.
    pub fn resolve(&self, namespace: Option<&str>, name: &str) -> StudioResult<RendererEntry> {
        self.resolve_qualified(&qualified_name(namespace, name))
    }

    /// Resolve a component by qualified name (`namespace:Name` or `Name`).
    ///
    /// # Errors
    ///
    /// Returns [`StudioError::UnknownComponent`] if no renderer is registered.
    pub fn resolve_qualified(&self, qualified: &str) -> StudioResult<RendererEntry> {
        let state = self.read();
        let component = state
            .components
            .get(qualified)
            .ok_or_else(|| StudioError::UnknownComponent(qualified.to_string()))?;
        Ok(RendererEntry {
            name: qualified.to_string(),
            component: Arc::clone(component),
            meta: state.metas.get(qualified).cloned().unwrap_or_default(),
            props_meta: state.props_metas.get(qualified).cloned().unwrap_or_default(),
        })
    }

    /// Snapshot of structural metadata by qualified name.
    #[must_use]
    pub fn metas(&self) -> HashMap<String, ComponentMeta> {
        self.read().metas.clone()
    }

    /// Fire every hook registered for the event's kind. Returns how many ran.
    pub fn dispatch_hook(&self, event: &HookEvent) -> usize {
        // Clone the callbacks out so hooks may call back into the registry.
        let callbacks = self.read().hooks.callbacks(event.kind());
        for hook in &callbacks {
            hook(event);
        }
        callbacks.len()
    }

    /// Number of hooks registered for `kind`.
    #[must_use]
    pub fn hook_count(&self, kind: HookKind) -> usize {
        self.read().hooks.count(kind)
    }

    /// Registered namespaces in registration order (`None` is the default).
    #[must_use]
    pub fn namespaces(&self) -> Vec<Option<String>> {
        self.read().namespaces.clone()
    }

    /// Number of registered renderers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().components.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().components.is_empty()
    }

    /// Bumps on every registration.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.read().revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tag(name: &'static str) -> impl Component {
        move |_: &RenderInput<'_>| Rendered::new(name)
    }

    fn render_tag(registry: &ComponentRegistry, name: &str) -> String {
        let entry = registry.resolve_qualified(name).expect("resolve");
        let instance = Instance::new("i", name);
        let props = ResolvedProps::new();
        let params = Params::default();
        entry
            .component
            .render(&RenderInput {
                instance: &instance,
                props: &props,
                params: &params,
                mode: RenderMode::Preview,
            })
            .tag
    }

    #[test]
    fn test_resolve_unknown() {
        let registry = ComponentRegistry::new();
        assert!(matches!(
            registry.resolve(None, "Missing"),
            Err(StudioError::UnknownComponent(name)) if name == "Missing"
        ));
    }

    #[test]
    fn test_later_registration_overrides_renderer_and_merges_hooks() {
        let registry = ComponentRegistry::new();
        registry.register(ComponentRegistration::new().component(
            "Btn",
            tag("button"),
            ComponentMeta::new(ComponentKind::Control),
            PropsMeta::default(),
        ));

        let mounted = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&mounted);
        registry.register(
            ComponentRegistration::new()
                .renderer("Btn", tag("x-button"))
                .with_hooks(Hooks::new().on_mount(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                })),
        );

        assert_eq!(render_tag(&registry, "Btn"), "x-button");
        // Metadata from the first registration survives a renderer-only override.
        let entry = registry.resolve(None, "Btn").expect("resolve");
        assert_eq!(entry.meta.kind, ComponentKind::Control);
        assert_eq!(registry.hook_count(HookKind::Mount), 1);
        assert_eq!(registry.dispatch_hook(&HookEvent::Mount), 1);
        assert_eq!(mounted.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_hooks_accumulate_across_libraries() {
        let registry = ComponentRegistry::new();
        let fired = Arc::new(AtomicUsize::new(0));
        for ns in ["a", "b"] {
            let fired = Arc::clone(&fired);
            registry.register(
                ComponentRegistration::namespaced(ns).with_hooks(Hooks::new().on(
                    HookKind::InstanceRemoved,
                    move |_| {
                        fired.fetch_add(1, Ordering::SeqCst);
                    },
                )),
            );
        }
        let ran = registry.dispatch_hook(&HookEvent::InstanceRemoved {
            instance_id: "x".to_string(),
        });
        assert_eq!(ran, 2);
        assert_eq!(fired.load(Ordering::SeqCst), 2);
        assert_eq!(registry.dispatch_hook(&HookEvent::Mount), 0);
    }

    #[test]
    fn test_namespaces_are_disjoint() {
        let registry = ComponentRegistry::new();
        registry.register(ComponentRegistration::new().renderer("Link", tag("a")));
        registry.register(ComponentRegistration::namespaced("@kit/nav").renderer("Link", tag("nav-a")));
        assert_eq!(render_tag(&registry, "Link"), "a");
        assert_eq!(render_tag(&registry, "@kit/nav:Link"), "nav-a");
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.namespaces(),
            vec![None, Some("@kit/nav".to_string())]
        );
    }

    #[test]
    fn test_split_qualified() {
        assert_eq!(split_qualified("Box"), (None, "Box"));
        assert_eq!(split_qualified("@kit/ui:Tabs"), (Some("@kit/ui"), "Tabs"));
        assert_eq!(qualified_name(Some("@kit/ui"), "Tabs"), "@kit/ui:Tabs");
        assert_eq!(qualified_name(Some(""), "Tabs"), "Tabs");
    }

    #[test]
    fn test_meta_children_rules() {
        let mut meta = ComponentMeta::new(ComponentKind::Container);
        assert!(meta.allows_child("Anything"));
        meta.allowed_children = Some(vec!["TabsTrigger".to_string()]);
        assert!(meta.allows_child("TabsTrigger"));
        assert!(!meta.allows_child("Box"));
        assert!(!ComponentMeta::new(ComponentKind::Control).accepts_children());
    }
}
