//! # Render Integration Tests
//!
//! End-to-end checks of the engine: registry, props, data sources and the
//! elements tree builder working together.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use proptest::prelude::*;
use studio_core::{
    base_library, ComponentKind, ComponentMeta, ComponentRegistration, ComponentRegistry,
    DataSource, DataSourceEngine, HookEvent, HookKind, Hooks, Instance, InstanceChild, Page,
    PageDocument, Params, Prop, PropValue, PropsMeta, RenderInput, RenderMode, RenderNode,
    RenderSession, Rendered, ResolvedProp, Value, VariablesMap,
};

fn registry_with(registration: ComponentRegistration) -> Arc<ComponentRegistry> {
    let registry = Arc::new(ComponentRegistry::new());
    registry.register(registration);
    registry
}

fn simple_components() -> ComponentRegistration {
    ComponentRegistration::new()
        .component(
            "A",
            |_: &RenderInput<'_>| Rendered::new("div"),
            ComponentMeta::new(ComponentKind::Container),
            PropsMeta::default(),
        )
        .component(
            "B",
            |_: &RenderInput<'_>| Rendered::new("span"),
            ComponentMeta::new(ComponentKind::RichText),
            PropsMeta::default(),
        )
}

fn two_level_document() -> PageDocument {
    let mut document = PageDocument::new(Page::new("home", "", "a"));
    document.instances = [
        Instance::new("a", "A").with_child("b"),
        Instance::new("b", "B").with_text("hi"),
    ]
    .into_iter()
    .collect();
    document
}

/// `A(children=[B]), B: Text("hi")` renders as a two-level tree.
#[test]
fn test_two_level_preview() {
    let mut session = RenderSession::new(
        registry_with(simple_components()),
        two_level_document(),
        Params::default(),
    );
    let output = session.build(RenderMode::Preview);
    assert!(output.errors.is_empty());

    let RenderNode::Document { children, .. } = &output.root else {
        panic!("expected document root");
    };
    assert_eq!(children.len(), 1);
    let a = children[0].as_element().expect("a is an element");
    assert_eq!(a.key, "a");
    assert_eq!(a.children.len(), 1);
    let b = a.children[0].as_element().expect("b is an element");
    assert_eq!(b.key, "b");
    assert_eq!(b.children, vec![RenderNode::Text { text: "hi".to_string() }]);
    assert_eq!(output.root.text_content(), "hi");
}

/// A prop bound to an undeclared data source renders as undefined and warns
/// once.
#[test]
fn test_unset_href_binding() {
    let mut document = PageDocument::new(Page::new("home", "", "body"));
    document.instances = [
        Instance::new("body", "Body").with_child("link"),
        Instance::new("link", "Link").with_text("Docs"),
    ]
    .into_iter()
    .collect();
    document.props = vec![Prop::bound("link", "href", "x")];

    let mut session = RenderSession::new(registry_with(base_library()), document, Params::default());
    let props = session.resolver().resolve_props("link");
    assert_eq!(props["href"], ResolvedProp::Value(Value::Undefined));

    let output = session.build(RenderMode::Preview);
    let _ = session.build(RenderMode::Design);
    let link = output.root.find("link").expect("link");
    assert_eq!(link.attributes.get("href"), Some(&Value::from("#")));
    assert_eq!(session.resolver().warning_count(), 1);
}

/// Re-registering a component switches the renderer and registers its hooks.
#[test]
fn test_reregister_with_hooks() {
    let registry = Arc::new(ComponentRegistry::new());
    registry.register(ComponentRegistration::new().component(
        "Btn",
        |_: &RenderInput<'_>| Rendered::new("button"),
        ComponentMeta::new(ComponentKind::Control),
        PropsMeta::default(),
    ));

    let mounts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&mounts);
    registry.register(
        ComponentRegistration::new()
            .renderer("Btn", |_: &RenderInput<'_>| {
                Rendered::new("button").attr("data-variant", "second")
            })
            .with_hooks(Hooks::new().on_mount(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
    );

    let mut document = PageDocument::new(Page::new("home", "", "btn"));
    document.instances = std::iter::once(Instance::new("btn", "Btn")).collect();
    let mut session = RenderSession::new(Arc::clone(&registry), document, Params::default());
    let output = session.build(RenderMode::Preview);
    let button = output.root.find("btn").expect("btn");
    assert_eq!(button.attributes.get("data-variant"), Some(&Value::from("second")));

    assert_eq!(registry.hook_count(HookKind::Mount), 1);
    assert_eq!(registry.dispatch_hook(&HookEvent::Mount), 1);
    assert_eq!(mounts.load(Ordering::SeqCst), 1);
}

/// Identical inputs give identical trees.
#[test]
fn test_build_is_deterministic() {
    let mut document = two_level_document();
    document.props = vec![
        Prop::literal("a", "id", "first"),
        Prop::literal("a", "role", "main"),
        Prop::bound("b", "title", "label"),
    ];
    document.data_sources = vec![DataSource::variable("label", "hello")];

    let registry = registry_with(simple_components());
    let mut first = RenderSession::new(Arc::clone(&registry), document.clone(), Params::default());
    let mut second = RenderSession::new(registry, document, Params::default());
    for mode in [RenderMode::Design, RenderMode::Preview] {
        let a = first.build(mode);
        let b = second.build(mode);
        assert_eq!(a.root, b.root);
        assert_eq!(
            serde_json::to_string(&a.root).expect("serialize"),
            serde_json::to_string(&b.root).expect("serialize")
        );
        assert_eq!(a.root.to_html(), b.root.to_html());
    }
}

/// Design and preview differ only in affordances.
#[test]
fn test_design_preview_equivalence() {
    let mut session = RenderSession::new(
        registry_with(simple_components()),
        two_level_document(),
        Params::default(),
    );
    let design = session.build(RenderMode::Design);
    let preview = session.build(RenderMode::Preview);
    assert_ne!(design.root, preview.root);
    assert_eq!(design.root.without_affordances(), preview.root);
    assert!(design.root.find("a").and_then(|a| a.affordances).is_some());
}

/// Components a generated page draws from; `Ghost` is never registered.
const GENERATED_COMPONENTS: &[&str] = &["Box", "Text", "Heading", "Link", "Image", "Ghost"];

/// A page under a `Body` root where every generated instance hangs off an
/// earlier one. Returns the document and whether it uses `Ghost`.
fn arb_page() -> impl Strategy<Value = (PageDocument, bool)> {
    (
        prop::collection::vec(
            (
                0..GENERATED_COMPONENTS.len(),
                any::<prop::sample::Index>(),
                0u8..4,
                any::<bool>(),
            ),
            0..16,
        ),
        any::<bool>(),
    )
        .prop_map(|(nodes, declared)| {
            let mut instances = vec![Instance::new("n0", "Body")];
            let mut props = Vec::new();
            let mut has_unknown = false;
            for (i, (component, parent, prop, text)) in nodes.into_iter().enumerate() {
                let id = format!("n{}", i + 1);
                let component = GENERATED_COMPONENTS[component];
                has_unknown |= component == "Ghost";
                instances[parent.index(i + 1)]
                    .children
                    .push(InstanceChild::Id(id.clone()));

                let mut instance = Instance::new(id.clone(), component);
                if text {
                    instance = instance.with_text(format!("text {i}"));
                }
                let bound_prop = match component {
                    "Link" => "href",
                    "Image" => "src",
                    _ => "title",
                };
                match prop {
                    1 => props.push(Prop::literal(&id, "title", format!("t{i}"))),
                    2 => props.push(Prop::bound(&id, bound_prop, "x")),
                    3 => props.push(match component {
                        "Link" => Prop::new(
                            &id,
                            "href",
                            PropValue::Page {
                                page_id: "home".to_string(),
                                hash: Some("top".to_string()),
                            },
                        ),
                        "Image" => Prop::literal(&id, "src", "/img/a.png"),
                        _ => Prop::literal(&id, "id", id.clone()),
                    }),
                    _ => {}
                }
                instances.push(instance);
            }

            let mut document = PageDocument::new(Page::new("home", "", "n0"));
            document.instances = instances.into_iter().collect();
            document.props = props;
            if declared {
                document.data_sources = vec![DataSource::variable("x", "/bound")];
            }
            (document, has_unknown)
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Generated pages build identically twice, and design equals preview
    /// once affordances are removed unless a component is unknown.
    #[test]
    fn prop_generated_pages_build_consistently((document, has_unknown) in arb_page()) {
        let registry = registry_with(base_library());
        let mut first = RenderSession::new(Arc::clone(&registry), document.clone(), Params::default());
        let mut second = RenderSession::new(registry, document, Params::default());

        let design = first.build(RenderMode::Design);
        let preview = first.build(RenderMode::Preview);
        prop_assert_eq!(&design.root, &second.build(RenderMode::Design).root);
        prop_assert_eq!(&preview.root, &second.build(RenderMode::Preview).root);

        if has_unknown {
            prop_assert_eq!(preview.unknown_components(), vec!["Ghost"]);
        } else {
            prop_assert!(design.errors.is_empty());
            prop_assert_eq!(design.root.without_affordances(), preview.root);
        }
    }
}

/// Readers never observe half of a multi-key update.
#[test]
fn test_set_values_atomic_under_concurrent_readers() {
    let engine = Arc::new(DataSourceEngine::default());
    engine.mount([DataSource::variable("left", 0), DataSource::variable("right", 0)]);

    let writer = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            for i in 1..=500 {
                let mut updates = VariablesMap::new();
                updates.insert("left".to_string(), Value::from(i));
                updates.insert("right".to_string(), Value::from(i));
                engine.set_values(updates);
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for _ in 0..500 {
                    let values = engine.values();
                    assert_eq!(values["left"], values["right"], "torn read");
                }
            })
        })
        .collect();

    writer.join().expect("writer");
    for reader in readers {
        reader.join().expect("reader");
    }
    assert_eq!(engine.get_value("left"), Some(Value::from(500)));
}

/// A failing action leaves every value untouched.
#[test]
fn test_failed_action_applies_nothing() {
    let mut document = two_level_document();
    document.data_sources = vec![DataSource::variable("a", 1), DataSource::variable("b", 2)];
    document.props = vec![Prop::action("a", "onClick", "a = 10; b = missing + 1", &[])];

    let session = RenderSession::new(
        registry_with(simple_components()),
        document,
        Params::default(),
    );
    let revision = session.data().revision();
    assert!(session.run_action("a", "onClick", VariablesMap::new()).is_err());
    assert_eq!(session.data().get_value("a"), Some(Value::from(1)));
    assert_eq!(session.data().revision(), revision);
}
