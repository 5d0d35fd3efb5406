//! # Bridge Integration Tests
//!
//! Builder and canvas wired together over an in-process channel pair.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use studio_core::{
    base_library, ComponentRegistration, ComponentRegistry, DataSource, HookKind, Hooks, Instance,
    InstancesPatch, Page, PageDocument, Params, Prop, PropsPatch, RenderMode, RenderSession,
    Value, VariablesMap,
};
use studio_sync::{
    BuilderContext, CanvasContext, Channel, Interaction, InteractionKind, InterceptOutcome,
    MessageKind, SyncMessage,
};

fn document() -> PageDocument {
    let mut document = PageDocument::new(Page::new("home", "", "body"));
    document.instances = [
        Instance::new("body", "Body").with_child("title").with_child("button"),
        Instance::new("title", "Heading").with_text("Hello"),
        Instance::new("button", "Box"),
    ]
    .into_iter()
    .collect();
    document.props = vec![
        Prop::bound("title", "title", "count"),
        Prop::action("button", "onClick", "count = count + 1", &[]),
    ];
    document.data_sources = vec![DataSource::variable("count", 0)];
    document
}

fn registry() -> Arc<ComponentRegistry> {
    let registry = Arc::new(ComponentRegistry::new());
    registry.register(base_library());
    registry
}

struct Bridge {
    builder: BuilderContext,
    canvas: CanvasContext,
    to_canvas: Channel,
    to_builder: Channel,
}

impl Bridge {
    fn new() -> Self {
        let (builder_end, canvas_end) = Channel::pair();
        let builder = BuilderContext::new(document(), builder_end.outbox());
        // The canvas starts empty and learns the document from the builder.
        let session = RenderSession::new(
            registry(),
            PageDocument::new(Page::new("home", "", "body")),
            Params::default(),
        );
        let canvas = CanvasContext::new(session, canvas_end.outbox());
        Self {
            builder,
            canvas,
            to_canvas: canvas_end,
            to_builder: builder_end,
        }
    }

    /// Deliver everything in flight, both ways, until both queues are empty.
    fn pump(&mut self) {
        loop {
            let mut moved = false;
            while let Some(message) = self.to_canvas.try_recv() {
                self.canvas.handle(message).expect("canvas handle");
                moved = true;
            }
            while let Some(message) = self.to_builder.try_recv() {
                self.builder.handle(message).expect("builder handle");
                moved = true;
            }
            if !moved {
                break;
            }
        }
    }
}

/// The handshake completes once and ships the document to the canvas.
#[test]
fn test_handshake_delivers_document() {
    let mut bridge = Bridge::new();
    bridge.builder.connect().expect("connect");
    bridge.pump();

    assert!(bridge.builder.is_established());
    assert!(bridge.canvas.is_established());
    assert_eq!(bridge.canvas.effective_mode(), RenderMode::Design);

    let output = bridge.canvas.render();
    assert!(output.errors.is_empty());
    let title = output.root.find("title").expect("title");
    assert_eq!(title.attributes.get("title"), Some(&Value::from(0)));
    assert!(title.affordances.is_some());

    // A second handshake changes nothing.
    bridge
        .canvas
        .handle(SyncMessage::handshake("late"))
        .expect("repeat");
    assert!(bridge.canvas.is_established());
}

/// Before the handshake, selection waits in the queue and affordances stay
/// off; the handshake replays it.
#[test]
fn test_selection_before_handshake_is_queued() {
    let mut bridge = Bridge::new();
    bridge
        .canvas
        .handle(SyncMessage::SelectionChange {
            instance_id: Some("body".to_string()),
        })
        .expect("selection");

    assert_eq!(bridge.canvas.selection(), None);
    assert_eq!(bridge.canvas.pending_len(), 1);
    assert_eq!(bridge.canvas.effective_mode(), RenderMode::Preview);
    let output = bridge.canvas.render();
    assert!(output
        .root
        .find("body")
        .map_or(true, |body| body.affordances.is_none()));

    bridge.builder.connect().expect("connect");
    bridge.pump();
    assert_eq!(bridge.canvas.selection(), Some("body"));
    assert_eq!(bridge.canvas.pending_len(), 0);
    let output = bridge.canvas.render();
    assert!(output
        .root
        .find("body")
        .is_some_and(|body| body.affordances.is_some()));
}

/// A canvas selection made before connecting reaches the builder only after
/// the handshake.
#[test]
fn test_canvas_selection_sent_after_handshake() {
    let mut bridge = Bridge::new();
    bridge
        .canvas
        .select(Some("title".to_string()))
        .expect("select");
    assert!(bridge.to_builder.try_recv().is_none());
    assert_eq!(bridge.canvas.outgoing_len(), 1);

    bridge.builder.connect().expect("connect");
    bridge.pump();
    assert_eq!(bridge.builder.selection(), Some("title"));
    assert_eq!(bridge.canvas.outgoing_len(), 0);
}

/// Edits made before connecting reach the canvas in order after the document.
#[test]
fn test_edits_replayed_after_document() {
    let mut bridge = Bridge::new();
    bridge
        .builder
        .apply_instances_patch(InstancesPatch {
            updates: vec![
                Instance::new("body", "Body")
                    .with_child("title")
                    .with_child("button")
                    .with_child("extra")
                    .into(),
                Instance::new("extra", "Text").with_text("Added").into(),
            ],
            removals: vec![],
        })
        .expect("patch");
    bridge
        .builder
        .apply_props_patch(PropsPatch {
            upserts: vec![Prop::literal("extra", "id", "late")],
            removals: vec![],
        })
        .expect("props");

    bridge.builder.connect().expect("connect");
    bridge.pump();

    let output = bridge.canvas.render();
    let extra = output.root.find("extra").expect("extra");
    assert_eq!(extra.attributes.get("id"), Some(&Value::from("late")));
    assert_eq!(output.root.find("body").expect("body").children.len(), 3);
}

/// Selection travels both ways without bouncing back.
#[test]
fn test_selection_is_not_echoed() {
    let mut bridge = Bridge::new();
    bridge.builder.connect().expect("connect");
    bridge.pump();

    bridge
        .builder
        .select(Some("title".to_string()))
        .expect("select");
    bridge.pump();
    assert_eq!(bridge.canvas.selection(), Some("title"));
    assert!(bridge.to_canvas.try_recv().is_none());
    assert!(bridge.to_builder.try_recv().is_none());

    bridge.canvas.set_hover(Some("button".to_string())).expect("hover");
    bridge.pump();
    assert_eq!(bridge.builder.hover(), Some("button"));
    assert!(bridge.to_canvas.try_recv().is_none());
}

/// Selecting on the canvas fires selection hooks with the ancestor path.
#[test]
fn test_selection_hook_receives_path() {
    let mut bridge = Bridge::new();
    let paths = Arc::new(std::sync::Mutex::new(Vec::new()));
    let seen = Arc::clone(&paths);
    bridge
        .canvas
        .session()
        .registry()
        .register(ComponentRegistration::new().with_hooks(Hooks::new().on(
            HookKind::SelectionChanged,
            move |event| {
                if let studio_core::HookEvent::SelectionChanged { instance_path } = event {
                    seen.lock().expect("lock").push(instance_path.clone());
                }
            },
        )));
    bridge.builder.connect().expect("connect");
    bridge.pump();

    bridge
        .canvas
        .select(Some("title".to_string()))
        .expect("select");
    let paths = paths.lock().expect("lock");
    assert_eq!(paths.last(), Some(&vec!["title".to_string(), "body".to_string()]));
}

/// Design mode swallows clicks; preview runs the action and syncs the value.
#[test]
fn test_interaction_interception() {
    let mut bridge = Bridge::new();
    bridge.builder.connect().expect("connect");
    bridge.pump();

    let outcome = bridge
        .canvas
        .intercept(Interaction::new("button", InteractionKind::Click))
        .expect("design");
    assert_eq!(outcome, InterceptOutcome::Suppressed);
    bridge.pump();
    assert_eq!(bridge.builder.interactions().len(), 1);

    bridge.builder.set_preview(true).expect("preview");
    bridge.pump();
    assert_eq!(bridge.canvas.effective_mode(), RenderMode::Preview);

    let outcome = bridge
        .canvas
        .intercept(Interaction::new("button", InteractionKind::Click))
        .expect("preview");
    assert_eq!(
        outcome,
        InterceptOutcome::Passed {
            updated: vec!["count".to_string()]
        }
    );
    bridge.pump();
    assert_eq!(bridge.builder.values().get("count"), Some(&Value::from(1)));

    let output = bridge.canvas.flush().expect("stale");
    let title = output.root.find("title").expect("title");
    assert_eq!(title.attributes.get("title"), Some(&Value::from(1)));
    assert!(title.affordances.is_none());
}

/// Values pushed by the builder render on the canvas's next flush.
#[test]
fn test_builder_values_render() {
    let mut bridge = Bridge::new();
    bridge.builder.connect().expect("connect");
    bridge.pump();
    let _ = bridge.canvas.flush();

    let mut values = VariablesMap::new();
    values.insert("count".to_string(), Value::from(42));
    bridge.builder.set_values(values).expect("values");
    bridge.pump();

    let output = bridge.canvas.flush().expect("stale");
    let title = output.root.find("title").expect("title");
    assert_eq!(title.attributes.get("title"), Some(&Value::from(42)));
}

/// Dropped subscriptions stop receiving and are no longer counted.
#[test]
fn test_subscription_lifetime() {
    let bridge = Bridge::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let subscription = bridge
        .builder
        .subscribe(MessageKind::SelectionChange, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    assert_eq!(bridge.builder.bus().subscriber_count(), 1);

    bridge
        .builder
        .bus()
        .publish(&SyncMessage::SelectionChange { instance_id: None });
    drop(subscription);
    bridge
        .builder
        .bus()
        .publish(&SyncMessage::SelectionChange { instance_id: None });

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(bridge.builder.bus().subscriber_count(), 0);
}

/// The channel carries the same flow across tasks.
#[tokio::test]
async fn test_async_channel_flow() {
    let (builder_end, mut canvas_end) = Channel::pair();
    let mut builder = BuilderContext::new(document(), builder_end.outbox());
    let session = RenderSession::new(registry(), document(), Params::default());
    let mut canvas = CanvasContext::new(session, canvas_end.outbox());

    builder.connect().expect("connect");
    let handshake = canvas_end.recv().await.expect("handshake");
    canvas.handle(handshake).expect("canvas handshake");

    let (_, mut builder_rx) = builder_end.split();
    let reply = builder_rx.recv().await.expect("reply");
    assert_eq!(reply.kind(), MessageKind::Handshake);
    builder.handle(reply).expect("builder handshake");

    let loaded = canvas_end.recv().await.expect("document");
    assert_eq!(loaded.kind(), MessageKind::DocumentLoaded);
    canvas.handle(loaded).expect("load");
    assert!(canvas.render().errors.is_empty());
}
