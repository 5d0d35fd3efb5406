//! Canvas execution context.
//!
//! The canvas owns a [`RenderSession`] and mirrors whatever the builder sends.
//! Until the handshake completes it renders in preview mode only: design
//! affordances (selection outlines, drop targets, event interception) stay
//! off, and messages in both directions wait in bounded queues.

use studio_core::{
    codec, BuildOutput, DataSourceId, HookEvent, InstanceId, Invalidation, RenderMode,
    RenderSession, ResolvedProp, VariablesMap,
};

use crate::channel::Outbox;
use crate::error::{SyncError, SyncResult};
use crate::handshake::{Handshake, PendingQueue};
use crate::protocol::{Interaction, MessageKind, SyncMessage};
use crate::pubsub::{PubSub, Subscription};

/// What happened to an interaction handed to [`CanvasContext::intercept`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterceptOutcome {
    /// Design mode swallowed the event and reported it to the builder.
    Suppressed,
    /// The event reached the component.
    Passed {
        /// Data sources written by the action it fired, if any.
        updated: Vec<DataSourceId>,
    },
}

/// Canvas side of the bridge.
pub struct CanvasContext {
    peer_id: String,
    session: RenderSession,
    handshake: Handshake,
    announced: bool,
    pending: PendingQueue,
    outgoing: PendingQueue,
    outbox: Outbox,
    bus: PubSub,
    preview: bool,
    selection: Option<InstanceId>,
    hover: Option<InstanceId>,
}

impl std::fmt::Debug for CanvasContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanvasContext")
            .field("peer_id", &self.peer_id)
            .field("established", &self.handshake.is_established())
            .field("pending", &self.pending.len())
            .field("outgoing", &self.outgoing.len())
            .field("preview", &self.preview)
            .field("selection", &self.selection)
            .finish_non_exhaustive()
    }
}

impl CanvasContext {
    /// Wrap a session; messages for the builder go to `outbox`.
    #[must_use]
    pub fn new(session: RenderSession, outbox: Outbox) -> Self {
        session.registry().dispatch_hook(&HookEvent::Mount);
        Self {
            peer_id: uuid::Uuid::new_v4().to_string(),
            session,
            handshake: Handshake::new(),
            announced: false,
            pending: PendingQueue::default(),
            outgoing: PendingQueue::default(),
            outbox,
            bus: PubSub::new(),
            preview: false,
            selection: None,
            hover: None,
        }
    }

    /// Replace both pre-handshake queues with ones of `capacity`.
    #[must_use]
    pub fn with_pending_capacity(mut self, capacity: usize) -> Self {
        self.pending = PendingQueue::new(capacity);
        self.outgoing = PendingQueue::new(capacity);
        self
    }

    /// This peer's id.
    #[must_use]
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// The render session.
    #[must_use]
    pub const fn session(&self) -> &RenderSession {
        &self.session
    }

    /// Whether the handshake has completed.
    #[must_use]
    pub fn is_established(&self) -> bool {
        self.handshake.is_established()
    }

    /// Received messages waiting for the handshake.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Messages for the builder waiting for the handshake.
    #[must_use]
    pub fn outgoing_len(&self) -> usize {
        self.outgoing.len()
    }

    /// Current selection.
    #[must_use]
    pub fn selection(&self) -> Option<&str> {
        self.selection.as_deref()
    }

    /// Current hover target.
    #[must_use]
    pub fn hover(&self) -> Option<&str> {
        self.hover.as_deref()
    }

    /// Whether the builder switched the canvas to preview.
    #[must_use]
    pub const fn is_preview(&self) -> bool {
        self.preview
    }

    /// Mode the canvas renders in right now.
    #[must_use]
    pub fn effective_mode(&self) -> RenderMode {
        if self.handshake.is_established() && !self.preview {
            RenderMode::Design
        } else {
            RenderMode::Preview
        }
    }

    /// Observe messages of `kind` inside this context.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe(
        &self,
        kind: MessageKind,
        callback: impl Fn(&SyncMessage) + Send + Sync + 'static,
    ) -> Subscription {
        self.bus.subscribe(kind, callback)
    }

    /// The local message bus.
    #[must_use]
    pub const fn bus(&self) -> &PubSub {
        &self.bus
    }

    /// Send this side's handshake, once.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Disconnected`] if the builder is gone.
    pub fn announce(&mut self) -> SyncResult<()> {
        if self.announced {
            return Ok(());
        }
        self.transmit(SyncMessage::handshake(self.peer_id.clone()))?;
        self.announced = true;
        Ok(())
    }

    /// Apply a message from the builder.
    ///
    /// # Errors
    ///
    /// Returns an error if the message could not be applied; the context
    /// stays usable.
    pub fn handle(&mut self, message: SyncMessage) -> SyncResult<()> {
        match message {
            SyncMessage::Handshake { peer_id, version } => {
                self.on_handshake(&peer_id, &version)?;
                let message = SyncMessage::Handshake { peer_id, version };
                self.bus.publish(&message);
                Ok(())
            }
            message if !self.handshake.is_established() => {
                tracing::debug!(kind = ?message.kind(), "Queueing message until handshake");
                self.pending.push(message);
                Ok(())
            }
            message => self.apply(message),
        }
    }

    fn on_handshake(&mut self, peer_id: &str, version: &str) -> SyncResult<()> {
        if !self.handshake.establish() {
            tracing::debug!(peer_id, "Ignoring repeated handshake");
            return Ok(());
        }
        tracing::info!(peer_id, version, "Canvas connected to builder");

        let queued = self.pending.drain();
        if !queued.is_empty() {
            tracing::debug!(count = queued.len(), "Replaying queued messages");
        }
        for message in queued {
            let kind = message.kind();
            if let Err(e) = self.apply(message) {
                tracing::warn!(?kind, error = %e, "Failed to apply queued message");
            }
        }
        self.session.invalidate(Invalidation::Mode);

        // Queued local messages follow our handshake.
        self.announce()?;
        let outgoing = self.outgoing.drain();
        if !outgoing.is_empty() {
            tracing::debug!(count = outgoing.len(), "Sending queued messages");
        }
        for message in outgoing {
            self.transmit(message)?;
        }
        Ok(())
    }

    fn apply(&mut self, message: SyncMessage) -> SyncResult<()> {
        match &message {
            SyncMessage::DocumentLoaded { document } => {
                self.session.load(document.as_ref().clone());
            }
            SyncMessage::InstancesPatch { patch } => {
                self.session.apply_instances_patch(patch.clone())?;
            }
            SyncMessage::PropsPatch { patch } => {
                self.session.apply_props_patch(patch.clone());
            }
            SyncMessage::DataSourcesPatch { patch } => {
                self.session.apply_data_sources_patch(patch);
            }
            SyncMessage::SelectedPageChange { page_id } => {
                self.session.select_page(page_id)?;
            }
            SyncMessage::DataSourceUpdate { .. } => {
                if let Some(values) = message.decoded_values()? {
                    self.session.set_values(values);
                }
            }
            SyncMessage::PreviewModeChange { preview } => {
                self.preview = *preview;
                self.session.invalidate(Invalidation::Mode);
            }
            SyncMessage::SelectionChange { instance_id } => {
                self.apply_selection(instance_id.clone());
            }
            SyncMessage::HoverChange { instance_id } => {
                self.hover.clone_from(instance_id);
            }
            SyncMessage::InteractionIntercepted { .. } | SyncMessage::Handshake { .. } => {
                tracing::debug!(kind = ?message.kind(), "Ignoring message on canvas");
            }
        }
        self.bus.publish(&message);
        Ok(())
    }

    fn apply_selection(&mut self, instance_id: Option<InstanceId>) {
        let instance_path = instance_id
            .as_deref()
            .map(|id| self.session.instance_path(id))
            .unwrap_or_default();
        self.selection = instance_id;
        self.session
            .registry()
            .dispatch_hook(&HookEvent::SelectionChanged { instance_path });
    }

    /// Select an instance on the canvas and tell the builder.
    ///
    /// Before the handshake the message waits in the outgoing queue.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Disconnected`] if the builder is gone.
    pub fn select(&mut self, instance_id: Option<InstanceId>) -> SyncResult<()> {
        self.apply_selection(instance_id.clone());
        let message = SyncMessage::SelectionChange { instance_id };
        self.bus.publish(&message);
        self.send(message)
    }

    /// Hover an instance on the canvas and tell the builder.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Disconnected`] if the builder is gone.
    pub fn set_hover(&mut self, instance_id: Option<InstanceId>) -> SyncResult<()> {
        self.hover.clone_from(&instance_id);
        let message = SyncMessage::HoverChange { instance_id };
        self.bus.publish(&message);
        self.send(message)
    }

    /// Route a user interaction.
    ///
    /// In design mode the event is swallowed and reported. Otherwise the
    /// matching action prop runs, and its writes are sent to the builder.
    ///
    /// # Errors
    ///
    /// Returns an error if the action fails, its arguments are not in codec
    /// form, or the builder is gone.
    pub fn intercept(&mut self, interaction: Interaction) -> SyncResult<InterceptOutcome> {
        if self.effective_mode() == RenderMode::Design {
            tracing::debug!(instance_id = %interaction.instance_id, kind = ?interaction.kind, "Intercepted interaction");
            let message = SyncMessage::InteractionIntercepted { interaction };
            self.bus.publish(&message);
            self.send(message)?;
            return Ok(InterceptOutcome::Suppressed);
        }

        let prop = interaction.kind.action_prop();
        let props = self.session.resolver().resolve_props(&interaction.instance_id);
        if props.get(prop).and_then(ResolvedProp::as_action).is_none() {
            return Ok(InterceptOutcome::Passed {
                updated: Vec::new(),
            });
        }

        let args = if interaction.args.is_null() {
            VariablesMap::new()
        } else {
            codec::decode_values(&interaction.args)?
        };
        let updated = self
            .session
            .run_action(&interaction.instance_id, prop, args)?;
        if !updated.is_empty() {
            let values: VariablesMap = updated
                .iter()
                .filter_map(|id| {
                    self.session
                        .data()
                        .get_value(id)
                        .map(|value| (id.clone(), value))
                })
                .collect();
            self.send(SyncMessage::data_source_update(&values))?;
        }
        Ok(InterceptOutcome::Passed { updated })
    }

    /// Rebuild if anything changed since the last flush.
    pub fn flush(&mut self) -> Option<BuildOutput> {
        let mode = self.effective_mode();
        self.session.flush(mode)
    }

    /// Build the current page unconditionally.
    pub fn render(&mut self) -> BuildOutput {
        let mode = self.effective_mode();
        self.session.build(mode)
    }

    /// Send now if established, otherwise queue until the handshake.
    fn send(&mut self, message: SyncMessage) -> SyncResult<()> {
        if !self.handshake.is_established() {
            tracing::debug!(kind = ?message.kind(), "Holding message until handshake");
            self.outgoing.push(message);
            return Ok(());
        }
        self.transmit(message)
    }

    fn transmit(&self, message: SyncMessage) -> SyncResult<()> {
        self.outbox.send(message).map_err(|_| SyncError::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Channel;
    use crate::protocol::InteractionKind;
    use std::sync::Arc;
    use studio_core::{
        base_library, ComponentRegistry, DataSource, Instance, Page, PageDocument, Params, Prop,
        Value,
    };

    fn canvas() -> (CanvasContext, Channel) {
        let mut document = PageDocument::new(Page::new("home", "", "body"));
        document.instances = [
            Instance::new("body", "Body").with_child("button"),
            Instance::new("button", "Box"),
        ]
        .into_iter()
        .collect();
        document.props = vec![Prop::action("button", "onClick", "count = count + 1", &[])];
        document.data_sources = vec![DataSource::variable("count", 0)];

        let registry = Arc::new(ComponentRegistry::new());
        registry.register(base_library());
        let session = RenderSession::new(registry, document, Params::default());
        let (builder_end, canvas_end) = Channel::pair();
        (CanvasContext::new(session, canvas_end.outbox()), builder_end)
    }

    #[test]
    fn test_preview_until_established() {
        let (mut canvas, mut builder) = canvas();
        assert_eq!(canvas.effective_mode(), RenderMode::Preview);

        canvas
            .handle(SyncMessage::handshake("builder"))
            .expect("handshake");
        assert!(canvas.is_established());
        assert_eq!(canvas.effective_mode(), RenderMode::Design);
        assert!(matches!(
            builder.try_recv(),
            Some(SyncMessage::Handshake { .. })
        ));
    }

    #[test]
    fn test_structural_messages_wait_for_handshake() {
        let (mut canvas, _builder) = canvas();
        canvas
            .handle(SyncMessage::PreviewModeChange { preview: true })
            .expect("queued");
        assert_eq!(canvas.pending_len(), 1);
        assert!(!canvas.is_preview());

        canvas
            .handle(SyncMessage::handshake("builder"))
            .expect("handshake");
        assert_eq!(canvas.pending_len(), 0);
        assert!(canvas.is_preview());
        assert_eq!(canvas.effective_mode(), RenderMode::Preview);
    }

    #[test]
    fn test_intercept_in_design_suppresses() {
        let (mut canvas, mut builder) = canvas();
        canvas
            .handle(SyncMessage::handshake("builder"))
            .expect("handshake");
        let _ = builder.try_recv();

        let outcome = canvas
            .intercept(Interaction::new("button", InteractionKind::Click))
            .expect("intercept");
        assert_eq!(outcome, InterceptOutcome::Suppressed);
        assert!(matches!(
            builder.try_recv(),
            Some(SyncMessage::InteractionIntercepted { .. })
        ));
        assert_eq!(canvas.session().data().get_value("count"), Some(Value::from(0)));
    }

    #[test]
    fn test_intercept_in_preview_runs_action() {
        let (mut canvas, mut builder) = canvas();
        let outcome = canvas
            .intercept(Interaction::new("button", InteractionKind::Click))
            .expect("intercept");
        assert_eq!(
            outcome,
            InterceptOutcome::Passed {
                updated: vec!["count".to_string()]
            }
        );
        assert!(builder.try_recv().is_none());
        assert_eq!(canvas.outgoing_len(), 1);

        canvas
            .handle(SyncMessage::handshake("builder"))
            .expect("handshake");
        assert!(matches!(
            builder.try_recv(),
            Some(SyncMessage::Handshake { .. })
        ));
        let update = builder.try_recv().expect("update");
        let values = update.decoded_values().expect("codec").expect("values");
        assert_eq!(values.get("count"), Some(&Value::from(1)));
    }

    #[test]
    fn test_remote_selection_is_not_echoed() {
        let (mut canvas, mut builder) = canvas();
        canvas
            .handle(SyncMessage::handshake("builder"))
            .expect("handshake");
        let _ = builder.try_recv();

        canvas
            .handle(SyncMessage::SelectionChange {
                instance_id: Some("button".to_string()),
            })
            .expect("selection");
        assert_eq!(canvas.selection(), Some("button"));
        assert!(builder.try_recv().is_none());
    }

    #[test]
    fn test_selection_and_hover_wait_for_handshake() {
        let (mut canvas, mut builder) = canvas();
        canvas
            .handle(SyncMessage::SelectionChange {
                instance_id: Some("button".to_string()),
            })
            .expect("queued");
        canvas
            .handle(SyncMessage::HoverChange {
                instance_id: Some("body".to_string()),
            })
            .expect("queued");
        assert_eq!(canvas.selection(), None);
        assert_eq!(canvas.hover(), None);
        assert_eq!(canvas.pending_len(), 2);

        canvas.select(Some("body".to_string())).expect("select");
        assert_eq!(canvas.selection(), Some("body"));
        assert!(builder.try_recv().is_none());

        canvas
            .handle(SyncMessage::handshake("builder"))
            .expect("handshake");
        // Queued remote selection replays first, then local messages go out.
        assert_eq!(canvas.selection(), Some("button"));
        assert_eq!(canvas.hover(), Some("body"));
        assert!(matches!(
            builder.try_recv(),
            Some(SyncMessage::Handshake { .. })
        ));
        assert!(matches!(
            builder.try_recv(),
            Some(SyncMessage::SelectionChange { instance_id }) if instance_id.as_deref() == Some("body")
        ));
        assert!(builder.try_recv().is_none());
    }

    #[test]
    fn test_queued_messages_apply_when_builder_is_gone() {
        let (mut canvas, builder) = canvas();
        canvas
            .handle(SyncMessage::PreviewModeChange { preview: true })
            .expect("queued");
        drop(builder);

        let result = canvas.handle(SyncMessage::handshake("builder"));
        assert!(matches!(result, Err(SyncError::Disconnected)));
        assert!(canvas.is_established());
        assert_eq!(canvas.pending_len(), 0);
        assert!(canvas.is_preview());
    }
}
