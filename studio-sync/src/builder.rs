//! Builder execution context.
//!
//! The builder owns the authoritative [`DocumentStore`]. Every edit is applied
//! locally first and then forwarded to the canvas; edits made before the
//! handshake are held back and flushed, in order, right after the full
//! document is sent. Canvas messages that arrive before the handshake,
//! selection and hover included, wait until it completes.

use studio_core::{
    DataSourcesPatch, DocumentStore, InstanceId, InstancesChange, InstancesPatch, PageDocument,
    PropsPatch, VariablesMap,
};

use crate::channel::Outbox;
use crate::error::{SyncError, SyncResult};
use crate::handshake::{Handshake, PendingQueue};
use crate::protocol::{Interaction, MessageKind, SyncMessage};
use crate::pubsub::{PubSub, Subscription};

/// Builder side of the bridge.
pub struct BuilderContext {
    peer_id: String,
    store: DocumentStore,
    handshake: Handshake,
    announced: bool,
    outgoing: PendingQueue,
    incoming: PendingQueue,
    outbox: Outbox,
    bus: PubSub,
    values: VariablesMap,
    preview: bool,
    selection: Option<InstanceId>,
    hover: Option<InstanceId>,
    interactions: Vec<Interaction>,
}

impl std::fmt::Debug for BuilderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuilderContext")
            .field("peer_id", &self.peer_id)
            .field("established", &self.handshake.is_established())
            .field("outgoing", &self.outgoing.len())
            .field("incoming", &self.incoming.len())
            .field("preview", &self.preview)
            .field("selection", &self.selection)
            .finish_non_exhaustive()
    }
}

impl BuilderContext {
    /// Edit `document`; messages for the canvas go to `outbox`.
    #[must_use]
    pub fn new(document: PageDocument, outbox: Outbox) -> Self {
        Self {
            peer_id: uuid::Uuid::new_v4().to_string(),
            store: DocumentStore::new(document),
            handshake: Handshake::new(),
            announced: false,
            outgoing: PendingQueue::default(),
            incoming: PendingQueue::default(),
            outbox,
            bus: PubSub::new(),
            values: VariablesMap::new(),
            preview: false,
            selection: None,
            hover: None,
            interactions: Vec::new(),
        }
    }

    /// This peer's id.
    #[must_use]
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// The authoritative document.
    #[must_use]
    pub const fn store(&self) -> &DocumentStore {
        &self.store
    }

    /// Whether the handshake has completed.
    #[must_use]
    pub fn is_established(&self) -> bool {
        self.handshake.is_established()
    }

    /// Edits waiting for the handshake.
    #[must_use]
    pub fn outgoing_len(&self) -> usize {
        self.outgoing.len()
    }

    /// Canvas messages waiting for the handshake.
    #[must_use]
    pub fn incoming_len(&self) -> usize {
        self.incoming.len()
    }

    /// Last known data source values.
    #[must_use]
    pub const fn values(&self) -> &VariablesMap {
        &self.values
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

    /// Interactions the canvas swallowed in design mode.
    #[must_use]
    pub fn interactions(&self) -> &[Interaction] {
        &self.interactions
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

    /// Open the connection by sending this side's handshake.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Disconnected`] if the canvas is gone.
    pub fn connect(&mut self) -> SyncResult<()> {
        if self.announced {
            return Ok(());
        }
        self.transmit(SyncMessage::handshake(self.peer_id.clone()))?;
        self.announced = true;
        Ok(())
    }

    /// Apply a message from the canvas.
    ///
    /// # Errors
    ///
    /// Returns an error if the reply could not be sent or the values were not
    /// in codec form.
    pub fn handle(&mut self, message: SyncMessage) -> SyncResult<()> {
        match message {
            SyncMessage::Handshake { ref peer_id, ref version } => {
                if self.handshake.establish() {
                    tracing::info!(peer_id = %peer_id, version = %version, "Builder connected to canvas");
                    self.on_established()?;
                } else {
                    tracing::debug!(peer_id = %peer_id, "Ignoring repeated handshake");
                }
                self.bus.publish(&message);
                Ok(())
            }
            message if !self.handshake.is_established() => {
                tracing::debug!(kind = ?message.kind(), "Queueing message until handshake");
                self.incoming.push(message);
                Ok(())
            }
            message => self.apply(message),
        }
    }

    fn on_established(&mut self) -> SyncResult<()> {
        for message in self.incoming.drain() {
            let kind = message.kind();
            if let Err(e) = self.apply(message) {
                tracing::warn!(?kind, error = %e, "Failed to apply queued message");
            }
        }

        self.connect()?;
        self.transmit(SyncMessage::DocumentLoaded {
            document: Box::new(self.store.document()),
        })?;
        if self.preview {
            self.transmit(SyncMessage::PreviewModeChange { preview: true })?;
        }
        for message in self.outgoing.drain() {
            self.transmit(message)?;
        }
        Ok(())
    }

    fn apply(&mut self, message: SyncMessage) -> SyncResult<()> {
        match &message {
            SyncMessage::DataSourceUpdate { .. } => {
                if let Some(values) = message.decoded_values()? {
                    self.values.extend(values);
                }
            }
            SyncMessage::InteractionIntercepted { interaction } => {
                self.interactions.push(interaction.clone());
            }
            SyncMessage::SelectionChange { instance_id } => {
                self.selection.clone_from(instance_id);
            }
            SyncMessage::HoverChange { instance_id } => {
                self.hover.clone_from(instance_id);
            }
            _ => {
                tracing::debug!(kind = ?message.kind(), "Ignoring message on builder");
            }
        }
        self.bus.publish(&message);
        Ok(())
    }

    /// Replace the document and ship it whole.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Disconnected`] if the canvas is gone.
    pub fn load_document(&mut self, document: PageDocument) -> SyncResult<()> {
        self.store.load(document);
        // The handshake already sends the full document.
        if self.handshake.is_established() {
            self.transmit(SyncMessage::DocumentLoaded {
                document: Box::new(self.store.document()),
            })?;
        }
        Ok(())
    }

    /// Edit instances.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the patch is rejected; nothing is sent
    /// in that case.
    pub fn apply_instances_patch(&mut self, patch: InstancesPatch) -> SyncResult<InstancesChange> {
        let change = self.store.apply_instances_patch(patch.clone())?;
        self.send(SyncMessage::InstancesPatch { patch })?;
        Ok(change)
    }

    /// Edit prop bindings.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Disconnected`] if the canvas is gone.
    pub fn apply_props_patch(&mut self, patch: PropsPatch) -> SyncResult<()> {
        self.store.apply_props_patch(patch.clone());
        self.send(SyncMessage::PropsPatch { patch })
    }

    /// Edit data source declarations.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Disconnected`] if the canvas is gone.
    pub fn apply_data_sources_patch(&mut self, patch: DataSourcesPatch) -> SyncResult<()> {
        self.store.apply_data_sources_patch(&patch);
        self.send(SyncMessage::DataSourcesPatch { patch })
    }

    /// Switch the edited page.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the page does not exist.
    pub fn select_page(&mut self, page_id: &str) -> SyncResult<()> {
        self.store.select_page(page_id)?;
        self.send(SyncMessage::SelectedPageChange {
            page_id: page_id.to_string(),
        })
    }

    /// Push new data source values to the canvas.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Disconnected`] if the canvas is gone.
    pub fn set_values(&mut self, values: VariablesMap) -> SyncResult<()> {
        let message = SyncMessage::data_source_update(&values);
        self.values.extend(values);
        self.send(message)
    }

    /// Toggle preview on the canvas.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Disconnected`] if the canvas is gone.
    pub fn set_preview(&mut self, preview: bool) -> SyncResult<()> {
        if self.preview == preview {
            return Ok(());
        }
        self.preview = preview;
        // Sent by the handshake itself when still unestablished.
        if self.handshake.is_established() {
            self.transmit(SyncMessage::PreviewModeChange { preview })?;
        }
        Ok(())
    }

    /// Select an instance in the navigator and tell the canvas.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Disconnected`] if the canvas is gone.
    pub fn select(&mut self, instance_id: Option<InstanceId>) -> SyncResult<()> {
        self.selection.clone_from(&instance_id);
        let message = SyncMessage::SelectionChange { instance_id };
        self.bus.publish(&message);
        self.send(message)
    }

    /// Hover an instance in the navigator and tell the canvas.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Disconnected`] if the canvas is gone.
    pub fn set_hover(&mut self, instance_id: Option<InstanceId>) -> SyncResult<()> {
        self.hover.clone_from(&instance_id);
        let message = SyncMessage::HoverChange { instance_id };
        self.bus.publish(&message);
        self.send(message)
    }

    fn send(&mut self, message: SyncMessage) -> SyncResult<()> {
        if self.handshake.is_established() {
            self.transmit(message)
        } else {
            self.outgoing.push(message);
            Ok(())
        }
    }

    fn transmit(&self, message: SyncMessage) -> SyncResult<()> {
        self.outbox.send(message).map_err(|_| SyncError::Disconnected)
    }
}
