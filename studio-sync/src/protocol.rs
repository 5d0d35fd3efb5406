//! # Sync Protocol Messages
//!
//! Every message is a JSON object tagged by `type`:
//!
//! ### Both directions
//!
//! - `{"type": "handshake", "peer_id": "...", "version": "..."}`
//! - `{"type": "selection_change", "instance_id": "..." | null}`
//! - `{"type": "hover_change", "instance_id": "..." | null}`
//! - `{"type": "data_source_update", "values": {...codec form...}}`
//!
//! ### Builder -> Canvas
//!
//! - `{"type": "document_loaded", "document": {...}}`
//! - `{"type": "instances_patch", "patch": {...}}`
//! - `{"type": "props_patch", "patch": {...}}`
//! - `{"type": "data_sources_patch", "patch": {...}}`
//! - `{"type": "selected_page_change", "page_id": "..."}`
//! - `{"type": "preview_mode_change", "preview": true}`
//!
//! ### Canvas -> Builder
//!
//! - `{"type": "interaction_intercepted", "interaction": {...}}`

use serde::{Deserialize, Serialize};
use studio_core::{
    codec, CodecError, DataSourcesPatch, InstanceId, InstancesPatch, PageDocument, PageId,
    PropsPatch, VariablesMap,
};

/// A message exchanged between builder and canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncMessage {
    /// Opens the connection; each side sends it once.
    Handshake {
        /// Sender's peer id.
        peer_id: String,
        /// Sender's protocol version.
        version: String,
    },
    /// A full document replacing whatever the canvas had.
    DocumentLoaded {
        /// The document.
        document: Box<PageDocument>,
    },
    /// Instance edits.
    InstancesPatch {
        /// The edits.
        patch: InstancesPatch,
    },
    /// Prop binding edits.
    PropsPatch {
        /// The edits.
        patch: PropsPatch,
    },
    /// Data source declaration edits.
    DataSourcesPatch {
        /// The edits.
        patch: DataSourcesPatch,
    },
    /// A different page was selected.
    SelectedPageChange {
        /// The page.
        page_id: PageId,
    },
    /// Data source values changed; values travel in codec form.
    DataSourceUpdate {
        /// Encoded values keyed by data source id.
        values: serde_json::Value,
    },
    /// The selected instance changed.
    SelectionChange {
        /// Selected instance, `None` when cleared.
        instance_id: Option<InstanceId>,
    },
    /// The hovered instance changed.
    HoverChange {
        /// Hovered instance, `None` when cleared.
        instance_id: Option<InstanceId>,
    },
    /// The canvas swallowed a user interaction in design mode.
    InteractionIntercepted {
        /// The interaction.
        interaction: Interaction,
    },
    /// Preview mode was toggled.
    PreviewModeChange {
        /// Whether preview is on.
        preview: bool,
    },
}

impl SyncMessage {
    /// Topic of this message.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::Handshake { .. } => MessageKind::Handshake,
            Self::DocumentLoaded { .. } => MessageKind::DocumentLoaded,
            Self::InstancesPatch { .. } => MessageKind::InstancesPatch,
            Self::PropsPatch { .. } => MessageKind::PropsPatch,
            Self::DataSourcesPatch { .. } => MessageKind::DataSourcesPatch,
            Self::SelectedPageChange { .. } => MessageKind::SelectedPageChange,
            Self::DataSourceUpdate { .. } => MessageKind::DataSourceUpdate,
            Self::SelectionChange { .. } => MessageKind::SelectionChange,
            Self::HoverChange { .. } => MessageKind::HoverChange,
            Self::InteractionIntercepted { .. } => MessageKind::InteractionIntercepted,
            Self::PreviewModeChange { .. } => MessageKind::PreviewModeChange,
        }
    }

    /// A handshake from this build.
    #[must_use]
    pub fn handshake(peer_id: impl Into<String>) -> Self {
        Self::Handshake {
            peer_id: peer_id.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// A data source update carrying `values` in codec form.
    #[must_use]
    pub fn data_source_update(values: &VariablesMap) -> Self {
        Self::DataSourceUpdate {
            values: codec::encode_values(values),
        }
    }

    /// Decode the values of a `data_source_update`.
    ///
    /// Returns `Ok(None)` for any other message.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] if the values are not in codec form.
    pub fn decoded_values(&self) -> Result<Option<VariablesMap>, CodecError> {
        match self {
            Self::DataSourceUpdate { values } => codec::decode_values(values).map(Some),
            _ => Ok(None),
        }
    }
}

/// Topic a message is published under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// See [`SyncMessage::Handshake`].
    Handshake,
    /// See [`SyncMessage::DocumentLoaded`].
    DocumentLoaded,
    /// See [`SyncMessage::InstancesPatch`].
    InstancesPatch,
    /// See [`SyncMessage::PropsPatch`].
    PropsPatch,
    /// See [`SyncMessage::DataSourcesPatch`].
    DataSourcesPatch,
    /// See [`SyncMessage::SelectedPageChange`].
    SelectedPageChange,
    /// See [`SyncMessage::DataSourceUpdate`].
    DataSourceUpdate,
    /// See [`SyncMessage::SelectionChange`].
    SelectionChange,
    /// See [`SyncMessage::HoverChange`].
    HoverChange,
    /// See [`SyncMessage::InteractionIntercepted`].
    InteractionIntercepted,
    /// See [`SyncMessage::PreviewModeChange`].
    PreviewModeChange,
}

/// Kind of user interaction on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    /// Pointer click.
    Click,
    /// Form submission.
    Submit,
    /// Value change of an input.
    Change,
    /// Key press.
    KeyDown,
}

impl InteractionKind {
    /// Name of the action prop this interaction fires.
    #[must_use]
    pub const fn action_prop(self) -> &'static str {
        match self {
            Self::Click => "onClick",
            Self::Submit => "onSubmit",
            Self::Change => "onChange",
            Self::KeyDown => "onKeyDown",
        }
    }
}

/// A user interaction on a rendered instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    /// Target instance.
    pub instance_id: InstanceId,
    /// What happened.
    pub kind: InteractionKind,
    /// Action arguments in codec form (e.g. the new input value).
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub args: serde_json::Value,
}

impl Interaction {
    /// An interaction without arguments.
    #[must_use]
    pub fn new(instance_id: impl Into<InstanceId>, kind: InteractionKind) -> Self {
        Self {
            instance_id: instance_id.into(),
            kind,
            args: serde_json::Value::Null,
        }
    }
}
