//! Error types for sync operations.

use studio_core::{CodecError, StudioError};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while syncing builder and canvas.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The other side of the channel is gone.
    #[error("Peer disconnected")]
    Disconnected,

    /// A message could not be applied to the engine.
    #[error("Engine error: {0}")]
    Studio(#[from] StudioError),

    /// Data source values were not in codec form.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// A wire message could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
