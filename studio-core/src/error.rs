//! Error types for engine operations.

use thiserror::Error;

use crate::codec::CodecError;
use crate::expression::ExpressionError;

/// Result type for engine operations.
pub type StudioResult<T> = Result<T, StudioError>;

/// Errors that can occur in engine operations.
#[derive(Debug, Error)]
pub enum StudioError {
    /// An instance names a component that no registration provides.
    #[error("Unknown component: {0}")]
    UnknownComponent(String),

    /// A prop or expression references a data source that does not exist.
    #[error("Unresolved data source: {0}")]
    UnresolvedDataSource(String),

    /// Instance not found in the graph.
    #[error("Instance not found: {0}")]
    InstanceNotFound(String),

    /// Page not found in the document.
    #[error("Page not found: {0}")]
    PageNotFound(String),

    /// The instance graph violates its structural invariants.
    #[error("Invalid instance graph: {0}")]
    InvalidGraph(String),

    /// The prop is not bound to an action.
    #[error("Instance {instance} has no action prop {prop}")]
    NotAnAction {
        /// Instance the action was looked up on.
        instance: String,
        /// Prop name.
        prop: String,
    },

    /// An expression failed; none of its updates were applied.
    #[error("Expression execution failed: {0}")]
    ExpressionExecutionFailure(#[from] ExpressionError),

    /// Values could not cross the evaluator boundary.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Document serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
