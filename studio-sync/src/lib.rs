//! # Page Studio Sync
//!
//! Connects the builder (where documents are edited) with the canvas (where
//! they are rendered). The two sides exchange [`SyncMessage`]s over a
//! [`Channel`] or any transport carrying the same JSON envelope.
//!
//! ```text
//!  BuilderContext                         CanvasContext
//!  ┌──────────────┐   handshake   ┌──────────────────────┐
//!  │ DocumentStore│ ◄───────────► │ RenderSession        │
//!  │ outgoing q.  │   patches ──► │ pending q. (bounded) │
//!  │ PubSub       │ ◄── updates   │ PubSub               │
//!  └──────────────┘ ◄─ selection ─► └──────────────────────┘
//! ```
//!
//! Nothing design-specific is rendered before both sides shook hands.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod builder;
pub mod canvas;
pub mod channel;
pub mod error;
pub mod handshake;
pub mod protocol;
pub mod pubsub;

pub use builder::BuilderContext;
pub use canvas::{CanvasContext, InterceptOutcome};
pub use channel::{Channel, Outbox};
pub use error::{SyncError, SyncResult};
pub use handshake::{Handshake, PendingQueue, DEFAULT_PENDING_CAPACITY};
pub use protocol::{Interaction, InteractionKind, MessageKind, SyncMessage};
pub use pubsub::{PubSub, Subscription};

/// Protocol version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
