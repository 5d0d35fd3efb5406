//! # Page Studio Core
//!
//! Render engine for the Page Studio visual page builder: compiles a
//! serialized instance graph plus a multi-namespace component registry into
//! a render tree, with props bound to live data sources.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                    RenderSession                     │
//! ├──────────────────────────────────────────────────────┤
//! │  DocumentStore     │  DataSourceEngine               │
//! │  - Instances       │  - Atomic set_values            │
//! │  - Props, pages    │  - Actions across the codec     │
//! ├──────────────────────────────────────────────────────┤
//! │  PropsResolver     │  ComponentRegistry              │
//! │  - Memoized        │  - Namespaced renderers         │
//! │  - Page/asset URLs │  - Merged lifecycle hooks       │
//! ├──────────────────────────────────────────────────────┤
//! │            Elements tree builder (design/preview)    │
//! └──────────────────────────────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod codec;
pub mod data_source;
pub mod error;
pub mod expression;
pub mod image;
pub mod indexes;
pub mod instance;
pub mod library;
pub mod page;
pub mod prop;
pub mod props;
pub mod reactive;
pub mod registry;
pub mod session;
pub mod store;
pub mod tree;
pub mod value;

pub use codec::{decode_value, decode_values, encode_value, encode_values, CodecError, VariablesMap};
pub use data_source::{DataSource, DataSourceEngine, DataSourceId, DataSourceKind, ValuesChanged};
pub use error::{StudioError, StudioResult};
pub use expression::{ExpressionError, ExpressionEvaluator, Interpreter};
pub use image::{ImageSource, ImageState, BROKEN_IMAGE_PLACEHOLDER};
pub use indexes::{indexes_within_ancestors, IndexWithinAncestors, IndexesWithinAncestors};
pub use instance::{Instance, InstanceChild, InstanceId, Instances};
pub use library::{base_library, navigation_library};
pub use page::{Asset, AssetKind, Page, PageId, Pages, Params};
pub use prop::{ExpressionRef, Prop, PropId, PropValue, PropsIndex};
pub use props::{href, ActionRef, PropsResolver, ResolvedProp, ResolvedProps, ResolvedUrl};
pub use reactive::{Invalidation, Scheduler};
pub use registry::{
    Component, ComponentKind, ComponentMeta, ComponentRegistration, ComponentRegistry, HookEvent,
    HookKind, Hooks, PropKind, PropMeta, PropsMeta, RenderInput, Rendered, RendererEntry,
};
pub use session::RenderSession;
pub use store::{
    DataSourcesPatch, DocumentStore, InstanceUpdate, InstancesChange, InstancesPatch, PageDocument,
    PropsPatch,
};
pub use tree::{
    build, Affordances, BuildConfig, BuildOutput, ElementNode, RenderMode, RenderNode,
    BOOTSTRAP_MARKERS,
};
pub use value::{AssetId, AssetRef, Value};

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
