//! # Page Studio Server Library
//!
//! Shared types and routes for the `page-studio` binary.
//! This library is used by both the binary and integration tests.

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use studio_core::{base_library, ComponentRegistry, DocumentStore, PageDocument, Params};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

pub mod error;
pub mod health;
pub mod render;
pub mod sync;

pub use error::{ApiError, ApiResult};
pub use render::render_document;

/// Default port for the studio server.
pub const DEFAULT_PORT: u16 = 9474;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Components every session renders with.
    pub registry: Arc<ComponentRegistry>,
    /// The document served by `/render` and handed to new canvases.
    pub document: DocumentStore,
    /// Asset URL parameters.
    pub params: Params,
}

impl AppState {
    /// State serving `document` with the built-in component library.
    #[must_use]
    pub fn new(document: PageDocument, params: Params) -> Self {
        Self {
            registry: default_registry(),
            document: DocumentStore::new(document),
            params,
        }
    }
}

/// Registry holding the built-in component library.
#[must_use]
pub fn default_registry() -> Arc<ComponentRegistry> {
    let registry = Arc::new(ComponentRegistry::new());
    registry.register(base_library());
    registry
}

/// CORS layer accepting localhost origins only.
fn build_cors_layer(port: u16) -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        format!("http://localhost:{port}"),
        format!("http://127.0.0.1:{port}"),
    ]
    .iter()
    .filter_map(|o| o.parse().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
}

/// Build the router.
pub fn router(state: AppState, port: u16) -> Router {
    Router::new()
        .route("/health", get(health::readiness))
        .route("/health/live", get(health::liveness))
        .route("/render", get(render::render_handler))
        .route("/sync", get(sync::sync_websocket_handler))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(build_cors_layer(port)),
        )
        .with_state(state)
}
