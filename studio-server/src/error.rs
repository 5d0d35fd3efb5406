//! HTTP error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use studio_core::StudioError;
use thiserror::Error;

/// Result type for route handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors returned by route handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The engine rejected the request.
    #[error(transparent)]
    Studio(#[from] StudioError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Studio(StudioError::PageNotFound(_) | StudioError::InstanceNotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            Self::Studio(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::debug!(%status, error = %self, "Request failed");
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
