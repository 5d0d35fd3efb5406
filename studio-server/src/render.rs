//! One-shot rendering of a stored document.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use studio_core::{
    BuildOutput, ComponentRegistry, PageDocument, PageId, Params, RenderMode, RenderNode,
    RenderSession, StudioResult,
};

use crate::error::ApiResult;
use crate::AppState;

/// Build one page of `document`; the home page when `page` is `None`.
///
/// # Errors
///
/// Returns `PageNotFound` if `page` names no page.
pub fn render_document(
    registry: Arc<ComponentRegistry>,
    document: PageDocument,
    params: Params,
    page: Option<&str>,
    mode: RenderMode,
) -> StudioResult<(PageId, BuildOutput)> {
    let mut session = RenderSession::new(registry, document, params);
    if let Some(page) = page {
        session.select_page(page)?;
    }
    let page_id = session.selected_page().id;
    Ok((page_id, session.build(mode)))
}

/// Query of `GET /render`.
#[derive(Debug, Default, Deserialize)]
pub struct RenderQuery {
    /// Page to render; the home page when absent.
    pub page: Option<String>,
    /// Render mode.
    #[serde(default)]
    pub mode: RenderMode,
    /// Return HTML instead of the JSON tree.
    #[serde(default)]
    pub html: bool,
}

/// Body of a JSON render response.
#[derive(Debug, Serialize)]
pub struct RenderResponse {
    /// Rendered page.
    pub page: PageId,
    /// Mode it was rendered in.
    pub mode: RenderMode,
    /// The tree.
    pub root: RenderNode,
    /// Non-fatal problems, such as unknown components.
    pub errors: Vec<String>,
}

/// `GET /render`
#[tracing::instrument(name = "render", skip(state))]
pub async fn render_handler(
    State(state): State<AppState>,
    Query(query): Query<RenderQuery>,
) -> ApiResult<Response> {
    let (page, output) = render_document(
        Arc::clone(&state.registry),
        state.document.document(),
        state.params.clone(),
        query.page.as_deref(),
        query.mode,
    )?;
    if !output.errors.is_empty() {
        tracing::warn!(page = %page, count = output.errors.len(), "Rendered with errors");
    }

    if query.html {
        return Ok(Html(output.root.to_html()).into_response());
    }
    Ok(Json(RenderResponse {
        page,
        mode: query.mode,
        root: output.root,
        errors: output.errors.iter().map(ToString::to_string).collect(),
    })
    .into_response())
}
