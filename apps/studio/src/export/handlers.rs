use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::editor::handlers::find_session;
use crate::errors::AppError;
use crate::export::wrap_document;
use crate::state::AppState;

#[derive(Deserialize, Default)]
pub struct ExportRequest {
    #[serde(default)]
    pub title: Option<String>,
}

/// POST /api/v1/sessions/:id/export
///
/// The JSON body is optional.
pub async fn handle_export(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    req: Option<Json<ExportRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let req = req.map(|Json(req)| req).unwrap_or_default();
    let renderer = state.renderer.as_ref().ok_or_else(|| {
        AppError::ServiceUnavailable("PDF export is not configured".to_string())
    })?;
    let session = find_session(&state, id).await?;

    let html = session.save().await?;
    let title = req.title.unwrap_or_else(|| "Resume".to_string());
    let document = wrap_document(&html, &title, &state.layout);
    let pdf = renderer.render_pdf(&document).await?;
    info!(session = %id, bytes = pdf.len(), "resume exported");

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"resume.pdf\""),
        ],
        pdf,
    ))
}
