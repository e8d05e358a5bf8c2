use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::editor::session::SessionHandle;
use crate::editor::surface::{InputEvent, SurfaceSnapshot};
use crate::errors::AppError;
use crate::state::AppState;
use crate::template::{ResumeData, TemplateKind};

#[derive(Deserialize, Default)]
pub struct CreateSessionRequest {
    /// Previously saved content to seed the surface with.
    #[serde(default)]
    pub html: Option<String>,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub session_id: Uuid,
    pub snapshot: SurfaceSnapshot,
}

#[derive(Serialize)]
pub struct SaveResponse {
    pub html: String,
}

#[derive(Deserialize)]
pub struct PreviewRequest {
    pub resume: ResumeData,
    #[serde(default)]
    pub template: TemplateKind,
}

pub(crate) async fn find_session(state: &AppState, id: Uuid) -> Result<SessionHandle, AppError> {
    state
        .sessions
        .get(id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Session {id} not found")))
}

/// POST /api/v1/sessions
pub async fn handle_create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), AppError> {
    let handle = state
        .sessions
        .create(state.editor.clone(), state.measurer.clone(), req.html)
        .await;
    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            session_id: handle.id(),
            snapshot: handle.snapshot(),
        }),
    ))
}

/// GET /api/v1/sessions/:id
pub async fn handle_get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SurfaceSnapshot>, AppError> {
    let session = find_session(&state, id).await?;
    Ok(Json(session.snapshot()))
}

/// DELETE /api/v1/sessions/:id
pub async fn handle_close_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if !state.sessions.remove(id).await {
        return Err(AppError::NotFound(format!("Session {id} not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/sessions/:id/input
pub async fn handle_input(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(event): Json<InputEvent>,
) -> Result<Json<SurfaceSnapshot>, AppError> {
    let session = find_session(&state, id).await?;
    Ok(Json(session.input(event).await?))
}

/// POST /api/v1/sessions/:id/undo
pub async fn handle_undo(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SurfaceSnapshot>, AppError> {
    let session = find_session(&state, id).await?;
    Ok(Json(session.undo().await?))
}

/// POST /api/v1/sessions/:id/redo
pub async fn handle_redo(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SurfaceSnapshot>, AppError> {
    let session = find_session(&state, id).await?;
    Ok(Json(session.redo().await?))
}

/// POST /api/v1/sessions/:id/save
pub async fn handle_save(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SaveResponse>, AppError> {
    let session = find_session(&state, id).await?;
    let html = session.save().await?;
    Ok(Json(SaveResponse { html }))
}

/// POST /api/v1/sessions/:id/edit
pub async fn handle_edit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SurfaceSnapshot>, AppError> {
    let session = find_session(&state, id).await?;
    Ok(Json(session.edit().await?))
}

/// POST /api/v1/sessions/:id/preview
pub async fn handle_preview(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<PreviewRequest>,
) -> Result<Json<SurfaceSnapshot>, AppError> {
    let session = find_session(&state, id).await?;
    Ok(Json(session.preview(req.resume, req.template).await?))
}
