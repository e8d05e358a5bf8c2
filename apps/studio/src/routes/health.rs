use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /health
/// Returns service status and which optional integrations are configured.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "resume-studio",
        "sessions": state.sessions.len().await,
        "page_font": state.config.page_font,
        "enhance_enabled": state.enhancer.is_some(),
        "export_enabled": state.renderer.is_some(),
    }))
}
