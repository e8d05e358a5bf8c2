use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::info;

use crate::enhance::SectionKind;
use crate::errors::AppError;
use crate::state::AppState;

const MAX_TEXT_CHARS: usize = 5_000;
const PRUNE_THRESHOLD: usize = 1_024;

#[derive(Deserialize)]
pub struct EnhanceRequest {
    /// Rate-limit key supplied by the browser.
    pub client_id: String,
    #[serde(default)]
    pub section: SectionKind,
    pub text: String,
}

#[derive(Serialize)]
pub struct EnhanceResponse {
    pub text: String,
}

/// POST /api/v1/enhance
pub async fn handle_enhance(
    State(state): State<AppState>,
    Json(req): Json<EnhanceRequest>,
) -> Result<Json<EnhanceResponse>, AppError> {
    if req.client_id.trim().is_empty() {
        return Err(AppError::Validation("client_id is required".to_string()));
    }
    let chars = req.text.chars().count();
    if req.text.trim().is_empty() || chars > MAX_TEXT_CHARS {
        return Err(AppError::Validation(format!(
            "text must be 1..={MAX_TEXT_CHARS} characters"
        )));
    }

    {
        let now = Instant::now();
        let mut limiter = state.rate_limiter.lock().await;
        if let Err(retry_after) = limiter.check(&req.client_id, now) {
            return Err(AppError::RateLimited {
                retry_after_secs: (retry_after.as_secs_f64().ceil() as u64).max(1),
            });
        }
        if limiter.tracked_clients() > PRUNE_THRESHOLD {
            limiter.prune(now);
        }
    }

    let enhancer = state.enhancer.as_ref().ok_or_else(|| {
        AppError::ServiceUnavailable("Text enhancement is not configured".to_string())
    })?;

    let text = enhancer.enhance(req.section, &req.text).await?;
    info!(section = ?req.section, chars, "section enhanced");
    Ok(Json(EnhanceResponse { text }))
}
