use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::handlers::form::ColorForm;
use crate::models::error::AppError;
use crate::models::hints::parse_hint_payload;
use crate::services::orchestrator::ColorizeOutcome;
use crate::AppState;

#[derive(Serialize)]
pub struct ColorizeResponse {
    pub status: &'static str,
    pub image: String,
    pub filename: String,
    pub session_id: String,
}

impl From<ColorizeOutcome> for ColorizeResponse {
    fn from(out: ColorizeOutcome) -> Self {
        Self {
            status: "success",
            image: out.image_base64,
            filename: out.filename,
            session_id: out.session_id,
        }
    }
}

// ---------------------------------------------------------------------------
// POST /colorize
// ---------------------------------------------------------------------------

pub async fn colorize(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ColorizeResponse>, AppError> {
    let mut form = ColorForm::read(multipart, state.config.max_upload_bytes).await?;
    let out = state
        .orchestrator
        .colorize(form.image_source(), Vec::new())
        .await?;
    Ok(Json(out.into()))
}

// ---------------------------------------------------------------------------
// POST /colorize_with_hints
// ---------------------------------------------------------------------------

pub async fn colorize_with_hints(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ColorizeResponse>, AppError> {
    let mut form = ColorForm::read(multipart, state.config.max_upload_bytes).await?;
    let hints = parse_hint_payload(form.field("hints"))?;
    let out = state
        .orchestrator
        .colorize(form.image_source(), hints)
        .await?;
    Ok(Json(out.into()))
}
