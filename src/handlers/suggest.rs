use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::handlers::form::ColorForm;
use crate::models::error::AppError;
use crate::models::suggestion::Suggestion;
use crate::services::orchestrator::SuggestQuery;
use crate::AppState;

const DEFAULT_K: usize = 5;

#[derive(Serialize)]
pub struct SuggestResponse {
    pub status: &'static str,
    pub suggestions: Vec<Suggestion>,
    pub session_id: String,
}

pub async fn suggest_colors(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<SuggestResponse>, AppError> {
    let mut form = ColorForm::read(multipart, state.config.max_upload_bytes).await?;
    let query = parse_query(&form)?;
    let out = state
        .orchestrator
        .suggest(form.image_source(), query)
        .await?;

    Ok(Json(SuggestResponse {
        status: "success",
        suggestions: out.suggestions,
        session_id: out.session_id,
    }))
}

fn parse_query(form: &ColorForm) -> Result<SuggestQuery, AppError> {
    let percent = |name: &str| -> Result<f64, AppError> {
        match form.field(name) {
            None => Ok(50.0),
            Some(raw) => raw
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or(AppError::InvalidCoordinates),
        }
    };

    let k = match form.field("k") {
        None => DEFAULT_K,
        Some(raw) => raw
            .trim()
            .parse::<usize>()
            .ok()
            .filter(|&k| k > 0)
            .ok_or(AppError::InvalidCoordinates)?,
    };

    Ok(SuggestQuery {
        x: percent("x")?,
        y: percent("y")?,
        k,
    })
}
