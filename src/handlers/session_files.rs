use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

use crate::models::error::AppError;
use crate::services::session_registry::validate_session_id;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SessionImageQuery {
    pub session_id: Option<String>,
    pub original_file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResultFileQuery {
    pub session_id: Option<String>,
}

fn required<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str, AppError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(AppError::MissingParameter(name))
}

fn mime_for(path: &Path) -> &'static str {
    let is_png = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("png"))
        .unwrap_or(false);
    if is_png {
        "image/png"
    } else {
        "image/jpeg"
    }
}

async fn read_file(path: &Path, mime: &'static str) -> Result<impl IntoResponse, AppError> {
    let data = tokio::fs::read(path)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to read {}: {}", path.display(), e)))?;
    Ok(([(header::CONTENT_TYPE, mime)], data))
}

// ---------------------------------------------------------------------------
// GET /get_session_image
// ---------------------------------------------------------------------------

/// Serve the original upload of a session, used to restore saved projects.
pub async fn get_session_image(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SessionImageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let session_id = required(&query.session_id, "Session ID")?;
    let original = required(&query.original_file_name, "Original file name")?;
    validate_session_id(session_id)?;

    let path = state
        .orchestrator
        .registry()
        .locate_upload(session_id, original)
        .await
        .ok_or_else(|| AppError::NotFound("Image not found".to_string()))?;

    tracing::debug!(session_id, path = %path.display(), "Serving session image");
    read_file(&path, mime_for(Path::new(original))).await
}

// ---------------------------------------------------------------------------
// GET /get_result_file
// ---------------------------------------------------------------------------

pub async fn get_result_file(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ResultFileQuery>,
) -> Result<impl IntoResponse, AppError> {
    let session_id = required(&query.session_id, "Session ID")?;
    validate_session_id(session_id)?;

    let registry = state.orchestrator.registry();
    let path = registry
        .get(session_id)
        .map(|s| s.result_path)
        .unwrap_or_else(|| registry.result_path_for(session_id));

    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return Err(AppError::NotFound(
            "Colorized result not found for this session".to_string(),
        ));
    }
    read_file(&path, "image/jpeg").await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_by_extension_else_jpeg() {
        assert_eq!(mime_for(Path::new("photo.PNG")), "image/png");
        assert_eq!(mime_for(Path::new("photo.jpg")), "image/jpeg");
        assert_eq!(mime_for(Path::new("noext")), "image/jpeg");
    }

    #[test]
    fn blank_parameters_count_as_missing() {
        let err = required(&Some("  ".into()), "Session ID").unwrap_err();
        assert_eq!(err.to_string(), "Session ID is required");
        assert!(required(&None, "Original file name").is_err());
        assert_eq!(required(&Some("abc".into()), "Session ID").unwrap(), "abc");
    }
}
