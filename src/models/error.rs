use axum::{
    extract::multipart::MultipartRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Body of every error response.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    MissingOrInvalidImage(String),

    #[error("{0}")]
    InvalidHintPayload(String),

    #[error("Point {index} {reason}")]
    MalformedHint { index: usize, reason: String },

    #[error("Invalid coordinates")]
    InvalidCoordinates,

    #[error("Invalid session id")]
    InvalidSessionId,

    #[error("{0} is required")]
    MissingParameter(&'static str),

    #[error("{0}")]
    NotFound(String),

    #[error("File exceeds the maximum upload size of {0} bytes")]
    FileTooLarge(u64),

    #[error("Failed to generate color suggestions")]
    NoSuggestionsAvailable,

    #[error("{0}")]
    EngineFailure(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MissingOrInvalidImage(_)
            | AppError::InvalidHintPayload(_)
            | AppError::MalformedHint { .. }
            | AppError::InvalidCoordinates
            | AppError::InvalidSessionId
            | AppError::MissingParameter(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::FileTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::NoSuggestionsAvailable
            | AppError::EngineFailure(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error: self.to_string(),
        }
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        tracing::debug!(error = %rejection, "request body is not multipart");
        AppError::MissingOrInvalidImage("No image provided".to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }
        (status, Json(self.to_body())).into_response()
    }
}
