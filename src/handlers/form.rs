use std::collections::HashMap;

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::Multipart;
use axum::http::StatusCode;

use crate::models::error::AppError;
use crate::models::session::UploadedImage;
use crate::services::orchestrator::ImageSource;

/// Fields of a multipart colorization request.
#[derive(Debug, Default)]
pub struct ColorForm {
    pub image: Option<UploadedImage>,
    pub text: HashMap<String, String>,
}

impl ColorForm {
    /// Drain the request body. `max_bytes` is only used to report an
    /// oversized body, the limit itself is enforced by the router.
    pub async fn read(
        multipart: Result<Multipart, MultipartRejection>,
        max_bytes: u64,
    ) -> Result<Self, AppError> {
        let mut multipart = multipart?;
        let mut form = ColorForm::default();
        let fail = |e: MultipartError, what: String| {
            if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
                AppError::FileTooLarge(max_bytes)
            } else {
                AppError::MissingOrInvalidImage(format!("{}: {}", what, e))
            }
        };

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| fail(e, "Multipart error".to_string()))?
        {
            let name = field.name().unwrap_or("").to_string();
            if name == "image" {
                let filename = field.file_name().unwrap_or("").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| fail(e, "Failed to read upload".to_string()))?;
                form.image = Some(UploadedImage {
                    filename,
                    data: data.to_vec(),
                });
            } else if !name.is_empty() {
                let value = field
                    .text()
                    .await
                    .map_err(|e| fail(e, format!("Failed to read field '{}'", name)))?;
                form.text.insert(name, value);
            }
        }

        Ok(form)
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.text.get(name).map(String::as_str)
    }

    pub fn image_source(&mut self) -> ImageSource {
        ImageSource {
            session_id: self
                .field("session_id")
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            upload: self.image.take(),
        }
    }
}
