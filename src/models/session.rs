use std::path::PathBuf;

use chrono::{DateTime, Utc};

/// Whether requests may reuse a previously uploaded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// A known session id skips the upload.
    Persist,
    /// Every request must carry its image.
    AlwaysFresh,
}

impl SessionMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "persist" => Some(SessionMode::Persist),
            "fresh" | "always_fresh" => Some(SessionMode::AlwaysFresh),
            _ => None,
        }
    }

    pub fn reuses_uploads(self) -> bool {
        matches!(self, SessionMode::Persist)
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub upload_path: PathBuf,
    pub result_path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
}

impl Session {
    /// Whole seconds since the upload that created the session.
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_seconds().max(0)
    }
}

/// Outcome of resolving a request against the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub session_id: String,
    pub upload_path: PathBuf,
    pub result_path: PathBuf,
    pub is_new_upload: bool,
}

impl Resolved {
    pub fn result_filename(&self) -> String {
        self.result_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// An image file field taken from a multipart request.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub filename: String,
    pub data: Vec<u8>,
}
