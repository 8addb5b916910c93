use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use dashmap::DashMap;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::models::config::AppConfig;
use crate::models::error::AppError;
use crate::models::session::{Resolved, Session, UploadedImage};

const ALLOWED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];
const MAX_SESSION_ID_LEN: usize = 128;

/// In-memory map from session id to the files backing that session.
///
/// Entries expire after a TTL and the least recently used entry is dropped
/// once the registry is over capacity. Files on disk are left in place so
/// saved projects can still be restored through the deterministic paths.
pub struct SessionRegistry {
    sessions: DashMap<String, Session>,
    upload_dir: PathBuf,
    results_dir: PathBuf,
    ttl: Duration,
    capacity: usize,
}

impl SessionRegistry {
    pub async fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let upload_dir = PathBuf::from(&config.upload_dir);
        let results_dir = PathBuf::from(&config.results_dir);
        fs::create_dir_all(&upload_dir).await?;
        fs::create_dir_all(&results_dir).await?;

        Ok(Self {
            sessions: DashMap::new(),
            upload_dir,
            results_dir,
            ttl: Duration::seconds(config.session_ttl_secs.min(i64::MAX as u64) as i64),
            capacity: config.session_capacity,
        })
    }

    /// Find the image a request should operate on, saving `upload` when the
    /// session cannot be reused.
    pub async fn resolve(
        &self,
        session_id: Option<&str>,
        upload: Option<UploadedImage>,
        reuse: bool,
    ) -> Result<Resolved, AppError> {
        if let Some(id) = session_id {
            validate_session_id(id)?;
        }

        if reuse {
            if let Some(existing) = session_id.and_then(|id| self.touch(id)) {
                if fs::try_exists(&existing.upload_path).await.unwrap_or(false) {
                    return Ok(Resolved {
                        session_id: existing.session_id,
                        upload_path: existing.upload_path,
                        result_path: existing.result_path,
                        is_new_upload: false,
                    });
                }
                debug!(
                    session_id = %existing.session_id,
                    "session upload missing on disk, expecting a fresh upload"
                );
            }
        }

        let upload = upload
            .ok_or_else(|| AppError::MissingOrInvalidImage("No image provided".into()))?;
        if upload.filename.is_empty() {
            return Err(AppError::MissingOrInvalidImage("No image selected".into()));
        }
        let filename = secure_filename(&upload.filename);
        if !allowed_file(&upload.filename) || !allowed_file(&filename) {
            return Err(AppError::MissingOrInvalidImage("Invalid file format".into()));
        }

        let session_id = session_id
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let upload_path = self.upload_path_for(&session_id, &filename);
        let result_path = self.result_path_for(&session_id);

        fs::write(&upload_path, &upload.data).await.map_err(|e| {
            AppError::Internal(format!("Failed to write upload: {}", e))
        })?;

        let now = Utc::now();
        self.sessions.insert(
            session_id.clone(),
            Session {
                session_id: session_id.clone(),
                upload_path: upload_path.clone(),
                result_path: result_path.clone(),
                created_at: now,
                last_access: now,
            },
        );
        info!(session_id = %session_id, size = upload.data.len(), "Upload stored");
        self.evict_over_capacity();

        Ok(Resolved {
            session_id,
            upload_path,
            result_path,
            is_new_upload: true,
        })
    }

    /// Point the session at its latest colorized result.
    pub fn record_result(&self, session_id: &str, result_path: &Path) {
        if let Some(mut entry) = self.sessions.get_mut(session_id) {
            entry.result_path = result_path.to_path_buf();
            entry.last_access = Utc::now();
        }
    }

    pub fn get(&self, session_id: &str) -> Option<Session> {
        self.sessions.get(session_id).map(|s| s.clone())
    }

    pub fn upload_path_for(&self, session_id: &str, filename: &str) -> PathBuf {
        self.upload_dir
            .join(format!("session_{}_{}", session_id, secure_filename(filename)))
    }

    pub fn result_path_for(&self, session_id: &str) -> PathBuf {
        self.results_dir.join(format!("result_{}.jpg", session_id))
    }

    /// Locate the original upload of a session, falling back to the
    /// deterministic name and then to the bare filename in the upload dir.
    pub async fn locate_upload(&self, session_id: &str, original_file_name: &str) -> Option<PathBuf> {
        let mut candidates = Vec::with_capacity(3);
        if let Some(session) = self.get(session_id) {
            candidates.push(session.upload_path);
        } else {
            candidates.push(self.upload_path_for(session_id, original_file_name));
        }
        let direct = secure_filename(original_file_name);
        if !direct.is_empty() {
            candidates.push(self.upload_dir.join(direct));
        }

        for path in candidates {
            if fs::try_exists(&path).await.unwrap_or(false) {
                return Some(path);
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Drop sessions idle for longer than the TTL. Returns how many went.
    pub fn cleanup_expired(&self) -> usize {
        let cutoff = Utc::now() - self.ttl;
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.last_access >= cutoff);
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            warn!(removed, "Expired sessions removed from registry");
        }
        removed
    }

    fn touch(&self, session_id: &str) -> Option<Session> {
        let now = Utc::now();
        match self.sessions.get_mut(session_id) {
            Some(mut entry) if entry.last_access + self.ttl >= now => {
                entry.last_access = now;
                return Some(entry.clone());
            }
            Some(_) => {}
            None => return None,
        }
        // expired; the guard above is released before removal
        self.sessions.remove(session_id);
        None
    }

    fn evict_over_capacity(&self) {
        while self.sessions.len() > self.capacity {
            let oldest = self
                .sessions
                .iter()
                .min_by_key(|e| e.last_access)
                .map(|e| e.key().clone());
            match oldest.and_then(|id| self.sessions.remove(&id)) {
                Some((id, session)) => {
                    debug!(
                        session_id = %id,
                        age_secs = session.age_secs(Utc::now()),
                        "Session evicted (capacity)"
                    );
                }
                None => break,
            }
        }
    }
}

pub fn allowed_file(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Reduce a client filename to a safe single path component.
pub fn secure_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or("");
    let joined = base.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();
    kept.trim_matches(|c| c == '.' || c == '_').to_string()
}

pub fn validate_session_id(id: &str) -> Result<(), AppError> {
    let ok = !id.is_empty()
        && id.len() <= MAX_SESSION_ID_LEN
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(AppError::InvalidSessionId)
    }
}
