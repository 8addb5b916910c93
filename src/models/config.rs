use std::env;

use crate::models::session::SessionMode;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: String,
    pub allowed_origins: Vec<String>,
    pub upload_dir: String,
    pub results_dir: String,
    pub max_upload_bytes: u64,
    pub grid_size: usize,
    pub hint_radius: usize,
    pub session_mode: SessionMode,
    pub session_ttl_secs: u64,
    pub session_capacity: usize,
    pub engine_timeout_secs: u64,
    pub color_model_path: String,
    pub dist_model_path: String,
    pub ab_gamut_path: String,
    pub log_level: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            listen_addr: env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:5000".to_string()),
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "*".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            upload_dir: env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string()),
            results_dir: env::var("RESULTS_DIR").unwrap_or_else(|_| "./results".to_string()),
            max_upload_bytes: env::var("MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(16 * 1024 * 1024),
            grid_size: env::var("GRID_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&d: &usize| d > 0)
                .unwrap_or(256),
            hint_radius: env::var("HINT_RADIUS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&r: &usize| r > 0)
                .unwrap_or(3),
            session_mode: env::var("SESSION_MODE")
                .ok()
                .and_then(|v| SessionMode::parse(&v))
                .unwrap_or(SessionMode::Persist),
            session_ttl_secs: env::var("SESSION_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(86400),
            session_capacity: env::var("SESSION_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&c: &usize| c > 0)
                .unwrap_or(1024),
            engine_timeout_secs: env::var("ENGINE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(120),
            color_model_path: env::var("COLOR_MODEL_PATH")
                .unwrap_or_else(|_| "./models/colorizer.onnx".to_string()),
            dist_model_path: env::var("DIST_MODEL_PATH")
                .unwrap_or_else(|_| "./models/colorizer_dist.onnx".to_string()),
            ab_gamut_path: env::var("AB_GAMUT_PATH")
                .unwrap_or_else(|_| "./models/ab_gamut.json".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }
}

#[cfg(test)]
impl AppConfig {
    /// Config rooted in a scratch directory, with no model files on disk.
    pub fn for_tests(root: &std::path::Path) -> Self {
        Self {
            listen_addr: "127.0.0.1:0".to_string(),
            allowed_origins: vec!["*".to_string()],
            upload_dir: root.join("uploads").to_string_lossy().into_owned(),
            results_dir: root.join("results").to_string_lossy().into_owned(),
            max_upload_bytes: 16 * 1024 * 1024,
            grid_size: 256,
            hint_radius: 3,
            session_mode: SessionMode::Persist,
            session_ttl_secs: 86400,
            session_capacity: 1024,
            engine_timeout_secs: 30,
            color_model_path: root.join("missing.onnx").to_string_lossy().into_owned(),
            dist_model_path: root.join("missing_dist.onnx").to_string_lossy().into_owned(),
            ab_gamut_path: root.join("missing.json").to_string_lossy().into_owned(),
            log_level: "debug".to_string(),
        }
    }
}
