use std::io::Cursor;
use std::sync::Arc;

use base64::Engine as _;
use image::RgbImage;
use tracing::info;

use crate::models::error::AppError;
use crate::models::hints::HintPoint;
use crate::models::session::{Resolved, SessionMode, UploadedImage};
use crate::models::suggestion::Suggestion;
use crate::services::compositor::{HintCompositor, HintTensors};
use crate::services::engine::EngineHandle;
use crate::services::grid::to_grid;
use crate::services::session_registry::SessionRegistry;
use crate::services::suggestions::reconstruct;

const RESULT_JPEG_QUALITY: u8 = 95;

/// Where the image for a request comes from.
#[derive(Debug, Clone, Default)]
pub struct ImageSource {
    pub session_id: Option<String>,
    pub upload: Option<UploadedImage>,
}

#[derive(Debug, Clone)]
pub struct ColorizeOutcome {
    pub image_base64: String,
    pub filename: String,
    pub session_id: String,
}

#[derive(Debug, Clone)]
pub struct SuggestOutcome {
    pub suggestions: Vec<Suggestion>,
    pub session_id: String,
}

#[derive(Debug, Clone, Copy)]
pub struct SuggestQuery {
    pub x: f64,
    pub y: f64,
    pub k: usize,
}

pub struct RequestOrchestrator {
    mode: SessionMode,
    registry: Arc<SessionRegistry>,
    compositor: HintCompositor,
    colorizer: EngineHandle,
    suggester: EngineHandle,
}

impl RequestOrchestrator {
    pub fn new(
        mode: SessionMode,
        registry: Arc<SessionRegistry>,
        hint_radius: usize,
        colorizer: EngineHandle,
        suggester: EngineHandle,
    ) -> Self {
        Self {
            mode,
            compositor: HintCompositor::new(colorizer.grid_size(), hint_radius),
            registry,
            colorizer,
            suggester,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    async fn resolve(&self, source: ImageSource) -> Result<Resolved, AppError> {
        let resolved = self
            .registry
            .resolve(
                source.session_id.as_deref(),
                source.upload,
                self.mode.reuses_uploads(),
            )
            .await?;
        info!(
            session_id = %resolved.session_id,
            is_new_upload = resolved.is_new_upload,
            "Session resolved"
        );
        Ok(resolved)
    }

    /// Colorize the session image, constrained by `hints` (empty for the
    /// fully automatic pass).
    pub async fn colorize(
        &self,
        source: ImageSource,
        hints: Vec<HintPoint>,
    ) -> Result<ColorizeOutcome, AppError> {
        let resolved = self.resolve(source).await?;
        let tensors = self.compositor.composite(&hints);
        info!(session_id = %resolved.session_id, hints = hints.len(), "Colorizing");

        let upload_path = resolved.upload_path.clone();
        let result = self
            .colorizer
            .run(move |engine| {
                engine.load_image(&upload_path)?;
                engine.forward(tensors)?;
                engine.full_resolution()
            })
            .await?;

        let jpeg = tokio::task::spawn_blocking(move || encode_jpeg(&result, RESULT_JPEG_QUALITY))
            .await
            .map_err(|e| AppError::Internal(format!("Encoder task failed: {}", e)))??;

        tokio::fs::write(&resolved.result_path, &jpeg).await.map_err(|e| {
            AppError::Internal(format!("Failed to write result: {}", e))
        })?;
        self.registry
            .record_result(&resolved.session_id, &resolved.result_path);

        Ok(ColorizeOutcome {
            image_base64: base64::engine::general_purpose::STANDARD.encode(&jpeg),
            filename: resolved.result_filename(),
            session_id: resolved.session_id,
        })
    }

    /// Rank plausible colors for one point of the session image.
    pub async fn suggest(
        &self,
        source: ImageSource,
        query: SuggestQuery,
    ) -> Result<SuggestOutcome, AppError> {
        let resolved = self.resolve(source).await?;
        let cell = to_grid(query.x, query.y, self.suggester.grid_size());
        let k = query.k;
        info!(
            session_id = %resolved.session_id,
            row = cell.row,
            col = cell.col,
            k,
            "Suggesting colors"
        );

        let upload_path = resolved.upload_path.clone();
        let grid_size = self.suggester.grid_size();
        let (recommendations, l) = self
            .suggester
            .run(move |engine| {
                engine.load_image(&upload_path)?;
                engine.forward(HintTensors::zeros(grid_size))?;
                let recs = engine.ab_recommendations(cell, k)?;
                let l = engine.lightness_at(cell)?;
                Ok((recs, l))
            })
            .await?;

        let suggestions = reconstruct(recommendations, l, k)?;
        Ok(SuggestOutcome {
            suggestions,
            session_id: resolved.session_id,
        })
    }
}

pub fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>, AppError> {
    let mut buf = Cursor::new(Vec::new());
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality);
    encoder
        .encode(img.as_raw(), img.width(), img.height(), image::ExtendedColorType::Rgb8)
        .map_err(|e| AppError::Internal(format!("JPEG encode error: {}", e)))?;
    Ok(buf.into_inner())
}
