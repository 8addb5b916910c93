use std::path::{Path, PathBuf};

use image::{imageops::FilterType, RgbImage};
use ndarray::{Array2, Array3, Axis};

use crate::models::error::AppError;
use crate::models::suggestion::AbRecommendations;
use crate::services::color::{lab_to_rgb, rgb_to_lab, unit_to_byte};
use crate::services::compositor::HintTensors;
use crate::services::engine::ColorizationEngine;
use crate::services::grid::GridCell;

// Normalization baked into the exported network.
const L_CENT: f32 = 50.0;
const AB_NORM: f32 = 110.0;
const MASK_CENT: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorizerKind {
    /// Predicts ab only.
    Direct,
    /// Also predicts a distribution over quantized ab bins.
    Distribution,
}

enum LazySession {
    Pending(PathBuf),
    Loaded(ort::session::Session),
    Unavailable(String),
}

struct LoadedImage {
    width: u32,
    height: u32,
    /// Row-major L for every pixel of the original image.
    full_l: Vec<f32>,
    /// `(D, D)` L of the image resized to the working grid.
    grid_l: Array2<f32>,
}

struct Prediction {
    /// `(2, D, D)`
    ab: Array3<f32>,
    /// `(Q, h, w)` bin probabilities, distribution models only.
    dist: Option<Array3<f32>>,
}

/// ONNX-backed colorizer, session loaded on first use.
pub struct OnnxColorizer {
    kind: ColorizerKind,
    grid_size: usize,
    session: LazySession,
    gamut: Option<Vec<[f32; 2]>>,
    image: Option<LoadedImage>,
    prediction: Option<Prediction>,
}

impl OnnxColorizer {
    pub fn new(
        kind: ColorizerKind,
        model_path: &Path,
        gamut_path: Option<&Path>,
        grid_size: usize,
    ) -> Self {
        let session = if model_path.exists() {
            tracing::info!(
                "Registered {:?} colorizer for lazy loading from {:?}",
                kind,
                model_path
            );
            LazySession::Pending(model_path.to_path_buf())
        } else {
            tracing::warn!(
                "Colorizer model {:?} not found; {:?} colorization unavailable",
                model_path,
                kind
            );
            LazySession::Unavailable(format!(
                "Colorization model not available: {}",
                model_path.display()
            ))
        };

        let gamut = gamut_path.and_then(|p| match load_gamut(p) {
            Ok(bins) => Some(bins),
            Err(e) => {
                tracing::warn!("ab gamut bins unavailable: {}", e);
                None
            }
        });

        Self {
            kind,
            grid_size,
            session,
            gamut,
            image: None,
            prediction: None,
        }
    }

    fn ensure_loaded(&mut self) -> Result<&mut ort::session::Session, AppError> {
        if let LazySession::Pending(_) = self.session {
            let old = std::mem::replace(&mut self.session, LazySession::Unavailable(String::new()));
            if let LazySession::Pending(path) = old {
                self.session = match load_session(&path) {
                    Ok(session) => {
                        tracing::info!("Lazy-loaded {:?} colorizer from {:?}", self.kind, path);
                        LazySession::Loaded(session)
                    }
                    Err(e) => {
                        tracing::warn!("Failed to lazy-load colorizer: {}", e);
                        LazySession::Unavailable(e)
                    }
                };
            }
        }

        match &mut self.session {
            LazySession::Loaded(session) => Ok(session),
            LazySession::Unavailable(reason) => Err(AppError::EngineFailure(reason.clone())),
            LazySession::Pending(_) => Err(AppError::EngineFailure(
                "Colorization model not loaded".to_string(),
            )),
        }
    }

    fn loaded_image(&self) -> Result<&LoadedImage, AppError> {
        self.image
            .as_ref()
            .ok_or_else(|| AppError::EngineFailure("No image loaded".to_string()))
    }

    fn prediction(&self) -> Result<&Prediction, AppError> {
        self.prediction
            .as_ref()
            .ok_or_else(|| AppError::EngineFailure("Forward pass has not run".to_string()))
    }
}

impl ColorizationEngine for OnnxColorizer {
    fn grid_size(&self) -> usize {
        self.grid_size
    }

    fn load_image(&mut self, path: &Path) -> Result<(), AppError> {
        let rgb = image::open(path)
            .map_err(|e| AppError::EngineFailure(format!("Failed to load image: {}", e)))?
            .to_rgb8();
        let (width, height) = rgb.dimensions();
        let full_l = rgb.pixels().map(|p| rgb_to_lab(p.0)[0]).collect();

        let d = self.grid_size as u32;
        let small = image::imageops::resize(&rgb, d, d, FilterType::Triangle);
        let grid_l = Array2::from_shape_fn((self.grid_size, self.grid_size), |(y, x)| {
            rgb_to_lab(small.get_pixel(x as u32, y as u32).0)[0]
        });

        self.image = Some(LoadedImage {
            width,
            height,
            full_l,
            grid_l,
        });
        self.prediction = None;
        Ok(())
    }

    fn forward(&mut self, hints: HintTensors) -> Result<(), AppError> {
        let d = self.grid_size;
        if hints.grid_size() != d {
            return Err(AppError::EngineFailure(format!(
                "Hint tensors are {}x{}, engine expects {}x{}",
                hints.grid_size(),
                hints.grid_size(),
                d,
                d
            )));
        }

        let l_input = self
            .loaded_image()?
            .grid_l
            .mapv(|v| v - L_CENT)
            .insert_axis(Axis(0))
            .insert_axis(Axis(0));
        let ab_input = hints.ab.mapv(|v| v / AB_NORM).insert_axis(Axis(0));
        let mask_input = hints.mask.mapv(|v| v - MASK_CENT).insert_axis(Axis(0));

        let to_tensor = |name: &str, arr: ndarray::Array4<f32>| {
            ort::value::Tensor::from_array(arr)
                .map_err(|e| AppError::EngineFailure(format!("{} tensor: {}", name, e)))
        };
        let l_tensor = to_tensor("l", l_input)?;
        let ab_tensor = to_tensor("ab", ab_input)?;
        let mask_tensor = to_tensor("mask", mask_input)?;

        let want_dist = self.kind == ColorizerKind::Distribution;
        let prediction = {
            let session = self.ensure_loaded()?;
            let outputs = session
                .run(ort::inputs![
                    "l" => l_tensor,
                    "ab" => ab_tensor,
                    "mask" => mask_tensor,
                ])
                .map_err(|e| AppError::EngineFailure(format!("Colorizer inference failed: {}", e)))?;

            let (shape, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| AppError::EngineFailure(format!("Failed to extract ab output: {}", e)))?;
            if shape.iter().product::<i64>() != (2 * d * d) as i64 {
                return Err(AppError::EngineFailure(format!(
                    "Unexpected ab output shape {:?}",
                    &shape[..]
                )));
            }
            let ab = Array3::from_shape_vec((2, d, d), data.iter().map(|v| v * AB_NORM).collect())
                .map_err(|e| AppError::EngineFailure(format!("ab output: {}", e)))?;

            let dist = if want_dist {
                if outputs.len() < 2 {
                    return Err(AppError::EngineFailure(
                        "Distribution output missing from model".to_string(),
                    ));
                }
                let (shape, data) = outputs[1].try_extract_tensor::<f32>().map_err(|e| {
                    AppError::EngineFailure(format!("Failed to extract distribution: {}", e))
                })?;
                if shape.len() != 4 {
                    return Err(AppError::EngineFailure(format!(
                        "Unexpected distribution shape {:?}",
                        &shape[..]
                    )));
                }
                let dims = (shape[1] as usize, shape[2] as usize, shape[3] as usize);
                Some(
                    Array3::from_shape_vec(dims, data.to_vec())
                        .map_err(|e| AppError::EngineFailure(format!("distribution output: {}", e)))?,
                )
            } else {
                None
            };
            Prediction { ab, dist }
        };
        self.prediction = Some(prediction);
        Ok(())
    }

    fn full_resolution(&self) -> Result<RgbImage, AppError> {
        let image = self.loaded_image()?;
        let prediction = self.prediction()?;
        let d = self.grid_size as u32;
        let (w, h) = (image.width, image.height);

        let channel = |c: usize| {
            let plane: Vec<f32> = prediction.ab.index_axis(Axis(0), c).iter().copied().collect();
            bilinear_resize(&plane, d, d, w, h)
        };
        let a_full = channel(0);
        let b_full = channel(1);

        let mut buf = Vec::with_capacity((w as usize) * (h as usize) * 3);
        for i in 0..image.full_l.len() {
            buf.extend_from_slice(&unit_to_byte(lab_to_rgb(image.full_l[i], a_full[i], b_full[i])));
        }

        RgbImage::from_raw(w, h, buf)
            .ok_or_else(|| AppError::EngineFailure("Result buffer size mismatch".to_string()))
    }

    fn ab_recommendations(
        &self,
        cell: GridCell,
        k: usize,
    ) -> Result<Option<AbRecommendations>, AppError> {
        let dist = match self.prediction()?.dist.as_ref() {
            Some(d) => d,
            None => return Ok(None),
        };
        let gamut = self.gamut.as_ref().ok_or_else(|| {
            AppError::EngineFailure("ab gamut bins not configured".to_string())
        })?;

        let (bins, dh, dw) = dist.dim();
        if bins != gamut.len() {
            return Err(AppError::EngineFailure(format!(
                "Model predicts {} bins, gamut file has {}",
                bins,
                gamut.len()
            )));
        }

        // distribution may be predicted at a coarser resolution than the grid
        let row = (cell.row * dh / self.grid_size).min(dh.saturating_sub(1));
        let col = (cell.col * dw / self.grid_size).min(dw.saturating_sub(1));

        let mut ranked: Vec<(usize, f32)> = dist
            .slice(ndarray::s![.., row, col])
            .iter()
            .copied()
            .enumerate()
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(k);

        if ranked.is_empty() {
            return Ok(None);
        }

        Ok(Some(AbRecommendations {
            ab: ranked.iter().map(|&(q, _)| gamut[q]).collect(),
            confidences: ranked.iter().map(|&(_, p)| p).collect(),
        }))
    }

    fn lightness_at(&self, cell: GridCell) -> Result<f32, AppError> {
        let image = self.loaded_image()?;
        image
            .grid_l
            .get((cell.row, cell.col))
            .copied()
            .ok_or_else(|| AppError::EngineFailure("Cell outside the working grid".to_string()))
    }
}

fn load_session(path: &Path) -> Result<ort::session::Session, String> {
    ort::session::Session::builder()
        .and_then(|b| b.with_intra_threads(2))
        .and_then(|b| b.commit_from_file(path))
        .map_err(|e| format!("ONNX session load error: {}", e))
}

/// Read quantized ab bin centers from a JSON array of `[a, b]` pairs.
fn load_gamut(path: &Path) -> Result<Vec<[f32; 2]>, String> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {:?}: {}", path, e))?;
    serde_json::from_str(&json).map_err(|e| format!("Failed to parse {:?}: {}", path, e))
}

fn bilinear_resize(data: &[f32], sw: u32, sh: u32, dw: u32, dh: u32) -> Vec<f32> {
    let mut result = vec![0.0f32; (dw as usize) * (dh as usize)];
    if sw == 0 || sh == 0 {
        return result;
    }
    let sx = sw as f32 / dw as f32;
    let sy = sh as f32 / dh as f32;

    let get = |xx: u32, yy: u32| -> f32 {
        data.get((yy * sw + xx) as usize).copied().unwrap_or(0.0)
    };

    for y in 0..dh {
        let src_y = ((y as f32 + 0.5) * sy - 0.5).max(0.0);
        let y0 = (src_y.floor() as u32).min(sh - 1);
        let y1 = (y0 + 1).min(sh - 1);
        let fy = src_y - y0 as f32;

        for x in 0..dw {
            let src_x = ((x as f32 + 0.5) * sx - 0.5).max(0.0);
            let x0 = (src_x.floor() as u32).min(sw - 1);
            let x1 = (x0 + 1).min(sw - 1);
            let fx = src_x - x0 as f32;

            let v = get(x0, y0) * (1.0 - fx) * (1.0 - fy)
                + get(x1, y0) * fx * (1.0 - fy)
                + get(x0, y1) * (1.0 - fx) * fy
                + get(x1, y1) * fx * fy;

            result[(y * dw + x) as usize] = v;
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bilinear_resize_preserves_constant_planes() {
        let plane = vec![7.5f32; 16];
        let out = bilinear_resize(&plane, 4, 4, 10, 3);
        assert_eq!(out.len(), 30);
        assert!(out.iter().all(|v| (v - 7.5).abs() < 1e-5));
    }

    #[test]
    fn bilinear_resize_interpolates_between_columns() {
        // 2x1 plane [0, 10] upsampled to 4x1
        let out = bilinear_resize(&[0.0, 10.0], 2, 1, 4, 1);
        assert_eq!(out[0], 0.0);
        assert!((out[1] - 2.5).abs() < 1e-5);
        assert!((out[2] - 7.5).abs() < 1e-5);
        assert_eq!(out[3], 10.0);
    }

    #[test]
    fn missing_model_reports_engine_failure() {
        let dir = tempfile::tempdir().unwrap();
        let img_path = dir.path().join("gray.png");
        RgbImage::from_pixel(20, 10, image::Rgb([90, 90, 90]))
            .save(&img_path)
            .unwrap();

        let mut engine = OnnxColorizer::new(
            ColorizerKind::Direct,
            &dir.path().join("absent.onnx"),
            None,
            16,
        );
        engine.load_image(&img_path).unwrap();

        let l = engine.lightness_at(GridCell { row: 3, col: 4 }).unwrap();
        assert!((l - rgb_to_lab([90, 90, 90])[0]).abs() < 0.5);

        let err = engine.forward(HintTensors::zeros(16)).unwrap_err();
        assert!(matches!(err, AppError::EngineFailure(_)));
        assert!(engine.full_resolution().is_err());
    }

    #[test]
    fn rejects_mismatched_hint_grid() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = OnnxColorizer::new(
            ColorizerKind::Direct,
            &dir.path().join("absent.onnx"),
            None,
            16,
        );
        let err = engine.forward(HintTensors::zeros(8)).unwrap_err();
        assert!(err.to_string().contains("engine expects 16x16"));
    }
}
