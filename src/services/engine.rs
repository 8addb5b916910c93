use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use image::RgbImage;
use parking_lot::Mutex;
use tracing::warn;

use crate::models::error::AppError;
use crate::models::suggestion::AbRecommendations;
use crate::services::compositor::HintTensors;
use crate::services::grid::GridCell;

/// A stateful colorization network.
///
/// `load_image` and `forward` mutate state that the read methods observe,
/// so a sequence of calls for one request must not interleave with another
/// request's calls on the same instance. [`EngineHandle`] enforces that.
pub trait ColorizationEngine: Send {
    fn grid_size(&self) -> usize;

    fn load_image(&mut self, path: &Path) -> Result<(), AppError>;

    fn forward(&mut self, hints: HintTensors) -> Result<(), AppError>;

    /// Last prediction recombined with the loaded image's full-resolution L.
    fn full_resolution(&self) -> Result<RgbImage, AppError>;

    /// Top-`k` ab candidates at `cell`, most likely first.
    fn ab_recommendations(
        &self,
        cell: GridCell,
        k: usize,
    ) -> Result<Option<AbRecommendations>, AppError>;

    /// L of the loaded image at `cell` on the working grid.
    fn lightness_at(&self, cell: GridCell) -> Result<f32, AppError>;
}

/// Exclusive access to one engine instance.
///
/// Every job runs on the blocking pool while holding the instance lock for
/// its whole load → forward → read sequence.
#[derive(Clone)]
pub struct EngineHandle {
    name: &'static str,
    grid_size: usize,
    engine: Arc<Mutex<Box<dyn ColorizationEngine>>>,
    timeout: Option<Duration>,
}

impl EngineHandle {
    pub fn new(name: &'static str, engine: Box<dyn ColorizationEngine>, timeout_secs: u64) -> Self {
        Self {
            name,
            grid_size: engine.grid_size(),
            engine: Arc::new(Mutex::new(engine)),
            timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
        }
    }

    pub fn grid_size(&self) -> usize {
        self.grid_size
    }

    pub async fn run<T, F>(&self, job: F) -> Result<T, AppError>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn ColorizationEngine) -> Result<T, AppError> + Send + 'static,
    {
        let engine = self.engine.clone();
        let task = tokio::task::spawn_blocking(move || {
            let mut guard = engine.lock();
            job(&mut **guard)
        });

        let joined = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, task).await.map_err(|_| {
                warn!(engine = self.name, timeout_secs = limit.as_secs(), "Inference timed out");
                AppError::EngineFailure("Inference timed out".to_string())
            })?,
            None => task.await,
        };

        joined.map_err(|e| AppError::EngineFailure(format!("Engine task failed: {}", e)))?
    }
}

#[cfg(test)]
pub mod fake {
    use super::*;

    /// Deterministic engine that records the calls it receives.
    pub struct FakeEngine {
        pub grid_size: usize,
        pub calls: Arc<Mutex<Vec<String>>>,
        pub recommendations: Option<AbRecommendations>,
        pub last_mask_sum: f32,
        loaded: bool,
    }

    impl FakeEngine {
        pub fn new(grid_size: usize) -> (Self, Arc<Mutex<Vec<String>>>) {
            let calls = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    grid_size,
                    calls: calls.clone(),
                    recommendations: Some(AbRecommendations {
                        ab: vec![[0.0, 0.0], [60.0, 50.0], [-30.0, -40.0]],
                        confidences: vec![0.5, 0.3, 0.2],
                    }),
                    last_mask_sum: 0.0,
                    loaded: false,
                },
                calls,
            )
        }
    }

    impl ColorizationEngine for FakeEngine {
        fn grid_size(&self) -> usize {
            self.grid_size
        }

        fn load_image(&mut self, path: &Path) -> Result<(), AppError> {
            if !path.exists() {
                return Err(AppError::EngineFailure(format!("missing {}", path.display())));
            }
            self.loaded = true;
            self.calls.lock().push(format!("load:{}", path.display()));
            Ok(())
        }

        fn forward(&mut self, hints: HintTensors) -> Result<(), AppError> {
            if !self.loaded {
                return Err(AppError::EngineFailure("No image loaded".into()));
            }
            self.last_mask_sum = hints.mask.sum();
            self.calls.lock().push(format!("forward:{}", self.last_mask_sum));
            Ok(())
        }

        fn full_resolution(&self) -> Result<RgbImage, AppError> {
            self.calls.lock().push("fullres".to_string());
            let shade = if self.last_mask_sum > 0.0 { 200 } else { 100 };
            Ok(RgbImage::from_pixel(8, 6, image::Rgb([shade, 50, 25])))
        }

        fn ab_recommendations(
            &self,
            cell: GridCell,
            k: usize,
        ) -> Result<Option<AbRecommendations>, AppError> {
            self.calls
                .lock()
                .push(format!("reccs:{}:{}:{}", cell.row, cell.col, k));
            Ok(self.recommendations.clone())
        }

        fn lightness_at(&self, _cell: GridCell) -> Result<f32, AppError> {
            Ok(60.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeEngine;
    use super::*;

    #[tokio::test]
    async fn jobs_are_serialized_per_instance() {
        let (engine, _calls) = FakeEngine::new(4);
        let handle = EngineHandle::new("test", Box::new(engine), 5);
        let active = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let handle = handle.clone();
            let active = active.clone();
            tasks.push(tokio::spawn(async move {
                handle
                    .run(move |_engine| {
                        use std::sync::atomic::Ordering;
                        let inside = active.fetch_add(1, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(5));
                        active.fetch_sub(1, Ordering::SeqCst);
                        Ok(inside)
                    })
                    .await
            }));
        }
        for t in tasks {
            assert_eq!(t.await.unwrap().unwrap(), 0);
        }
    }

    #[tokio::test]
    async fn slow_jobs_time_out() {
        let (engine, _calls) = FakeEngine::new(4);
        let handle = EngineHandle::new("test", Box::new(engine), 1);
        let err = handle
            .run(|_engine| {
                std::thread::sleep(Duration::from_millis(1500));
                Ok(())
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Inference timed out");
    }

    #[tokio::test]
    async fn job_errors_pass_through() {
        let (engine, _calls) = FakeEngine::new(4);
        let handle = EngineHandle::new("test", Box::new(engine), 0);
        let err = handle
            .run(|engine| engine.forward(HintTensors::zeros(4)))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No image loaded");
    }
}
