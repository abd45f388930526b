//! Deadline-bounded chessboard detection.
//!
//! Finding a chessboard can take arbitrarily long on a cluttered frame, so the
//! search runs on the blocking pool and the caller waits at most a deadline
//! derived from the frame rate. A search that overruns is abandoned (its
//! eventual result is dropped) and no new search is scheduled until it ends.

use std::sync::Arc;
use std::time::Duration;

use image::GrayImage;
use nalgebra::Point2;
use tokio::sync::Semaphore;

use super::subpix::{refine_corners, SubPixCriteria};
use crate::geometry::CalibrationPattern;

/// Default number of frame intervals a detection may take.
pub const DEFAULT_DETECTION_TOLERANCE: f64 = 10.0;

/// Default frame rate used to derive the detection deadline.
pub const DEFAULT_FPS: f64 = 30.0;

/// Locates the inner corners of a chessboard pattern.
///
/// Implementations return the corners in pattern row-major order, or `None`
/// when the full pattern is not visible.
pub trait ChessboardFinder: Send + Sync {
    fn find_corners(
        &self,
        image: &GrayImage,
        pattern: CalibrationPattern,
    ) -> Option<Vec<Point2<f64>>>;
}

/// Why a frame produced no corners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Miss {
    /// The finder did not see the full pattern.
    NoPattern,
    /// The finder did not answer before the deadline.
    Timeout,
    /// A previous detection is still running.
    Busy,
    /// The detection task panicked or was aborted.
    WorkerFailed,
}

/// Outcome of a detection attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    /// Sub-pixel refined corners in pattern row-major order.
    Found(Vec<Point2<f64>>),
    NotFound(Miss),
}

impl Detection {
    pub fn is_found(&self) -> bool {
        matches!(self, Detection::Found(_))
    }
}

/// Configuration for corner detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorConfig {
    /// How many frame intervals a detection may take before it is abandoned.
    pub tolerance: f64,
    /// Frame rate of the feed being searched.
    pub fps: f64,
    /// Sub-pixel refinement stop rule.
    pub criteria: SubPixCriteria,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_DETECTION_TOLERANCE,
            fps: DEFAULT_FPS,
            criteria: SubPixCriteria::default(),
        }
    }
}

impl DetectorConfig {
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_fps(mut self, fps: f64) -> Self {
        self.fps = fps;
        self
    }

    pub fn with_criteria(mut self, criteria: SubPixCriteria) -> Self {
        self.criteria = criteria;
        self
    }

    /// Longest time a caller waits for one detection: `tolerance / fps`.
    ///
    /// A zero or negative setting means no waiting at all. Values that do not
    /// give a representable duration (NaN, infinite, huge) fall back to the
    /// default deadline.
    pub fn deadline(&self) -> Duration {
        if self.fps <= 0.0 || self.tolerance <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(self.tolerance / self.fps).unwrap_or_else(|_| {
            tracing::warn!(
                "Detection tolerance {} at {} fps is not a usable deadline, using the default",
                self.tolerance,
                self.fps
            );
            default_deadline()
        })
    }
}

fn default_deadline() -> Duration {
    Duration::from_secs_f64(DEFAULT_DETECTION_TOLERANCE / DEFAULT_FPS)
}

/// Runs a [`ChessboardFinder`] with a deadline and at most one search in flight.
pub struct CornerDetector {
    finder: Arc<dyn ChessboardFinder>,
    config: DetectorConfig,
    in_flight: Arc<Semaphore>,
}

impl CornerDetector {
    pub fn new(finder: Arc<dyn ChessboardFinder>, config: DetectorConfig) -> Self {
        Self {
            finder,
            config,
            in_flight: Arc::new(Semaphore::new(1)),
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Deadline derived from the configured tolerance and frame rate.
    pub fn deadline(&self) -> Duration {
        self.config.deadline()
    }

    /// Whether a detection is still running, possibly abandoned by its caller.
    pub fn is_busy(&self) -> bool {
        self.in_flight.available_permits() == 0
    }

    /// Search a frame for the pattern, waiting at most `deadline`.
    ///
    /// Never fails: a slow finder, a busy worker and an absent pattern all
    /// come back as [`Detection::NotFound`].
    pub async fn detect(
        &self,
        image: GrayImage,
        pattern: CalibrationPattern,
        deadline: Duration,
    ) -> Detection {
        let permit = match self.in_flight.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::debug!("Detection still in flight, skipping frame");
                return Detection::NotFound(Miss::Busy);
            }
        };

        let finder = Arc::clone(&self.finder);
        let criteria = self.config.criteria;
        let task = tokio::task::spawn_blocking(move || {
            // Held until the search ends, even when the caller gave up.
            let _permit = permit;
            let corners = finder.find_corners(&image, pattern)?;
            if corners.len() != pattern.corner_count() {
                tracing::debug!(
                    "Finder returned {} corners, expected {}",
                    corners.len(),
                    pattern.corner_count()
                );
                return None;
            }
            Some(refine_corners(&image, &corners, criteria))
        });

        match tokio::time::timeout(deadline, task).await {
            Ok(Ok(Some(corners))) => Detection::Found(corners),
            Ok(Ok(None)) => Detection::NotFound(Miss::NoPattern),
            Ok(Err(e)) => {
                tracing::warn!("Corner detection task failed: {}", e);
                Detection::NotFound(Miss::WorkerFailed)
            }
            Err(_) => {
                tracing::debug!("Corner detection exceeded {:?}", deadline);
                Detection::NotFound(Miss::Timeout)
            }
        }
    }
}
