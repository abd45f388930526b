//! Interactive lens calibration for one camera.
//!
//! A session searches incoming frames for the calibration pattern, collects
//! one correspondence per detection and, once enough have been gathered,
//! hands them to a [`CalibrationSolver`] and commits the result to the
//! [`CalibrationStore`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use image::RgbImage;
use nalgebra::{Point2, Point3};
use thiserror::Error;

use super::solver::{CalibrationSolver, SolveError};
use super::store::{CalibrationResult, CalibrationStore};
use crate::detection::{CornerDetector, Detection, Miss};
use crate::geometry::{CalibrationPattern, Correspondence, Resolution, Side};

/// Default number of detections collected before solving.
pub const DEFAULT_SAMPLE_THRESHOLD: usize = 10;

/// Session errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Calibration of {side} camera failed after {samples} samples: {reason}")]
    CalibrationFailed {
        side: Side,
        samples: usize,
        reason: SolveError,
    },
    #[error("Cannot {action} a session that is {state:?}")]
    InvalidState {
        action: &'static str,
        state: SessionState,
    },
}

/// Lifecycle of a calibration session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Searching,
    Solving,
    Complete,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Complete | SessionState::Cancelled)
    }
}

/// Configuration for a calibration session. Fixed once the session starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionConfig {
    /// Camera the result is stored for.
    pub side: Side,
    pub pattern: CalibrationPattern,
    /// Number of correspondences that triggers the solve.
    pub sample_threshold: usize,
}

impl SessionConfig {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            pattern: CalibrationPattern::default(),
            sample_threshold: DEFAULT_SAMPLE_THRESHOLD,
        }
    }

    pub fn with_pattern(mut self, pattern: CalibrationPattern) -> Self {
        self.pattern = pattern;
        self
    }

    pub fn with_sample_threshold(mut self, sample_threshold: usize) -> Self {
        self.sample_threshold = sample_threshold.max(1);
        self
    }
}

/// What a frame did to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// The session is not searching; the frame was ignored.
    Inactive,
    /// No corners this frame.
    NoPattern(Miss),
    /// Corners accepted; `count` correspondences collected so far.
    Captured {
        count: usize,
        corners: Vec<Point2<f64>>,
    },
    /// The threshold was reached and the solved result is now in the store.
    Completed(Arc<CalibrationResult>),
}

/// Callback invoked with the correspondence count after each capture.
pub type ProgressCallback = Box<dyn Fn(usize) + Send + Sync>;

/// Cancels a session from outside the task that drives it.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Calibration state machine for one camera side.
pub struct CalibrationSession {
    config: SessionConfig,
    state: SessionState,
    object_template: Vec<Point3<f64>>,
    correspondences: Vec<Correspondence>,
    detector: Option<CornerDetector>,
    cancelled: Arc<AtomicBool>,
    progress_callback: Option<ProgressCallback>,
}

impl CalibrationSession {
    pub fn new(config: SessionConfig, detector: CornerDetector) -> Self {
        Self {
            config,
            state: SessionState::Idle,
            object_template: Vec::new(),
            correspondences: Vec::new(),
            detector: Some(detector),
            cancelled: Arc::new(AtomicBool::new(false)),
            progress_callback: None,
        }
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current state; a pending external cancel already reads as `Cancelled`.
    pub fn state(&self) -> SessionState {
        if self.state != SessionState::Complete && self.cancelled.load(Ordering::SeqCst) {
            SessionState::Cancelled
        } else {
            self.state
        }
    }

    /// Correspondences collected so far, in arrival order.
    pub fn correspondences(&self) -> &[Correspondence] {
        if self.state() == SessionState::Cancelled {
            return &[];
        }
        &self.correspondences
    }

    pub fn sample_count(&self) -> usize {
        self.correspondences().len()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.cancelled))
    }

    /// Begin searching for the pattern.
    pub fn start(&mut self) -> Result<(), SessionError> {
        self.apply_pending_cancel();
        if self.state != SessionState::Idle {
            return Err(SessionError::InvalidState {
                action: "start",
                state: self.state,
            });
        }
        self.object_template = self.config.pattern.object_points();
        self.correspondences.clear();
        self.state = SessionState::Searching;
        tracing::info!(
            "Calibration of {} camera started ({}x{} pattern, {} samples)",
            self.config.side,
            self.config.pattern.cols,
            self.config.pattern.rows,
            self.config.sample_threshold
        );
        Ok(())
    }

    /// Abandon the session, discarding collected data. Cancelling twice is a no-op.
    pub fn cancel(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Complete => Err(SessionError::InvalidState {
                action: "cancel",
                state: self.state,
            }),
            SessionState::Cancelled => Ok(()),
            _ => {
                self.cancelled.store(true, Ordering::SeqCst);
                self.apply_pending_cancel();
                Ok(())
            }
        }
    }

    /// Feed one camera frame to the session.
    ///
    /// Detection misses and timeouts are absorbed. When the sample threshold
    /// is reached the solve runs before this returns; a failed solve resets
    /// the session to `Idle` and leaves `store` untouched.
    pub async fn on_frame(
        &mut self,
        frame: &RgbImage,
        store: &mut CalibrationStore,
        solver: &dyn CalibrationSolver,
    ) -> Result<FrameOutcome, SessionError> {
        self.apply_pending_cancel();
        if self.state != SessionState::Searching {
            return Ok(FrameOutcome::Inactive);
        }
        let Some(detector) = self.detector.as_ref() else {
            return Ok(FrameOutcome::Inactive);
        };

        let gray = image::imageops::grayscale(frame);
        let detection = detector
            .detect(gray, self.config.pattern, detector.deadline())
            .await;

        // Cancelled while the detector was running: drop whatever it found.
        if self.apply_pending_cancel() {
            return Ok(FrameOutcome::Inactive);
        }

        let corners = match detection {
            Detection::Found(corners) => corners,
            Detection::NotFound(miss) => return Ok(FrameOutcome::NoPattern(miss)),
        };

        self.correspondences.push(Correspondence::new(
            self.object_template.clone(),
            corners.clone(),
        ));
        let count = self.correspondences.len();
        tracing::debug!("{} camera: {} / {} samples", self.config.side, count, self.config.sample_threshold);
        if let Some(callback) = &self.progress_callback {
            callback(count);
        }

        if count < self.config.sample_threshold {
            return Ok(FrameOutcome::Captured { count, corners });
        }

        self.state = SessionState::Solving;
        let resolution = Resolution::new(frame.width(), frame.height());
        self.solve(resolution, store, solver)
            .map(|result| result.map_or(FrameOutcome::Inactive, FrameOutcome::Completed))
    }

    fn solve(
        &mut self,
        resolution: Resolution,
        store: &mut CalibrationStore,
        solver: &dyn CalibrationSolver,
    ) -> Result<Option<Arc<CalibrationResult>>, SessionError> {
        let samples = self.correspondences.len();
        let (object_points, image_points): (Vec<_>, Vec<_>) = self
            .correspondences
            .iter()
            .map(|c| (c.object_points.clone(), c.image_points.clone()))
            .unzip();

        tracing::info!(
            "Solving {} camera calibration from {} samples at {}",
            self.config.side,
            samples,
            resolution
        );
        let solved = solver.solve(&object_points, &image_points, resolution);

        if self.apply_pending_cancel() {
            return Ok(None);
        }

        match solved {
            Ok(output) => {
                let result = Arc::new(output.into_result(resolution));
                tracing::info!(
                    "{} camera calibrated, reprojection error {:.4}",
                    self.config.side,
                    result.reprojection_error
                );
                store.set_working_resolution(resolution);
                store.install(self.config.side, Arc::clone(&result));
                self.state = SessionState::Complete;
                self.detector = None;
                Ok(Some(result))
            }
            Err(reason) => {
                tracing::warn!("{} camera calibration failed: {}", self.config.side, reason);
                self.correspondences.clear();
                self.state = SessionState::Idle;
                Err(SessionError::CalibrationFailed {
                    side: self.config.side,
                    samples,
                    reason,
                })
            }
        }
    }

    /// Move to `Cancelled` if a cancel was requested. Returns whether the
    /// session is cancelled.
    fn apply_pending_cancel(&mut self) -> bool {
        if self.state == SessionState::Cancelled {
            return true;
        }
        if self.state == SessionState::Complete || !self.cancelled.load(Ordering::SeqCst) {
            return false;
        }
        tracing::info!(
            "Calibration of {} camera cancelled, discarding {} samples",
            self.config.side,
            self.correspondences.len()
        );
        self.correspondences.clear();
        self.detector = None;
        self.state = SessionState::Cancelled;
        true
    }
}
