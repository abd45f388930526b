//! Lens calibration: per-side results, the calibration file codec and the
//! interactive calibration session.

pub mod codec;
mod session;
mod solver;
mod store;

pub use codec::{CalibrationBlock, CodecError, Field, StereoCalibrationFile};
pub use session::{
    CalibrationSession, CancelHandle, FrameOutcome, ProgressCallback, SessionConfig, SessionError,
    SessionState, DEFAULT_SAMPLE_THRESHOLD,
};
pub use solver::{CalibrationSolver, SolveError, SolveOutput};
pub use store::{CalibrationResult, CalibrationSource, CalibrationStore};

#[cfg(test)]
pub(crate) use store::tests::sample_result;
