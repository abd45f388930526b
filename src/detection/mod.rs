//! Chessboard corner detection for calibration sessions.

mod detector;
mod overlay;
mod subpix;

pub use detector::{
    ChessboardFinder, CornerDetector, Detection, DetectorConfig, Miss, DEFAULT_DETECTION_TOLERANCE,
    DEFAULT_FPS,
};
pub use overlay::draw_corners;
pub use subpix::{refine_corners, SubPixCriteria};

#[cfg(test)]
pub(crate) use detector::tests::GridFinder;
