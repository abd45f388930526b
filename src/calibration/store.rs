//! Per-side calibration results and the two-slot store that holds them.

use std::sync::Arc;

use nalgebra::{Matrix3, Matrix3x4, Vector5};
use serde::{Deserialize, Serialize};

use super::codec::{CalibrationBlock, StereoCalibrationFile};
use crate::geometry::{Resolution, Side};

/// Where a calibration result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalibrationSource {
    /// Produced by a completed calibration session.
    Solved,
    /// Loaded from a calibration file.
    Imported,
}

/// Complete lens calibration for one camera.
///
/// Values are immutable once built; the store replaces them wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    /// RMS reprojection error reported by the solver (0 for imported files).
    pub reprojection_error: f64,
    /// 3x3 intrinsic matrix.
    pub camera_matrix: Matrix3<f64>,
    /// Plumb-bob coefficients (k1, k2, p1, p2, k3).
    pub distortion: Vector5<f64>,
    /// 3x3 rectification rotation.
    pub rectification: Matrix3<f64>,
    /// 3x4 projection matrix.
    pub projection: Matrix3x4<f64>,
    /// Image resolution the parameters were estimated at.
    pub resolution: Resolution,
    pub source: CalibrationSource,
}

impl CalibrationResult {
    /// Build a result from a parsed calibration file block.
    pub fn from_block(block: &CalibrationBlock) -> Self {
        Self {
            reprojection_error: 0.0,
            camera_matrix: block.camera_matrix,
            distortion: block.distortion,
            rectification: block.rectification,
            projection: block.projection,
            resolution: block.resolution(),
            source: CalibrationSource::Imported,
        }
    }
}

/// Two calibration slots (left, right) plus the working resolution the
/// stored parameters apply to.
///
/// Each slot is replaced as a whole value; readers holding an `Arc` from a
/// previous install keep seeing the old result.
#[derive(Debug, Clone, Default)]
pub struct CalibrationStore {
    slots: [Option<Arc<CalibrationResult>>; 2],
    working_resolution: Option<Resolution>,
}

impl CalibrationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest result for a side.
    pub fn get(&self, side: Side) -> Option<&Arc<CalibrationResult>> {
        self.slots[side.index()].as_ref()
    }

    /// Both results, if present.
    pub fn pair(&self) -> (Option<&Arc<CalibrationResult>>, Option<&Arc<CalibrationResult>>) {
        (self.get(Side::Left), self.get(Side::Right))
    }

    pub fn is_calibrated(&self, side: Side) -> bool {
        self.slots[side.index()].is_some()
    }

    /// Replace the result for a side, returning the previous one.
    pub fn install(
        &mut self,
        side: Side,
        result: impl Into<Arc<CalibrationResult>>,
    ) -> Option<Arc<CalibrationResult>> {
        let result = result.into();
        tracing::info!(
            "Installing {:?} calibration for {} camera at {}",
            result.source,
            side,
            result.resolution
        );
        self.slots[side.index()].replace(result)
    }

    /// Empty a slot.
    pub fn clear(&mut self, side: Side) -> Option<Arc<CalibrationResult>> {
        self.slots[side.index()].take()
    }

    /// Resolution the stored parameters were estimated at, once any
    /// calibration has been solved or imported.
    pub fn working_resolution(&self) -> Option<Resolution> {
        self.working_resolution
    }

    pub fn set_working_resolution(&mut self, resolution: Resolution) {
        self.working_resolution = Some(resolution);
    }

    /// Install a single-camera calibration file block.
    pub fn import_single(&mut self, side: Side, block: &CalibrationBlock) {
        self.set_working_resolution(block.resolution());
        self.install(side, CalibrationResult::from_block(block));
    }

    /// Install whichever sides of a stereo calibration file are complete.
    ///
    /// Returns the number of sides installed. The working resolution becomes
    /// the minimum over the installed sides and is left alone when none was.
    pub fn import_stereo(&mut self, file: &StereoCalibrationFile) -> usize {
        let mut installed = 0;
        for side in Side::BOTH {
            if let Some(block) = file.block(side) {
                self.install(side, CalibrationResult::from_block(block));
                installed += 1;
            } else {
                tracing::warn!("Stereo calibration file has no complete {} block", side);
            }
        }
        if let Some(resolution) = file.resolution {
            self.set_working_resolution(resolution);
        }
        installed
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_result(width: u32, height: u32) -> CalibrationResult {
        let camera_matrix = Matrix3::new(
            500.0,
            0.0,
            (width as f64 - 1.0) / 2.0,
            0.0,
            500.0,
            (height as f64 - 1.0) / 2.0,
            0.0,
            0.0,
            1.0,
        );
        let mut projection = Matrix3x4::zeros();
        projection
            .fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&camera_matrix);
        CalibrationResult {
            reprojection_error: 0.25,
            camera_matrix,
            distortion: Vector5::zeros(),
            rectification: Matrix3::identity(),
            projection,
            resolution: Resolution::new(width, height),
            source: CalibrationSource::Solved,
        }
    }

    #[test]
    fn test_install_replaces_whole_value() {
        let mut store = CalibrationStore::new();
        assert!(store.install(Side::Left, sample_result(640, 480)).is_none());
        let reader = store.get(Side::Left).cloned().unwrap();

        let previous = store.install(Side::Left, sample_result(320, 240)).unwrap();
        assert_eq!(previous.resolution, Resolution::new(640, 480));
        // Readers keep the value they already hold.
        assert_eq!(reader.resolution, Resolution::new(640, 480));
        assert_eq!(
            store.get(Side::Left).unwrap().resolution,
            Resolution::new(320, 240)
        );
        assert!(!store.is_calibrated(Side::Right));
    }

    #[test]
    fn test_clear_slot() {
        let mut store = CalibrationStore::new();
        store.install(Side::Right, sample_result(640, 480));
        assert!(store.clear(Side::Right).is_some());
        assert!(store.get(Side::Right).is_none());
    }

    const BLOCK: &str = "width 640 height 480 camera matrix 500 0 320 0 500 240 0 0 1 \
        distortion 0 0 0 0 0 rectification 1 0 0 0 1 0 0 0 1 \
        projection 500 0 320 0 0 500 240 0 0 0 1 0";

    #[test]
    fn test_import_stereo_ignores_incomplete_block_dimensions() {
        let text = format!("{} width 320 height 240 distortion 0 0 0 0 0", BLOCK);
        let file = crate::calibration::codec::parse_stereo(&text).unwrap();

        let mut store = CalibrationStore::new();
        assert_eq!(store.import_stereo(&file), 1);
        assert!(store.is_calibrated(Side::Left));
        assert!(!store.is_calibrated(Side::Right));
        assert_eq!(store.working_resolution(), Some(Resolution::new(640, 480)));
        assert_eq!(
            store.get(Side::Left).unwrap().source,
            CalibrationSource::Imported
        );
    }

    #[test]
    fn test_import_stereo_without_blocks_keeps_working_resolution() {
        let mut store = CalibrationStore::new();
        store.set_working_resolution(Resolution::new(1280, 720));
        let file = crate::calibration::codec::parse_stereo("width 320 height 240").unwrap();

        assert_eq!(store.import_stereo(&file), 0);
        assert_eq!(store.working_resolution(), Some(Resolution::new(1280, 720)));
    }
}
