//! The camera calibration solve capability consumed by calibration sessions.
//!
//! The numerical solve itself lives outside this crate; implementors wrap
//! whatever library or service performs it.

use nalgebra::{Matrix3, Matrix3x4, Point2, Point3, Vector3, Vector5};
use thiserror::Error;

use super::store::{CalibrationResult, CalibrationSource};
use crate::geometry::Resolution;

/// Solve errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolveError {
    /// The correspondences do not constrain a calibration (collinear views,
    /// too few points, diverging optimisation, ...).
    #[error("Degenerate calibration input: {0}")]
    DegenerateInput(String),
}

/// Raw output of a calibration solve.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveOutput {
    pub reprojection_error: f64,
    pub camera_matrix: Matrix3<f64>,
    pub distortion: Vector5<f64>,
    /// Per-view rotation vectors (Rodrigues).
    pub rotations: Vec<Vector3<f64>>,
    /// Per-view translations.
    pub translations: Vec<Vector3<f64>>,
}

impl SolveOutput {
    /// Convert into a stored calibration for a single, unrectified camera:
    /// rectification is the identity and projection is `[K | 0]`.
    pub fn into_result(self, resolution: Resolution) -> CalibrationResult {
        let mut projection = Matrix3x4::zeros();
        projection
            .fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&self.camera_matrix);

        CalibrationResult {
            reprojection_error: self.reprojection_error,
            camera_matrix: self.camera_matrix,
            distortion: self.distortion,
            rectification: Matrix3::identity(),
            projection,
            resolution,
            source: CalibrationSource::Solved,
        }
    }
}

/// Estimates intrinsics and distortion from planar target observations.
pub trait CalibrationSolver {
    fn solve(
        &self,
        object_points: &[Vec<Point3<f64>>],
        image_points: &[Vec<Point2<f64>>],
        image_size: Resolution,
    ) -> Result<SolveOutput, SolveError>;
}

impl<F> CalibrationSolver for F
where
    F: Fn(&[Vec<Point3<f64>>], &[Vec<Point2<f64>>], Resolution) -> Result<SolveOutput, SolveError>,
{
    fn solve(
        &self,
        object_points: &[Vec<Point3<f64>>],
        image_points: &[Vec<Point2<f64>>],
        image_size: Resolution,
    ) -> Result<SolveOutput, SolveError> {
        self(object_points, image_points, image_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_result_builds_projection_from_intrinsics() {
        let camera_matrix = Matrix3::new(600.0, 0.0, 320.0, 0.0, 610.0, 240.0, 0.0, 0.0, 1.0);
        let output = SolveOutput {
            reprojection_error: 0.4,
            camera_matrix,
            distortion: Vector5::new(-0.2, 0.05, 0.0, 0.0, 0.0),
            rotations: Vec::new(),
            translations: Vec::new(),
        };

        let result = output.into_result(Resolution::new(640, 480));
        assert_eq!(result.rectification, Matrix3::identity());
        assert_eq!(result.projection[(0, 0)], 600.0);
        assert_eq!(result.projection[(1, 2)], 240.0);
        assert_eq!(result.projection[(0, 3)], 0.0);
        assert_eq!(result.source, CalibrationSource::Solved);
        assert_eq!(result.resolution, Resolution::new(640, 480));
    }
}
