//! Planar calibration targets and the point correspondences collected from them.

use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

/// Grid geometry of a chessboard target, counted in inner corners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationPattern {
    /// Inner corners per row.
    pub cols: u32,
    /// Inner corners per column.
    pub rows: u32,
}

impl Default for CalibrationPattern {
    fn default() -> Self {
        Self { cols: 9, rows: 6 }
    }
}

impl CalibrationPattern {
    pub fn new(cols: u32, rows: u32) -> Self {
        Self { cols, rows }
    }

    /// Number of inner corners on the target.
    pub fn corner_count(&self) -> usize {
        (self.cols * self.rows) as usize
    }

    /// Canonical object points on the z = 0 plane, one unit per square,
    /// ordered row-major: (0,0,0), (1,0,0), ..., (cols-1, rows-1, 0).
    pub fn object_points(&self) -> Vec<Point3<f64>> {
        (0..self.rows)
            .flat_map(|row| (0..self.cols).map(move |col| Point3::new(col as f64, row as f64, 0.0)))
            .collect()
    }
}

/// Object points of the pattern paired with one frame's refined image points.
#[derive(Debug, Clone, PartialEq)]
pub struct Correspondence {
    pub object_points: Vec<Point3<f64>>,
    pub image_points: Vec<Point2<f64>>,
}

impl Correspondence {
    pub fn new(object_points: Vec<Point3<f64>>, image_points: Vec<Point2<f64>>) -> Self {
        Self {
            object_points,
            image_points,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_points_row_major() {
        let pattern = CalibrationPattern::new(3, 2);
        let points = pattern.object_points();
        assert_eq!(points.len(), 6);
        assert_eq!(points[0], Point3::new(0.0, 0.0, 0.0));
        assert_eq!(points[2], Point3::new(2.0, 0.0, 0.0));
        assert_eq!(points[3], Point3::new(0.0, 1.0, 0.0));
        assert!(points.iter().all(|p| p.z == 0.0));
    }

    #[test]
    fn test_default_pattern() {
        let pattern = CalibrationPattern::default();
        assert_eq!(pattern.corner_count(), 54);
    }
}
