//! Plumb-bob (Brown-Conrady) lens distortion on normalized image coordinates.

use nalgebra::{Matrix3, Point2, Vector2, Vector5};
use serde::{Deserialize, Serialize};

/// Fixed-point iterations used to invert the distortion.
const UNDISTORT_ITERATIONS: usize = 5;

/// Radial (`k1`, `k2`, `k3`) and tangential (`p1`, `p2`) distortion
/// coefficients, stored in file order `(k1, k2, p1, p2, k3)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PlumbBob {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl PlumbBob {
    pub fn from_coefficients(coefficients: &Vector5<f64>) -> Self {
        Self {
            k1: coefficients[0],
            k2: coefficients[1],
            p1: coefficients[2],
            p2: coefficients[3],
            k3: coefficients[4],
        }
    }

    pub fn coefficients(&self) -> Vector5<f64> {
        Vector5::new(self.k1, self.k2, self.p1, self.p2, self.k3)
    }

    pub fn is_identity(&self) -> bool {
        self.coefficients().iter().all(|c| *c == 0.0)
    }

    /// Apply distortion to an ideal normalized point.
    pub fn distort(&self, point: Vector2<f64>) -> Vector2<f64> {
        let (x, y) = (point.x, point.y);
        let r2 = x * x + y * y;
        let radial = 1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));
        let x_tan = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let y_tan = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        Vector2::new(x * radial + x_tan, y * radial + y_tan)
    }

    /// Recover the ideal normalized point from a distorted one.
    ///
    /// Falls back to the distorted point when the radial term turns negative.
    pub fn undistort(&self, distorted: Vector2<f64>) -> Vector2<f64> {
        let mut x = distorted.x;
        let mut y = distorted.y;
        for _ in 0..UNDISTORT_ITERATIONS {
            let r2 = x * x + y * y;
            let inverse_radial = 1.0 / (1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3)));
            if inverse_radial < 0.0 {
                return distorted;
            }
            let dx = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
            let dy = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
            x = (distorted.x - dx) * inverse_radial;
            y = (distorted.y - dy) * inverse_radial;
        }
        Vector2::new(x, y)
    }
}

/// Pixel to normalized coordinates under intrinsics `k`.
pub fn normalize(k: &Matrix3<f64>, pixel: Point2<f64>) -> Vector2<f64> {
    let y = (pixel.y - k[(1, 2)]) / k[(1, 1)];
    let x = (pixel.x - k[(0, 2)] - k[(0, 1)] * y) / k[(0, 0)];
    Vector2::new(x, y)
}

/// Normalized to pixel coordinates under intrinsics `k`.
pub fn project(k: &Matrix3<f64>, point: Vector2<f64>) -> Point2<f64> {
    Point2::new(
        k[(0, 0)] * point.x + k[(0, 1)] * point.y + k[(0, 2)],
        k[(1, 1)] * point.y + k[(1, 2)],
    )
}

/// Undistort pixel positions, optionally re-projecting through `new_k`;
/// without it the result stays in normalized coordinates.
pub fn undistort_points(
    points: &[Point2<f64>],
    k: &Matrix3<f64>,
    distortion: &PlumbBob,
    new_k: Option<&Matrix3<f64>>,
) -> Vec<Point2<f64>> {
    points
        .iter()
        .map(|&pixel| {
            let ideal = distortion.undistort(normalize(k, pixel));
            match new_k {
                Some(new_k) => project(new_k, ideal),
                None => Point2::new(ideal.x, ideal.y),
            }
        })
        .collect()
}
