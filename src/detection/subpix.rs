//! Iterative sub-pixel refinement of chessboard corners.
//!
//! Each corner is moved to the point where the image gradients inside a
//! window around it are orthogonal to the vectors pointing at it, which is
//! the saddle point of a chessboard crossing.

use image::GrayImage;
use nalgebra::Point2;

/// Stop rule for the refinement iterations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubPixCriteria {
    /// Half side of the search window in pixels (window is `2 * half + 1`).
    pub half_window: u32,
    /// Maximum number of iterations per corner.
    pub max_iterations: u32,
    /// Stop once a corner moves less than this many pixels.
    pub epsilon: f64,
}

impl Default for SubPixCriteria {
    fn default() -> Self {
        Self {
            half_window: 11,
            max_iterations: 30,
            epsilon: 0.001,
        }
    }
}

/// Refine every corner; corners that wander outside their window are kept
/// at their initial position.
pub fn refine_corners(
    image: &GrayImage,
    corners: &[Point2<f64>],
    criteria: SubPixCriteria,
) -> Vec<Point2<f64>> {
    let half = criteria.half_window.max(1) as i32;
    let mask = gaussian_mask(half);
    corners
        .iter()
        .map(|&corner| refine_corner(image, corner, half, &mask, criteria))
        .collect()
}

fn refine_corner(
    image: &GrayImage,
    initial: Point2<f64>,
    half: i32,
    mask: &[f64],
    criteria: SubPixCriteria,
) -> Point2<f64> {
    let side = (2 * half + 1) as usize;
    let eps_sq = criteria.epsilon * criteria.epsilon;
    let (width, height) = (image.width() as f64, image.height() as f64);
    let mut current = initial;

    for _ in 0..criteria.max_iterations.max(1) {
        // Patch with a one-pixel border for central differences.
        let patch = sample_patch(image, current, side + 2);
        let stride = side + 2;

        let (mut a, mut b, mut c, mut bb1, mut bb2) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for i in 0..side {
            let py = i as f64 - half as f64;
            for j in 0..side {
                let px = j as f64 - half as f64;
                let m = mask[i * side + j];
                let gx = patch[(i + 1) * stride + j + 2] - patch[(i + 1) * stride + j];
                let gy = patch[(i + 2) * stride + j + 1] - patch[i * stride + j + 1];
                let gxx = gx * gx * m;
                let gxy = gx * gy * m;
                let gyy = gy * gy * m;

                a += gxx;
                b += gxy;
                c += gyy;
                bb1 += gxx * px + gxy * py;
                bb2 += gxy * px + gyy * py;
            }
        }

        let det = a * c - b * b;
        if det.abs() <= eps_sq {
            break;
        }
        let scale = 1.0 / det;
        let next = Point2::new(
            current.x + c * scale * bb1 - b * scale * bb2,
            current.y - b * scale * bb1 + a * scale * bb2,
        );
        let moved = (next - current).norm_squared();
        current = next;

        if current.x < 0.0 || current.x >= width || current.y < 0.0 || current.y >= height {
            break;
        }
        if moved <= eps_sq {
            break;
        }
    }

    if (current.x - initial.x).abs() > half as f64 || (current.y - initial.y).abs() > half as f64 {
        initial
    } else {
        current
    }
}

/// Separable Gaussian weights over the window, `exp(-(u^2 + v^2))` with
/// `u, v` normalised to [-1, 1].
fn gaussian_mask(half: i32) -> Vec<f64> {
    let side = (2 * half + 1) as usize;
    let weights: Vec<f64> = (-half..=half)
        .map(|i| {
            let u = i as f64 / half as f64;
            (-u * u).exp()
        })
        .collect();
    let mut mask = Vec::with_capacity(side * side);
    for wy in &weights {
        for wx in &weights {
            mask.push(wy * wx);
        }
    }
    mask
}

/// Bilinearly sampled `size x size` patch centred on `center`, borders replicated.
fn sample_patch(image: &GrayImage, center: Point2<f64>, size: usize) -> Vec<f64> {
    let origin_x = center.x - (size as f64 - 1.0) / 2.0;
    let origin_y = center.y - (size as f64 - 1.0) / 2.0;
    let mut patch = Vec::with_capacity(size * size);
    for i in 0..size {
        for j in 0..size {
            patch.push(sample_bilinear(image, origin_x + j as f64, origin_y + i as f64));
        }
    }
    patch
}

fn sample_bilinear(image: &GrayImage, x: f64, y: f64) -> f64 {
    let max_x = image.width().saturating_sub(1) as f64;
    let max_y = image.height().saturating_sub(1) as f64;
    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);

    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let x1 = (x0 + 1.0).min(max_x);
    let y1 = (y0 + 1.0).min(max_y);

    let at = |px: f64, py: f64| image.get_pixel(px as u32, py as u32)[0] as f64;
    let top = at(x0, y0) * (1.0 - fx) + at(x1, y0) * fx;
    let bottom = at(x0, y1) * (1.0 - fx) + at(x1, y1) * fx;
    top * (1.0 - fy) + bottom * fy
}
