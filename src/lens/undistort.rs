//! Whole-image lens correction: optimal new intrinsics, valid-pixel region
//! and inverse-mapped undistortion.

use image::{Rgb, RgbImage};
use nalgebra::{Matrix3, Point2};

use super::distortion::{normalize, project, undistort_points, PlumbBob};
use crate::geometry::Resolution;

/// Samples per axis used to trace the undistorted image border.
const BORDER_GRID: u32 = 9;

/// Valid-pixel rectangle in an undistorted image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Roi {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Roi {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Clip to an image of the given size.
    pub fn clip(&self, size: Resolution) -> Roi {
        let x = self.x.min(size.width);
        let y = self.y.min(size.height);
        Roi {
            x,
            y,
            width: self.width.min(size.width - x),
            height: self.height.min(size.height - y),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Rect {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

/// Inscribed and circumscribed rectangles of the undistorted image border.
fn border_rectangles(
    k: &Matrix3<f64>,
    distortion: &PlumbBob,
    new_k: Option<&Matrix3<f64>>,
    size: Resolution,
) -> (Rect, Rect) {
    let n = BORDER_GRID;
    let grid: Vec<Point2<f64>> = (0..n)
        .flat_map(|y| {
            (0..n).map(move |x| {
                Point2::new(
                    x as f64 * size.width as f64 / (n - 1) as f64,
                    y as f64 * size.height as f64 / (n - 1) as f64,
                )
            })
        })
        .collect();
    let points = undistort_points(&grid, k, distortion, new_k);

    let (mut ix0, mut ix1, mut iy0, mut iy1) =
        (f64::MIN, f64::MAX, f64::MIN, f64::MAX);
    let (mut ox0, mut ox1, mut oy0, mut oy1) =
        (f64::MAX, f64::MIN, f64::MAX, f64::MIN);
    for (index, p) in points.iter().enumerate() {
        let (gx, gy) = (index as u32 % n, index as u32 / n);
        ox0 = ox0.min(p.x);
        ox1 = ox1.max(p.x);
        oy0 = oy0.min(p.y);
        oy1 = oy1.max(p.y);
        if gx == 0 {
            ix0 = ix0.max(p.x);
        }
        if gx == n - 1 {
            ix1 = ix1.min(p.x);
        }
        if gy == 0 {
            iy0 = iy0.max(p.y);
        }
        if gy == n - 1 {
            iy1 = iy1.min(p.y);
        }
    }

    (
        Rect { x: ix0, y: iy0, width: ix1 - ix0, height: iy1 - iy0 },
        Rect { x: ox0, y: oy0, width: ox1 - ox0, height: oy1 - oy0 },
    )
}

/// Intrinsics for the undistorted image plus the region holding only valid
/// pixels.
///
/// `alpha = 0` keeps only valid pixels in view; `alpha = 1` keeps every
/// source pixel in view, leaving black corners that the ROI excludes.
pub fn optimal_new_camera_matrix(
    k: &Matrix3<f64>,
    distortion: &PlumbBob,
    size: Resolution,
    alpha: f64,
) -> (Matrix3<f64>, Roi) {
    let alpha = alpha.clamp(0.0, 1.0);
    let (inner, outer) = border_rectangles(k, distortion, None, size);
    let (w, h) = (size.width as f64, size.height as f64);

    let fx0 = w / inner.width;
    let fy0 = h / inner.height;
    let cx0 = -fx0 * inner.x;
    let cy0 = -fy0 * inner.y;

    let fx1 = w / outer.width;
    let fy1 = h / outer.height;
    let cx1 = -fx1 * outer.x;
    let cy1 = -fy1 * outer.y;

    let mix = |a: f64, b: f64| a * (1.0 - alpha) + b * alpha;
    let new_k = Matrix3::new(
        mix(fx0, fx1),
        0.0,
        mix(cx0, cx1),
        0.0,
        mix(fy0, fy1),
        mix(cy0, cy1),
        0.0,
        0.0,
        1.0,
    );

    let (valid, _) = border_rectangles(k, distortion, Some(&new_k), size);
    let x0 = valid.x.round().max(0.0);
    let y0 = valid.y.round().max(0.0);
    let x1 = (valid.x.round() + valid.width.round()).min(w);
    let y1 = (valid.y.round() + valid.height.round()).min(h);
    let roi = if x1 > x0 && y1 > y0 {
        Roi {
            x: x0 as u32,
            y: y0 as u32,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
        }
    } else {
        Roi::default()
    };

    (new_k, roi)
}

/// Remove lens distortion, rendering through `new_k` at the input size.
///
/// Each output pixel is traced back through the distortion model into the
/// source image and sampled bilinearly; rays landing outside are black.
pub fn undistort_image(
    image: &RgbImage,
    k: &Matrix3<f64>,
    distortion: &PlumbBob,
    new_k: &Matrix3<f64>,
) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |u, v| {
        let ideal = normalize(new_k, Point2::new(u as f64, v as f64));
        let source = project(k, distortion.distort(ideal));
        sample_bilinear(image, source.x, source.y)
    })
}

/// Undistort with `alpha = 1` and crop to the valid-pixel region.
///
/// The new camera matrix and its region are computed for `size`, the
/// resolution the calibration applies to; the image is rendered at its own
/// size and the region is clipped to it.
pub fn undistort_cropped(
    image: &RgbImage,
    k: &Matrix3<f64>,
    distortion: &PlumbBob,
    size: Resolution,
) -> RgbImage {
    let (new_k, roi) = optimal_new_camera_matrix(k, distortion, size, 1.0);
    let undistorted = undistort_image(image, k, distortion, &new_k);

    let roi = roi.clip(Resolution::new(image.width(), image.height()));
    if roi.is_empty() {
        tracing::warn!("Undistorted image has no valid region, returning it uncropped");
        return undistorted;
    }
    image::imageops::crop_imm(&undistorted, roi.x, roi.y, roi.width, roi.height).to_image()
}

fn sample_bilinear(image: &RgbImage, x: f64, y: f64) -> Rgb<u8> {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);

    let fetch = |px: i64, py: i64| -> [f64; 3] {
        if px < 0 || py < 0 || px >= image.width() as i64 || py >= image.height() as i64 {
            return [0.0; 3];
        }
        let p = image.get_pixel(px as u32, py as u32);
        [p[0] as f64, p[1] as f64, p[2] as f64]
    };

    let weights = [
        ((1.0 - fx) * (1.0 - fy), fetch(x0, y0)),
        (fx * (1.0 - fy), fetch(x0 + 1, y0)),
        ((1.0 - fx) * fy, fetch(x0, y0 + 1)),
        (fx * fy, fetch(x0 + 1, y0 + 1)),
    ];
    let mut out = [0u8; 3];
    for (channel, value) in out.iter_mut().enumerate() {
        let sum: f64 = weights.iter().map(|(w, p)| w * p[channel]).sum();
        *value = sum.round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}
