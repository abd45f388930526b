//! Lens-corrected frames and the rectified side-by-side composite.

use image::imageops::{self, FilterType};
use image::RgbImage;

use super::frame::{placeholder, Frame, FramePair};
use crate::calibration::{CalibrationResult, CalibrationStore};
use crate::geometry::{Resolution, Side};
use crate::lens::{undistort_cropped, PlumbBob};

/// Integer ratio `numerator / denominator`, rounded up only when the
/// remainder is strictly more than half the denominator. Never below 1.
pub fn scale_factor(numerator: u32, denominator: u32) -> u32 {
    if denominator == 0 {
        return 1;
    }
    let mut factor = numerator / denominator;
    if 2 * (numerator % denominator) as u64 > denominator as u64 {
        factor += 1;
    }
    factor.max(1)
}

/// Length of one axis after integer decimation or magnification towards `target`.
pub fn scaled_length(length: u32, target: u32) -> u32 {
    if length == 0 || target == 0 {
        return length;
    }
    if length >= target {
        let factor = scale_factor(length, target);
        (length as f64 / factor as f64).round() as u32
    } else {
        length * scale_factor(target, length)
    }
}

/// Resize a frame by whole per-axis factors so it lands near `canvas`.
///
/// The result only matches `canvas` exactly when the source is an integer
/// multiple or divisor of it.
pub fn resize_to_canvas(frame: &Frame, canvas: Resolution) -> Frame {
    let width = scaled_length(frame.width(), canvas.width).max(1);
    let height = scaled_length(frame.height(), canvas.height).max(1);
    if (width, height) == frame.dimensions() {
        return frame.clone();
    }
    imageops::resize(frame, width, height, FilterType::Triangle)
}

/// Lens-correct one frame for display at `canvas`.
///
/// Without a frame or a calibration the result is a placeholder of the
/// canvas size. Otherwise the new camera matrix is computed for `canvas`,
/// even when integer resizing left the frame at another size, and the output
/// is cropped to its valid-pixel region, so it may be smaller than the canvas.
pub fn rectify(
    frame: Option<&Frame>,
    calibration: Option<&CalibrationResult>,
    canvas: Resolution,
) -> Frame {
    let (frame, calibration) = match (frame, calibration) {
        (Some(frame), Some(calibration)) => (frame, calibration),
        _ => return placeholder(canvas),
    };

    let resized = resize_to_canvas(frame, canvas);
    let distortion = PlumbBob::from_coefficients(&calibration.distortion);
    let corrected = undistort_cropped(&resized, &calibration.camera_matrix, &distortion, canvas);
    if corrected.width() == 0 || corrected.height() == 0 {
        return placeholder(canvas);
    }
    corrected
}

/// Place two images side by side, padding the narrower one on the right and
/// the shorter one at the bottom with black so both halves match.
pub fn join_unequal_size(left: &RgbImage, right: &RgbImage) -> RgbImage {
    let width = left.width().max(right.width());
    let height = left.height().max(right.height());

    let mut out = RgbImage::new(width * 2, height);
    imageops::replace(&mut out, left, 0, 0);
    imageops::replace(&mut out, right, width as i64, 0);
    out
}

/// Both frames lens-corrected with their stored calibration and joined.
pub fn rectified_side_by_side(
    frames: &FramePair,
    store: &CalibrationStore,
    canvas: Resolution,
) -> RgbImage {
    let [left, right] = Side::BOTH.map(|side| {
        if store.get(side).is_none() {
            tracing::debug!("No {} calibration, showing placeholder", side);
        }
        rectify(
            frames.captured(side),
            store.get(side).map(|c| c.as_ref()),
            canvas,
        )
    });
    join_unequal_size(&left, &right)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::sample_result;
    use crate::lens::optimal_new_camera_matrix;
    use image::Rgb;
    use nalgebra::{Matrix3, Vector5};

    #[test]
    fn test_scale_factor_rounding() {
        assert_eq!(scale_factor(1280, 640), 2);
        assert_eq!(scale_factor(1000, 640), 2);
        assert_eq!(scale_factor(700, 640), 1);
        assert_eq!(scale_factor(100, 640), 1);
        // Exactly half a step does not round up.
        assert_eq!(scale_factor(960, 640), 1);
        assert_eq!(scale_factor(961, 640), 2);
    }

    #[test]
    fn test_scaled_length() {
        assert_eq!(scaled_length(1280, 640), 640);
        assert_eq!(scaled_length(1000, 640), 500);
        assert_eq!(scaled_length(960, 640), 960);
        assert_eq!(scaled_length(320, 640), 640);
        assert_eq!(scaled_length(400, 640), 800);
        assert_eq!(scaled_length(640, 640), 640);
    }

    #[test]
    fn test_rectify_without_calibration_is_placeholder() {
        let canvas = Resolution::new(32, 24);
        let frame = RgbImage::from_pixel(64, 48, Rgb([1, 2, 3]));
        let out = rectify(Some(&frame), None, canvas);
        assert_eq!(out, placeholder(canvas));

        let calibration = sample_result(32, 24);
        assert_eq!(rectify(None, Some(&calibration), canvas), placeholder(canvas));
    }

    #[test]
    fn test_rectify_identity_lens_only_resizes() {
        let canvas = Resolution::new(32, 24);
        let frame = RgbImage::from_pixel(64, 48, Rgb([90, 90, 90]));
        let out = rectify(Some(&frame), Some(&sample_result(32, 24)), canvas);
        assert_eq!(out.dimensions(), (32, 24));
        assert_eq!(*out.get_pixel(16, 12), Rgb([90, 90, 90]));
    }

    #[test]
    fn test_rectify_region_follows_canvas_for_off_canvas_frame() {
        // 960 does not reach the 1.5 threshold, so the frame stays 960x720.
        let canvas = Resolution::new(640, 480);
        let frame = RgbImage::from_pixel(960, 720, Rgb([70, 70, 70]));
        assert_eq!(resize_to_canvas(&frame, canvas).dimensions(), (960, 720));

        let out = rectify(Some(&frame), Some(&sample_result(640, 480)), canvas);
        assert_eq!(out.dimensions(), (640, 480));
        assert_eq!(*out.get_pixel(320, 240), Rgb([70, 70, 70]));
    }

    #[test]
    fn test_join_pads_trailing_edges() {
        let left = RgbImage::from_pixel(4, 2, Rgb([10, 10, 10]));
        let right = RgbImage::from_pixel(3, 5, Rgb([20, 20, 20]));
        let out = join_unequal_size(&left, &right);

        assert_eq!(out.dimensions(), (8, 5));
        assert_eq!(*out.get_pixel(0, 0), Rgb([10, 10, 10]));
        assert_eq!(*out.get_pixel(0, 4), Rgb([0, 0, 0]));
        assert_eq!(*out.get_pixel(4, 0), Rgb([20, 20, 20]));
        assert_eq!(*out.get_pixel(7, 0), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_rectified_side_by_side_with_missing_right_calibration() {
        let canvas = Resolution::new(64, 48);
        let mut left = sample_result(64, 48);
        left.camera_matrix = Matrix3::new(60.0, 0.0, 32.0, 0.0, 60.0, 24.0, 0.0, 0.0, 1.0);
        left.distortion = Vector5::new(-0.3, 0.05, 0.0, 0.0, 0.0);

        let mut store = CalibrationStore::new();
        store.install(Side::Left, left.clone());

        let bright = RgbImage::from_pixel(128, 96, Rgb([200, 200, 200]));
        let frames = FramePair::new(Some(bright.clone()), Some(bright), canvas);
        let out = rectified_side_by_side(&frames, &store, canvas);

        let (_, roi) = optimal_new_camera_matrix(
            &left.camera_matrix,
            &PlumbBob::from_coefficients(&left.distortion),
            canvas,
            1.0,
        );
        assert!(roi.width < 64 && roi.height < 48);

        // Right half is a canvas-sized placeholder; the left is padded to match.
        assert_eq!(out.dimensions(), (128, 48));
        assert_eq!(
            *out.get_pixel(roi.width / 2, roi.height / 2),
            Rgb([200, 200, 200])
        );
        assert_eq!(*out.get_pixel(roi.width, 0), Rgb([0, 0, 0]));
        assert_eq!(*out.get_pixel(roi.width / 2, roi.height), Rgb([0, 0, 0]));
        assert!((64..128).all(|x| *out.get_pixel(x, 10) == Rgb([0, 0, 0])));
    }
}
