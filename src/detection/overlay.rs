//! Corner overlay for calibration feedback frames.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_circle_mut, draw_line_segment_mut};
use nalgebra::Point2;

use crate::geometry::CalibrationPattern;

const ROW_COLOURS: [Rgb<u8>; 6] = [
    Rgb([255, 0, 0]),
    Rgb([255, 128, 0]),
    Rgb([200, 200, 0]),
    Rgb([0, 255, 0]),
    Rgb([0, 128, 255]),
    Rgb([128, 0, 255]),
];

const CORNER_RADIUS: i32 = 4;

/// Draw detected corners onto a frame, one colour per pattern row, joined in
/// detection order. Corner lists that do not match the pattern are ignored.
pub fn draw_corners(frame: &mut RgbImage, pattern: CalibrationPattern, corners: &[Point2<f64>]) {
    if corners.len() != pattern.corner_count() || corners.is_empty() {
        return;
    }

    let cols = pattern.cols as usize;
    let mut previous: Option<(f32, f32)> = None;
    for (index, corner) in corners.iter().enumerate() {
        let colour = ROW_COLOURS[(index / cols) % ROW_COLOURS.len()];
        let point = (corner.x as f32, corner.y as f32);

        draw_hollow_circle_mut(
            frame,
            (corner.x.round() as i32, corner.y.round() as i32),
            CORNER_RADIUS,
            colour,
        );
        if let Some(from) = previous {
            draw_line_segment_mut(frame, from, point, colour);
        }
        previous = Some(point);
    }
}
