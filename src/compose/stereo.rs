//! Side-by-side and red/cyan anaglyph composites.

use std::borrow::Cow;

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

use super::frame::{Frame, FramePair};
use super::CompositeError;
use crate::geometry::Resolution;

/// Bring a frame to the canvas size; frames already at that size are borrowed.
pub(crate) fn fit_to_canvas(frame: &Frame, canvas: Resolution) -> Cow<'_, Frame> {
    if frame.dimensions() == (canvas.width, canvas.height) {
        Cow::Borrowed(frame)
    } else {
        tracing::debug!(
            "Scaling {}x{} frame to {} canvas",
            frame.width(),
            frame.height(),
            canvas
        );
        Cow::Owned(imageops::resize(frame, canvas.width, canvas.height, FilterType::Triangle))
    }
}

/// Left and right frames next to each other on a `2w x h` image.
pub fn side_by_side(frames: &FramePair, canvas: Resolution) -> Result<RgbImage, CompositeError> {
    if !canvas.is_established() {
        return Err(CompositeError::CanvasNotEstablished);
    }
    let left = fit_to_canvas(frames.left(), canvas);
    let right = fit_to_canvas(frames.right(), canvas);

    let mut out = RgbImage::new(canvas.width * 2, canvas.height);
    imageops::replace(&mut out, &*left, 0, 0);
    imageops::replace(&mut out, &*right, canvas.width as i64, 0);
    Ok(out)
}

/// Red/cyan anaglyph: the left frame's red channel at x = 0 and the right
/// frame's green and blue channels shifted right by `offset` pixels.
///
/// The output is `canvas.width + offset` wide; `offset` is clamped to the
/// canvas width. Pixels neither frame covers stay black.
pub fn anaglyph(
    frames: &FramePair,
    canvas: Resolution,
    offset: u32,
) -> Result<RgbImage, CompositeError> {
    if !canvas.is_established() {
        return Err(CompositeError::CanvasNotEstablished);
    }
    let offset = offset.min(canvas.width);
    let left = fit_to_canvas(frames.left(), canvas);
    let right = fit_to_canvas(frames.right(), canvas);

    let mut out = RgbImage::new(canvas.width + offset, canvas.height);
    for (x, y, pixel) in left.enumerate_pixels() {
        out.put_pixel(x, y, Rgb([pixel[0], 0, 0]));
    }
    for (x, y, pixel) in right.enumerate_pixels() {
        let target = out.get_pixel_mut(x + offset, y);
        target[1] = pixel[1];
        target[2] = pixel[2];
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Side;

    fn pair(size: Resolution) -> FramePair {
        let left = RgbImage::from_pixel(size.width, size.height, Rgb([200, 10, 20]));
        let right = RgbImage::from_pixel(size.width, size.height, Rgb([30, 150, 250]));
        FramePair::new(Some(left), Some(right), size)
    }

    #[test]
    fn test_side_by_side_layout() {
        let canvas = Resolution::new(4, 3);
        let out = side_by_side(&pair(canvas), canvas).unwrap();
        assert_eq!(out.dimensions(), (8, 3));
        assert_eq!(*out.get_pixel(3, 2), Rgb([200, 10, 20]));
        assert_eq!(*out.get_pixel(4, 0), Rgb([30, 150, 250]));
    }

    #[test]
    fn test_side_by_side_scales_and_substitutes() {
        let canvas = Resolution::new(4, 3);
        let big = RgbImage::from_pixel(8, 6, Rgb([50, 50, 50]));
        let frames = FramePair::new(Some(big), None, canvas);
        let out = side_by_side(&frames, canvas).unwrap();

        assert_eq!(out.dimensions(), (8, 3));
        assert_eq!(*out.get_pixel(1, 1), Rgb([50, 50, 50]));
        assert!(!frames.is_present(Side::Right));
        assert_eq!(*out.get_pixel(6, 1), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_side_by_side_requires_canvas() {
        let frames = pair(Resolution::new(4, 3));
        assert_eq!(
            side_by_side(&frames, Resolution::default()),
            Err(CompositeError::CanvasNotEstablished)
        );
    }

    #[test]
    fn test_anaglyph_without_offset_overlaps_fully() {
        let canvas = Resolution::new(6, 2);
        let out = anaglyph(&pair(canvas), canvas, 0).unwrap();
        assert_eq!(out.dimensions(), (6, 2));
        assert_eq!(*out.get_pixel(0, 0), Rgb([200, 150, 250]));
    }

    #[test]
    fn test_anaglyph_full_offset_doubles_width() {
        let canvas = Resolution::new(6, 2);
        let out = anaglyph(&pair(canvas), canvas, 6).unwrap();
        assert_eq!(out.dimensions(), (12, 2));
        assert_eq!(*out.get_pixel(5, 1), Rgb([200, 0, 0]));
        assert_eq!(*out.get_pixel(6, 1), Rgb([0, 150, 250]));
    }

    #[test]
    fn test_anaglyph_offset_is_clamped_and_gap_is_black() {
        let canvas = Resolution::new(6, 2);
        let out = anaglyph(&pair(canvas), canvas, 100).unwrap();
        assert_eq!(out.width(), 12);

        let shifted = anaglyph(&pair(canvas), canvas, 2).unwrap();
        assert_eq!(shifted.width(), 8);
        assert_eq!(*shifted.get_pixel(1, 0), Rgb([200, 0, 0]));
        assert_eq!(*shifted.get_pixel(3, 0), Rgb([200, 150, 250]));
        assert_eq!(*shifted.get_pixel(7, 0), Rgb([0, 150, 250]));
    }
}
