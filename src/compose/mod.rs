//! Stereo composites: side-by-side, anaglyph and lens-corrected views.

mod frame;
mod rectify;
mod stereo;

pub use frame::{placeholder, Frame, FramePair, PLACEHOLDER_COLOUR};
pub use rectify::{
    join_unequal_size, rectified_side_by_side, rectify, resize_to_canvas, scale_factor,
    scaled_length,
};
pub use stereo::{anaglyph, side_by_side};

use std::str::FromStr;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calibration::CalibrationStore;
use crate::geometry::Resolution;

/// Compositing errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompositeError {
    #[error("Canvas resolution has not been established")]
    CanvasNotEstablished,
    #[error("Unknown display mode: {0}")]
    UnknownMode(String),
}

/// Inputs shared by every display mode.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    /// Live canvas resolution.
    pub canvas: Resolution,
    pub store: &'a CalibrationStore,
}

impl<'a> RenderContext<'a> {
    pub fn new(canvas: Resolution, store: &'a CalibrationStore) -> Self {
        Self { canvas, store }
    }

    /// Resolution lens correction works at: the calibration's working
    /// resolution, or the live canvas before any calibration exists.
    pub fn calibration_canvas(&self) -> Resolution {
        self.store.working_resolution().unwrap_or(self.canvas)
    }
}

/// How a frame pair is shown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum DisplayMode {
    #[default]
    SideBySide,
    /// Red/cyan overlay with the right frame shifted by `offset` pixels.
    Anaglyph { offset: u32 },
    /// Each side undistorted with its stored calibration.
    Rectified,
}

impl DisplayMode {
    pub fn render(
        &self,
        frames: &FramePair,
        context: &RenderContext<'_>,
    ) -> Result<RgbImage, CompositeError> {
        match *self {
            DisplayMode::SideBySide => side_by_side(frames, context.canvas),
            DisplayMode::Anaglyph { offset } => anaglyph(frames, context.canvas, offset),
            DisplayMode::Rectified => {
                let canvas = context.calibration_canvas();
                if !canvas.is_established() {
                    return Err(CompositeError::CanvasNotEstablished);
                }
                Ok(rectified_side_by_side(frames, context.store, canvas))
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayMode::SideBySide => "side-by-side",
            DisplayMode::Anaglyph { .. } => "anaglyph",
            DisplayMode::Rectified => "rectified",
        }
    }
}

impl std::fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DisplayMode {
    type Err = CompositeError;

    /// Parses a mode name; anaglyph starts without offset.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "side-by-side" | "sbs" => Ok(DisplayMode::SideBySide),
            "anaglyph" | "red-green" => Ok(DisplayMode::Anaglyph { offset: 0 }),
            "rectified" | "corrected" => Ok(DisplayMode::Rectified),
            other => Err(CompositeError::UnknownMode(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{sample_result, CalibrationBlock};
    use crate::geometry::Side;
    use image::Rgb;

    #[test]
    fn test_parse_modes() {
        assert_eq!("Anaglyph".parse::<DisplayMode>(), Ok(DisplayMode::Anaglyph { offset: 0 }));
        assert_eq!("sbs".parse::<DisplayMode>(), Ok(DisplayMode::SideBySide));
        assert!(matches!(
            "stereo".parse::<DisplayMode>(),
            Err(CompositeError::UnknownMode(_))
        ));
    }

    #[test]
    fn test_render_each_mode() {
        let canvas = Resolution::new(8, 6);
        let mut store = CalibrationStore::new();
        let frame = RgbImage::from_pixel(8, 6, Rgb([40, 80, 120]));
        let frames = FramePair::new(Some(frame.clone()), Some(frame), canvas);
        let context = RenderContext::new(canvas, &store);

        let sbs = DisplayMode::SideBySide.render(&frames, &context).unwrap();
        assert_eq!(sbs.dimensions(), (16, 6));
        let red_cyan = DisplayMode::Anaglyph { offset: 3 }.render(&frames, &context).unwrap();
        assert_eq!(red_cyan.dimensions(), (11, 6));
        let rectified = DisplayMode::Rectified.render(&frames, &context).unwrap();
        assert!(rectified.pixels().all(|p| *p == PLACEHOLDER_COLOUR));

        let lens = sample_result(8, 6);
        store.import_single(
            Side::Left,
            &CalibrationBlock {
                width: 8,
                height: 6,
                camera_matrix: lens.camera_matrix,
                distortion: lens.distortion,
                rectification: lens.rectification,
                projection: lens.projection,
            },
        );
        let context = RenderContext::new(canvas, &store);
        let rectified = DisplayMode::Rectified.render(&frames, &context).unwrap();
        assert_eq!(rectified.dimensions(), (16, 6));
        assert_eq!(*rectified.get_pixel(4, 3), Rgb([40, 80, 120]));
    }

    #[test]
    fn test_render_without_canvas_fails() {
        let store = CalibrationStore::new();
        let frames = FramePair::new(None, None, Resolution::default());
        let context = RenderContext::new(Resolution::default(), &store);
        for mode in [
            DisplayMode::SideBySide,
            DisplayMode::Anaglyph { offset: 2 },
            DisplayMode::Rectified,
        ] {
            assert_eq!(
                mode.render(&frames, &context),
                Err(CompositeError::CanvasNotEstablished)
            );
        }
    }
}
