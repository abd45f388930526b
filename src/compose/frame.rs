//! Frames and stereo frame pairs with placeholder substitution.

use image::{Rgb, RgbImage};

use crate::geometry::{Resolution, Side};

/// One camera frame, 8-bit RGB.
pub type Frame = RgbImage;

/// Colour of the stand-in for a missing frame.
pub const PLACEHOLDER_COLOUR: Rgb<u8> = Rgb([0, 0, 0]);

/// Solid stand-in for a frame that could not be captured.
pub fn placeholder(size: Resolution) -> Frame {
    RgbImage::from_pixel(size.width, size.height, PLACEHOLDER_COLOUR)
}

/// Two frames captured in the same tick.
///
/// A side that produced no frame holds a placeholder of the canvas size, so
/// consumers always have an image; [`FramePair::is_present`] tells them apart.
#[derive(Debug, Clone, PartialEq)]
pub struct FramePair {
    frames: [Frame; 2],
    present: [bool; 2],
}

impl FramePair {
    pub fn new(left: Option<Frame>, right: Option<Frame>, canvas: Resolution) -> Self {
        let present = [left.is_some(), right.is_some()];
        let left = left.unwrap_or_else(|| placeholder(canvas));
        let right = right.unwrap_or_else(|| placeholder(canvas));
        Self {
            frames: [left, right],
            present,
        }
    }

    /// The frame for a side, or its placeholder.
    pub fn get(&self, side: Side) -> &Frame {
        &self.frames[side.index()]
    }

    /// The captured frame for a side, `None` for a placeholder.
    pub fn captured(&self, side: Side) -> Option<&Frame> {
        self.is_present(side).then(|| self.get(side))
    }

    pub fn is_present(&self, side: Side) -> bool {
        self.present[side.index()]
    }

    pub fn left(&self) -> &Frame {
        self.get(Side::Left)
    }

    pub fn right(&self) -> &Frame {
        self.get(Side::Right)
    }

    pub fn into_frames(self) -> (Frame, Frame) {
        let [left, right] = self.frames;
        (left, right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_side_becomes_placeholder() {
        let left = RgbImage::from_pixel(8, 6, Rgb([9, 9, 9]));
        let pair = FramePair::new(Some(left.clone()), None, Resolution::new(4, 3));

        assert!(pair.is_present(Side::Left));
        assert!(!pair.is_present(Side::Right));
        assert_eq!(pair.left(), &left);
        assert_eq!(pair.right().dimensions(), (4, 3));
        assert!(pair.right().pixels().all(|p| *p == PLACEHOLDER_COLOUR));
        assert!(pair.captured(Side::Right).is_none());
    }
}
