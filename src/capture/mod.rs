//! Frame sources and the stereo rig that pairs them.

mod still;

pub use still::StillImageSource;

use thiserror::Error;

use crate::compose::{Frame, FramePair};
use crate::geometry::{Resolution, Side};

/// Default canvas: half of a 1280x720 side-by-side stream per camera.
pub const DEFAULT_CANVAS: Resolution = Resolution::new(640, 720);

/// Frame source errors.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to load image {path}: {source}")]
    Load {
        path: String,
        #[source]
        source: image::ImageError,
    },
}

/// A camera or anything that behaves like one.
pub trait FrameSource: Send {
    /// Next frame, or `None` when the source has nothing to give this tick.
    fn try_get_frame(&mut self) -> Option<Frame>;

    /// Resolution frames are currently delivered at.
    fn resolution(&self) -> Resolution;

    /// Ask for a new resolution; returns what the source actually delivers.
    fn set_resolution(&mut self, requested: Resolution) -> Resolution;
}

/// Left and right sources grabbed together, one [`FramePair`] per tick.
///
/// Missing sources and failed grabs turn into canvas-sized placeholders.
pub struct StereoRig {
    sources: [Option<Box<dyn FrameSource>>; 2],
    canvas: Resolution,
}

impl StereoRig {
    pub fn new(left: Option<Box<dyn FrameSource>>, right: Option<Box<dyn FrameSource>>) -> Self {
        Self {
            sources: [left, right],
            canvas: DEFAULT_CANVAS,
        }
    }

    pub fn with_canvas(mut self, canvas: Resolution) -> Self {
        self.canvas = canvas;
        self
    }

    pub fn canvas(&self) -> Resolution {
        self.canvas
    }

    pub fn has_source(&self, side: Side) -> bool {
        self.sources[side.index()].is_some()
    }

    /// Grab one frame from each side.
    pub fn grab(&mut self) -> FramePair {
        let [left, right] = Side::BOTH.map(|side| {
            let frame = self.sources[side.index()]
                .as_mut()
                .and_then(|source| source.try_get_frame());
            if frame.is_none() {
                tracing::debug!("No frame from {} camera", side);
            }
            frame
        });
        FramePair::new(left, right, self.canvas)
    }

    /// Request a resolution from both sources and adopt what they report as
    /// the canvas. Without any source the canvas is left unchanged.
    pub fn set_resolution(&mut self, requested: Resolution) -> Resolution {
        for (index, source) in self.sources.iter_mut().enumerate() {
            let Some(source) = source.as_mut() else {
                continue;
            };
            let actual = source.set_resolution(requested);
            if actual != requested {
                tracing::warn!(
                    "Camera {} delivers {} instead of requested {}",
                    index,
                    actual,
                    requested
                );
            }
            self.canvas = actual;
        }
        tracing::info!("Canvas resolution is {}", self.canvas);
        self.canvas
    }

    /// Request a 16:9 resolution of the given height.
    pub fn set_resolution_16x9(&mut self, height: u32) -> Resolution {
        self.set_resolution(Resolution::sixteen_by_nine(height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::collections::VecDeque;

    /// Plays back a scripted sequence of grabs; caps resolution at `max`.
    struct ScriptedSource {
        grabs: VecDeque<Option<Frame>>,
        resolution: Resolution,
        max: Resolution,
    }

    impl ScriptedSource {
        fn new(grabs: Vec<Option<Frame>>, max: Resolution) -> Box<Self> {
            Box::new(Self {
                grabs: grabs.into(),
                resolution: max,
                max,
            })
        }
    }

    impl FrameSource for ScriptedSource {
        fn try_get_frame(&mut self) -> Option<Frame> {
            self.grabs.pop_front().flatten()
        }

        fn resolution(&self) -> Resolution {
            self.resolution
        }

        fn set_resolution(&mut self, requested: Resolution) -> Resolution {
            self.resolution = Resolution::new(
                requested.width.min(self.max.width),
                requested.height.min(self.max.height),
            );
            self.resolution
        }
    }

    fn frame(value: u8) -> Frame {
        RgbImage::from_pixel(4, 3, Rgb([value, value, value]))
    }

    #[test]
    fn test_grab_substitutes_failed_and_missing_sources() {
        let left = ScriptedSource::new(vec![Some(frame(10)), None], Resolution::new(4, 3));
        let mut rig = StereoRig::new(Some(left), None).with_canvas(Resolution::new(4, 3));

        let first = rig.grab();
        assert!(first.is_present(Side::Left));
        assert!(!first.is_present(Side::Right));
        assert_eq!(first.right().dimensions(), (4, 3));

        let second = rig.grab();
        assert!(!second.is_present(Side::Left));
    }

    #[test]
    fn test_set_resolution_adopts_reported_size() {
        let left = ScriptedSource::new(Vec::new(), Resolution::new(1920, 1080));
        let right = ScriptedSource::new(Vec::new(), Resolution::new(1280, 720));
        let mut rig = StereoRig::new(Some(left), Some(right));

        let canvas = rig.set_resolution_16x9(1080);
        assert_eq!(canvas, Resolution::new(1280, 720));
        assert_eq!(rig.canvas(), canvas);
    }

    #[test]
    fn test_set_resolution_without_sources_keeps_canvas() {
        let mut rig = StereoRig::new(None, None);
        assert_eq!(rig.set_resolution(Resolution::new(320, 240)), DEFAULT_CANVAS);
    }
}
