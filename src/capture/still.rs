//! A frame source backed by a single decoded image.

use std::path::Path;

use image::imageops::{self, FilterType};

use super::{FrameSource, SourceError};
use crate::compose::Frame;
use crate::geometry::Resolution;

/// Serves the same image on every grab, scaled to the requested resolution.
#[derive(Debug, Clone)]
pub struct StillImageSource {
    original: Frame,
    current: Frame,
}

impl StillImageSource {
    pub fn new(image: Frame) -> Self {
        Self {
            current: image.clone(),
            original: image,
        }
    }

    /// Decode an image file into a source.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let image = image::open(path).map_err(|source| SourceError::Load {
            path: path.display().to_string(),
            source,
        })?;
        tracing::debug!("Loaded {} ({}x{})", path.display(), image.width(), image.height());
        Ok(Self::new(image.to_rgb8()))
    }
}

impl FrameSource for StillImageSource {
    fn try_get_frame(&mut self) -> Option<Frame> {
        Some(self.current.clone())
    }

    fn resolution(&self) -> Resolution {
        Resolution::new(self.current.width(), self.current.height())
    }

    fn set_resolution(&mut self, requested: Resolution) -> Resolution {
        if !requested.is_established() {
            return self.resolution();
        }
        self.current = if requested == Resolution::new(self.original.width(), self.original.height()) {
            self.original.clone()
        } else {
            imageops::resize(&self.original, requested.width, requested.height, FilterType::Triangle)
        };
        self.resolution()
    }
}
