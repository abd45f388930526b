//! Shared geometric types: resolutions, camera sides and calibration patterns.

mod pattern;

pub use pattern::{CalibrationPattern, Correspondence};

use serde::{Deserialize, Serialize};

/// A pixel resolution (width x height).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A 16:9 resolution for the given height (width truncated to an integer).
    pub fn sixteen_by_nine(height: u32) -> Self {
        Self {
            width: height * 16 / 9,
            height,
        }
    }

    /// Whether both dimensions are non-zero.
    pub fn is_established(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Component-wise minimum of two resolutions.
    pub fn min(self, other: Resolution) -> Resolution {
        Resolution {
            width: self.width.min(other.width),
            height: self.height.min(other.height),
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Which camera of the stereo pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    /// Slot index (left = 0, right = 1).
    pub fn index(self) -> usize {
        match self {
            Side::Left => 0,
            Side::Right => 1,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Side::Left),
            1 => Some(Side::Right),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
