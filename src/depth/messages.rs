//! Messages exchanged with the external depth engine.

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use nalgebra::{Matrix3, Matrix3x4};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calibration::CalibrationResult;
use crate::compose::Frame;
use crate::geometry::{Resolution, Side};

/// Distortion model name understood by the engine.
pub const DISTORTION_MODEL: &str = "plumb_bob";

/// Pixel encoding of [`ImageMessage::data`].
pub const IMAGE_ENCODING: &str = "rgb8";

/// Frame payload for one side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMessage {
    pub side: Side,
    pub stamp: DateTime<Utc>,
    pub width: u32,
    pub height: u32,
    pub encoding: String,
    /// Row-major RGB bytes, base64 encoded.
    pub data: String,
}

impl ImageMessage {
    pub fn from_frame(side: Side, frame: &Frame, stamp: DateTime<Utc>) -> Self {
        Self {
            side,
            stamp,
            width: frame.width(),
            height: frame.height(),
            encoding: IMAGE_ENCODING.to_string(),
            data: STANDARD.encode(frame.as_raw()),
        }
    }
}

/// Lens parameters for one side, in the engine's flattened row-major layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraInfo {
    pub side: Side,
    pub stamp: DateTime<Utc>,
    pub width: u32,
    pub height: u32,
    pub distortion_model: String,
    pub d: [f64; 5],
    pub k: [f64; 9],
    pub r: [f64; 9],
    pub p: [f64; 12],
}

impl CameraInfo {
    /// Describe a calibration for images of size `canvas`.
    ///
    /// The pixel rows of K and P are rescaled from the resolution the
    /// calibration was made at to the canvas.
    pub fn from_calibration(
        side: Side,
        calibration: &CalibrationResult,
        canvas: Resolution,
        stamp: DateTime<Utc>,
    ) -> Self {
        let (sx, sy) = if calibration.resolution.is_established() {
            (
                canvas.width as f64 / calibration.resolution.width as f64,
                canvas.height as f64 / calibration.resolution.height as f64,
            )
        } else {
            (1.0, 1.0)
        };

        let mut k = calibration.camera_matrix;
        let mut p = calibration.projection;
        for col in 0..4 {
            if col < 3 {
                k[(0, col)] *= sx;
                k[(1, col)] *= sy;
            }
            p[(0, col)] *= sx;
            p[(1, col)] *= sy;
        }

        let mut d = [0.0; 5];
        d.copy_from_slice(calibration.distortion.as_slice());

        Self {
            side,
            stamp,
            width: canvas.width,
            height: canvas.height,
            distortion_model: DISTORTION_MODEL.to_string(),
            d,
            k: flatten3(&k),
            r: flatten3(&calibration.rectification),
            p: flatten34(&p),
        }
    }
}

fn flatten3(m: &Matrix3<f64>) -> [f64; 9] {
    let mut out = [0.0; 9];
    for (i, value) in out.iter_mut().enumerate() {
        *value = m[(i / 3, i % 3)];
    }
    out
}

fn flatten34(m: &Matrix3x4<f64>) -> [f64; 12] {
    let mut out = [0.0; 12];
    for (i, value) in out.iter_mut().enumerate() {
        *value = m[(i / 4, i % 4)];
    }
    out
}

/// Everything the bridge sends to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineMessage {
    /// Announces that one synchronized pair follows.
    Sync { id: Uuid, stamp: DateTime<Utc> },
    Image(ImageMessage),
    CameraInfo(CameraInfo),
}

impl EngineMessage {
    pub fn stamp(&self) -> DateTime<Utc> {
        match self {
            EngineMessage::Sync { stamp, .. } => *stamp,
            EngineMessage::Image(image) => image.stamp,
            EngineMessage::CameraInfo(info) => info.stamp,
        }
    }
}

/// A reconstructed point cloud from the engine: `[x, y, z, intensity]` per point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointCloudMessage {
    #[serde(default)]
    pub stamp: Option<DateTime<Utc>>,
    pub points: Vec<[f64; 4]>,
}
