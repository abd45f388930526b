// Copyright 2025 ModerRAS
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Bino Cam
//!
//! Core of a binocular camera viewer: stereo composites of two live feeds,
//! interactive lens calibration and a bridge to an external depth engine.
//!
//! ## Composing a stereo frame
//!
//! ```rust,no_run
//! use bino_cam::{CalibrationStore, DisplayMode, FramePair, RenderContext, Resolution};
//!
//! let canvas = Resolution::new(640, 720);
//! let left = image::open("left.png").unwrap().to_rgb8();
//! let frames = FramePair::new(Some(left), None, canvas);
//!
//! let store = CalibrationStore::new();
//! let context = RenderContext::new(canvas, &store);
//! let anaglyph = DisplayMode::Anaglyph { offset: 20 }
//!     .render(&frames, &context)
//!     .unwrap();
//! anaglyph.save("anaglyph.png").unwrap();
//! ```
//!
//! ## Calibrating a camera
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bino_cam::{
//!     CalibrationSession, CalibrationSolver, CalibrationStore, ChessboardFinder,
//!     CornerDetector, DetectorConfig, FrameOutcome, SessionConfig, Side, StereoRig,
//! };
//!
//! async fn calibrate_left(
//!     rig: &mut StereoRig,
//!     finder: Arc<dyn ChessboardFinder>,
//!     solver: &dyn CalibrationSolver,
//! ) -> anyhow::Result<CalibrationStore> {
//!     let detector = CornerDetector::new(finder, DetectorConfig::default());
//!     let mut session = CalibrationSession::new(SessionConfig::new(Side::Left), detector);
//!     let mut store = CalibrationStore::new();
//!     session.start()?;
//!
//!     loop {
//!         let frames = rig.grab();
//!         if let FrameOutcome::Completed(result) =
//!             session.on_frame(frames.left(), &mut store, solver).await?
//!         {
//!             println!("Reprojection error: {:.3}", result.reprojection_error);
//!             return Ok(store);
//!         }
//!     }
//! }
//! ```

pub mod calibration;
pub mod capture;
pub mod compose;
pub mod depth;
pub mod detection;
pub mod geometry;
pub mod lens;
pub mod settings;

pub use geometry::{CalibrationPattern, Correspondence, Resolution, Side};

pub use calibration::{
    CalibrationResult, CalibrationSession, CalibrationSolver, CalibrationSource, CalibrationStore,
    CodecError, FrameOutcome, SessionConfig, SessionError, SessionState, SolveError, SolveOutput,
};
pub use capture::{FrameSource, SourceError, StereoRig, StillImageSource};
pub use compose::{CompositeError, DisplayMode, Frame, FramePair, RenderContext};
pub use depth::{
    BridgeConfig, BridgeError, DepthEngine, DepthPipelineBridge, DepthQueueEntry, ProcessEngine,
    Pull,
};
pub use detection::{ChessboardFinder, CornerDetector, Detection, DetectorConfig};
pub use settings::AppSettings;
