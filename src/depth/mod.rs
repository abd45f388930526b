//! Bridging synchronized frames to an external depth-reconstruction engine.

mod bridge;
mod grid;
mod messages;
mod process;

pub use bridge::{
    BridgeConfig, BridgeError, DepthEngine, DepthPipelineBridge, EngineLink, Pull, RequestOutcome,
    DEFAULT_QUEUE_CAP,
};
pub use grid::DepthQueueEntry;
pub use messages::{
    CameraInfo, EngineMessage, ImageMessage, PointCloudMessage, DISTORTION_MODEL, IMAGE_ENCODING,
};
pub use process::{ProcessEngine, DEFAULT_ENGINE_ARGS, DEFAULT_ENGINE_PROGRAM};
