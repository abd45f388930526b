//! Bridge between the frame pump and an out-of-process depth engine.
//!
//! Requests go out as a sync marker followed by both frames and both lens
//! descriptions. Point clouds come back asynchronously and are queued in
//! arrival order; [`DepthPipelineBridge::pull`] hands out the oldest one, or
//! the last one again when nothing new has arrived.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use uuid::Uuid;

use super::grid::DepthQueueEntry;
use super::messages::{CameraInfo, EngineMessage, ImageMessage, PointCloudMessage};
use crate::calibration::CalibrationStore;
use crate::compose::FramePair;
use crate::geometry::{Resolution, Side};

/// Default number of unconsumed results above which requests are skipped.
pub const DEFAULT_QUEUE_CAP: usize = 10;

/// Messages published per request.
const MESSAGES_PER_REQUEST: usize = 5;

/// Bridge errors.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Depth engine has not been started")]
    NotStarted,
    #[error("No calibration for the {0} camera")]
    MissingCalibration(Side),
    #[error("Depth engine unavailable: {0}")]
    EngineUnavailable(String),
    #[error("Failed to launch depth engine: {0}")]
    Launch(#[from] std::io::Error),
}

/// Channels to a running engine.
#[derive(Debug)]
pub struct EngineLink {
    pub outbound: mpsc::Sender<EngineMessage>,
    pub inbound: mpsc::Receiver<PointCloudMessage>,
}

/// An external depth engine the bridge can start and stop.
pub trait DepthEngine: Send {
    /// Start the engine and return channels to it.
    fn launch(&mut self) -> Result<EngineLink, BridgeError>;

    /// Ask the engine to shut down. Must be harmless when it is not running.
    fn terminate(&mut self) -> Result<(), BridgeError>;
}

/// Bridge configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Requests are skipped while this many results are waiting.
    pub queue_cap: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            queue_cap: DEFAULT_QUEUE_CAP,
        }
    }
}

/// What a [`DepthPipelineBridge::request`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// All messages were handed to the engine under this sync id.
    Published(Uuid),
    /// Too many results or messages are pending; nothing was sent.
    Skipped,
}

/// Result of a [`DepthPipelineBridge::pull`].
#[derive(Debug, Clone, PartialEq)]
pub enum Pull {
    /// A result not handed out before.
    Fresh(Arc<DepthQueueEntry>),
    /// Nothing new; the previous result again.
    Stale(Arc<DepthQueueEntry>),
    /// The engine has not produced anything yet.
    NoDataYet,
}

impl Pull {
    pub fn entry(&self) -> Option<&Arc<DepthQueueEntry>> {
        match self {
            Pull::Fresh(entry) | Pull::Stale(entry) => Some(entry),
            Pull::NoDataYet => None,
        }
    }
}

pub struct DepthPipelineBridge {
    engine: Box<dyn DepthEngine>,
    config: BridgeConfig,
    link: Option<EngineLink>,
    queue: VecDeque<DepthQueueEntry>,
    last: Option<Arc<DepthQueueEntry>>,
}

impl DepthPipelineBridge {
    pub fn new(engine: Box<dyn DepthEngine>, config: BridgeConfig) -> Self {
        Self {
            engine,
            config,
            link: None,
            queue: VecDeque::new(),
            last: None,
        }
    }

    /// Whether the engine is started and its result channel is still open.
    pub fn is_running(&mut self) -> bool {
        self.drain_inbound();
        self.link.is_some()
    }

    /// Launch the engine. Does nothing when already running.
    pub fn start(&mut self) -> Result<(), BridgeError> {
        if self.link.is_some() {
            return Ok(());
        }
        let link = self.engine.launch()?;
        tracing::info!("Depth engine started");
        self.link = Some(link);
        Ok(())
    }

    /// Close the channels and ask the engine to terminate.
    pub fn stop(&mut self) -> Result<(), BridgeError> {
        if self.link.take().is_some() {
            tracing::info!("Stopping depth engine");
        }
        self.engine.terminate()
    }

    /// Results received but not yet pulled.
    pub fn pending(&mut self) -> usize {
        self.drain_inbound();
        self.queue.len()
    }

    /// Publish one synchronized pair with both sides' calibration scaled to
    /// `canvas`.
    ///
    /// Skipped without error while the result queue is at its cap or the
    /// engine is not reading its input.
    pub fn request(
        &mut self,
        frames: &FramePair,
        store: &CalibrationStore,
        canvas: Resolution,
    ) -> Result<RequestOutcome, BridgeError> {
        if self.link.is_none() {
            return Err(BridgeError::NotStarted);
        }
        let (left, right) = match store.pair() {
            (Some(left), Some(right)) => (Arc::clone(left), Arc::clone(right)),
            (None, _) => return Err(BridgeError::MissingCalibration(Side::Left)),
            (_, None) => return Err(BridgeError::MissingCalibration(Side::Right)),
        };

        self.drain_inbound();
        if self.queue.len() >= self.config.queue_cap {
            tracing::debug!("{} depth results pending, skipping request", self.queue.len());
            return Ok(RequestOutcome::Skipped);
        }
        let Some(link) = self.link.as_ref() else {
            return Err(BridgeError::EngineUnavailable(
                "engine closed its output".to_string(),
            ));
        };
        if link.outbound.capacity() < MESSAGES_PER_REQUEST {
            tracing::debug!("Depth engine input is backed up, skipping request");
            return Ok(RequestOutcome::Skipped);
        }

        let id = Uuid::new_v4();
        let stamp = Utc::now();
        let messages = [
            EngineMessage::Sync { id, stamp },
            EngineMessage::Image(ImageMessage::from_frame(Side::Left, frames.left(), stamp)),
            EngineMessage::CameraInfo(CameraInfo::from_calibration(Side::Left, &left, canvas, stamp)),
            EngineMessage::Image(ImageMessage::from_frame(Side::Right, frames.right(), stamp)),
            EngineMessage::CameraInfo(CameraInfo::from_calibration(Side::Right, &right, canvas, stamp)),
        ];
        let mut input_closed = false;
        for message in messages {
            match link.outbound.try_send(message) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    return Err(BridgeError::EngineUnavailable(
                        "input queue filled mid-request".to_string(),
                    ))
                }
                Err(TrySendError::Closed(_)) => {
                    input_closed = true;
                    break;
                }
            }
        }
        if input_closed {
            self.link = None;
            return Err(BridgeError::EngineUnavailable(
                "engine closed its input".to_string(),
            ));
        }
        tracing::debug!("Published depth request {}", id);
        Ok(RequestOutcome::Published(id))
    }

    /// Oldest unread result, else the previous result, else `NoDataYet`.
    pub fn pull(&mut self) -> Pull {
        self.drain_inbound();
        if let Some(entry) = self.queue.pop_front() {
            let entry = Arc::new(entry);
            self.last = Some(Arc::clone(&entry));
            return Pull::Fresh(entry);
        }
        match &self.last {
            Some(entry) => Pull::Stale(Arc::clone(entry)),
            None => Pull::NoDataYet,
        }
    }

    fn drain_inbound(&mut self) {
        let Some(link) = self.link.as_mut() else {
            return;
        };
        let mut disconnected = false;
        loop {
            match link.inbound.try_recv() {
                Ok(cloud) => match DepthQueueEntry::from_cloud(&cloud) {
                    Some(entry) => self.queue.push_back(entry),
                    None => tracing::warn!(
                        "Dropping point cloud with {} points, too few for a grid",
                        cloud.points.len()
                    ),
                },
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    disconnected = true;
                    break;
                }
            }
        }

        // Results already queued stay pullable; a later start relaunches.
        if disconnected {
            tracing::warn!("Depth engine closed its output, marking it stopped");
            self.link = None;
            if let Err(e) = self.engine.terminate() {
                tracing::warn!("Failed to stop depth engine: {}", e);
            }
        }
    }
}

impl Drop for DepthPipelineBridge {
    fn drop(&mut self) {
        if self.link.is_some() {
            if let Err(e) = self.stop() {
                tracing::warn!("Failed to stop depth engine: {}", e);
            }
        }
    }
}
