use anyhow::Result;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::{CameraConfig, CameraMode};

/// A single JPEG frame as delivered by the camera.
///
/// Frames are consumed within the ingestion iteration that produced them;
/// nothing downstream retains them, so there is no backlog to manage.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Encoded JPEG bytes, written to the sink as received
    pub jpeg: Bytes,
    /// Arrival time
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(jpeg: Bytes) -> Self {
        Self {
            jpeg,
            captured_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to open frame source {url:?}")]
    Open { url: String },
    #[error("frame source closed")]
    Closed,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Frame ingestion adapter: one `next_frame` capability over both transports.
///
/// Variants:
/// - Push: the camera POSTs discrete JPEG bodies to /upload, buffered through
///   a small hand-off channel
/// - Pull: a persistent MJPEG stream connection with reconnect-on-failure
#[async_trait::async_trait]
pub trait FrameSource: Send {
    /// Obtain the next frame. A transient read failure is an `Err` the caller
    /// may skip past; `SourceError::Closed` means no more frames will come.
    async fn next_frame(&mut self) -> Result<Frame, SourceError>;

    /// Source name for logging
    fn name(&self) -> &str;
}

/// Push-variant source: wraps the receiving end of the /upload hand-off
/// channel. The HTTP handler drops frames when the channel is full, so this
/// never accumulates a backlog.
pub struct PushSource {
    rx: mpsc::Receiver<Frame>,
}

/// Capacity of the push hand-off channel. Small on purpose: a frame that
/// cannot be picked up promptly is dropped at the door, not queued.
pub const PUSH_CHANNEL_CAPACITY: usize = 8;

impl PushSource {
    pub fn channel() -> (mpsc::Sender<Frame>, Self) {
        let (tx, rx) = mpsc::channel(PUSH_CHANNEL_CAPACITY);
        (tx, Self { rx })
    }
}

#[async_trait::async_trait]
impl FrameSource for PushSource {
    async fn next_frame(&mut self) -> Result<Frame, SourceError> {
        self.rx.recv().await.ok_or(SourceError::Closed)
    }

    fn name(&self) -> &str {
        "http-push"
    }
}

/// Builds the configured frame source variant.
pub struct FrameSourceFactory;

impl FrameSourceFactory {
    /// Create the frame source for `config.mode`.
    ///
    /// In push mode the returned sender must be handed to the HTTP layer;
    /// in pull mode it is unused and the /upload endpoint rejects frames.
    /// A pull source that cannot establish its first connection is a fatal
    /// startup error.
    pub async fn create(
        config: &CameraConfig,
    ) -> Result<(Option<mpsc::Sender<Frame>>, Box<dyn FrameSource>)> {
        match config.mode {
            CameraMode::Push => {
                let (tx, source) = PushSource::channel();
                Ok((Some(tx), Box::new(source)))
            }
            CameraMode::Pull => {
                let url = config
                    .stream_url
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("camera.stream_url required in pull mode"))?;
                let source = super::pull::MjpegPullSource::open(url).await?;
                Ok((None, Box::new(source)))
            }
        }
    }
}
