//! Frame ingestion loop.
//!
//! Pulls frames from the configured source and dispatches each one: append
//! to the recording sink if a session is active, offer to the detection
//! throttler, fan out to live stream viewers. The loop never waits on
//! detection or upload work and never dies on a transient read failure.

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::source::{FrameSource, SourceError};
use crate::recording::RecordingController;
use crate::vision::DetectionThrottler;

const READ_FAILURE_BACKOFF: Duration = Duration::from_millis(100);

pub struct IngestDriver {
    source: Box<dyn FrameSource>,
    recorder: Arc<RecordingController>,
    throttler: Arc<DetectionThrottler>,
    live_tx: broadcast::Sender<Bytes>,
}

impl IngestDriver {
    pub fn new(
        source: Box<dyn FrameSource>,
        recorder: Arc<RecordingController>,
        throttler: Arc<DetectionThrottler>,
        live_tx: broadcast::Sender<Bytes>,
    ) -> Self {
        Self {
            source,
            recorder,
            throttler,
            live_tx,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        info!(source = self.source.name(), "frame ingestion started");

        loop {
            match self.source.next_frame().await {
                Ok(frame) => {
                    self.recorder.feed(&frame).await;
                    self.throttler.offer(&frame);
                    // No live viewers is the normal case; send errors are fine.
                    let _ = self.live_tx.send(frame.jpeg);
                }
                Err(SourceError::Closed) => {
                    info!("frame source closed, ingestion stopping");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "frame read failed, skipping");
                    tokio::time::sleep(READ_FAILURE_BACKOFF).await;
                }
            }
        }
    }
}
