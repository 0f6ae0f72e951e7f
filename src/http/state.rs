use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use crate::ingest::Frame;
use crate::recording::RecordingController;
use crate::signals::SignalStore;
use crate::storage::ObjectStore;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Service name, echoed by the liveness endpoint
    pub service_name: String,

    /// Latest label/distance signals
    pub signals: Arc<SignalStore>,

    /// The single process-wide recording session
    pub recorder: Arc<RecordingController>,

    /// Durable storage, listed on demand for the recording catalog
    pub store: Arc<dyn ObjectStore>,

    /// Storage key prefix the catalog is derived from
    pub storage_prefix: String,

    /// Hand-off into the ingestion loop; `None` when frames are pulled from
    /// the camera instead of pushed to /upload
    pub frames_tx: Option<mpsc::Sender<Frame>>,

    /// Live frame fan-out for /video viewers
    pub live_tx: broadcast::Sender<Bytes>,
}
