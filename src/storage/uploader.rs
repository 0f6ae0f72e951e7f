//! Fire-and-forget shipment of finished recordings to durable storage.
//!
//! Submissions never block the caller; a single worker task drains the queue
//! so uploads are serialized rather than racing each other under load. A
//! failed upload is logged and dropped (no retry), and the local file is
//! kept on disk either way.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::ObjectStore;

/// One finished recording to ship. Ephemeral: consumed by the dispatcher and
/// discarded after the attempt, successful or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTask {
    pub local_path: PathBuf,
    pub remote_key: String,
}

/// Sending half handed to the recording controller.
#[derive(Clone)]
pub struct UploadQueue {
    tx: mpsc::UnboundedSender<UploadTask>,
}

impl UploadQueue {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<UploadTask>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Enqueue and return immediately.
    pub fn submit(&self, task: UploadTask) {
        if self.tx.send(task).is_err() {
            error!("upload worker is gone, dropping upload task");
        }
    }
}

pub struct UploadDispatcher;

impl UploadDispatcher {
    /// Spawn the worker that drains the queue.
    pub fn spawn(
        store: Arc<dyn ObjectStore>,
        mut rx: mpsc::UnboundedReceiver<UploadTask>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("upload worker started");

            while let Some(task) = rx.recv().await {
                Self::process(store.as_ref(), task).await;
            }

            info!("upload worker stopped");
        })
    }

    async fn process(store: &dyn ObjectStore, task: UploadTask) {
        info!(
            path = %task.local_path.display(),
            key = %task.remote_key,
            "uploading recording"
        );

        match store.put_object(&task.local_path, &task.remote_key).await {
            Ok(url) => {
                // Visibility is best-effort; the upload already succeeded.
                if let Err(e) = store.make_public(&task.remote_key).await {
                    warn!(key = %task.remote_key, error = %e, "failed to mark object public");
                }
                info!(url = %url, "recording upload complete");
            }
            Err(e) => {
                error!(
                    path = %task.local_path.display(),
                    key = %task.remote_key,
                    error = %e,
                    "recording upload failed"
                );
            }
        }
    }
}
