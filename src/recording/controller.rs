use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::sink::AviSink;
use crate::config::RecordingConfig;
use crate::ingest::Frame;
use crate::storage::{UploadQueue, UploadTask};

#[derive(Debug, Error)]
pub enum RecorderError {
    /// `start()` while a session is active; the current session is untouched.
    #[error("a recording session is already active")]
    AlreadyRecording,
    #[error("failed to open recording sink")]
    OpenSink(#[source] anyhow::Error),
}

/// Descriptor of a started session, returned to the operator.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub filename: String,
    pub started_at: DateTime<Utc>,
}

struct ActiveSession {
    filename: String,
    path: PathBuf,
    started_at: DateTime<Utc>,
    sink: AviSink,
    /// Set on a sink write error; the session keeps running but the fact is
    /// reported when it closes.
    failed: bool,
}

/// State machine governing the single process-wide recording session.
///
/// Exactly one session may be active at a time. The active sink is owned
/// exclusively by this controller: the ingestion loop appends through
/// `feed`, the operator transitions state through `start`/`stop`, and no
/// other component ever touches the file.
pub struct RecordingController {
    config: RecordingConfig,
    uploads: UploadQueue,
    remote_prefix: String,
    recording: AtomicBool,
    session: Mutex<Option<ActiveSession>>,
}

impl RecordingController {
    pub fn new(config: RecordingConfig, remote_prefix: String, uploads: UploadQueue) -> Self {
        Self {
            config,
            uploads,
            remote_prefix,
            recording: AtomicBool::new(false),
            session: Mutex::new(None),
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    /// Open a fresh timestamped sink and go Active.
    pub async fn start(&self) -> Result<SessionInfo, RecorderError> {
        let mut session = self.session.lock().await;
        if session.is_some() {
            warn!("start requested while already recording");
            return Err(RecorderError::AlreadyRecording);
        }

        std::fs::create_dir_all(&self.config.output_dir)
            .map_err(|e| RecorderError::OpenSink(e.into()))?;

        let started_at = Utc::now();
        let filename = format!("record_{}.avi", Local::now().format("%Y%m%d_%H%M%S"));
        let path = PathBuf::from(&self.config.output_dir).join(&filename);

        let sink = AviSink::create(
            &path,
            self.config.fps,
            self.config.width,
            self.config.height,
        )
        .map_err(RecorderError::OpenSink)?;

        info!(file = %path.display(), "recording started");

        let info = SessionInfo {
            filename: filename.clone(),
            started_at,
        };
        *session = Some(ActiveSession {
            filename,
            path,
            started_at,
            sink,
            failed: false,
        });
        self.recording.store(true, Ordering::SeqCst);

        Ok(info)
    }

    /// Append a frame to the active sink. A no-op while Idle; a write error
    /// marks the session failed but never tears it down.
    pub async fn feed(&self, frame: &Frame) {
        if !self.recording.load(Ordering::SeqCst) {
            return;
        }

        let mut session = self.session.lock().await;
        if let Some(active) = session.as_mut() {
            if let Err(e) = active.sink.write_frame(&frame.jpeg) {
                if !active.failed {
                    error!(file = %active.path.display(), error = %e, "sink write failed");
                }
                active.failed = true;
            }
        }
    }

    /// Close the session. Returns whether an upload task was enqueued.
    ///
    /// Calling `stop` while Idle is a defensive no-op, not an error, so the
    /// second of two back-to-back stops enqueues nothing.
    pub async fn stop(&self) -> bool {
        let mut session = self.session.lock().await;
        self.recording.store(false, Ordering::SeqCst);

        let Some(active) = session.take() else {
            return false;
        };

        let duration = Utc::now().signed_duration_since(active.started_at);
        let path = active.path;
        let filename = active.filename;
        let failed = active.failed;

        let frames = match active.sink.finish() {
            Ok(frames) => frames,
            Err(e) => {
                error!(file = %path.display(), error = %e, "failed to close sink");
                return false;
            }
        };

        info!(
            file = %path.display(),
            frames,
            duration_secs = duration.num_milliseconds() as f64 / 1000.0,
            failed,
            "recording stopped"
        );

        if frames == 0 {
            // Nothing worth shipping; the empty file stays on disk.
            return false;
        }

        self.uploads.submit(UploadTask {
            local_path: path,
            remote_key: format!("{}{}", self.remote_prefix, filename),
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    fn controller(dir: &TempDir) -> (RecordingController, mpsc::UnboundedReceiver<UploadTask>) {
        let (queue, rx) = UploadQueue::channel();
        let config = RecordingConfig {
            output_dir: dir.path().to_string_lossy().into_owned(),
            fps: 20,
            width: 640,
            height: 480,
        };
        (
            RecordingController::new(config, "recordings/".to_string(), queue),
            rx,
        )
    }

    fn frame() -> Frame {
        Frame::new(Bytes::from_static(&[
            0xFF, 0xD8, 0x01, 0x02, 0x03, 0xFF, 0xD9,
        ]))
    }

    #[tokio::test]
    async fn feed_while_idle_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let (controller, mut rx) = controller(&dir);

        for _ in 0..10 {
            controller.feed(&frame()).await;
        }

        assert!(!controller.is_recording());
        assert!(rx.try_recv().is_err(), "no upload task while idle");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn start_while_active_is_rejected() {
        let dir = TempDir::new().unwrap();
        let (controller, _rx) = controller(&dir);

        let first = controller.start().await.unwrap();
        let again = controller.start().await;
        assert!(matches!(again, Err(RecorderError::AlreadyRecording)));

        // Current session untouched: same file, still recording.
        assert!(controller.is_recording());
        let session = controller.session.lock().await;
        let active = session.as_ref().unwrap();
        assert_eq!(active.filename, first.filename);
        assert_eq!(active.started_at, first.started_at);
    }

    #[tokio::test]
    async fn stop_while_idle_is_neutral() {
        let dir = TempDir::new().unwrap();
        let (controller, mut rx) = controller(&dir);

        assert!(!controller.stop().await);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_session_produces_one_file_and_one_upload() {
        let dir = TempDir::new().unwrap();
        let (controller, mut rx) = controller(&dir);

        let info = controller.start().await.unwrap();
        assert!(controller.is_recording());

        for _ in 0..5 {
            controller.feed(&frame()).await;
        }

        assert!(controller.stop().await);
        assert!(!controller.is_recording());

        let task = rx.try_recv().unwrap();
        assert_eq!(task.remote_key, format!("recordings/{}", info.filename));
        assert!(task.remote_key.starts_with("recordings/record_"));

        let len = std::fs::metadata(&task.local_path).unwrap().len();
        assert!(len > 0, "recorded file should be non-empty");

        // Exactly one task, and the file stays on disk after handoff.
        assert!(rx.try_recv().is_err());
        assert!(task.local_path.exists());
    }

    #[tokio::test]
    async fn double_stop_enqueues_a_single_upload() {
        let dir = TempDir::new().unwrap();
        let (controller, mut rx) = controller(&dir);

        controller.start().await.unwrap();
        controller.feed(&frame()).await;

        assert!(controller.stop().await);
        assert!(!controller.stop().await);

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err(), "second stop must not enqueue");
    }

    #[tokio::test]
    async fn empty_session_skips_upload() {
        let dir = TempDir::new().unwrap();
        let (controller, mut rx) = controller(&dir);

        controller.start().await.unwrap();
        assert!(!controller.stop().await, "no frames, nothing to ship");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn restart_after_stop_opens_a_new_session() {
        let dir = TempDir::new().unwrap();
        let (controller, _rx) = controller(&dir);

        controller.start().await.unwrap();
        controller.feed(&frame()).await;
        controller.stop().await;

        // stop never blocks a subsequent start
        controller.start().await.unwrap();
        assert!(controller.is_recording());
        controller.stop().await;
    }
}
