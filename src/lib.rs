pub mod config;
pub mod distance;
pub mod http;
pub mod ingest;
pub mod recording;
pub mod signals;
pub mod storage;
pub mod vision;

pub use config::Config;
pub use http::{create_router, AppState};
pub use ingest::{Frame, FrameSource, FrameSourceFactory, IngestDriver};
pub use recording::{RecorderError, RecordingController, SessionInfo};
pub use signals::{DetectionResult, DistanceSample, SignalStore};
pub use storage::{GcsStore, ObjectStore, StoredObject, UploadDispatcher, UploadQueue, UploadTask};
pub use vision::{Annotator, DetectionThrottler, GoogleAnnotator};
