pub mod controller;
pub mod sink;

pub use controller::{RecorderError, RecordingController, SessionInfo};
pub use sink::AviSink;
