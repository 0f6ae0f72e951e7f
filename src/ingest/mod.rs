pub mod driver;
pub mod pull;
pub mod source;

pub use driver::IngestDriver;
pub use pull::MjpegPullSource;
pub use source::{Frame, FrameSource, FrameSourceFactory, PushSource, SourceError};
