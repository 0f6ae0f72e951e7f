pub mod client;
pub mod throttler;

pub use client::{Annotator, GoogleAnnotator};
pub use throttler::DetectionThrottler;

/// Sentinel served when detection finds nothing. The sentinel is never sent
/// through the translation API; the translated field carries this fixed
/// fallback instead.
pub const UNKNOWN_LABEL: &str = "unknown";
pub const UNKNOWN_LABEL_TRANSLATED: &str = "알 수 없음";
