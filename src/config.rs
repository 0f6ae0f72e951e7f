use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub camera: CameraConfig,
    pub detection: DetectionConfig,
    pub recording: RecordingConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

/// How frames arrive: pushed by the camera to POST /upload, or pulled from
/// the camera's MJPEG stream endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraMode {
    Push,
    Pull,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    pub mode: CameraMode,

    /// MJPEG stream URL (pull mode only)
    pub stream_url: Option<String>,

    /// Distance sensor endpoint polled on a fixed interval (pull mode only)
    pub distance_url: Option<String>,

    #[serde(default = "default_distance_poll_secs")]
    pub distance_poll_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    /// Minimum interval between two admitted detection calls
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    pub vision_api_key: String,
    pub translate_api_key: String,

    /// Translation target for the secondary label (original deployment: Korean)
    #[serde(default = "default_target_lang")]
    pub target_lang: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordingConfig {
    pub output_dir: String,

    /// Fixed encoding profile; frames are written as received, so playback
    /// speed is only correct if the camera matches it.
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub bucket: String,

    /// Remote key prefix for finished recordings
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// OAuth bearer token for the storage API
    pub access_token: String,
}

fn default_distance_poll_secs() -> u64 {
    1
}

fn default_window_secs() -> u64 {
    1
}

fn default_target_lang() -> String {
    "ko".to_string()
}

fn default_fps() -> u32 {
    20
}

fn default_width() -> u32 {
    640
}

fn default_height() -> u32 {
    480
}

fn default_prefix() -> String {
    "recordings/".to_string()
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
