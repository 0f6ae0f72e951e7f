use anyhow::{Context, Result};
use clap::Parser;
use smartcam::config::CameraMode;
use smartcam::distance::spawn_distance_sampler;
use smartcam::{
    AppState, Config, DetectionThrottler, FrameSourceFactory, GcsStore, IngestDriver, ObjectStore,
    RecordingController, SignalStore, UploadDispatcher, UploadQueue,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "smartcam", about = "Camera relay with live labels and recording upload")]
struct Cli {
    /// Config file path (without extension)
    #[arg(long, default_value = "config/smartcam")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!(
        "HTTP server will bind to {}:{}",
        cfg.service.http.bind, cfg.service.http.port
    );

    let signals = Arc::new(SignalStore::new());

    let store: Arc<dyn ObjectStore> = Arc::new(GcsStore::new(&cfg.storage)?);
    let (uploads, upload_rx) = UploadQueue::channel();
    UploadDispatcher::spawn(Arc::clone(&store), upload_rx);

    let recorder = Arc::new(RecordingController::new(
        cfg.recording.clone(),
        cfg.storage.prefix.clone(),
        uploads,
    ));

    let annotator = Arc::new(smartcam::GoogleAnnotator::new(&cfg.detection)?);
    let throttler = Arc::new(DetectionThrottler::new(
        Duration::from_secs(cfg.detection.window_secs),
        annotator,
        Arc::clone(&signals),
        cfg.detection.target_lang.clone(),
    ));

    // Live /video viewers; slow ones lag and skip frames.
    let (live_tx, _) = broadcast::channel(16);

    // A pull source that cannot connect is fatal here, before serving.
    let (frames_tx, source) = FrameSourceFactory::create(&cfg.camera).await?;
    IngestDriver::new(source, Arc::clone(&recorder), throttler, live_tx.clone()).spawn();

    if cfg.camera.mode == CameraMode::Pull {
        if let Some(url) = cfg.camera.distance_url.clone() {
            spawn_distance_sampler(
                url,
                Duration::from_secs(cfg.camera.distance_poll_secs),
                Arc::clone(&signals),
            );
        }
    }

    let state = AppState {
        service_name: cfg.service.name.clone(),
        signals,
        recorder,
        store,
        storage_prefix: cfg.storage.prefix.clone(),
        frames_tx,
        live_tx,
    };

    let app = smartcam::create_router(state);
    let listener =
        tokio::net::TcpListener::bind((cfg.service.http.bind.as_str(), cfg.service.http.port))
            .await
            .context("failed to bind HTTP listener")?;

    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await.context("HTTP server failed")?;

    Ok(())
}
