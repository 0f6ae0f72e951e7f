use super::state::AppState;
use crate::ingest::Frame;
use crate::recording::RecorderError;
use crate::storage::StoredObject;
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json},
};
use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct VideoListResponse {
    pub videos: Vec<StoredObject>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /
/// Liveness check
pub async fn home(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, format!("{} server is running", state.service_name))
}

/// POST /distance/update
/// Inbound distance reading from the camera device
pub async fn update_distance(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> impl IntoResponse {
    let Some(distance) = body.get("distance").and_then(|v| v.as_f64()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "missing distance value" })),
        );
    };

    debug!(distance_cm = distance, "distance updated");
    state
        .signals
        .set_distance(crate::signals::DistanceSample::known(distance))
        .await;

    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

/// GET /distance
/// Latest distance reading; "N/A" until one arrives
pub async fn get_distance(State(state): State<AppState>) -> impl IntoResponse {
    let value = match state.signals.distance().await.and_then(|s| s.distance_cm) {
        Some(cm) if cm.fract() == 0.0 => json!(cm as i64),
        Some(cm) => json!(cm),
        None => json!("N/A"),
    };

    Json(json!({ "distance_cm": value }))
}

/// GET /label
/// Latest detected label pair; empty object until a detection succeeds
pub async fn get_label(State(state): State<AppState>) -> impl IntoResponse {
    match state.signals.detection().await {
        Some(result) => Json(json!({
            "label_en": result.label_en,
            "label_ko": result.label_ko,
        })),
        None => Json(json!({})),
    }
}

/// POST /upload
/// Raw JPEG frame pushed by the camera (push variant)
pub async fn upload_frame(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    if body.is_empty() {
        return (StatusCode::BAD_REQUEST, "no image data");
    }

    if image::load_from_memory_with_format(&body, image::ImageFormat::Jpeg).is_err() {
        return (StatusCode::BAD_REQUEST, "image decode failed");
    }

    let Some(frames_tx) = &state.frames_tx else {
        return (StatusCode::BAD_REQUEST, "push ingestion is disabled");
    };

    // Full channel means the loop is momentarily behind; the frame is
    // dropped rather than queued.
    if frames_tx.try_send(Frame::new(body)).is_err() {
        debug!("ingestion busy, frame dropped");
    }

    (StatusCode::OK, "frame received")
}

/// GET /video
/// Live MJPEG stream of ingested frames (pull variant)
pub async fn video_stream(State(state): State<AppState>) -> impl IntoResponse {
    let rx = state.live_tx.subscribe();

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(jpeg) => {
                    let mut part = Vec::with_capacity(jpeg.len() + 80);
                    part.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n");
                    part.extend_from_slice(
                        format!("Content-Length: {}\r\n\r\n", jpeg.len()).as_bytes(),
                    );
                    part.extend_from_slice(&jpeg);
                    part.extend_from_slice(b"\r\n");
                    return Some((Ok::<_, std::convert::Infallible>(Bytes::from(part)), rx));
                }
                // A slow viewer skips frames instead of stalling the stream.
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });

    (
        [(
            header::CONTENT_TYPE,
            "multipart/x-mixed-replace; boundary=frame",
        )],
        Body::from_stream(stream),
    )
}

/// GET /record/start
/// Begin a recording session
pub async fn record_start(State(state): State<AppState>) -> impl IntoResponse {
    match state.recorder.start().await {
        Ok(info) => {
            info!(file = %info.filename, "recording started by operator");
            (StatusCode::OK, format!("recording started: {}", info.filename))
        }
        Err(RecorderError::AlreadyRecording) => (
            StatusCode::CONFLICT,
            "recording already in progress".to_string(),
        ),
        Err(e) => {
            error!(error = %e, "failed to start recording");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to start recording: {e}"),
            )
        }
    }
}

/// GET /record/stop
/// End the session; safe to call while idle
pub async fn record_stop(State(state): State<AppState>) -> impl IntoResponse {
    if state.recorder.stop().await {
        (StatusCode::OK, "recording stopped, upload queued")
    } else {
        (StatusCode::OK, "recording stopped")
    }
}

/// GET /videos
/// Catalog of uploaded recordings, derived from the storage prefix on demand
pub async fn list_videos(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.list_objects(&state.storage_prefix).await {
        Ok(objects) => {
            let videos = objects
                .into_iter()
                .filter(|o| o.name.ends_with(".avi"))
                .map(|o| StoredObject {
                    name: o.name.rsplit('/').next().unwrap_or(&o.name).to_string(),
                    url: o.url,
                })
                .collect();
            (StatusCode::OK, Json(VideoListResponse { videos })).into_response()
        }
        Err(e) => {
            error!(error = %e, "failed to list recordings");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("failed to list recordings: {e}"),
                }),
            )
                .into_response()
        }
    }
}
