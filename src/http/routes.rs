use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Liveness
        .route("/", get(handlers::home))
        // Live signals
        .route("/distance/update", post(handlers::update_distance))
        .route("/distance", get(handlers::get_distance))
        .route("/label", get(handlers::get_label))
        // Frame ingestion (push variant) and live view
        .route("/upload", post(handlers::upload_frame))
        .route("/video", get(handlers::video_stream))
        // Recording control and catalog
        .route("/record/start", get(handlers::record_start))
        .route("/record/stop", get(handlers::record_stop))
        .route("/videos", get(handlers::list_videos))
        // Request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
