//! HTTP API for polling clients and operator control:
//! - GET  /                 - liveness
//! - POST /distance/update  - inbound distance reading (push variant)
//! - GET  /distance         - latest distance, "N/A" when unknown
//! - POST /upload           - raw JPEG frame ingestion (push variant)
//! - GET  /video            - live MJPEG stream (multipart/x-mixed-replace)
//! - GET  /label            - latest detected label pair
//! - GET  /record/start     - begin a recording session
//! - GET  /record/stop      - end it and ship the file
//! - GET  /videos           - catalog of uploaded recordings

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
