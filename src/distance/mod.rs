//! Background proximity polling (pull variant).
//!
//! Independent of frame flow: a fixed-interval loop reads the camera's
//! distance endpoint and refreshes the signal store. Every failure mode
//! (timeout, connection error, bad payload) degrades to the "unknown"
//! sentinel and never propagates further.

use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::signals::{DistanceSample, SignalStore};

/// Short per-request timeout so a stuck sensor bounds staleness at roughly
/// one missed tick.
const POLL_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
struct DistanceReading {
    distance: f64,
}

pub fn spawn_distance_sampler(
    url: String,
    poll_interval: Duration,
    signals: Arc<SignalStore>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(url = %url, interval_secs = poll_interval.as_secs(), "distance sampler started");

        let client = reqwest::Client::builder()
            .timeout(POLL_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        let mut interval = tokio::time::interval(poll_interval);
        loop {
            interval.tick().await;

            let sample = match poll_once(&client, &url).await {
                Ok(distance_cm) => {
                    debug!(distance_cm, "distance updated");
                    DistanceSample::known(distance_cm)
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "distance poll failed");
                    DistanceSample::unknown()
                }
            };

            signals.set_distance(sample).await;
        }
    })
}

async fn poll_once(client: &reqwest::Client, url: &str) -> anyhow::Result<f64> {
    let reading: DistanceReading = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    Ok(reading.distance)
}
