//! Shared signal store: the latest derived values from the camera stream.
//!
//! HTTP handlers read these; background tasks (detection, distance sampling)
//! write them. The two signals are unrelated, so each sits behind its own
//! lock: replacing one never blocks readers of the other, and a reader can
//! never observe a half-written value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Result of one successful detection + translation round trip.
///
/// Both labels always come from the same detection call; the store replaces
/// the pair wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResult {
    pub label_en: String,
    pub label_ko: String,
    pub observed_at: DateTime<Utc>,
}

/// Last-known proximity reading. `None` means "unknown", distinct from any
/// numeric reading, including zero.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DistanceSample {
    pub distance_cm: Option<f64>,
    pub observed_at: DateTime<Utc>,
}

impl DistanceSample {
    pub fn known(distance_cm: f64) -> Self {
        Self {
            distance_cm: Some(distance_cm),
            observed_at: Utc::now(),
        }
    }

    pub fn unknown() -> Self {
        Self {
            distance_cm: None,
            observed_at: Utc::now(),
        }
    }
}

/// Store of the latest live signals.
///
/// Detection writes go through a sequence gate: each admitted detection takes
/// a ticket at admission time, and a completion whose ticket is older than
/// the last stored one is discarded. A slow detection can therefore never
/// overwrite a newer result, even when several are in flight.
pub struct SignalStore {
    detection: RwLock<Option<(u64, DetectionResult)>>,
    distance: RwLock<Option<DistanceSample>>,
    detection_seq: AtomicU64,
}

impl SignalStore {
    pub fn new() -> Self {
        Self {
            detection: RwLock::new(None),
            distance: RwLock::new(None),
            detection_seq: AtomicU64::new(0),
        }
    }

    /// Reserve a sequence ticket for a detection that is about to be launched.
    pub fn next_detection_ticket(&self) -> u64 {
        self.detection_seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Store a completed detection unless a newer one already landed.
    /// Returns whether the result was accepted.
    pub async fn set_detection(&self, ticket: u64, result: DetectionResult) -> bool {
        let mut slot = self.detection.write().await;
        match slot.as_ref() {
            Some((stored, _)) if *stored > ticket => false,
            _ => {
                *slot = Some((ticket, result));
                true
            }
        }
    }

    pub async fn detection(&self) -> Option<DetectionResult> {
        self.detection.read().await.as_ref().map(|(_, r)| r.clone())
    }

    pub async fn set_distance(&self, sample: DistanceSample) {
        *self.distance.write().await = Some(sample);
    }

    pub async fn distance(&self) -> Option<DistanceSample> {
        *self.distance.read().await
    }
}

impl Default for SignalStore {
    fn default() -> Self {
        Self::new()
    }
}
