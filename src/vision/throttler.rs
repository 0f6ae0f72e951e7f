//! Rate-limited dispatch of detection work.
//!
//! Frames can arrive at tens per second; the external detection call is
//! expensive and slow. The throttler admits at most one detection per rate
//! window and drops the rest; dropping is the sampling policy, not an
//! error. The admission decision is synchronous and O(1); the admitted work
//! runs on its own task and writes its result into the signal store.

use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::client::Annotator;
use super::{UNKNOWN_LABEL, UNKNOWN_LABEL_TRANSLATED};
use crate::ingest::Frame;
use crate::signals::{DetectionResult, SignalStore};

pub struct DetectionThrottler {
    window: Duration,
    last_admitted: Mutex<Option<Instant>>,
    annotator: Arc<dyn Annotator>,
    signals: Arc<SignalStore>,
    target_lang: String,
}

impl DetectionThrottler {
    pub fn new(
        window: Duration,
        annotator: Arc<dyn Annotator>,
        signals: Arc<SignalStore>,
        target_lang: String,
    ) -> Self {
        Self {
            window,
            last_admitted: Mutex::new(None),
            annotator,
            signals,
            target_lang,
        }
    }

    /// Offer a frame for detection. Returns whether it was admitted.
    ///
    /// The admission stamp is taken before the async work is launched, so a
    /// burst of frames arriving while a detection is still in flight cannot
    /// all be admitted. If the external call outlasts the window, a second
    /// detection may overlap the first; the signal store's sequence gate
    /// keeps the older one from clobbering the newer result.
    pub fn offer(&self, frame: &Frame) -> bool {
        if !self.try_admit(Instant::now()) {
            return false;
        }

        let ticket = self.signals.next_detection_ticket();
        let annotator = Arc::clone(&self.annotator);
        let signals = Arc::clone(&self.signals);
        let target_lang = self.target_lang.clone();
        let jpeg = frame.jpeg.clone();

        tokio::spawn(async move {
            Self::run_detection(annotator, signals, ticket, jpeg, target_lang).await;
        });

        true
    }

    fn try_admit(&self, now: Instant) -> bool {
        let mut last = self.last_admitted.lock().unwrap_or_else(|e| e.into_inner());
        let admit = match *last {
            None => true,
            Some(stamp) => now.duration_since(stamp) >= self.window,
        };
        if admit {
            *last = Some(now);
        }
        admit
    }

    /// Detection + translation round trip for one admitted frame. Any
    /// failure discards the whole update and leaves the previous result in
    /// place.
    async fn run_detection(
        annotator: Arc<dyn Annotator>,
        signals: Arc<SignalStore>,
        ticket: u64,
        jpeg: Bytes,
        target_lang: String,
    ) {
        let label = match annotator.detect(&jpeg).await {
            Ok(label) => label,
            Err(e) => {
                warn!(error = %e, "detection call failed, keeping previous label");
                return;
            }
        };

        let result = match label {
            Some(label_en) => {
                let label_ko = match annotator.translate(&label_en, &target_lang).await {
                    Ok(translated) => translated,
                    Err(e) => {
                        warn!(error = %e, "translation failed, keeping previous label");
                        return;
                    }
                };
                DetectionResult {
                    label_en,
                    label_ko,
                    observed_at: Utc::now(),
                }
            }
            // Nothing detected: serve the sentinel without a translation call.
            None => DetectionResult {
                label_en: UNKNOWN_LABEL.to_string(),
                label_ko: UNKNOWN_LABEL_TRANSLATED.to_string(),
                observed_at: Utc::now(),
            },
        };

        if !signals.set_detection(ticket, result).await {
            debug!(ticket, "stale detection discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedAnnotator {
        label: Option<String>,
        fail_detect: bool,
        fail_translate: bool,
        detect_calls: AtomicUsize,
        translate_calls: AtomicUsize,
    }

    impl ScriptedAnnotator {
        fn returning(label: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                label: label.map(str::to_string),
                fail_detect: false,
                fail_translate: false,
                detect_calls: AtomicUsize::new(0),
                translate_calls: AtomicUsize::new(0),
            })
        }

        fn failing_detect() -> Arc<Self> {
            Arc::new(Self {
                label: None,
                fail_detect: true,
                fail_translate: false,
                detect_calls: AtomicUsize::new(0),
                translate_calls: AtomicUsize::new(0),
            })
        }

        fn failing_translate() -> Arc<Self> {
            Arc::new(Self {
                label: Some("Dog".to_string()),
                fail_detect: false,
                fail_translate: true,
                detect_calls: AtomicUsize::new(0),
                translate_calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait::async_trait]
    impl Annotator for ScriptedAnnotator {
        async fn detect(&self, _jpeg: &[u8]) -> Result<Option<String>> {
            self.detect_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_detect {
                anyhow::bail!("vision service down");
            }
            Ok(self.label.clone())
        }

        async fn translate(&self, text: &str, _target_lang: &str) -> Result<String> {
            self.translate_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_translate {
                anyhow::bail!("translate service down");
            }
            Ok(format!("{text}-ko"))
        }
    }

    fn throttler(window: Duration, annotator: Arc<ScriptedAnnotator>) -> DetectionThrottler {
        DetectionThrottler::new(
            window,
            annotator,
            Arc::new(SignalStore::new()),
            "ko".to_string(),
        )
    }

    #[test]
    fn admissions_bounded_by_rate_window() {
        let annotator = ScriptedAnnotator::returning(Some("Dog"));
        let throttler = throttler(Duration::from_secs(1), annotator);

        // Frames every 100ms over 3.5 seconds, much faster than the window.
        let base = Instant::now();
        let mut admitted = 0;
        for i in 0..35 {
            if throttler.try_admit(base + Duration::from_millis(i * 100)) {
                admitted += 1;
            }
        }

        // ceil(T/W) + 1 with T=3.5s, W=1s
        assert!(admitted <= 5, "admitted {admitted} detections in 3.5s");
        assert!(admitted >= 3, "throttler starved the detector");
    }

    #[test]
    fn first_frame_is_always_admitted() {
        let annotator = ScriptedAnnotator::returning(Some("Dog"));
        let throttler = throttler(Duration::from_secs(60), annotator);
        assert!(throttler.try_admit(Instant::now()));
        assert!(!throttler.try_admit(Instant::now()));
    }

    #[tokio::test]
    async fn successful_detection_updates_the_store() {
        let annotator = ScriptedAnnotator::returning(Some("Dog"));
        let signals = Arc::new(SignalStore::new());

        let ticket = signals.next_detection_ticket();
        DetectionThrottler::run_detection(
            annotator.clone(),
            signals.clone(),
            ticket,
            Bytes::from_static(b"jpeg"),
            "ko".to_string(),
        )
        .await;

        let result = signals.detection().await.unwrap();
        assert_eq!(result.label_en, "Dog");
        assert_eq!(result.label_ko, "Dog-ko");
    }

    #[tokio::test]
    async fn failed_detection_keeps_previous_result() {
        let signals = Arc::new(SignalStore::new());

        let ok = ScriptedAnnotator::returning(Some("Cat"));
        let t0 = signals.next_detection_ticket();
        DetectionThrottler::run_detection(
            ok,
            signals.clone(),
            t0,
            Bytes::from_static(b"jpeg"),
            "ko".to_string(),
        )
        .await;

        let failing = ScriptedAnnotator::failing_detect();
        let t1 = signals.next_detection_ticket();
        DetectionThrottler::run_detection(
            failing,
            signals.clone(),
            t1,
            Bytes::from_static(b"jpeg"),
            "ko".to_string(),
        )
        .await;

        assert_eq!(signals.detection().await.unwrap().label_en, "Cat");
    }

    #[tokio::test]
    async fn failed_translation_discards_the_whole_update() {
        let signals = Arc::new(SignalStore::new());

        let failing = ScriptedAnnotator::failing_translate();
        let ticket = signals.next_detection_ticket();
        DetectionThrottler::run_detection(
            failing.clone(),
            signals.clone(),
            ticket,
            Bytes::from_static(b"jpeg"),
            "ko".to_string(),
        )
        .await;

        assert!(signals.detection().await.is_none(), "no partial update");
        assert_eq!(failing.detect_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sentinel_is_not_translated() {
        let signals = Arc::new(SignalStore::new());

        let empty = ScriptedAnnotator::returning(None);
        let ticket = signals.next_detection_ticket();
        DetectionThrottler::run_detection(
            empty.clone(),
            signals.clone(),
            ticket,
            Bytes::from_static(b"jpeg"),
            "ko".to_string(),
        )
        .await;

        let result = signals.detection().await.unwrap();
        assert_eq!(result.label_en, UNKNOWN_LABEL);
        assert_eq!(result.label_ko, UNKNOWN_LABEL_TRANSLATED);
        assert_eq!(empty.translate_calls.load(Ordering::SeqCst), 0);
    }
}
