//! Label detection and translation over the Google REST APIs.

use anyhow::{Context, Result};
use base64::Engine;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::DetectionConfig;

const VISION_URL: &str = "https://vision.googleapis.com/v1/images:annotate";
const TRANSLATE_URL: &str = "https://translation.googleapis.com/language/translate/v2";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// External detection + translation collaborator.
///
/// `detect` returns the best label for the image, or `None` when the service
/// saw nothing it could name. Latency is unbounded from the caller's point
/// of view; callers must not hold the ingestion path open across it.
#[async_trait::async_trait]
pub trait Annotator: Send + Sync {
    async fn detect(&self, jpeg: &[u8]) -> Result<Option<String>>;
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String>;
}

pub struct GoogleAnnotator {
    client: reqwest::Client,
    vision_api_key: String,
    translate_api_key: String,
}

#[derive(Debug, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateResult>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateResult {
    #[serde(default)]
    localized_object_annotations: Vec<ObjectAnnotation>,
    #[serde(default)]
    label_annotations: Vec<LabelAnnotation>,
}

#[derive(Debug, Deserialize)]
struct ObjectAnnotation {
    name: String,
}

#[derive(Debug, Deserialize)]
struct LabelAnnotation {
    description: String,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    data: TranslateData,
}

#[derive(Debug, Deserialize)]
struct TranslateData {
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Translation {
    translated_text: String,
}

impl GoogleAnnotator {
    pub fn new(config: &DetectionConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build vision HTTP client")?;

        Ok(Self {
            client,
            vision_api_key: config.vision_api_key.clone(),
            translate_api_key: config.translate_api_key.clone(),
        })
    }
}

/// Tie-break between the two annotation kinds: a localized object is more
/// specific than a whole-image label, so it wins; within each kind the
/// service orders by confidence and the first entry is taken.
fn best_label(result: &AnnotateResult) -> Option<String> {
    result
        .localized_object_annotations
        .first()
        .map(|o| o.name.clone())
        .or_else(|| {
            result
                .label_annotations
                .first()
                .map(|l| l.description.clone())
        })
}

#[async_trait::async_trait]
impl Annotator for GoogleAnnotator {
    async fn detect(&self, jpeg: &[u8]) -> Result<Option<String>> {
        let payload = serde_json::json!({
            "requests": [{
                "image": { "content": base64::engine::general_purpose::STANDARD.encode(jpeg) },
                "features": [
                    { "type": "OBJECT_LOCALIZATION" },
                    { "type": "LABEL_DETECTION" },
                ],
            }]
        });

        let response: AnnotateResponse = self
            .client
            .post(format!("{VISION_URL}?key={}", self.vision_api_key))
            .json(&payload)
            .send()
            .await
            .context("vision request failed")?
            .error_for_status()
            .context("vision request rejected")?
            .json()
            .await
            .context("failed to decode vision response")?;

        let label = response.responses.first().and_then(best_label);
        debug!(label = ?label, "detection completed");

        Ok(label)
    }

    async fn translate(&self, text: &str, target_lang: &str) -> Result<String> {
        let response: TranslateResponse = self
            .client
            .post(format!("{TRANSLATE_URL}?key={}", self.translate_api_key))
            .form(&[("q", text), ("target", target_lang)])
            .send()
            .await
            .context("translate request failed")?
            .error_for_status()
            .context("translate request rejected")?
            .json()
            .await
            .context("failed to decode translate response")?;

        response
            .data
            .translations
            .into_iter()
            .next()
            .map(|t| t.translated_text)
            .context("translate response contained no translations")
    }
}
