//! Google Cloud Storage backend over the JSON API.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use super::{ObjectStore, StoredObject};
use crate::config::StorageConfig;

const UPLOAD_BASE: &str = "https://storage.googleapis.com/upload/storage/v1/b";
const API_BASE: &str = "https://storage.googleapis.com/storage/v1/b";
const PUBLIC_BASE: &str = "https://storage.googleapis.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct GcsStore {
    client: reqwest::Client,
    bucket: String,
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    items: Vec<ListItem>,
}

#[derive(Debug, Deserialize)]
struct ListItem {
    name: String,
}

impl GcsStore {
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build storage HTTP client")?;

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            access_token: config.access_token.clone(),
        })
    }

    fn public_url(&self, key: &str) -> String {
        format!("{PUBLIC_BASE}/{}/{}", self.bucket, key)
    }
}

#[async_trait::async_trait]
impl ObjectStore for GcsStore {
    async fn put_object(&self, local_path: &Path, remote_key: &str) -> Result<String> {
        let body = tokio::fs::read(local_path)
            .await
            .with_context(|| format!("failed to read {}", local_path.display()))?;

        let url = format!(
            "{UPLOAD_BASE}/{}/o?uploadType=media&name={}",
            self.bucket,
            urlencode(remote_key)
        );

        self.client
            .post(&url)
            .bearer_auth(&self.access_token)
            .header("content-type", "video/x-msvideo")
            .body(body)
            .send()
            .await
            .context("storage upload request failed")?
            .error_for_status()
            .context("storage upload rejected")?;

        info!(key = remote_key, bucket = %self.bucket, "object uploaded");

        Ok(self.public_url(remote_key))
    }

    async fn make_public(&self, remote_key: &str) -> Result<()> {
        let url = format!(
            "{API_BASE}/{}/o/{}/acl",
            self.bucket,
            urlencode(remote_key)
        );

        self.client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({ "entity": "allUsers", "role": "READER" }))
            .send()
            .await
            .context("ACL request failed")?
            .error_for_status()
            .context("ACL request rejected")?;

        Ok(())
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<StoredObject>> {
        let url = format!(
            "{API_BASE}/{}/o?prefix={}",
            self.bucket,
            urlencode(prefix)
        );

        let response: ListResponse = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .context("storage list request failed")?
            .error_for_status()
            .context("storage list rejected")?
            .json()
            .await
            .context("failed to decode storage listing")?;

        Ok(response
            .items
            .into_iter()
            .map(|item| StoredObject {
                url: self.public_url(&item.name),
                name: item.name,
            })
            .collect())
    }
}

/// Percent-encode an object key for use in a URL path or query component.
fn urlencode(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urlencode_escapes_slashes() {
        assert_eq!(urlencode("recordings/clip.avi"), "recordings%2Fclip.avi");
        assert_eq!(urlencode("plain-name_1.avi"), "plain-name_1.avi");
    }
}
