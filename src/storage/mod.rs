pub mod gcs;
pub mod uploader;

pub use gcs::GcsStore;
pub use uploader::{UploadDispatcher, UploadQueue, UploadTask};

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// A durable object visible under the recording prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredObject {
    pub name: String,
    pub url: String,
}

/// Durable object storage backend.
///
/// The catalog of finished recordings is derived by listing the storage
/// prefix on demand; the service never caches it.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload a local file under `remote_key` and return its public URL.
    async fn put_object(&self, local_path: &std::path::Path, remote_key: &str) -> Result<String>;

    /// Mark an uploaded object publicly readable. Best-effort: callers log
    /// failures but do not treat them as upload failures.
    async fn make_public(&self, remote_key: &str) -> Result<()>;

    /// List objects under a key prefix.
    async fn list_objects(&self, prefix: &str) -> Result<Vec<StoredObject>>;
}
