//! HTTP bucket object store: PUT/GET/HEAD against a base URL.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;

use lessonvault_shared::{LessonVaultError, Result};

use crate::{ObjectMeta, ObjectStore};

/// User-Agent string for store requests.
const USER_AGENT: &str = concat!("LessonVault/", env!("CARGO_PKG_VERSION"));

/// Request timeout for store operations.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Object store speaking plain HTTP verbs against a bucket base URL
/// (S3-compatible gateways and test servers alike).
pub struct HttpObjectStore {
    client: Client,
    base_url: String,
}

impl HttpObjectStore {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LessonVaultError::Storage(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let url = self.url(path);
        let response = self
            .client
            .put(&url)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| LessonVaultError::Storage(format!("{url}: {e}")))?;

        if !response.status().is_success() {
            return Err(LessonVaultError::Storage(format!(
                "{url}: HTTP {}",
                response.status()
            )));
        }
        debug!(path, bytes = bytes.len(), "uploaded object");
        Ok(())
    }

    async fn put_file(&self, path: &str, local: &Path) -> Result<u64> {
        let bytes = tokio::fs::read(local)
            .await
            .map_err(|e| LessonVaultError::io(local, e))?;
        let size = bytes.len() as u64;
        self.put(path, &bytes).await?;
        Ok(size)
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        let url = self.url(path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| LessonVaultError::Storage(format!("{url}: {e}")))?;

        if !response.status().is_success() {
            return Err(LessonVaultError::Storage(format!(
                "{url}: HTTP {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| LessonVaultError::Storage(format!("{url}: body read failed: {e}")))?;
        Ok(bytes.to_vec())
    }

    async fn head(&self, path: &str) -> Result<Option<ObjectMeta>> {
        let url = self.url(path);
        let response = self
            .client
            .head(&url)
            .send()
            .await
            .map_err(|e| LessonVaultError::Storage(format!("{url}: {e}")))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => {
                let size = response.content_length().ok_or_else(|| {
                    LessonVaultError::Storage(format!("{url}: HEAD without Content-Length"))
                })?;
                Ok(Some(ObjectMeta { size }))
            }
            s => Err(LessonVaultError::Storage(format!("{url}: HTTP {s}"))),
        }
    }

    async fn ping(&self) -> Result<()> {
        // Any HTTP response means the store is reachable; only transport
        // failures count as unreachable.
        let url = self.url("");
        self.client
            .head(&url)
            .send()
            .await
            .map_err(|e| LessonVaultError::Storage(format!("store unreachable: {url}: {e}")))?;
        Ok(())
    }
}
