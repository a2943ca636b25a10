//! Rate-limited, retrying HTTP client for the discovery/caption source.

use std::path::Path;
use std::time::{Duration, Instant};

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use lessonvault_shared::{ErrorClass, LessonVaultError, Result};

/// User-Agent string for source requests.
const USER_AGENT: &str = concat!("LessonVault/", env!("CARGO_PKG_VERSION"));

/// Base delay for exponential backoff between retries.
const BACKOFF_BASE: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Settings for a [`SourceClient`].
#[derive(Debug, Clone)]
pub struct SourceClientConfig {
    /// Minimum delay since the previous request *completed*.
    pub rate_limit: Duration,
    /// Retry bound for transient failures.
    pub max_retries: u32,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Classify HTTP 404/410 as permanent (true) or transient (false).
    pub gone_is_permanent: bool,
}

impl Default for SourceClientConfig {
    fn default() -> Self {
        Self {
            rate_limit: Duration::from_millis(500),
            max_retries: 3,
            request_timeout: Duration::from_secs(30),
            gone_is_permanent: true,
        }
    }
}

// ---------------------------------------------------------------------------
// SourceClient
// ---------------------------------------------------------------------------

/// HTTP client wrapper that serializes all source requests through a single
/// rate gate. Workers share one instance; the gate guarantees the configured
/// minimum delay between any two requests, measured from completion of the
/// previous one.
pub struct SourceClient {
    http: Client,
    config: SourceClientConfig,
    /// Completion instant of the most recent request.
    gate: Mutex<Option<Instant>>,
}

impl SourceClient {
    /// Create a new client with the given configuration.
    pub fn new(config: SourceClientConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                LessonVaultError::transient(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            http,
            config,
            gate: Mutex::new(None),
        })
    }

    /// Fetch `url` and deserialize the JSON response body.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.execute(url).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| LessonVaultError::permanent(format!("{url}: invalid JSON body: {e}")))
    }

    /// Fetch `url` and return the response body as text.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.execute(url).await?;
        response
            .text()
            .await
            .map_err(|e| LessonVaultError::transient(format!("{url}: body read failed: {e}")))
    }

    /// Fetch `url` and write the body to `dest`. Returns the byte count.
    ///
    /// The write is atomic (temp file then rename), so `dest` never holds a
    /// partially downloaded body after a crash.
    pub async fn download_to_file(&self, url: &str, dest: &Path) -> Result<u64> {
        let response = self.execute(url).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| LessonVaultError::transient(format!("{url}: body read failed: {e}")))?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LessonVaultError::io(parent, e))?;
        }
        let tmp = dest.with_extension("part");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| LessonVaultError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, dest)
            .await
            .map_err(|e| LessonVaultError::io(dest, e))?;

        debug!(url, dest = %dest.display(), bytes = bytes.len(), "downloaded file");
        Ok(bytes.len() as u64)
    }

    /// Perform one rate-gated GET with bounded retry on transient failures.
    ///
    /// The gate mutex is held across the delay, the request, and any backoff,
    /// so requests from concurrent workers are fully serialized.
    async fn execute(&self, url: &str) -> Result<Response> {
        let mut last_done = self.gate.lock().await;

        if let Some(done) = *last_done {
            let since = done.elapsed();
            if since < self.config.rate_limit {
                tokio::time::sleep(self.config.rate_limit - since).await;
            }
        }

        let mut attempt: u32 = 0;
        let result = loop {
            match self.try_get(url).await {
                Ok(response) => break Ok(response),
                Err(e) if e.class() == ErrorClass::Transient && attempt < self.config.max_retries => {
                    let backoff = BACKOFF_BASE * 2u32.saturating_pow(attempt);
                    warn!(url, attempt, error = %e, backoff_ms = backoff.as_millis() as u64, "transient source failure, retrying");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => break Err(e),
            }
        };

        *last_done = Some(Instant::now());
        result
    }

    /// Single GET attempt with status classification.
    async fn try_get(&self, url: &str) -> Result<Response> {
        let response = self.http.get(url).send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                LessonVaultError::transient(format!("{url}: {e}"))
            } else {
                LessonVaultError::permanent(format!("{url}: {e}"))
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        Err(self.classify_status(url, status))
    }

    /// Map an HTTP error status onto the retry taxonomy.
    fn classify_status(&self, url: &str, status: StatusCode) -> LessonVaultError {
        let message = format!("{url}: HTTP {status}");
        match status {
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                if self.config.gone_is_permanent {
                    LessonVaultError::permanent(message)
                } else {
                    LessonVaultError::transient(message)
                }
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                LessonVaultError::permanent(message)
            }
            StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => {
                LessonVaultError::transient(message)
            }
            s if s.is_server_error() => LessonVaultError::transient(message),
            _ => LessonVaultError::permanent(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_config() -> SourceClientConfig {
        SourceClientConfig {
            rate_limit: Duration::from_millis(0),
            max_retries: 2,
            request_timeout: Duration::from_secs(5),
            gone_is_permanent: true,
        }
    }

    #[tokio::test]
    async fn enforces_minimum_delay_between_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let client = SourceClient::new(SourceClientConfig {
            rate_limit: Duration::from_millis(120),
            ..fast_config()
        })
        .unwrap();

        let url = format!("{}/ping", server.uri());
        let started = Instant::now();
        client.get_text(&url).await.unwrap();
        client.get_text(&url).await.unwrap();
        client.get_text(&url).await.unwrap();

        // Two inter-request gaps of at least 120ms each.
        assert!(started.elapsed() >= Duration::from_millis(240));
    }

    #[tokio::test]
    async fn retries_server_errors_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("recovered"))
            .mount(&server)
            .await;

        let client = SourceClient::new(fast_config()).unwrap();
        let body = client
            .get_text(&format!("{}/flaky", server.uri()))
            .await
            .unwrap();
        assert_eq!(body, "recovered");
    }

    #[tokio::test]
    async fn exhausted_retries_surface_transient_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = SourceClient::new(fast_config()).unwrap();
        let err = client
            .get_text(&format!("{}/down", server.uri()))
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Transient);

        // 1 initial + 2 retries.
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn not_found_is_permanent_and_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = SourceClient::new(fast_config()).unwrap();
        let err = client
            .get_text(&format!("{}/missing", server.uri()))
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Permanent);
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn gone_classification_is_configurable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/removed"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;

        let client = SourceClient::new(SourceClientConfig {
            gone_is_permanent: false,
            ..fast_config()
        })
        .unwrap();
        let err = client
            .get_text(&format!("{}/removed", server.uri()))
            .await
            .unwrap_err();

        // Retried as transient, then surfaced as transient.
        assert_eq!(err.class(), ErrorClass::Transient);
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn request_timeout_is_retried_as_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(408))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_body_string("eventually"))
            .mount(&server)
            .await;

        let client = SourceClient::new(fast_config()).unwrap();
        let body = client
            .get_text(&format!("{}/slow", server.uri()))
            .await
            .unwrap();
        assert_eq!(body, "eventually");
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn download_writes_file_and_reports_size() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/caption.vtt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("WEBVTT\n\n"))
            .mount(&server)
            .await;

        let dir = std::env::temp_dir().join(format!("lv-client-{}", std::process::id()));
        let dest = dir.join("caption.vtt");

        let client = SourceClient::new(fast_config()).unwrap();
        let size = client
            .download_to_file(&format!("{}/caption.vtt", server.uri()), &dest)
            .await
            .unwrap();

        assert_eq!(size, 8);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "WEBVTT\n\n");
        // The temp file was renamed away.
        assert!(!dest.with_extension("part").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn download_replaces_leftover_partial_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/media.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 64]))
            .mount(&server)
            .await;

        let dir = std::env::temp_dir().join(format!("lv-client-part-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let dest = dir.join("media.bin");
        // Leftover from an interrupted transfer.
        std::fs::write(dest.with_extension("part"), vec![7u8; 10]).unwrap();

        let client = SourceClient::new(fast_config()).unwrap();
        let size = client
            .download_to_file(&format!("{}/media.bin", server.uri()), &dest)
            .await
            .unwrap();

        assert_eq!(size, 64);
        assert_eq!(std::fs::metadata(&dest).unwrap().len(), 64);
        assert!(!dest.with_extension("part").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
