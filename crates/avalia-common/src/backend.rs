use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::StatusCode;
use serde::Deserialize;
use tracing::warn;

use crate::api::{
    AnalyzeSelectedRequest, AnalyzeSelectedResponse, BulkDeleteRequest, DeleteResponse,
    LatestPromptResponse, LatestRawResponse, LatestResponseResponse, ResultListResponse,
};

#[derive(Clone, Debug)]
pub struct BackendConfig {
    pub base_url: String,
    pub default_timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_error_body_bytes: usize,
}

impl BackendConfig {
    pub fn from_env() -> Self {
        let base_url = std::env::var("AVALIA_BACKEND_URL")
            .unwrap_or_else(|_| "http://localhost:8000".to_string());

        let default_timeout = std::env::var("AVALIA_BACKEND_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(120));

        let max_retries = std::env::var("AVALIA_BACKEND_MAX_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(2);

        let initial_backoff = std::env::var("AVALIA_BACKEND_RETRY_INITIAL_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or_else(|| Duration::from_millis(250));

        let max_backoff = std::env::var("AVALIA_BACKEND_RETRY_MAX_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or_else(|| Duration::from_millis(5_000));

        let max_error_body_bytes = std::env::var("AVALIA_BACKEND_MAX_ERROR_BODY_BYTES")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(8 * 1024);

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            default_timeout,
            max_retries,
            initial_backoff,
            max_backoff,
            max_error_body_bytes,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid response JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("backend returned error: status={status} message={message}")]
    Upstream { status: StatusCode, message: String },

    #[error("backend returned non-JSON error: status={status} body={body}")]
    UpstreamBody { status: StatusCode, body: String },
}

/// HTTP client for the general-analysis backend.
///
/// Endpoint coverage matches the `/general-analysis/*` contract. Transient
/// failures (timeouts, connect errors, 429, 5xx) are retried with capped
/// exponential backoff and jitter.
#[derive(Clone)]
pub struct BackendClient {
    config: BackendConfig,
    http: reqwest::Client,
}

impl BackendClient {
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .user_agent("avalia/general-analysis")
            .build()?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}/general-analysis{}", self.config.base_url, path)
    }

    /// `POST /general-analysis/analyze-selected`.
    ///
    /// The LLM call behind this endpoint can be slow; an optional timeout
    /// override lets callers wait longer than the configured default.
    pub async fn analyze_selected(
        &self,
        request: &AnalyzeSelectedRequest,
        timeout_override: Option<Duration>,
    ) -> Result<AnalyzeSelectedResponse, BackendError> {
        let url = self.url("/analyze-selected");
        let timeout = timeout_override.unwrap_or(self.config.default_timeout);
        self.request_with_retry(|| async {
            let resp = self
                .http
                .post(&url)
                .timeout(timeout)
                .json(request)
                .send()
                .await?;
            self.parse_json_response(resp).await
        })
        .await
    }

    /// `GET /general-analysis/results`.
    pub async fn list_results(&self) -> Result<ResultListResponse, BackendError> {
        let url = self.url("/results");
        self.request_with_retry(|| async {
            let resp = self
                .http
                .get(&url)
                .timeout(self.config.default_timeout)
                .send()
                .await?;
            self.parse_json_response(resp).await
        })
        .await
    }

    /// `DELETE /general-analysis/results/{id}`.
    pub async fn delete_result(&self, result_id: i64) -> Result<DeleteResponse, BackendError> {
        let url = self.url(&format!("/results/{result_id}"));
        self.request_with_retry(|| async {
            let resp = self
                .http
                .delete(&url)
                .timeout(self.config.default_timeout)
                .send()
                .await?;
            self.parse_json_response(resp).await
        })
        .await
    }

    /// Bulk `DELETE /general-analysis/results` with `{result_ids}` body.
    pub async fn delete_results(&self, result_ids: &[i64]) -> Result<DeleteResponse, BackendError> {
        let url = self.url("/results");
        let body = BulkDeleteRequest {
            result_ids: result_ids.to_vec(),
        };
        self.request_with_retry(|| {
            let body = body.clone();
            let url = url.clone();
            async move {
                let resp = self
                    .http
                    .delete(&url)
                    .timeout(self.config.default_timeout)
                    .json(&body)
                    .send()
                    .await?;
                self.parse_json_response(resp).await
            }
        })
        .await
    }

    /// `DELETE /general-analysis/results/all`.
    pub async fn delete_all_results(&self) -> Result<DeleteResponse, BackendError> {
        let url = self.url("/results/all");
        self.request_with_retry(|| async {
            let resp = self
                .http
                .delete(&url)
                .timeout(self.config.default_timeout)
                .send()
                .await?;
            self.parse_json_response(resp).await
        })
        .await
    }

    /// `GET /general-analysis/latest-prompt`.
    pub async fn latest_prompt(&self) -> Result<LatestPromptResponse, BackendError> {
        self.get_json(self.url("/latest-prompt")).await
    }

    /// `GET /general-analysis/latest-response`.
    pub async fn latest_response(&self) -> Result<LatestResponseResponse, BackendError> {
        self.get_json(self.url("/latest-response")).await
    }

    /// `GET /general-analysis/latest-raw-response`.
    pub async fn latest_raw_response(&self) -> Result<LatestRawResponse, BackendError> {
        self.get_json(self.url("/latest-raw-response")).await
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: String) -> Result<T, BackendError> {
        self.request_with_retry(|| {
            let url = url.clone();
            async move {
                let resp = self
                    .http
                    .get(&url)
                    .timeout(self.config.default_timeout)
                    .send()
                    .await?;
                self.parse_json_response(resp).await
            }
        })
        .await
    }

    async fn parse_json_response<T: for<'de> Deserialize<'de>>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, BackendError> {
        if resp.status().is_success() {
            let json = resp.json::<T>().await?;
            return Ok(json);
        }
        Err(self.to_upstream_error(resp).await)
    }

    async fn to_upstream_error(&self, resp: reqwest::Response) -> BackendError {
        let status = resp.status();
        let body = read_limited_text(resp, self.config.max_error_body_bytes).await;
        if let Ok(parsed) = serde_json::from_str::<BackendErrorEnvelope>(&body) {
            if let Some(message) = parsed.detail.or(parsed.error).or(parsed.message) {
                return BackendError::Upstream { status, message };
            }
        }
        BackendError::UpstreamBody { status, body }
    }

    async fn request_with_retry<T, Fut, F>(&self, mut f: F) -> Result<T, BackendError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, BackendError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match f().await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    if attempt > self.config.max_retries || !should_retry(&e) {
                        return Err(e);
                    }
                    let delay = backoff_delay(
                        self.config.initial_backoff,
                        self.config.max_backoff,
                        attempt - 1,
                    );
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "backend request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

fn should_retry(err: &BackendError) -> bool {
    match err {
        BackendError::Request(e) => e.is_timeout() || e.is_connect() || e.is_body() || e.is_decode(),
        BackendError::Upstream { status, .. } | BackendError::UpstreamBody { status, .. } => {
            *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
        }
        BackendError::InvalidJson(_) => false,
    }
}

fn backoff_delay(initial: Duration, max: Duration, exponent: u32) -> Duration {
    let mult = 1u128.checked_shl(exponent).unwrap_or(u128::MAX);
    let base_ms = initial.as_millis().saturating_mul(mult);
    let capped_ms = std::cmp::min(base_ms, max.as_millis()) as u64;
    let jitter_cap = std::cmp::max(1, capped_ms / 4);
    Duration::from_millis(capped_ms.saturating_add(pseudo_jitter_ms(jitter_cap)))
}

fn pseudo_jitter_ms(max_inclusive: u64) -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0));
    (now.subsec_nanos() as u64) % (max_inclusive + 1)
}

async fn read_limited_text(resp: reqwest::Response, max_bytes: usize) -> String {
    match resp.bytes().await {
        Ok(mut b) => {
            if b.len() > max_bytes {
                b.truncate(max_bytes);
            }
            String::from_utf8_lossy(&b).to_string()
        }
        Err(e) => {
            warn!(error = %e, "failed to read backend error body");
            "<failed to read error body>".to_string()
        }
    }
}

/// The backend reports errors as `{detail}` (FastAPI style), `{error}` or
/// `{message}` depending on the route; accept any of them.
#[derive(Debug, Deserialize)]
struct BackendErrorEnvelope {
    detail: Option<String>,
    error: Option<String>,
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_capped_and_jittered() {
        let initial = Duration::from_millis(200);
        let max = Duration::from_millis(1_000);
        for exponent in 0..10 {
            let d = backoff_delay(initial, max, exponent);
            // cap plus at most 25% jitter
            assert!(d >= Duration::from_millis(200), "delay too small: {d:?}");
            assert!(d <= Duration::from_millis(1_250), "delay exceeds cap: {d:?}");
        }
    }

    #[test]
    fn error_envelope_accepts_known_shapes() {
        let detail: BackendErrorEnvelope =
            serde_json::from_str(r#"{"detail": "not found"}"#).unwrap();
        assert_eq!(detail.detail.as_deref(), Some("not found"));

        let message: BackendErrorEnvelope =
            serde_json::from_str(r#"{"message": "boom", "success": false}"#).unwrap();
        assert_eq!(message.message.as_deref(), Some("boom"));
    }

    #[test]
    fn trailing_slash_is_trimmed_from_base_url() {
        let config = BackendConfig {
            base_url: "http://localhost:8000".to_string(),
            default_timeout: Duration::from_secs(1),
            max_retries: 0,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(1),
            max_error_body_bytes: 1024,
        };
        let client = BackendClient::new(config).unwrap();
        assert_eq!(
            client.url("/results/all"),
            "http://localhost:8000/general-analysis/results/all"
        );
    }
}
