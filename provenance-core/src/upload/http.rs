//! HTTP upload provider (multipart POST to a pinning or add endpoint).

use std::time::Instant;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument, warn};

use super::config::ProviderConfig;
use super::response::parse_upload_response;
use super::UploadProvider;
use crate::cid::Cid;
use crate::error::ProviderError;
use crate::mask::mask;

pub struct HttpUploadProvider {
    client: Client,
    config: ProviderConfig,
}

impl HttpUploadProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                ProviderError::permanent(&config.name, format!("failed to create HTTP client: {e}"))
            })?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

#[async_trait]
impl UploadProvider for HttpUploadProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    #[instrument(skip(self, content), fields(provider = %self.config.name, bytes = content.len()))]
    async fn submit(&self, content: &[u8]) -> Result<Cid, ProviderError> {
        let name = self.config.name.as_str();
        let start = Instant::now();

        let part = Part::bytes(content.to_vec()).file_name("content");
        let form = Form::new().part("file", part);
        let request = self
            .config
            .auth
            .apply(self.client.post(&self.config.endpoint))
            .multipart(form);

        let response = request.send().await.map_err(|e| {
            let latency_ms = start.elapsed().as_millis() as u64;
            let transient = is_transient_error(&e);
            let e = e.without_url();
            if transient {
                warn!(error = %e, latency_ms, "Transient upload error");
                ProviderError::transient(name, format!("request failed: {e}"))
            } else {
                warn!(error = %e, latency_ms, "Upload request failed");
                ProviderError::permanent(name, format!("request failed: {e}"))
            }
        })?;

        let status = response.status();
        debug!(status = %status, "Received HTTP response");

        if !status.is_success() {
            let latency_ms = start.elapsed().as_millis() as u64;
            let message = format!("endpoint returned status {status}");
            return if is_transient_status(status) {
                warn!(status = %status, latency_ms, "Transient HTTP status");
                Err(ProviderError::transient(name, message))
            } else {
                warn!(status = %status, latency_ms, "Permanent HTTP error");
                Err(ProviderError::permanent(name, message))
            };
        }

        let body = response.text().await.map_err(|e| {
            ProviderError::transient(name, format!("failed to read response body: {e}"))
        })?;

        let (shape, record) = parse_upload_response(&body).ok_or_else(|| {
            ProviderError::permanent(name, "response carried no content identifier")
        })?;

        debug!(
            cid = %mask(record.cid.as_str()),
            shape = ?shape,
            latency_ms = start.elapsed().as_millis() as u64,
            "Upload accepted"
        );
        Ok(record.cid)
    }
}

/// Check if a reqwest error is transient and should be retried.
///
/// Request and body failures count only when an I/O error sits underneath.
pub fn is_transient_error(error: &reqwest::Error) -> bool {
    if error.is_timeout() || error.is_connect() {
        return true;
    }
    (error.is_request() || error.is_body()) && has_io_source(error)
}

fn has_io_source(error: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(error);
    while let Some(err) = source {
        if err.is::<std::io::Error>() {
            return true;
        }
        source = err.source();
    }
    false
}

/// 408, 429 and every 5xx are worth retrying; other statuses are not.
pub fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}
