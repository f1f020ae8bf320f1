//! Range Fetcher Implementation using Reqwest

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{ByteRange, ContentRange, RangeFetcher, RangeResponse},
};
use reqwest::{
    header::{CONTENT_RANGE, RANGE},
    Client, StatusCode,
};
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("pcm-stream-core/", env!("CARGO_PKG_VERSION"));

/// Reqwest-based byte-range fetcher
///
/// Provides:
/// - Connection pooling via reqwest
/// - TLS via rustls
/// - `Content-Range` parsing so the caller learns the asset length
///
/// Each call is a single attempt. Backoff and retry belong to the prefetch
/// scheduler, which knows whether a retry is still worth doing.
#[derive(Debug, Clone)]
pub struct ReqwestRangeFetcher {
    client: Client,
    timeout: Duration,
}

impl ReqwestRangeFetcher {
    /// Create a fetcher with the default 30 s request timeout
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Create a fetcher with a custom request timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(4)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| {
                BridgeError::NotAvailable(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self { client, timeout })
    }

    /// Wrap a preconfigured reqwest client. `timeout` is only used for error
    /// reporting; the client's own timeout applies.
    pub fn with_client(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    fn classify_error(&self, error: reqwest::Error) -> BridgeError {
        if error.is_timeout() {
            BridgeError::Timeout(self.timeout)
        } else if error.is_connect() {
            BridgeError::OperationFailed(format!("Connection failed: {}", error))
        } else {
            BridgeError::OperationFailed(error.to_string())
        }
    }
}

#[async_trait]
impl RangeFetcher for ReqwestRangeFetcher {
    async fn fetch_range(&self, url: &str, range: ByteRange) -> Result<RangeResponse> {
        let header = range.header_value().ok_or_else(|| {
            BridgeError::OperationFailed(format!("Cannot request empty range {}", range))
        })?;

        debug!(range = %range, bytes = range.len(), "Executing range request");

        let response = self
            .client
            .get(url)
            .header(RANGE, header)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, range = %range, "Range request failed");
                self.classify_error(e)
            })?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            warn!(status = status.as_u16(), range = %range, "Range request rejected");
            return Err(BridgeError::Http {
                status: status.as_u16(),
                message: status
                    .canonical_reason()
                    .unwrap_or("unknown status")
                    .to_string(),
            });
        }

        // a server ignoring `Range` answers 200 with the whole asset; the core
        // rejects anything but 206, so the body is never read
        if status != StatusCode::PARTIAL_CONTENT {
            debug!(status = status.as_u16(), range = %range, "Range not honoured, body skipped");
            return Ok(RangeResponse {
                status: status.as_u16(),
                body: Default::default(),
                total_length: None,
            });
        }

        let content_range = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(ContentRange::parse);

        if let Some(served) = content_range {
            if served.first != range.start || served.span_len() > range.len() {
                warn!(
                    requested = %range,
                    first = served.first,
                    last = served.last,
                    "Server returned a different range"
                );
                return Err(BridgeError::OperationFailed(format!(
                    "requested {} but server sent bytes {}-{}",
                    range, served.first, served.last
                )));
            }
        }
        let total_length = content_range.and_then(|served| served.total);

        let body = response.bytes().await.map_err(|e| self.classify_error(e))?;

        debug!(
            status = status.as_u16(),
            received = body.len(),
            total_length = ?total_length,
            "Range request completed"
        );

        Ok(RangeResponse {
            status: status.as_u16(),
            body,
            total_length,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetcher_creation() {
        let fetcher = ReqwestRangeFetcher::new();
        assert!(fetcher.is_ok());
    }

    #[tokio::test]
    async fn test_empty_range_rejected_before_sending() {
        let fetcher = ReqwestRangeFetcher::new().unwrap();
        let result = fetcher
            .fetch_range("http://127.0.0.1:9/never.wav", ByteRange::new(44, 44))
            .await;

        assert!(matches!(result, Err(BridgeError::OperationFailed(_))));
    }
}
