//! Byte-Range HTTP Abstraction
//!
//! Provides the single network capability the streaming core needs: fetching
//! a half-open byte range of a remote asset.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;

/// HTTP status code for a successful range request.
pub const STATUS_PARTIAL_CONTENT: u16 = 206;

/// Half-open byte range `[start, end)` within a remote asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Range of `len` bytes beginning at `start`.
    pub fn with_len(start: u64, len: u64) -> Self {
        Self {
            start,
            end: start.saturating_add(len),
        }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Value for the `Range` request header. HTTP ranges are inclusive, so
    /// the last byte is `end - 1`.
    ///
    /// Returns `None` for an empty range, which has no HTTP representation.
    pub fn header_value(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        Some(format!("bytes={}-{}", self.start, self.end - 1))
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Parsed `Content-Range` response header (`bytes 0-43/1000`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    /// First byte position (inclusive)
    pub first: u64,
    /// Last byte position (inclusive)
    pub last: u64,
    /// Complete length of the asset, `None` when the server sent `*`
    pub total: Option<u64>,
}

impl ContentRange {
    /// Parse a `Content-Range` header value.
    ///
    /// Unsatisfied ranges (`bytes */1000`) and malformed values yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        let rest = value.trim().strip_prefix("bytes")?.trim_start();
        let (span, total) = rest.split_once('/')?;
        let (first, last) = span.trim().split_once('-')?;
        let first = first.trim().parse::<u64>().ok()?;
        let last = last.trim().parse::<u64>().ok()?;
        if last < first {
            return None;
        }

        let total = match total.trim() {
            "*" => None,
            n => Some(n.parse::<u64>().ok()?),
        };

        Some(Self { first, last, total })
    }

    /// Number of bytes covered; never zero since both ends are inclusive.
    pub fn span_len(&self) -> u64 {
        self.last - self.first + 1
    }
}

/// Response to a byte-range request.
#[derive(Debug, Clone)]
pub struct RangeResponse {
    /// HTTP status code
    pub status: u16,
    /// Body bytes as delivered by the server
    pub body: Bytes,
    /// Complete asset length from `Content-Range`, when the server reported it
    pub total_length: Option<u64>,
}

impl RangeResponse {
    /// A `206 Partial Content` response.
    pub fn partial(body: impl Into<Bytes>, total_length: Option<u64>) -> Self {
        Self {
            status: STATUS_PARTIAL_CONTENT,
            body: body.into(),
            total_length,
        }
    }

    /// Whether the server honoured the range request.
    pub fn is_partial_content(&self) -> bool {
        self.status == STATUS_PARTIAL_CONTENT
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// Async byte-range fetcher
///
/// The streaming core calls this once per chunk and never concurrently for
/// the same stream. Implementations should:
/// - send a `Range` header built from [`ByteRange::header_value`]
/// - report the real status code instead of failing on non-206 success codes
///   (the core decides what a usable response is)
/// - map transport failures and HTTP error statuses to
///   [`BridgeError`](crate::error::BridgeError)
///
/// Retries are the caller's business; implementations should attempt each
/// request once.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::http::{ByteRange, RangeFetcher};
///
/// async fn fetch_header(fetcher: &dyn RangeFetcher, url: &str) -> Result<Bytes> {
///     let response = fetcher.fetch_range(url, ByteRange::new(0, 44)).await?;
///     Ok(response.body)
/// }
/// ```
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RangeFetcher: Send + Sync {
    /// Fetch `range` of the asset at `url`.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Network connection fails
    /// - The server answers with an error status (4xx/5xx)
    /// - Reading the body fails
    async fn fetch_range(&self, url: &str, range: ByteRange) -> Result<RangeResponse>;
}
