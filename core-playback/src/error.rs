//! # Playback Error Types
//!
//! Error taxonomy for the PCM streaming engine.
//!
//! Fatal errors ([`PlaybackError::is_fatal`]) stop a stream before it starts
//! and are returned from `StreamingService::open`. Transient errors are
//! absorbed by the tick loop: the fetch is retried with backoff and no cursor
//! moves.

use bridge_traits::BridgeError;
use thiserror::Error;

/// Errors that can occur while streaming a PCM asset.
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // Format Errors
    // ========================================================================
    /// The 44-byte preamble failed tag or consistency validation.
    #[error("Malformed WAV header: {0}")]
    MalformedHeader(String),

    // ========================================================================
    // Transfer Errors
    // ========================================================================
    /// A range request failed, timed out, or returned an unusable response.
    #[error("Range fetch failed: {0}")]
    FetchFailure(String),

    /// A chunk arrived shorter than requested, or not sample/frame aligned.
    #[error("Truncated chunk: {0}")]
    TruncatedChunk(String),

    /// Error bubbled up from a host bridge outside the tick loop.
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    // ========================================================================
    // Buffer Errors
    // ========================================================================
    /// Writing the chunk would overwrite frames the engine has not played yet.
    #[error(
        "Buffer overrun: write of {frames} frames at {write_start} would pass read floor {read_floor} + capacity {capacity_frames}"
    )]
    BufferOverrun {
        write_start: i64,
        frames: u64,
        read_floor: i64,
        capacity_frames: u64,
    },

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// Streaming configuration failed validation.
    #[error("Invalid streaming configuration: {0}")]
    InvalidConfig(String),

    /// Internal error (should not occur in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlaybackError {
    /// Returns `true` if the tick loop retries after this error.
    pub fn is_transient(&self) -> bool {
        match self {
            PlaybackError::FetchFailure(_)
            | PlaybackError::TruncatedChunk(_)
            | PlaybackError::BufferOverrun { .. } => true,
            PlaybackError::Bridge(err) => err.is_retryable(),
            _ => false,
        }
    }

    /// Returns `true` if the stream cannot be started or continued.
    pub fn is_fatal(&self) -> bool {
        !self.is_transient()
    }

    /// Returns `true` if this error is due to network issues.
    pub fn is_network_error(&self) -> bool {
        matches!(
            self,
            PlaybackError::FetchFailure(_) | PlaybackError::Bridge(_)
        )
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
