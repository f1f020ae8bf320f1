//! # Streaming Configuration
//!
//! Configuration types for the PCM streaming engine.

use crate::error::PlaybackError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Streaming engine configuration.
///
/// Window, threshold and chunk sizes are expressed in seconds of audio and
/// converted to frames/bytes once the stream's format is known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Ring buffer length in seconds of audio.
    ///
    /// Capacity in frames is `sample_rate_hz * window_seconds`.
    ///
    /// Default: 30 seconds.
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u32,

    /// Headroom (loaded minus played) at or above which no fetch is issued.
    ///
    /// Default: 20 seconds.
    #[serde(default = "default_headroom_threshold_seconds")]
    pub headroom_threshold_seconds: u32,

    /// Size of a regular fetch in seconds of audio.
    ///
    /// Default: 5 seconds.
    #[serde(default = "default_steady_chunk_seconds")]
    pub steady_chunk_seconds: u32,

    /// Multiplier applied to the first fetch after open or resync so playback
    /// starts with a useful lead.
    ///
    /// Default: 4 (a 20 second first chunk with the default steady chunk).
    #[serde(default = "default_initial_chunk_multiplier")]
    pub initial_chunk_multiplier: u32,

    /// Wall-clock vs. playback divergence that triggers a hard resync.
    ///
    /// Default: 5 seconds.
    #[serde(default = "default_drift_threshold")]
    pub drift_threshold: Duration,

    /// Whether drift detection is armed at all.
    ///
    /// Underrun recovery runs regardless.
    ///
    /// Default: true.
    #[serde(default = "default_enable_resync")]
    pub enable_resync: bool,

    /// Maximum duration of a single range request.
    ///
    /// Default: 30 seconds.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout: Duration,

    /// Delay before the first retry after a transient failure. Doubles per
    /// consecutive failure.
    ///
    /// Default: 250 milliseconds.
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay: Duration,

    /// Upper bound for the retry delay.
    ///
    /// Default: 8 seconds.
    #[serde(default = "default_retry_max_delay")]
    pub retry_max_delay: Duration,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            window_seconds: default_window_seconds(),
            headroom_threshold_seconds: default_headroom_threshold_seconds(),
            steady_chunk_seconds: default_steady_chunk_seconds(),
            initial_chunk_multiplier: default_initial_chunk_multiplier(),
            drift_threshold: default_drift_threshold(),
            enable_resync: default_enable_resync(),
            fetch_timeout: default_fetch_timeout(),
            retry_base_delay: default_retry_base_delay(),
            retry_max_delay: default_retry_max_delay(),
        }
    }
}

impl StreamingConfig {
    /// Create a configuration optimized for low latency.
    ///
    /// - Short window (12s)
    /// - Small chunks, quicker first byte
    /// - Tighter drift threshold
    pub fn low_latency() -> Self {
        Self {
            window_seconds: 12,
            headroom_threshold_seconds: 6,
            steady_chunk_seconds: 2,
            initial_chunk_multiplier: 3,
            drift_threshold: Duration::from_secs(3),
            ..Default::default()
        }
    }

    /// Create a configuration for unreliable networks.
    ///
    /// - Long window (60s)
    /// - Larger chunks, fewer requests
    /// - Relaxed drift threshold
    pub fn high_stability() -> Self {
        Self {
            window_seconds: 60,
            headroom_threshold_seconds: 40,
            steady_chunk_seconds: 10,
            initial_chunk_multiplier: 4,
            drift_threshold: Duration::from_secs(8),
            retry_max_delay: Duration::from_secs(15),
            ..Default::default()
        }
    }

    /// Validate configuration values.
    ///
    /// Besides positivity checks this guarantees that no planned write can
    /// exceed the window: a fetch is only issued below the threshold, so the
    /// largest possible headroom after a write is `threshold + steady_chunk`,
    /// and right after open or resync it is `steady_chunk * multiplier`.
    pub fn validate(&self) -> Result<(), String> {
        if self.window_seconds == 0 {
            return Err("window_seconds must be > 0".to_string());
        }

        if self.steady_chunk_seconds == 0 {
            return Err("steady_chunk_seconds must be > 0".to_string());
        }

        if self.initial_chunk_multiplier == 0 {
            return Err("initial_chunk_multiplier must be >= 1".to_string());
        }

        if self.headroom_threshold_seconds >= self.window_seconds {
            return Err("headroom_threshold_seconds must be below window_seconds".to_string());
        }

        if self
            .headroom_threshold_seconds
            .checked_add(self.steady_chunk_seconds)
            .map_or(true, |top| top > self.window_seconds)
        {
            return Err(
                "headroom_threshold_seconds + steady_chunk_seconds cannot exceed window_seconds"
                    .to_string(),
            );
        }

        if self.steady_chunk_seconds.saturating_mul(self.initial_chunk_multiplier)
            > self.window_seconds
        {
            return Err(
                "steady_chunk_seconds * initial_chunk_multiplier cannot exceed window_seconds"
                    .to_string(),
            );
        }

        if self.drift_threshold.is_zero() {
            return Err("drift_threshold must be > 0".to_string());
        }

        if self.fetch_timeout.is_zero() {
            return Err("fetch_timeout must be > 0".to_string());
        }

        if self.retry_base_delay > self.retry_max_delay {
            return Err("retry_base_delay cannot exceed retry_max_delay".to_string());
        }

        Ok(())
    }

    /// [`validate`](Self::validate) mapped into the crate error type.
    pub fn ensure_valid(&self) -> crate::Result<()> {
        self.validate().map_err(PlaybackError::InvalidConfig)
    }

    /// Ring buffer capacity in frames for a given sample rate.
    pub fn window_frames(&self, sample_rate_hz: u32) -> u64 {
        sample_rate_hz as u64 * self.window_seconds as u64
    }

    /// Headroom threshold in frames for a given sample rate.
    pub fn headroom_threshold_frames(&self, sample_rate_hz: u32) -> i64 {
        sample_rate_hz as i64 * self.headroom_threshold_seconds as i64
    }

    /// Size in bytes of a regular chunk.
    pub fn steady_chunk_bytes(&self, bytes_per_second: u32) -> u64 {
        bytes_per_second as u64 * self.steady_chunk_seconds as u64
    }

    /// Size in bytes of the first chunk after open or resync.
    pub fn initial_chunk_bytes(&self, bytes_per_second: u32) -> u64 {
        self.steady_chunk_bytes(bytes_per_second) * self.initial_chunk_multiplier as u64
    }
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_window_seconds() -> u32 {
    30
}

fn default_headroom_threshold_seconds() -> u32 {
    20
}

fn default_steady_chunk_seconds() -> u32 {
    5
}

fn default_initial_chunk_multiplier() -> u32 {
    4
}

fn default_drift_threshold() -> Duration {
    Duration::from_secs(5)
}

fn default_enable_resync() -> bool {
    true
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_retry_base_delay() -> Duration {
    Duration::from_millis(250)
}

fn default_retry_max_delay() -> Duration {
    Duration::from_secs(8)
}

// ============================================================================
// Stream Phase
// ============================================================================

/// Lifecycle phase of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamPhase {
    /// Waiting for the first chunk after open or resync; engine paused.
    Priming,
    /// Engine playing; headroom maintained by the scheduler.
    Playing,
    /// Fully loaded and fully played.
    Completed,
    /// Torn down; no further mutation.
    Closed,
}

impl StreamPhase {
    /// Returns `true` if ticks still do work.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Priming | Self::Playing)
    }

    /// Returns `true` if the stream reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Closed)
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Counters describing how a stream has been fed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamingStats {
    /// Range requests issued (header request excluded).
    pub fetch_requests: u64,
    /// Chunks decoded and written to the ring buffer.
    pub chunks_applied: u64,
    /// Payload bytes written to the ring buffer.
    pub bytes_fetched: u64,
    /// Frames written to the ring buffer.
    pub frames_loaded: u64,
    /// Transport failures, bad statuses, timeouts and oversized bodies.
    pub fetch_failures: u64,
    /// Short or misaligned chunks.
    pub truncated_chunks: u64,
    /// Writes rejected because they would lap the reader.
    pub buffer_overruns: u64,
    /// Results that arrived after a resync invalidated them.
    pub stale_results_discarded: u64,
    /// Hard resyncs caused by drift.
    pub resync_count: u32,
    /// Hard resyncs caused by the reader overtaking the writer.
    pub underrun_count: u32,
    /// Times the engine was told to play.
    pub playback_starts: u32,
    /// Mean latency of successful fetches in milliseconds.
    pub avg_fetch_latency_ms: f64,
}

impl StreamingStats {
    /// Count a rejected chunk under the matching counter.
    pub fn record_failure(&mut self, error: &PlaybackError) {
        match error {
            PlaybackError::TruncatedChunk(_) => self.truncated_chunks += 1,
            PlaybackError::BufferOverrun { .. } => self.buffer_overruns += 1,
            _ => self.fetch_failures += 1,
        }
    }

    /// Count an applied chunk and fold its latency into the running mean.
    pub fn record_chunk(&mut self, bytes: u64, frames: u64, latency: Duration) {
        self.chunks_applied += 1;
        self.bytes_fetched += bytes;
        self.frames_loaded += frames;

        let latency_ms = latency.as_secs_f64() * 1000.0;
        let n = self.chunks_applied as f64;
        self.avg_fetch_latency_ms += (latency_ms - self.avg_fetch_latency_ms) / n;
    }

    /// Buffer fill fraction (0.0 to 1.0) for a given headroom.
    pub fn buffer_fill_percentage(headroom_frames: i64, capacity_frames: u64) -> f32 {
        if capacity_frames == 0 || headroom_frames <= 0 {
            return 0.0;
        }
        (headroom_frames as f32 / capacity_frames as f32).min(1.0)
    }
}
