//! # Prefetch Scheduler
//!
//! Decides once per tick whether the stream needs more audio, sizes the next
//! byte range, and validates and applies a completed range to the ring
//! buffer.
//!
//! ## Planning
//!
//! ```text
//! headroom = loaded_index - played_index
//! headroom >= threshold            -> skip
//! fetch cursor at data end         -> skip (fully loaded)
//! backoff window not elapsed       -> skip
//! otherwise fetch [cursor, min(cursor + chunk, data_end))
//! ```
//!
//! The first chunk of a priming period is `initial_chunk_multiplier` times
//! the steady chunk to build a cushion before playback starts.
//!
//! ## Applying
//!
//! A response is checked in this order and rejected without moving any
//! cursor:
//!
//! 1. transport error: `FetchFailure`
//! 2. status other than 206: `FetchFailure`
//! 3. body shorter than requested: `TruncatedChunk`
//! 4. body longer than requested: `FetchFailure`
//! 5. body not decodable: `TruncatedChunk`
//! 6. chunk would lap the reader: `BufferOverrun`

use crate::config::StreamingConfig;
use crate::decoder::SampleDecoder;
use crate::error::{PlaybackError, Result};
use crate::header::FormatDescriptor;
use crate::ring_buffer::RingBuffer;
use crate::state::{FetchBackoff, StreamState};
use bridge_traits::error::BridgeError;
use bridge_traits::http::{ByteRange, RangeResponse};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error};

/// A fetch decided by [`PrefetchScheduler::plan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FetchPlan {
    pub range: ByteRange,
    /// First chunk of a priming period (uses the initial multiplier).
    pub is_initial: bool,
    /// `StreamState::fetch_generation` at planning time.
    pub generation: u64,
    /// Absolute frame at which the chunk will be written.
    pub at_frame: i64,
}

/// Why no fetch was planned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    /// Stream completed or closed.
    Inactive,
    FullyLoaded,
    BackingOff,
    HeadroomSatisfied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefetchDecision {
    Fetch(FetchPlan),
    Skip(SkipReason),
}

/// Outcome of a successfully applied chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AppliedChunk {
    pub frames: u64,
    pub bytes: u64,
    /// The chunk ended a priming period; the engine should start playing.
    pub starts_playback: bool,
    /// The fetch cursor reached the data end.
    pub fully_loaded: bool,
}

/// Per-stream prefetch policy, resolved against the stream format.
#[derive(Debug, Clone)]
pub struct PrefetchScheduler {
    headroom_threshold_frames: i64,
    steady_chunk_bytes: u64,
    initial_chunk_bytes: u64,
    channels: usize,
    retry_base_delay: Duration,
    retry_max_delay: Duration,
}

impl PrefetchScheduler {
    pub fn from_config(config: &StreamingConfig, format: &FormatDescriptor) -> Self {
        Self {
            headroom_threshold_frames: config.headroom_threshold_frames(format.sample_rate_hz),
            steady_chunk_bytes: config.steady_chunk_bytes(format.bytes_per_second),
            initial_chunk_bytes: config.initial_chunk_bytes(format.bytes_per_second),
            channels: format.channel_count as usize,
            retry_base_delay: config.retry_base_delay,
            retry_max_delay: config.retry_max_delay,
        }
    }

    pub fn headroom_threshold_frames(&self) -> i64 {
        self.headroom_threshold_frames
    }

    pub fn steady_chunk_bytes(&self) -> u64 {
        self.steady_chunk_bytes
    }

    pub fn initial_chunk_bytes(&self) -> u64 {
        self.initial_chunk_bytes
    }

    /// Decide the next fetch. `now` is the tick's elapsed clock, used for
    /// the retry backoff window.
    pub fn plan(&self, state: &StreamState, now: Duration) -> PrefetchDecision {
        if !state.phase.is_active() {
            return PrefetchDecision::Skip(SkipReason::Inactive);
        }
        if state.is_fully_loaded() {
            return PrefetchDecision::Skip(SkipReason::FullyLoaded);
        }
        if state.backoff.is_waiting(now) {
            return PrefetchDecision::Skip(SkipReason::BackingOff);
        }
        if state.headroom() >= self.headroom_threshold_frames {
            return PrefetchDecision::Skip(SkipReason::HeadroomSatisfied);
        }

        let chunk_bytes = if state.awaiting_first_chunk {
            self.initial_chunk_bytes
        } else {
            self.steady_chunk_bytes
        };
        let cursor = state.fetch_cursor;
        let end = cursor.offset.saturating_add(chunk_bytes).min(cursor.end);

        PrefetchDecision::Fetch(FetchPlan {
            range: ByteRange::new(cursor.offset, end),
            is_initial: state.awaiting_first_chunk,
            generation: state.fetch_generation,
            at_frame: state.loaded_index,
        })
    }

    /// Validate a completed fetch and write it into `ring`.
    ///
    /// On success `loaded_index` and the fetch cursor advance together and
    /// the backoff is cleared. On error nothing in `state` or `ring` changes.
    pub fn apply(
        &self,
        state: &mut StreamState,
        ring: &mut RingBuffer,
        decoder: &SampleDecoder,
        plan: &FetchPlan,
        result: std::result::Result<RangeResponse, BridgeError>,
    ) -> Result<AppliedChunk> {
        if plan.generation != state.fetch_generation
            || plan.range.start != state.fetch_cursor.offset
            || plan.at_frame != state.loaded_index
        {
            return Err(PlaybackError::Internal(format!(
                "fetch plan for {} no longer matches the stream cursors",
                plan.range
            )));
        }

        let response = result.map_err(|e| PlaybackError::FetchFailure(e.to_string()))?;

        if !response.is_partial_content() {
            return Err(PlaybackError::FetchFailure(format!(
                "expected 206 Partial Content for {}, got status {}",
                plan.range, response.status
            )));
        }

        let expected = plan.range.len();
        let received = response.len() as u64;
        if received < expected {
            return Err(PlaybackError::TruncatedChunk(format!(
                "requested {} bytes for {}, received {}",
                expected, plan.range, received
            )));
        }
        if received > expected {
            return Err(PlaybackError::FetchFailure(format!(
                "requested {} bytes for {}, received {}",
                expected, plan.range, received
            )));
        }

        let samples = decoder.decode(&response.body)?;
        if samples.len() % self.channels != 0 {
            return Err(PlaybackError::TruncatedChunk(format!(
                "{} samples is not a whole number of {}-channel frames",
                samples.len(),
                self.channels
            )));
        }
        let frames = (samples.len() / self.channels) as u64;

        if let Err(e) = ring.ensure_fits(state.loaded_index, frames, state.played_index()) {
            error!(
                loaded_index = state.loaded_index,
                played_index = state.played_index(),
                frames,
                capacity_frames = ring.capacity_frames(),
                "Rejected chunk that would overwrite unplayed frames"
            );
            return Err(e);
        }
        ring.write(state.write_frame(), &samples)?;

        state.loaded_index += frames as i64;
        state.fetch_cursor.offset = plan.range.end;
        state.backoff.reset();

        let starts_playback = state.awaiting_first_chunk;
        state.awaiting_first_chunk = false;

        debug!(
            range = %plan.range,
            frames,
            loaded_index = state.loaded_index,
            headroom = state.headroom(),
            "Applied chunk"
        );

        Ok(AppliedChunk {
            frames,
            bytes: received,
            starts_playback,
            fully_loaded: state.is_fully_loaded(),
        })
    }

    /// Register a transient failure and open the backoff window. Returns the
    /// delay before the next attempt.
    pub fn record_failure(&self, state: &mut StreamState, now: Duration) -> Duration {
        state.backoff.consecutive_failures = state.backoff.consecutive_failures.saturating_add(1);
        let delay = FetchBackoff::delay_for(
            state.backoff.consecutive_failures,
            self.retry_base_delay,
            self.retry_max_delay,
        );
        state.backoff.not_before = Some(now + delay);
        delay
    }
}
