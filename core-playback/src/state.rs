//! # Stream State
//!
//! Every mutable cursor and scheduler field of one stream, grouped so that a
//! resync or teardown is a single assignment and a tick can be inspected or
//! snapshotted as a whole.

use crate::config::StreamPhase;
use crate::cursor::PlaybackCursorTracker;
use crate::header::FormatDescriptor;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Next byte to request. Absolute file offset; the header occupies
/// `[0, data_offset)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchCursor {
    pub offset: u64,
    /// Exclusive end of the playable payload.
    pub end: u64,
}

impl FetchCursor {
    pub fn new(format: &FormatDescriptor) -> Self {
        Self {
            offset: format.data_offset(),
            end: format.data_end(),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.offset >= self.end
    }

    pub fn remaining(&self) -> u64 {
        self.end.saturating_sub(self.offset)
    }
}

/// Retry bookkeeping for transient fetch failures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchBackoff {
    pub consecutive_failures: u32,
    /// Tick-clock instant before which no fetch is planned.
    pub not_before: Option<Duration>,
}

impl FetchBackoff {
    /// `base * 2^(failures - 1)`, capped at `max`.
    pub fn delay_for(failures: u32, base: Duration, max: Duration) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(failures - 1).unwrap_or(u32::MAX);
        base.checked_mul(factor).unwrap_or(max).min(max)
    }

    pub fn is_waiting(&self, now: Duration) -> bool {
        matches!(self.not_before, Some(at) if now < at)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// All mutable state of one stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamState {
    pub phase: StreamPhase,
    pub tracker: PlaybackCursorTracker,
    /// Frames decoded and written, in absolute stream frames.
    pub loaded_index: i64,
    pub fetch_cursor: FetchCursor,
    /// Next applied chunk is the first of a priming period.
    pub awaiting_first_chunk: bool,
    /// Bumped on every resync; results planned under an older value are stale.
    pub fetch_generation: u64,
    pub backoff: FetchBackoff,
    /// Tick-clock instant at which the current playback period began.
    #[serde(default)]
    pub playback_anchor: Option<Duration>,
}

impl StreamState {
    pub fn new(format: &FormatDescriptor, capacity_frames: u64) -> Self {
        Self {
            phase: StreamPhase::Priming,
            tracker: PlaybackCursorTracker::new(capacity_frames),
            loaded_index: 0,
            fetch_cursor: FetchCursor::new(format),
            awaiting_first_chunk: true,
            fetch_generation: 0,
            backoff: FetchBackoff::default(),
            playback_anchor: None,
        }
    }

    pub fn played_index(&self) -> i64 {
        self.tracker.played_index()
    }

    pub fn headroom(&self) -> i64 {
        self.loaded_index - self.played_index()
    }

    pub fn is_fully_loaded(&self) -> bool {
        self.fetch_cursor.is_exhausted()
    }

    /// Ring-buffer-relative frame at which the next chunk is written.
    pub fn write_frame(&self) -> i64 {
        self.loaded_index - self.tracker.sync_base()
    }

    /// Where the stream should be after `elapsed` on the tick clock:
    /// `sync_base / rate` plus the time spent playing since the anchor.
    /// `None` until playback has started.
    pub fn timeline_position(&self, elapsed: Duration, sample_rate_hz: u32) -> Option<Duration> {
        let anchor = self.playback_anchor?;
        let base_frames = self.tracker.sync_base().max(0) as u128;
        // rounded up so the frame computed back from it is exactly sync_base
        let base_nanos = (base_frames * 1_000_000_000).div_ceil(sample_rate_hz.max(1) as u128);
        let base = Duration::from_nanos(u64::try_from(base_nanos).unwrap_or(u64::MAX));
        Some(base + elapsed.saturating_sub(anchor))
    }

    /// Re-anchor every cursor at `target_frame` and start a new priming
    /// period. `target_frame` must already be clamped to the asset.
    pub fn apply_resync(&mut self, target_frame: i64, format: &FormatDescriptor) {
        self.tracker.resync(target_frame);
        self.loaded_index = target_frame;
        self.fetch_cursor.offset = format.byte_offset_of_frame(target_frame);
        self.awaiting_first_chunk = true;
        self.fetch_generation += 1;
        self.backoff.reset();
        self.playback_anchor = None;
        self.phase = if self.fetch_cursor.is_exhausted() {
            StreamPhase::Completed
        } else {
            StreamPhase::Priming
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cd_format(total_data_bytes: u32) -> FormatDescriptor {
        FormatDescriptor::new(2, 44_100, 16, total_data_bytes).unwrap()
    }

    #[test]
    fn test_new_state() {
        let format = cd_format(441_000);
        let state = StreamState::new(&format, 1_323_000);

        assert_eq!(state.phase, StreamPhase::Priming);
        assert_eq!(state.fetch_cursor.offset, 44);
        assert_eq!(state.fetch_cursor.end, 44 + 441_000);
        assert_eq!(state.headroom(), 0);
        assert!(state.awaiting_first_chunk);
        assert!(!state.is_fully_loaded());
    }

    #[test]
    fn test_apply_resync_at_42_seconds() {
        let format = cd_format(u32::MAX - 3);
        let mut state = StreamState::new(&format, 1_323_000);
        state.loaded_index = 900_000;
        state.awaiting_first_chunk = false;
        state.phase = StreamPhase::Playing;

        state.apply_resync(1_852_200, &format);

        assert_eq!(state.tracker.sync_base(), 1_852_200);
        assert_eq!(state.tracker.loop_count(), 0);
        assert_eq!(state.loaded_index, 1_852_200);
        assert_eq!(state.fetch_cursor.offset, 44 + 1_852_200 * 4);
        assert_eq!(state.write_frame(), 0);
        assert_eq!(state.fetch_generation, 1);
        assert_eq!(state.phase, StreamPhase::Priming);
        assert!(state.awaiting_first_chunk);
    }

    #[test]
    fn test_timeline_starts_at_playback_anchor() {
        let format = cd_format(u32::MAX - 3);
        let mut state = StreamState::new(&format, 1_323_000);
        assert_eq!(state.timeline_position(Duration::from_secs(9), 44_100), None);

        // first chunk landed 6 s after open
        state.playback_anchor = Some(Duration::from_secs(6));
        assert_eq!(
            state.timeline_position(Duration::from_secs(7), 44_100),
            Some(Duration::from_secs(1))
        );

        state.apply_resync(1_852_200, &format);
        assert_eq!(state.playback_anchor, None);
        state.playback_anchor = Some(Duration::from_secs(48));
        assert_eq!(
            state.timeline_position(Duration::from_secs(50), 44_100),
            Some(Duration::from_secs(44))
        );
        // before the anchor the position holds at sync_base
        assert_eq!(
            state.timeline_position(Duration::from_secs(47), 44_100),
            Some(Duration::from_secs(42))
        );
    }

    #[test]
    fn test_resync_to_end_completes() {
        let format = cd_format(400);
        let mut state = StreamState::new(&format, 1_000);
        state.apply_resync(100, &format);
        assert!(state.is_fully_loaded());
        assert_eq!(state.phase, StreamPhase::Completed);
    }

    #[test]
    fn test_backoff_delay() {
        let base = Duration::from_millis(250);
        let max = Duration::from_secs(8);
        assert_eq!(FetchBackoff::delay_for(0, base, max), Duration::ZERO);
        assert_eq!(FetchBackoff::delay_for(1, base, max), base);
        assert_eq!(FetchBackoff::delay_for(3, base, max), Duration::from_secs(1));
        assert_eq!(FetchBackoff::delay_for(6, base, max), max);
        assert_eq!(FetchBackoff::delay_for(40, base, max), max);
    }

    #[test]
    fn test_state_json_round_trip() {
        let format = cd_format(441_000);
        let mut state = StreamState::new(&format, 1_323_000);
        state.tracker.observe(1_000);
        state.loaded_index = 88_200;
        state.backoff.consecutive_failures = 2;
        state.backoff.not_before = Some(Duration::from_millis(750));
        state.playback_anchor = Some(Duration::from_secs(3));

        let json = serde_json::to_string(&state).unwrap();
        let back: StreamState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
