//! # Playback Cursor Tracker
//!
//! The playback engine loops over the ring buffer and reports a position that
//! wraps at `capacity_frames`. The tracker turns that bounded counter into an
//! absolute, non-decreasing `played_index`:
//!
//! ```text
//! played_index = capacity_frames * loop_count + reported_position + sync_base
//! ```
//!
//! A wrap is detected when the reported position goes backwards between two
//! consecutive observations.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Absolute played-frame bookkeeping for one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackCursorTracker {
    capacity_frames: u64,
    loop_count: u64,
    last_reported: u64,
    sync_base: i64,
    played_index: i64,
}

impl PlaybackCursorTracker {
    pub fn new(capacity_frames: u64) -> Self {
        Self {
            capacity_frames: capacity_frames.max(1),
            loop_count: 0,
            last_reported: 0,
            sync_base: 0,
            played_index: 0,
        }
    }

    /// Feed one engine position report and return the updated `played_index`.
    pub fn observe(&mut self, reported_position: u64) -> i64 {
        let reported = if reported_position >= self.capacity_frames {
            warn!(
                reported_position,
                capacity_frames = self.capacity_frames,
                "Engine reported a position outside the ring buffer"
            );
            reported_position % self.capacity_frames
        } else {
            reported_position
        };

        if reported < self.last_reported {
            self.loop_count += 1;
        }
        self.last_reported = reported;

        self.played_index = (self.capacity_frames as i64)
            .saturating_mul(self.loop_count as i64)
            .saturating_add(reported as i64)
            .saturating_add(self.sync_base);
        self.played_index
    }

    /// Re-anchor at `target_frame`; the engine is expected to restart at 0.
    pub fn resync(&mut self, target_frame: i64) {
        self.sync_base = target_frame;
        self.loop_count = 0;
        self.last_reported = 0;
        self.played_index = target_frame;
    }

    pub fn played_index(&self) -> i64 {
        self.played_index
    }

    pub fn loop_count(&self) -> u64 {
        self.loop_count
    }

    pub fn sync_base(&self) -> i64 {
        self.sync_base
    }

    pub fn last_reported(&self) -> u64 {
        self.last_reported
    }

    pub fn capacity_frames(&self) -> u64 {
        self.capacity_frames
    }
}
