//! # Resync Controller
//!
//! Compares where the stream should be on the wall clock with the played
//! position and decides when a hard resynchronization is required. The
//! service passes the anchored timeline position (see
//! [`StreamState::timeline_position`](crate::state::StreamState::timeline_position)),
//! so time spent priming is never counted as drift.

use crate::config::StreamingConfig;
pub use core_runtime::events::ResyncReason;
use serde::Serialize;
use std::time::Duration;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// A decided resync, applied atomically by the streaming service.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResyncPlan {
    pub target_frame: i64,
    /// Signed `elapsed - played` in seconds at decision time.
    pub drift_secs: f64,
    pub reason: ResyncReason,
}

#[derive(Debug, Clone, Copy)]
pub struct ResyncController {
    drift_threshold: Duration,
    enabled: bool,
}

impl ResyncController {
    pub fn new(drift_threshold: Duration, enabled: bool) -> Self {
        Self {
            drift_threshold,
            enabled,
        }
    }

    pub fn from_config(config: &StreamingConfig) -> Self {
        Self::new(config.drift_threshold, config.enable_resync)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn drift_threshold(&self) -> Duration {
        self.drift_threshold
    }

    /// Frame that should be playing after `elapsed`, computed in integer
    /// nanoseconds so that e.g. 42.0 s at 44100 Hz is exactly 1852200.
    pub fn target_frame(elapsed: Duration, sample_rate_hz: u32) -> i64 {
        let frames = elapsed.as_nanos() * sample_rate_hz as u128 / NANOS_PER_SEC;
        i64::try_from(frames).unwrap_or(i64::MAX)
    }

    /// `elapsed - played / rate`, in seconds.
    pub fn drift_seconds(elapsed: Duration, played_index: i64, sample_rate_hz: u32) -> f64 {
        elapsed.as_secs_f64() - played_index as f64 / sample_rate_hz as f64
    }

    /// Drift check. Returns a plan when `|drift|` exceeds the threshold.
    pub fn check(
        &self,
        elapsed: Duration,
        played_index: i64,
        sample_rate_hz: u32,
    ) -> Option<ResyncPlan> {
        if !self.enabled {
            return None;
        }

        let drift_secs = Self::drift_seconds(elapsed, played_index, sample_rate_hz);
        if drift_secs.abs() <= self.drift_threshold.as_secs_f64() {
            return None;
        }

        Some(ResyncPlan {
            target_frame: Self::target_frame(elapsed, sample_rate_hz),
            drift_secs,
            reason: ResyncReason::Drift,
        })
    }

    /// Plan for a reader that overtook the writer; re-anchors where the
    /// reader already is.
    pub fn underrun(&self, played_index: i64, loaded_index: i64, sample_rate_hz: u32) -> ResyncPlan {
        ResyncPlan {
            target_frame: played_index,
            drift_secs: (played_index - loaded_index) as f64 / sample_rate_hz as f64,
            reason: ResyncReason::Underrun,
        }
    }
}

impl Default for ResyncController {
    fn default() -> Self {
        Self::from_config(&StreamingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_frame_is_exact() {
        assert_eq!(
            ResyncController::target_frame(Duration::from_secs_f64(42.0), 44_100),
            1_852_200
        );
        assert_eq!(
            ResyncController::target_frame(Duration::from_millis(1_500), 48_000),
            72_000
        );
        assert_eq!(ResyncController::target_frame(Duration::ZERO, 44_100), 0);
    }

    #[test]
    fn test_within_threshold_is_ignored() {
        let controller = ResyncController::new(Duration::from_secs(5), true);
        // 10 s elapsed, 7 s played
        assert!(controller
            .check(Duration::from_secs(10), 7 * 44_100, 44_100)
            .is_none());
        // exactly on the threshold
        assert!(controller
            .check(Duration::from_secs(10), 5 * 44_100, 44_100)
            .is_none());
    }

    #[test]
    fn test_drift_beyond_threshold() {
        let controller = ResyncController::new(Duration::from_secs(5), true);
        let plan = controller
            .check(Duration::from_secs_f64(42.0), 30 * 44_100, 44_100)
            .unwrap();

        assert_eq!(plan.target_frame, 1_852_200);
        assert_eq!(plan.reason, ResyncReason::Drift);
        assert!((plan.drift_secs - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_playback_ahead_of_clock_also_resyncs() {
        let controller = ResyncController::new(Duration::from_secs(2), true);
        let plan = controller
            .check(Duration::from_secs(1), 10 * 8_000, 8_000)
            .unwrap();
        assert_eq!(plan.target_frame, 8_000);
        assert!(plan.drift_secs < 0.0);
    }

    #[test]
    fn test_disabled_never_resyncs() {
        let controller = ResyncController::new(Duration::from_secs(1), false);
        assert!(controller
            .check(Duration::from_secs(100), 0, 44_100)
            .is_none());
    }

    #[test]
    fn test_underrun_plan() {
        let controller = ResyncController::default();
        let plan = controller.underrun(1_000, 900, 100);
        assert_eq!(plan.target_frame, 1_000);
        assert_eq!(plan.reason, ResyncReason::Underrun);
        assert!((plan.drift_secs - 1.0).abs() < 1e-9);
    }
}
