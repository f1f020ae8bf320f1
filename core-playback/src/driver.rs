//! # Tick Driver
//!
//! Invokes [`StreamingService::tick`] at a fixed cadence on a
//! `tokio::time::interval`, deriving the elapsed wall-clock time from an
//! injected [`Clock`]. Hosts that already own an update loop can skip the
//! driver and call `tick` themselves.

use crate::config::StreamPhase;
use crate::streaming::StreamingService;
use bridge_traits::time::Clock;
use core_runtime::config::CoreConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

pub struct TickDriver {
    clock: Arc<dyn Clock>,
    interval: Duration,
    cancel: CancellationToken,
}

impl TickDriver {
    pub fn new(clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            clock,
            interval,
            cancel: CancellationToken::new(),
        }
    }

    pub fn from_config(config: &CoreConfig) -> Self {
        Self::new(Arc::clone(&config.clock), config.tick_interval)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Token that stops [`run`](Self::run) and closes the stream.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Tick `service` until it reaches a terminal phase or the driver is
    /// cancelled. Returns the final phase.
    #[instrument(skip(self, service), fields(stream_id = %service.id()))]
    pub async fn run(&self, service: &mut StreamingService) -> StreamPhase {
        let start = self.clock.now();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval_ms = self.interval.as_millis() as u64, "Tick driver started");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    service.close();
                    info!("Tick driver cancelled");
                    return service.phase();
                }
                _ = ticker.tick() => {}
            }

            // a clock stepping backwards reads as no time passed
            let elapsed = (self.clock.now() - start).to_std().unwrap_or(Duration::ZERO);
            let report = service.tick(elapsed);

            if report.phase.is_terminal() {
                debug!(
                    phase = ?report.phase,
                    played_index = report.played_index,
                    "Tick driver finished"
                );
                return report.phase;
            }
        }
    }
}

impl std::fmt::Debug for TickDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickDriver")
            .field("interval", &self.interval)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
