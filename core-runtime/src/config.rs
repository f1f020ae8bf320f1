//! # Core Configuration Module
//!
//! Provides configuration management for the streaming core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds the injected host bridges and the runtime settings the
//! tick driver needs. It enforces fail-fast validation so a missing bridge is
//! reported at startup instead of on the first fetch.
//!
//! ## Required Dependencies
//!
//! - `RangeFetcher` - Byte-range HTTP access (desktop default: reqwest)
//!
//! ## Optional Dependencies (with defaults)
//!
//! - `Clock` - Wall-clock source for the tick driver (default: `SystemClock`)
//!
//! When the `desktop-shims` feature is enabled, `ReqwestRangeFetcher` is
//! injected automatically if no fetcher is provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let config = CoreConfig::builder()
//!     .range_fetcher(Arc::new(MyRangeFetcher))
//!     .tick_interval(Duration::from_millis(20))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::events::{EventBus, DEFAULT_EVENT_BUFFER_SIZE};
use bridge_traits::{Clock, RangeFetcher, SystemClock};
use std::sync::Arc;
use std::time::Duration;

/// Default interval between two ticks of the driver.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Longest tick interval accepted; beyond this the engine would drain a
/// noticeable share of the window between two scheduling decisions.
pub const MAX_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Core configuration for the streaming runtime.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Byte-range fetcher shared by every stream
    pub range_fetcher: Arc<dyn RangeFetcher>,

    /// Wall-clock source for elapsed-time computation
    pub clock: Arc<dyn Clock>,

    /// Interval between ticks
    pub tick_interval: Duration,

    /// Per-subscriber buffer of the event bus
    pub event_buffer_size: usize,

    /// Bus shared by streams opened from this configuration
    pub event_bus: EventBus,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("range_fetcher", &"RangeFetcher { ... }")
            .field("clock", &"Clock { ... }")
            .field("tick_interval", &self.tick_interval)
            .field("event_buffer_size", &self.event_buffer_size)
            .field("event_bus", &self.event_bus)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Tick interval is non-zero and at most [`MAX_TICK_INTERVAL`]
    /// - Event buffer size is non-zero
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval.is_zero() {
            return Err(Error::Config(
                "Tick interval must be greater than zero".to_string(),
            ));
        }

        if self.tick_interval > MAX_TICK_INTERVAL {
            return Err(Error::Config(format!(
                "Tick interval {:?} exceeds maximum of {:?}",
                self.tick_interval, MAX_TICK_INTERVAL
            )));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn range_fetcher_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "RangeFetcher".to_string(),
        message: "RangeFetcher implementation is required to stream audio. \
                 Desktop: enable the 'desktop-shims' feature to use the default ReqwestRangeFetcher. \
                 Other hosts: inject a platform-native adapter."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_range_fetcher() -> Result<Arc<dyn RangeFetcher>> {
    use bridge_desktop::ReqwestRangeFetcher;

    let fetcher = ReqwestRangeFetcher::new().map_err(|e| Error::CapabilityMissing {
        capability: "RangeFetcher".to_string(),
        message: format!("Default ReqwestRangeFetcher could not be created: {}", e),
    })?;
    let fetcher: Arc<dyn RangeFetcher> = Arc::new(fetcher);
    Ok(fetcher)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_range_fetcher() -> Result<Arc<dyn RangeFetcher>> {
    Err(range_fetcher_missing_error())
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    range_fetcher: Option<Arc<dyn RangeFetcher>>,
    clock: Option<Arc<dyn Clock>>,
    tick_interval: Option<Duration>,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    /// Sets the byte-range fetcher.
    pub fn range_fetcher(mut self, fetcher: Arc<dyn RangeFetcher>) -> Self {
        self.range_fetcher = Some(fetcher);
        self
    }

    /// Sets the clock used to compute elapsed wall-clock time.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets the tick interval (default 50 ms).
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = Some(interval);
        self
    }

    /// Sets the event bus buffer size (default 100).
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::CapabilityMissing`] when no fetcher was supplied and no
    ///   platform default is available
    /// - [`Error::Config`] when a setting is out of range
    pub fn build(self) -> Result<CoreConfig> {
        let range_fetcher = match self.range_fetcher {
            Some(fetcher) => fetcher,
            None => provide_default_range_fetcher()?,
        };

        let event_buffer_size = self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE);
        let config = CoreConfig {
            range_fetcher,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            tick_interval: self.tick_interval.unwrap_or(DEFAULT_TICK_INTERVAL),
            event_buffer_size,
            event_bus: EventBus::new(event_buffer_size),
        };

        config.validate()?;

        Ok(config)
    }
}
