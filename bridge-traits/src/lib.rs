//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the streaming core and
//! platform-specific implementations. The core owns no sockets and no system
//! clock of its own; everything that touches the outside world comes through
//! one of these traits.
//!
//! ## Traits
//!
//! ### Networking
//! - [`RangeFetcher`](http::RangeFetcher) - Async byte-range retrieval of a remote asset
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate | Status |
//! |----------|---------------------|--------|
//! | Desktop  | `bridge-desktop`    | ✅ Available |
//! | Embedded hosts | injected by the host | 📋 Planned |
//!
//! ## Fail-Fast Strategy
//!
//! The core fails fast with descriptive errors when a required capability is missing:
//!
//! ```ignore
//! use core_runtime::error::Error;
//!
//! let range_fetcher = builder.range_fetcher
//!     .ok_or_else(|| Error::CapabilityMissing {
//!         capability: "RangeFetcher".to_string(),
//!         message: "No range fetcher provided. \
//!                  Desktop: enable the desktop-shims feature. \
//!                  Other hosts: inject a native adapter.".to_string()
//!     })?;
//! ```
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Platform
//! implementations should convert platform-specific errors to `BridgeError`
//! and say what failed (URL, status code, timeout).
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so adapters can be shared with the
//! background fetch tasks spawned by the core.

pub mod error;
pub mod http;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{ByteRange, ContentRange, RangeFetcher, RangeResponse, STATUS_PARTIAL_CONTENT};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, SystemClock};
