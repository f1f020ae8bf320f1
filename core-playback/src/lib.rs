//! # PCM Streaming Module
//!
//! Streams a linear PCM WAV asset over HTTP byte ranges into a fixed-size
//! ring buffer and keeps that buffer ahead of an independently advancing
//! playback engine.
//!
//! ## Overview
//!
//! This module handles:
//! - WAV header parsing and validation (`header`)
//! - 8/16-bit PCM decoding into normalized samples (`decoder`)
//! - Wraparound-safe ring buffer storage (`ring_buffer`)
//! - Absolute played-position tracking over a wrapping engine counter (`cursor`)
//! - Headroom-driven range prefetching with retry backoff (`scheduler`)
//! - Drift and underrun resynchronization (`resync`)
//! - The tick-driven stream itself (`streaming`, `driver`)

pub mod config;
pub mod cursor;
pub mod decoder;
pub mod driver;
pub mod error;
pub mod header;
pub mod resync;
pub mod ring_buffer;
pub mod scheduler;
pub mod state;
pub mod streaming;
pub mod traits;

pub use config::{StreamPhase, StreamingConfig, StreamingStats};
pub use cursor::PlaybackCursorTracker;
pub use decoder::{SampleConverter, SampleDecoder};
pub use driver::TickDriver;
pub use error::{PlaybackError, Result};
pub use header::{FormatDescriptor, HeaderParser, WAV_HEADER_LEN};
pub use resync::{ResyncController, ResyncPlan, ResyncReason};
pub use ring_buffer::{RingBuffer, RingBufferReader};
pub use scheduler::{AppliedChunk, FetchPlan, PrefetchDecision, PrefetchScheduler, SkipReason};
pub use state::{FetchBackoff, FetchCursor, StreamState};
pub use streaming::{StreamId, StreamSnapshot, StreamingRequest, StreamingService, TickReport};
pub use traits::PlaybackEngine;
