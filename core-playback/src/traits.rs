//! # Playback Engine Boundary
//!
//! The streaming core never renders audio itself. A host-provided
//! [`PlaybackEngine`] consumes the ring buffer through a read-only
//! [`RingBufferReader`] and reports how far it has got.
//!
//! ## Architecture
//!
//! The stream uses a **producer-consumer model**:
//!
//! - **Producer (`StreamingService`)**: fetches, decodes and writes chunks into
//!   the ring buffer from inside `tick`.
//! - **Consumer (`PlaybackEngine`)**: loops over the ring buffer storage at its
//!   own pace, typically from an audio callback thread.
//!
//! ## Position Reporting
//!
//! `reported_position()` is the engine's own frame counter within the ring
//! buffer. It must stay in `[0, capacity_frames)` and wrap to 0 each time the
//! engine loops over the storage; the core reconstructs the absolute position
//! by counting those wraps.
//!
//! ## Usage Example
//!
//! ```rust
//! use core_playback::header::FormatDescriptor;
//! use core_playback::ring_buffer::RingBufferReader;
//! use core_playback::traits::PlaybackEngine;
//!
//! #[derive(Default)]
//! struct SilentEngine {
//!     position: u64,
//!     playing: bool,
//! }
//!
//! impl PlaybackEngine for SilentEngine {
//!     fn attach(&mut self, _reader: RingBufferReader, _format: &FormatDescriptor) {}
//!     fn play(&mut self) { self.playing = true; }
//!     fn pause(&mut self) { self.playing = false; }
//!     fn reset_position(&mut self) { self.position = 0; }
//!     fn reported_position(&self) -> u64 { self.position }
//! }
//! ```

use crate::header::FormatDescriptor;
use crate::ring_buffer::RingBufferReader;

/// Host audio output consuming the ring buffer.
///
/// Calls are made from the thread that drives `tick` and must return
/// promptly; an implementation that renders on another thread should only
/// flip flags or atomics here.
#[cfg_attr(test, mockall::automock)]
pub trait PlaybackEngine: Send {
    /// Hand over the read-only buffer view and the stream format. Called once,
    /// before any other method.
    fn attach(&mut self, reader: RingBufferReader, format: &FormatDescriptor);

    /// Start or resume consuming frames.
    fn play(&mut self);

    /// Stop consuming frames; the reported position must hold still.
    fn pause(&mut self);

    /// Move the read position back to physical frame 0.
    fn reset_position(&mut self);

    /// Current read position, in `[0, capacity_frames)`.
    fn reported_position(&self) -> u64;
}
