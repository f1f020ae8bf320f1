//! # Event Bus System
//!
//! Provides stream lifecycle notifications using `tokio::sync::broadcast`.
//! The streaming engine publishes; hosts (UI, diagnostics, tests) subscribe.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: [`StreamEvent`], one variant per observable transition
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐   emit    ┌───────────┐   subscribe   ┌────────────┐
//! │ StreamingService ├──────────>│ EventBus  ├──────────────>│ Subscriber │
//! └──────────────────┘           │ (broadcast│               └────────────┘
//!                                │  channel) │   subscribe   ┌────────────┐
//!                                │           ├──────────────>│ Subscriber │
//!                                └───────────┘               └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{EventBus, StreamEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut subscriber = event_bus.subscribe();
//!
//! event_bus
//!     .emit(StreamEvent::Closed { stream_id: "s-1".to_string() })
//!     .ok();
//!
//! let event = subscriber.recv().await.unwrap();
//! assert_eq!(event.stream_id(), "s-1");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   Non-fatal; `ChunkApplied` is the high-volume variant, size the buffer
//!   accordingly.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates shutdown.
//!
//! Publishing never blocks and never fails the stream: with no subscribers the
//! event is simply dropped.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Stream Event Types
// ============================================================================

/// Why a hard resynchronization happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResyncReason {
    /// Wall-clock position and playback position diverged past the threshold
    Drift,
    /// The playback cursor overtook the loaded cursor
    Underrun,
}

impl fmt::Display for ResyncReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResyncReason::Drift => write!(f, "drift"),
            ResyncReason::Underrun => write!(f, "underrun"),
        }
    }
}

/// Observable transitions of a single PCM stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum StreamEvent {
    /// Header parsed and ring buffer allocated.
    Opened {
        stream_id: String,
        sample_rate_hz: u32,
        channel_count: u16,
        bits_per_sample: u16,
        total_frames: u64,
        capacity_frames: u64,
    },
    /// The engine was told to play (first chunk after open or resync).
    PlaybackStarted {
        stream_id: String,
        /// Logical frame the engine starts from
        at_frame: i64,
    },
    /// A fetched chunk was decoded and written into the ring buffer.
    ChunkApplied {
        stream_id: String,
        /// Frames written by this chunk
        frames: u64,
        /// Loaded cursor after the write
        loaded_index: i64,
        /// Headroom after the write, in seconds
        headroom_secs: f64,
    },
    /// A fetch or its validation failed; it will be retried.
    FetchFailed {
        stream_id: String,
        message: String,
        /// Delay before the next attempt (milliseconds)
        retry_in_ms: u64,
    },
    /// Cursors were reset to a new target frame.
    Resynced {
        stream_id: String,
        target_frame: i64,
        reason: ResyncReason,
        /// Signed drift in seconds at the time of the resync
        drift_secs: f64,
    },
    /// The last byte of the payload has been written.
    FullyLoaded { stream_id: String, loaded_index: i64 },
    /// Playback drained everything that was loaded.
    Completed { stream_id: String },
    /// The stream was torn down.
    Closed { stream_id: String },
}

impl StreamEvent {
    /// Identifier of the stream that produced the event.
    pub fn stream_id(&self) -> &str {
        match self {
            StreamEvent::Opened { stream_id, .. }
            | StreamEvent::PlaybackStarted { stream_id, .. }
            | StreamEvent::ChunkApplied { stream_id, .. }
            | StreamEvent::FetchFailed { stream_id, .. }
            | StreamEvent::Resynced { stream_id, .. }
            | StreamEvent::FullyLoaded { stream_id, .. }
            | StreamEvent::Completed { stream_id }
            | StreamEvent::Closed { stream_id } => stream_id,
        }
    }

    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            StreamEvent::Opened { .. } => "Stream opened",
            StreamEvent::PlaybackStarted { .. } => "Playback started",
            StreamEvent::ChunkApplied { .. } => "Chunk applied",
            StreamEvent::FetchFailed { .. } => "Fetch failed",
            StreamEvent::Resynced { .. } => "Stream resynchronized",
            StreamEvent::FullyLoaded { .. } => "Stream fully loaded",
            StreamEvent::Completed { .. } => "Stream completed",
            StreamEvent::Closed { .. } => "Stream closed",
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            StreamEvent::FetchFailed { .. } => EventSeverity::Warning,
            StreamEvent::Resynced {
                reason: ResyncReason::Underrun,
                ..
            } => EventSeverity::Warning,
            StreamEvent::Resynced { .. }
            | StreamEvent::Opened { .. }
            | StreamEvent::PlaybackStarted { .. }
            | StreamEvent::Completed { .. } => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to stream events.
///
/// Uses `tokio::sync::broadcast` internally, which provides:
/// - Multiple producers (clone the `EventBus`)
/// - Multiple consumers (each `subscribe()` creates a new receiver)
/// - Non-blocking sends (events are cloned for each subscriber)
/// - Lagging detection (slow subscribers get `RecvError::Lagged`)
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<StreamEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of events to buffer per subscriber.
    ///   When a subscriber falls behind by more than this amount, it will
    ///   receive a `RecvError::Lagged` error. Must be greater than zero.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event.
    /// Returns an error if there are no active subscribers.
    pub fn emit(&self, event: StreamEvent) -> Result<usize, SendError<StreamEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber to receive events.
    ///
    /// Each call creates an independent receiver that will receive all future events.
    /// Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<StreamEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&StreamEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with additional filtering capabilities.
///
/// # Example
///
/// ```rust
/// use core_runtime::events::{EventBus, EventSeverity, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let warnings = EventStream::new(event_bus.subscribe())
///     .filter(|event| event.severity() >= EventSeverity::Warning);
/// ```
pub struct EventStream {
    receiver: Receiver<StreamEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<StreamEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Adds a filter function to this stream.
    ///
    /// Only events that match the filter will be returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&StreamEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Restricts this stream to events from one stream.
    pub fn for_stream(self, stream_id: impl Into<String>) -> Self {
        let stream_id = stream_id.into();
        self.filter(move |event| event.stream_id() == stream_id)
    }

    fn matches(&self, event: &StreamEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter (if any).
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<StreamEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<StreamEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.matches(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn closed(id: &str) -> StreamEvent {
        StreamEvent::Closed {
            stream_id: id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_event_bus_creation() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(closed("s-1")).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = StreamEvent::PlaybackStarted {
            stream_id: "s-1".to_string(),
            at_frame: 0,
        };
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_filter_by_stream() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe()).for_stream("wanted");

        bus.emit(closed("other")).ok();
        bus.emit(closed("wanted")).ok();

        let received = stream.recv().await.unwrap();
        assert_eq!(received.stream_id(), "wanted");
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_event_stream_lagged() {
        let bus = EventBus::new(2);
        let mut stream = EventStream::new(bus.subscribe());

        for i in 0..5 {
            bus.emit(closed(&format!("s-{}", i))).ok();
        }

        assert!(matches!(stream.try_recv(), Some(Err(RecvError::Lagged(_)))));
    }

    #[test]
    fn test_event_severity() {
        let failed = StreamEvent::FetchFailed {
            stream_id: "s".into(),
            message: "timeout".into(),
            retry_in_ms: 250,
        };
        assert_eq!(failed.severity(), EventSeverity::Warning);

        let underrun = StreamEvent::Resynced {
            stream_id: "s".into(),
            target_frame: 10,
            reason: ResyncReason::Underrun,
            drift_secs: 0.0,
        };
        assert_eq!(underrun.severity(), EventSeverity::Warning);

        let chunk = StreamEvent::ChunkApplied {
            stream_id: "s".into(),
            frames: 220_500,
            loaded_index: 220_500,
            headroom_secs: 5.0,
        };
        assert_eq!(chunk.severity(), EventSeverity::Debug);
        assert_eq!(chunk.description(), "Chunk applied");
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = StreamEvent::Resynced {
            stream_id: "s-9".into(),
            target_frame: 1_852_200,
            reason: ResyncReason::Drift,
            drift_secs: 12.5,
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "Resynced");
        assert_eq!(json["reason"], "drift");
        assert_eq!(json["target_frame"], 1_852_200);

        let back: StreamEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
