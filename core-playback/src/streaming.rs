//! # PCM Streaming Service
//!
//! Producer side of the pipeline: owns the ring buffer and every cursor of one
//! stream, and advances them from a single [`StreamingService::tick`] entry
//! point.
//!
//! ## Architecture
//!
//! The service never blocks inside `tick`. A range fetch is spawned on the
//! tokio runtime that opened the stream and its result is picked up by a
//! later tick through a `oneshot` channel. At most one fetch is in flight, so
//! chunks are applied strictly in request order.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       StreamingService::tick(elapsed)   │
//! │                                         │
//! │  1. Observe engine position (tracker)   │
//! │  2. Apply finished fetch (scheduler)    │
//! │  3. Completion / drift / underrun       │
//! │  4. Plan and spawn next fetch           │
//! └────────────┬────────────────────────────┘
//!              │ normalized samples
//!              ▼
//! ┌─────────────────────────────────────────┐
//! │        RingBuffer (owned by core)       │
//! └────────────┬────────────────────────────┘
//!              │ RingBufferReader
//!              ▼
//! ┌─────────────────────────────────────────┐
//! │     PlaybackEngine (host, consumer)     │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use core_playback::streaming::{StreamingRequest, StreamingService};
//! use core_playback::traits::PlaybackEngine;
//! use bridge_traits::http::RangeFetcher;
//! use std::sync::Arc;
//! use std::time::{Duration, Instant};
//!
//! async fn play(fetcher: Arc<dyn RangeFetcher>, engine: Box<dyn PlaybackEngine>) {
//!     let request = StreamingRequest::new("https://example.com/take.wav");
//!     let mut service = StreamingService::open(request, fetcher, engine)
//!         .await
//!         .expect("header");
//!
//!     let start = Instant::now();
//!     while !service.phase().is_terminal() {
//!         service.tick(start.elapsed());
//!         tokio::time::sleep(Duration::from_millis(50)).await;
//!     }
//! }
//! ```

use crate::config::{StreamPhase, StreamingConfig, StreamingStats};
use crate::decoder::SampleDecoder;
use crate::error::{PlaybackError, Result};
use crate::header::{FormatDescriptor, HeaderParser, WAV_HEADER_LEN};
use crate::resync::{ResyncController, ResyncPlan, ResyncReason};
use crate::ring_buffer::{RingBuffer, RingBufferReader};
use crate::scheduler::{AppliedChunk, FetchPlan, PrefetchDecision, PrefetchScheduler, SkipReason};
use crate::state::StreamState;
use crate::traits::PlaybackEngine;
use bridge_traits::error::BridgeError;
use bridge_traits::http::{ByteRange, RangeFetcher, RangeResponse};
use core_runtime::config::CoreConfig;
use core_runtime::events::{EventBus, StreamEvent};
use core_runtime::logging::redact_url;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

type FetchOutcome = std::result::Result<RangeResponse, BridgeError>;

// ============================================================================
// Identity & Request Types
// ============================================================================

/// Unique identifier of one opened stream, used in logs and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId(Uuid);

impl StreamId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for StreamId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Request to open a stream.
#[derive(Clone)]
pub struct StreamingRequest {
    /// Location of the WAV asset; must support byte-range requests.
    pub url: String,
    pub config: StreamingConfig,
    /// Optional sink for lifecycle events.
    pub events: Option<EventBus>,
}

impl StreamingRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            config: StreamingConfig::default(),
            events: None,
        }
    }

    pub fn with_config(mut self, config: StreamingConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }
}

impl fmt::Debug for StreamingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingRequest")
            .field("url", &redact_url(&self.url))
            .field("config", &self.config)
            .field("events", &self.events.is_some())
            .finish()
    }
}

// ============================================================================
// Tick Reporting
// ============================================================================

/// What a single tick observed and did.
#[derive(Debug)]
pub struct TickReport {
    pub elapsed: Duration,
    pub phase: StreamPhase,
    pub loaded_index: i64,
    pub played_index: i64,
    /// Range spawned during this tick.
    pub fetch_issued: Option<ByteRange>,
    pub chunk_applied: Option<AppliedChunk>,
    /// Transient failure of the fetch that completed during this tick.
    pub fetch_error: Option<PlaybackError>,
    pub resync: Option<ResyncPlan>,
    /// Why no fetch was planned, when none was and none was in flight.
    pub skipped: Option<SkipReason>,
    /// A result planned before a resync arrived and was dropped.
    pub stale_discarded: bool,
}

impl TickReport {
    fn new(elapsed: Duration) -> Self {
        Self {
            elapsed,
            phase: StreamPhase::Priming,
            loaded_index: 0,
            played_index: 0,
            fetch_issued: None,
            chunk_applied: None,
            fetch_error: None,
            resync: None,
            skipped: None,
            stale_discarded: false,
        }
    }

    pub fn headroom_frames(&self) -> i64 {
        self.loaded_index - self.played_index
    }
}

/// Serializable point-in-time view of a stream.
#[derive(Debug, Clone, Serialize)]
pub struct StreamSnapshot {
    pub stream_id: StreamId,
    pub format: FormatDescriptor,
    pub capacity_frames: u64,
    pub state: StreamState,
    pub stats: StreamingStats,
    pub buffer_fill: f32,
    pub fetch_in_flight: bool,
}

// ============================================================================
// StreamingService
// ============================================================================

struct InFlightFetch {
    plan: FetchPlan,
    receiver: oneshot::Receiver<FetchOutcome>,
    cancel: CancellationToken,
    issued_at: Instant,
}

/// One open PCM stream.
pub struct StreamingService {
    id: StreamId,
    url: String,
    config: StreamingConfig,
    format: FormatDescriptor,
    fetcher: Arc<dyn RangeFetcher>,
    engine: Box<dyn PlaybackEngine>,
    ring: RingBuffer,
    decoder: SampleDecoder,
    scheduler: PrefetchScheduler,
    resync: ResyncController,
    state: StreamState,
    stats: StreamingStats,
    in_flight: Option<InFlightFetch>,
    runtime: Handle,
    shutdown: CancellationToken,
    events: Option<EventBus>,
}

impl StreamingService {
    /// [`open`](Self::open) using the fetcher injected into `core`. Attaches
    /// `core`'s event bus when the request carries none.
    pub async fn open_with_core(
        request: StreamingRequest,
        core: &CoreConfig,
        engine: Box<dyn PlaybackEngine>,
    ) -> Result<Self> {
        let request = if request.events.is_none() {
            request.with_events(core.event_bus.clone())
        } else {
            request
        };
        Self::open(request, Arc::clone(&core.range_fetcher), engine).await
    }

    /// Fetch and parse the header, allocate the ring buffer and attach the
    /// engine. The engine is not started until the first chunk lands.
    ///
    /// # Errors
    ///
    /// - [`PlaybackError::InvalidConfig`] for an inconsistent config
    /// - [`PlaybackError::Bridge`] if the header request fails or times out
    /// - [`PlaybackError::FetchFailure`] unless the header request returns 206
    /// - [`PlaybackError::MalformedHeader`] if the preamble is not canonical
    ///   PCM WAV
    #[instrument(skip(request, fetcher, engine), fields(url = %redact_url(&request.url)))]
    pub async fn open(
        request: StreamingRequest,
        fetcher: Arc<dyn RangeFetcher>,
        mut engine: Box<dyn PlaybackEngine>,
    ) -> Result<Self> {
        let StreamingRequest {
            url,
            config,
            events,
        } = request;
        config.ensure_valid()?;

        let runtime = Handle::try_current()
            .map_err(|e| PlaybackError::Internal(format!("no tokio runtime: {}", e)))?;

        let header_range = ByteRange::new(0, WAV_HEADER_LEN as u64);
        let response =
            tokio::time::timeout(config.fetch_timeout, fetcher.fetch_range(&url, header_range))
                .await
                .map_err(|_| BridgeError::Timeout(config.fetch_timeout))??;

        // a full-file fallback means the server ignored the range
        if !response.is_partial_content() {
            return Err(PlaybackError::FetchFailure(format!(
                "header request returned status {}",
                response.status
            )));
        }
        let format = HeaderParser::parse_with_length(&response.body, response.total_length)?;

        let capacity_frames = config.window_frames(format.sample_rate_hz);
        let ring = RingBuffer::for_format(&format, capacity_frames)?;
        let decoder = SampleDecoder::for_format(&format)?;
        engine.attach(ring.reader(), &format);

        let service = Self {
            id: StreamId::new(),
            scheduler: PrefetchScheduler::from_config(&config, &format),
            resync: ResyncController::from_config(&config),
            state: StreamState::new(&format, capacity_frames),
            stats: StreamingStats::default(),
            in_flight: None,
            shutdown: CancellationToken::new(),
            url,
            config,
            format,
            fetcher,
            engine,
            ring,
            decoder,
            runtime,
            events,
        };

        info!(
            stream_id = %service.id,
            sample_rate_hz = format.sample_rate_hz,
            channels = format.channel_count,
            bits_per_sample = format.bits_per_sample,
            total_frames = format.total_frames(),
            capacity_frames,
            "Opened PCM stream"
        );
        service.emit(StreamEvent::Opened {
            stream_id: service.id.to_string(),
            sample_rate_hz: format.sample_rate_hz,
            channel_count: format.channel_count,
            bits_per_sample: format.bits_per_sample,
            total_frames: format.total_frames(),
            capacity_frames,
        });

        Ok(service)
    }

    /// Advance the stream by one step. `elapsed` is the wall-clock time since
    /// the stream started and drives drift detection and retry backoff.
    ///
    /// Never blocks and never fails; transient errors are reported in the
    /// returned [`TickReport`] and retried on later ticks.
    pub fn tick(&mut self, elapsed: Duration) -> TickReport {
        let mut report = TickReport::new(elapsed);

        if self.state.phase.is_active() {
            self.state.tracker.observe(self.engine.reported_position());
            self.poll_in_flight(elapsed, &mut report);
            self.reconcile(elapsed, &mut report);

            if self.state.phase.is_active() && self.in_flight.is_none() {
                match self.scheduler.plan(&self.state, elapsed) {
                    PrefetchDecision::Fetch(plan) => {
                        report.fetch_issued = Some(plan.range);
                        self.issue(plan);
                    }
                    PrefetchDecision::Skip(reason) => report.skipped = Some(reason),
                }
            }
        }

        report.phase = self.state.phase;
        report.loaded_index = self.state.loaded_index;
        report.played_index = self.state.played_index();
        report
    }

    /// Tear the stream down: cancel the in-flight fetch and pause the engine.
    /// Later ticks do nothing and late fetch results are dropped.
    pub fn close(&mut self) {
        if self.state.phase == StreamPhase::Closed {
            return;
        }

        self.cancel_in_flight();
        self.shutdown.cancel();
        self.engine.pause();
        self.state.phase = StreamPhase::Closed;

        info!(stream_id = %self.id, loaded_index = self.state.loaded_index, "Closed PCM stream");
        self.emit(StreamEvent::Closed {
            stream_id: self.id.to_string(),
        });
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn format(&self) -> &FormatDescriptor {
        &self.format
    }

    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    pub fn phase(&self) -> StreamPhase {
        self.state.phase
    }

    pub fn state(&self) -> &StreamState {
        &self.state
    }

    pub fn stats(&self) -> &StreamingStats {
        &self.stats
    }

    /// Another read-only handle on the ring buffer.
    pub fn reader(&self) -> RingBufferReader {
        self.ring.reader()
    }

    pub fn is_fetch_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn snapshot(&self) -> StreamSnapshot {
        let capacity_frames = self.ring.capacity_frames() as u64;
        StreamSnapshot {
            stream_id: self.id,
            format: self.format,
            capacity_frames,
            state: self.state.clone(),
            stats: self.stats.clone(),
            buffer_fill: StreamingStats::buffer_fill_percentage(
                self.state.headroom(),
                capacity_frames,
            ),
            fetch_in_flight: self.in_flight.is_some(),
        }
    }

    // ------------------------------------------------------------------------
    // Tick steps
    // ------------------------------------------------------------------------

    fn poll_in_flight(&mut self, elapsed: Duration, report: &mut TickReport) {
        let outcome = match self.in_flight.as_mut().map(|f| f.receiver.try_recv()) {
            None | Some(Err(TryRecvError::Empty)) => return,
            Some(Ok(outcome)) => outcome,
            Some(Err(TryRecvError::Closed)) => Err(BridgeError::OperationFailed(
                "fetch task ended without a result".to_string(),
            )),
        };
        let Some(fetch) = self.in_flight.take() else {
            return;
        };

        if fetch.plan.generation != self.state.fetch_generation {
            self.stats.stale_results_discarded += 1;
            report.stale_discarded = true;
            debug!(
                stream_id = %self.id,
                range = %fetch.plan.range,
                "Discarded stale fetch result"
            );
            return;
        }

        let latency = fetch.issued_at.elapsed();
        match self.scheduler.apply(
            &mut self.state,
            &mut self.ring,
            &self.decoder,
            &fetch.plan,
            outcome,
        ) {
            Ok(applied) => self.on_chunk_applied(applied, latency, elapsed, report),
            Err(e) => self.on_fetch_failed(&fetch.plan, e, elapsed, report),
        }
    }

    fn on_chunk_applied(
        &mut self,
        applied: AppliedChunk,
        latency: Duration,
        elapsed: Duration,
        report: &mut TickReport,
    ) {
        self.stats.record_chunk(applied.bytes, applied.frames, latency);
        report.chunk_applied = Some(applied);

        self.emit(StreamEvent::ChunkApplied {
            stream_id: self.id.to_string(),
            frames: applied.frames,
            loaded_index: self.state.loaded_index,
            headroom_secs: self.state.headroom() as f64 / self.format.sample_rate_hz as f64,
        });

        if applied.starts_playback && self.state.phase == StreamPhase::Priming {
            self.engine.play();
            self.state.phase = StreamPhase::Playing;
            self.state.playback_anchor = Some(elapsed);
            self.stats.playback_starts += 1;

            let at_frame = self.state.tracker.sync_base();
            info!(
                stream_id = %self.id,
                at_frame,
                loaded_index = self.state.loaded_index,
                "Playback started"
            );
            self.emit(StreamEvent::PlaybackStarted {
                stream_id: self.id.to_string(),
                at_frame,
            });
        }

        if applied.fully_loaded {
            info!(
                stream_id = %self.id,
                loaded_index = self.state.loaded_index,
                "Stream fully loaded"
            );
            self.emit(StreamEvent::FullyLoaded {
                stream_id: self.id.to_string(),
                loaded_index: self.state.loaded_index,
            });
        }
    }

    fn on_fetch_failed(
        &mut self,
        plan: &FetchPlan,
        error: PlaybackError,
        elapsed: Duration,
        report: &mut TickReport,
    ) {
        self.stats.record_failure(&error);
        let retry_in = self.scheduler.record_failure(&mut self.state, elapsed);

        // overruns are already logged at error level by the scheduler
        if !matches!(error, PlaybackError::BufferOverrun { .. }) {
            warn!(
                stream_id = %self.id,
                range = %plan.range,
                attempt = self.state.backoff.consecutive_failures,
                retry_in_ms = retry_in.as_millis() as u64,
                error = %error,
                "Chunk fetch failed"
            );
        }
        self.emit(StreamEvent::FetchFailed {
            stream_id: self.id.to_string(),
            message: error.to_string(),
            retry_in_ms: retry_in.as_millis() as u64,
        });
        report.fetch_error = Some(error);
    }

    /// Completion, drift and underrun checks; only armed while playing.
    fn reconcile(&mut self, elapsed: Duration, report: &mut TickReport) {
        if self.state.phase != StreamPhase::Playing {
            return;
        }

        let played = self.state.played_index();
        let loaded = self.state.loaded_index;
        let rate = self.format.sample_rate_hz;

        if self.state.is_fully_loaded() && played >= loaded {
            self.complete();
        } else if let Some(plan) = self
            .state
            .timeline_position(elapsed, rate)
            .and_then(|timeline| self.resync.check(timeline, played, rate))
        {
            self.hard_resync(plan, report);
        } else if !self.state.is_fully_loaded() && played > loaded {
            let plan = self.resync.underrun(played, loaded, rate);
            self.hard_resync(plan, report);
        }
    }

    fn hard_resync(&mut self, plan: ResyncPlan, report: &mut TickReport) {
        let target_frame = plan.target_frame.clamp(0, self.format.total_frames() as i64);
        let plan = ResyncPlan { target_frame, ..plan };

        if self.cancel_in_flight() {
            self.stats.stale_results_discarded += 1;
            report.stale_discarded = true;
        }
        self.engine.pause();
        self.engine.reset_position();
        self.ring.clear();
        self.state.apply_resync(target_frame, &self.format);

        match plan.reason {
            ResyncReason::Drift => self.stats.resync_count += 1,
            ResyncReason::Underrun => self.stats.underrun_count += 1,
        }

        warn!(
            stream_id = %self.id,
            reason = %plan.reason,
            target_frame,
            drift_secs = plan.drift_secs,
            fetch_offset = self.state.fetch_cursor.offset,
            "Hard resync"
        );
        self.emit(StreamEvent::Resynced {
            stream_id: self.id.to_string(),
            target_frame,
            reason: plan.reason,
            drift_secs: plan.drift_secs,
        });
        report.resync = Some(plan);

        if self.state.phase == StreamPhase::Completed {
            info!(stream_id = %self.id, "Resync target is past the end of the stream");
            self.emit(StreamEvent::Completed {
                stream_id: self.id.to_string(),
            });
        }
    }

    fn complete(&mut self) {
        self.engine.pause();
        self.state.phase = StreamPhase::Completed;

        info!(
            stream_id = %self.id,
            played_index = self.state.played_index(),
            chunks = self.stats.chunks_applied,
            "Playback completed"
        );
        self.emit(StreamEvent::Completed {
            stream_id: self.id.to_string(),
        });
    }

    fn issue(&mut self, plan: FetchPlan) {
        let (sender, receiver) = oneshot::channel();
        let cancel = self.shutdown.child_token();

        let fetcher = Arc::clone(&self.fetcher);
        let url = self.url.clone();
        let fetch_timeout = self.config.fetch_timeout;
        let task_cancel = cancel.clone();
        let range = plan.range;

        self.runtime.spawn(async move {
            let outcome = tokio::select! {
                _ = task_cancel.cancelled() => return,
                result = tokio::time::timeout(fetch_timeout, fetcher.fetch_range(&url, range)) => {
                    result.unwrap_or(Err(BridgeError::Timeout(fetch_timeout)))
                }
            };
            // receiver dropped means the stream moved on
            let _ = sender.send(outcome);
        });

        self.stats.fetch_requests += 1;
        debug!(
            stream_id = %self.id,
            range = %plan.range,
            initial = plan.is_initial,
            generation = plan.generation,
            "Issued range fetch"
        );

        self.in_flight = Some(InFlightFetch {
            plan,
            receiver,
            cancel,
            issued_at: Instant::now(),
        });
    }

    /// Returns `true` if a fetch was cancelled.
    fn cancel_in_flight(&mut self) -> bool {
        match self.in_flight.take() {
            Some(fetch) => {
                fetch.cancel.cancel();
                debug!(
                    stream_id = %self.id,
                    range = %fetch.plan.range,
                    "Cancelled in-flight fetch"
                );
                true
            }
            None => false,
        }
    }

    fn emit(&self, event: StreamEvent) {
        if let Some(events) = &self.events {
            events.emit(event).ok();
        }
    }
}

impl Drop for StreamingService {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl fmt::Debug for StreamingService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingService")
            .field("id", &self.id)
            .field("url", &redact_url(&self.url))
            .field("format", &self.format)
            .field("state", &self.state)
            .field("fetch_in_flight", &self.in_flight.is_some())
            .finish()
    }
}
