//! # PCM Streaming Example
//!
//! Streams a synthesized WAV file from an in-memory "server" into the ring
//! buffer while a simulated engine consumes it in real time.
//!
//! Run with: `cargo run --example playback_demo --package core-playback`

use anyhow::Context;
use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{ByteRange, RangeFetcher, RangeResponse};
use bridge_traits::{LogLevel, SystemClock};
use bytes::Bytes;
use core_playback::{
    FormatDescriptor, HeaderParser, PlaybackEngine, RingBufferReader, SampleConverter,
    StreamingConfig, StreamingRequest, StreamingService, TickDriver,
};
use core_runtime::config::CoreConfig;
use core_runtime::events::EventStream;
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

// ============================================================================
// In-Memory Range Server
// ============================================================================

struct InMemoryFetcher {
    asset: Bytes,
}

impl InMemoryFetcher {
    /// A mono 16-bit sine tone.
    fn sine(sample_rate_hz: u32, seconds: u32, frequency: f32) -> anyhow::Result<Self> {
        let frames = sample_rate_hz * seconds;
        let samples: Vec<f32> = (0..frames)
            .map(|i| {
                let t = i as f32 / sample_rate_hz as f32;
                (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3
            })
            .collect();
        let payload = SampleConverter::encode_i16_le(&samples);

        let format = FormatDescriptor::new(1, sample_rate_hz, 16, payload.len() as u32)
            .context("building demo format")?;
        let mut asset = HeaderParser::encode(&format).to_vec();
        asset.extend_from_slice(&payload);

        Ok(Self {
            asset: Bytes::from(asset),
        })
    }
}

#[async_trait]
impl RangeFetcher for InMemoryFetcher {
    async fn fetch_range(&self, _url: &str, range: ByteRange) -> BridgeResult<RangeResponse> {
        let len = self.asset.len() as u64;
        if range.start >= len {
            return Err(BridgeError::Http {
                status: 416,
                message: "Range Not Satisfiable".to_string(),
            });
        }
        // simulate a little network latency
        tokio::time::sleep(Duration::from_millis(15)).await;

        let end = range.end.min(len) as usize;
        Ok(RangeResponse::partial(
            self.asset.slice(range.start as usize..end),
            Some(len),
        ))
    }
}

// ============================================================================
// Simulated Engine
// ============================================================================

/// Consumes frames in real time without producing sound.
#[derive(Clone, Default)]
struct SimulatedEngine {
    inner: Arc<Mutex<EngineState>>,
}

#[derive(Default)]
struct EngineState {
    reader: Option<RingBufferReader>,
    sample_rate_hz: u32,
    played_before: u64,
    playing_since: Option<Instant>,
    peak: f32,
}

impl EngineState {
    fn consumed(&self) -> u64 {
        let running = self
            .playing_since
            .map(|since| (since.elapsed().as_secs_f64() * self.sample_rate_hz as f64) as u64)
            .unwrap_or(0);
        self.played_before + running
    }
}

impl PlaybackEngine for SimulatedEngine {
    fn attach(&mut self, reader: RingBufferReader, format: &FormatDescriptor) {
        let mut state = self.inner.lock();
        state.reader = Some(reader);
        state.sample_rate_hz = format.sample_rate_hz;
    }

    fn play(&mut self) {
        let mut state = self.inner.lock();
        if state.playing_since.is_none() {
            state.playing_since = Some(Instant::now());
        }
    }

    fn pause(&mut self) {
        let mut state = self.inner.lock();
        state.played_before = state.consumed();
        state.playing_since = None;
    }

    fn reset_position(&mut self) {
        let mut state = self.inner.lock();
        state.played_before = 0;
        if state.playing_since.is_some() {
            state.playing_since = Some(Instant::now());
        }
    }

    fn reported_position(&self) -> u64 {
        let mut state = self.inner.lock();
        let Some(reader) = state.reader.clone() else {
            return 0;
        };
        let capacity = reader.capacity_frames() as u64;
        let position = state.consumed() % capacity;

        // "render" a few frames at the current position
        let mut block = [0.0f32; 64];
        let frames = reader.read_frames(position as usize, &mut block[..reader.channels() * 16]);
        let peak = block[..frames * reader.channels()]
            .iter()
            .fold(0.0f32, |acc, s| acc.max(s.abs()));
        state.peak = state.peak.max(peak);

        position
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging(
        LoggingConfig::default()
            .with_format(LogFormat::Compact)
            .with_level(LogLevel::Info),
    )
    .context("initializing logging")?;

    println!("=== PCM Streaming Demo ===\n");

    let core = CoreConfig::builder()
        .range_fetcher(Arc::new(InMemoryFetcher::sine(8_000, 3, 440.0)?))
        .clock(Arc::new(SystemClock))
        .tick_interval(Duration::from_millis(20))
        .event_buffer_size(256)
        .build()
        .context("building core config")?;

    let engine = SimulatedEngine::default();
    let mut event_stream = EventStream::new(core.event_bus.subscribe());

    let request =
        StreamingRequest::new("memory://sine.wav").with_config(StreamingConfig::low_latency());

    let mut service = StreamingService::open_with_core(request, &core, Box::new(engine.clone()))
        .await
        .context("opening stream")?;

    let format = *service.format();
    println!(
        "Format: {} Hz, {} ch, {} bit, {:.1}s",
        format.sample_rate_hz,
        format.channel_count,
        format.bits_per_sample,
        format.duration().as_secs_f64()
    );

    let driver = TickDriver::from_config(&core);
    let phase = driver.run(&mut service).await;

    println!("\nFinal phase: {:?}", phase);
    println!("Events:");
    while let Some(Ok(event)) = event_stream.try_recv() {
        println!("  - {}", event.description());
    }

    let stats = service.stats();
    println!("\nStatistics:");
    println!("  Range requests:   {}", stats.fetch_requests);
    println!("  Chunks applied:   {}", stats.chunks_applied);
    println!("  Frames loaded:    {}", stats.frames_loaded);
    println!("  Resyncs:          {}", stats.resync_count);
    println!("  Avg latency:      {:.1} ms", stats.avg_fetch_latency_ms);
    println!("  Peak level seen:  {:.2}", engine.inner.lock().peak);

    Ok(())
}
