//! Tests for the playback engine contract.
//!
//! This test suite verifies, with a mockall engine:
//! - `attach` receives a reader sized to the configured window
//! - `play` is called once per priming period
//! - a hard resync pauses and rewinds the engine before anything else

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::http::{ByteRange, RangeFetcher, RangeResponse};
use bytes::Bytes;
use core_playback::{
    FormatDescriptor, HeaderParser, PlaybackEngine, RingBufferReader, StreamPhase,
    StreamingConfig, StreamingRequest, StreamingService,
};
use mockall::mock;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

mock! {
    pub Engine {}

    impl PlaybackEngine for Engine {
        fn attach(&mut self, reader: RingBufferReader, format: &FormatDescriptor);
        fn play(&mut self);
        fn pause(&mut self);
        fn reset_position(&mut self);
        fn reported_position(&self) -> u64;
    }
}

/// Serves a mono 8 kHz 16-bit asset of silence.
struct SilenceFetcher {
    asset: Bytes,
}

impl SilenceFetcher {
    fn new(seconds: u32) -> Arc<Self> {
        let format = FormatDescriptor::new(1, 8_000, 16, seconds * 16_000).unwrap();
        let mut asset = HeaderParser::encode(&format).to_vec();
        asset.resize(44 + (seconds * 16_000) as usize, 0);
        Arc::new(Self {
            asset: Bytes::from(asset),
        })
    }
}

#[async_trait]
impl RangeFetcher for SilenceFetcher {
    async fn fetch_range(&self, _url: &str, range: ByteRange) -> BridgeResult<RangeResponse> {
        let end = range.end.min(self.asset.len() as u64) as usize;
        Ok(RangeResponse::partial(
            self.asset.slice(range.start as usize..end),
            Some(self.asset.len() as u64),
        ))
    }
}

async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

fn request() -> StreamingRequest {
    StreamingRequest::new("https://cdn.example.com/tone.wav")
}

#[tokio::test]
async fn test_engine_attached_and_started_once() {
    let mut engine = MockEngine::new();
    engine
        .expect_attach()
        .withf(|reader, format| {
            reader.capacity_frames() == 30 * 8_000
                && reader.channels() == 1
                && format.sample_rate_hz == 8_000
        })
        .times(1)
        .return_const(());
    engine.expect_reported_position().return_const(0u64);
    engine.expect_play().times(1).return_const(());
    engine.expect_pause().never();
    engine.expect_reset_position().never();

    let mut service = StreamingService::open(request(), SilenceFetcher::new(60), Box::new(engine))
        .await
        .unwrap();

    service.tick(Duration::ZERO);
    for _ in 0..5 {
        settle().await;
        service.tick(Duration::from_millis(10));
    }

    assert_eq!(service.phase(), StreamPhase::Playing);
    assert_eq!(service.stats().playback_starts, 1);
}

#[tokio::test]
async fn test_resync_pauses_then_rewinds_then_restarts() {
    let position = Arc::new(AtomicU64::new(0));
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut engine = MockEngine::new();

    engine.expect_attach().times(1).return_const(());
    let reported = Arc::clone(&position);
    engine
        .expect_reported_position()
        .returning(move || reported.load(Ordering::SeqCst));

    let log = Arc::clone(&calls);
    engine
        .expect_play()
        .times(2)
        .returning(move || log.lock().push("play"));
    let log = Arc::clone(&calls);
    engine
        .expect_pause()
        .times(1)
        .returning(move || log.lock().push("pause"));
    let log = Arc::clone(&calls);
    let rewind = Arc::clone(&position);
    engine.expect_reset_position().times(1).returning(move || {
        rewind.store(0, Ordering::SeqCst);
        log.lock().push("reset");
    });

    let config = StreamingConfig {
        drift_threshold: Duration::from_secs(2),
        ..StreamingConfig::default()
    };
    let mut service = StreamingService::open(
        request().with_config(config),
        SilenceFetcher::new(60),
        Box::new(engine),
    )
    .await
    .unwrap();

    service.tick(Duration::ZERO);
    settle().await;
    service.tick(Duration::ZERO);
    assert_eq!(service.phase(), StreamPhase::Playing);

    // engine stalled at 1 s while 10 s passed
    position.store(8_000, Ordering::SeqCst);
    let report = service.tick(Duration::from_secs(10));
    assert_eq!(report.resync.map(|p| p.target_frame), Some(80_000));
    assert_eq!(service.phase(), StreamPhase::Priming);

    settle().await;
    let resumed = service.tick(Duration::from_secs(10));
    assert_eq!(resumed.phase, StreamPhase::Playing);
    assert_eq!(resumed.played_index, 80_000);
    assert_eq!(*calls.lock(), vec!["play", "pause", "reset", "play"]);
}

#[tokio::test]
async fn test_close_pauses_engine() {
    let mut engine = MockEngine::new();
    engine.expect_attach().return_const(());
    engine.expect_reported_position().return_const(0u64);
    engine.expect_play().never();
    engine.expect_pause().times(1).return_const(());

    let mut service = StreamingService::open(request(), SilenceFetcher::new(5), Box::new(engine))
        .await
        .unwrap();

    service.close();
    service.close();
    assert_eq!(service.phase(), StreamPhase::Closed);
}
