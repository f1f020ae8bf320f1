//! # Ring Buffer for PCM Audio Samples
//!
//! Fixed-capacity circular store of interleaved normalized samples shared
//! between the streaming core (single writer) and the playback engine
//! (readers).
//!
//! ## Design
//!
//! - **Capacity**: `capacity_frames * channels` samples, fixed at creation
//! - **Addressing**: logical frame `i` lives at sample offset
//!   `(i mod capacity_frames) * channels`
//! - **Writes**: whole chunks under one write lock, split into a tail copy and
//!   a head copy when they cross the end; a reader never sees half a chunk
//! - **Ownership**: [`RingBuffer`] is the only handle that can write; the
//!   engine gets a cloneable [`RingBufferReader`]
//! - **No overwrite policy**: lapping the reader is prevented by the caller
//!   through [`RingBuffer::ensure_fits`]
//!
//! ## Usage
//!
//! ```rust
//! use core_playback::ring_buffer::RingBuffer;
//!
//! // 4 frames of stereo
//! let mut buffer = RingBuffer::new(4, 2).unwrap();
//! let reader = buffer.reader();
//!
//! // frames 3 and 4 wrap onto physical frames 3 and 0
//! buffer.write(3, &[0.1, 0.1, 0.2, 0.2]).unwrap();
//!
//! let mut out = [0.0f32; 4];
//! reader.read_frames(3, &mut out);
//! assert_eq!(out, [0.1, 0.1, 0.2, 0.2]);
//! ```

use crate::error::{PlaybackError, Result};
use crate::header::FormatDescriptor;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

struct SharedStorage {
    samples: RwLock<Box<[f32]>>,
    capacity_frames: usize,
    channels: usize,
    frames_written: AtomicU64,
}

impl SharedStorage {
    fn capacity_samples(&self) -> usize {
        self.capacity_frames * self.channels
    }

    fn physical_frame(&self, logical_frame: i64) -> usize {
        logical_frame.rem_euclid(self.capacity_frames as i64) as usize
    }
}

// ============================================================================
// Writer
// ============================================================================

/// Writable ring buffer handle. Deliberately not `Clone`.
pub struct RingBuffer {
    shared: Arc<SharedStorage>,
}

impl RingBuffer {
    /// Create a zeroed buffer of `capacity_frames` frames of `channels` samples.
    pub fn new(capacity_frames: usize, channels: usize) -> Result<Self> {
        if capacity_frames == 0 || channels == 0 {
            return Err(PlaybackError::InvalidConfig(format!(
                "ring buffer needs non-zero capacity and channels (got {} frames x {} ch)",
                capacity_frames, channels
            )));
        }

        let len = capacity_frames.checked_mul(channels).ok_or_else(|| {
            PlaybackError::InvalidConfig("ring buffer size overflows usize".to_string())
        })?;

        Ok(Self {
            shared: Arc::new(SharedStorage {
                samples: RwLock::new(vec![0.0; len].into_boxed_slice()),
                capacity_frames,
                channels,
                frames_written: AtomicU64::new(0),
            }),
        })
    }

    /// Buffer holding `window_frames` frames of the given format.
    pub fn for_format(format: &FormatDescriptor, window_frames: u64) -> Result<Self> {
        let capacity = usize::try_from(window_frames).map_err(|_| {
            PlaybackError::InvalidConfig(format!("window of {} frames too large", window_frames))
        })?;
        Self::new(capacity, format.channel_count as usize)
    }

    /// Read-only handle sharing this buffer's storage.
    pub fn reader(&self) -> RingBufferReader {
        RingBufferReader {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn capacity_frames(&self) -> usize {
        self.shared.capacity_frames
    }

    pub fn channels(&self) -> usize {
        self.shared.channels
    }

    /// Physical frame slot of a logical frame index.
    pub fn physical_frame(&self, logical_frame: i64) -> usize {
        self.shared.physical_frame(logical_frame)
    }

    /// Check that writing `frames` frames starting at `write_start` keeps the
    /// writer at most one capacity ahead of `read_floor`.
    ///
    /// All three values must be expressed in the same logical frame space.
    pub fn ensure_fits(&self, write_start: i64, frames: u64, read_floor: i64) -> Result<()> {
        let capacity = self.shared.capacity_frames as u64;
        let write_end = write_start as i128 + frames as i128;
        let limit = read_floor as i128 + capacity as i128;

        if frames > capacity || write_end > limit {
            return Err(PlaybackError::BufferOverrun {
                write_start,
                frames,
                read_floor,
                capacity_frames: capacity,
            });
        }
        Ok(())
    }

    /// Write interleaved `samples` starting at logical frame `at_frame`.
    ///
    /// Returns the number of frames written. The write is all-or-nothing.
    ///
    /// # Errors
    ///
    /// - [`PlaybackError::TruncatedChunk`] if `samples` is not whole frames
    /// - [`PlaybackError::BufferOverrun`] if the chunk is larger than the buffer
    pub fn write(&mut self, at_frame: i64, samples: &[f32]) -> Result<usize> {
        let channels = self.shared.channels;
        if samples.len() % channels != 0 {
            return Err(PlaybackError::TruncatedChunk(format!(
                "{} samples is not a whole number of {}-channel frames",
                samples.len(),
                channels
            )));
        }

        let frames = samples.len() / channels;
        if frames == 0 {
            return Ok(0);
        }
        if frames > self.shared.capacity_frames {
            return Err(PlaybackError::BufferOverrun {
                write_start: at_frame,
                frames: frames as u64,
                read_floor: at_frame,
                capacity_frames: self.shared.capacity_frames as u64,
            });
        }

        let capacity_samples = self.shared.capacity_samples();
        let start = self.shared.physical_frame(at_frame) * channels;

        let mut storage = self.shared.samples.write();
        if start + samples.len() <= capacity_samples {
            storage[start..start + samples.len()].copy_from_slice(samples);
        } else {
            let tail = capacity_samples - start;
            storage[start..].copy_from_slice(&samples[..tail]);
            storage[..samples.len() - tail].copy_from_slice(&samples[tail..]);
        }
        drop(storage);

        self.shared
            .frames_written
            .fetch_add(frames as u64, Ordering::Release);

        Ok(frames)
    }

    /// Zero every sample.
    pub fn clear(&mut self) {
        self.shared.samples.write().fill(0.0);
    }
}

impl fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity_frames", &self.shared.capacity_frames)
            .field("channels", &self.shared.channels)
            .finish()
    }
}

// ============================================================================
// Reader
// ============================================================================

/// Read-only view of a [`RingBuffer`], handed to the playback engine.
#[derive(Clone)]
pub struct RingBufferReader {
    shared: Arc<SharedStorage>,
}

impl RingBufferReader {
    pub fn capacity_frames(&self) -> usize {
        self.shared.capacity_frames
    }

    pub fn channels(&self) -> usize {
        self.shared.channels
    }

    /// Total frames written since creation; increases by whole chunks.
    pub fn frames_written(&self) -> u64 {
        self.shared.frames_written.load(Ordering::Acquire)
    }

    /// Copy frames starting at physical frame `start_frame` into `out`,
    /// wrapping at the end of the buffer.
    ///
    /// Copies `min(out.len() / channels, capacity_frames)` whole frames and
    /// returns that count.
    pub fn read_frames(&self, start_frame: usize, out: &mut [f32]) -> usize {
        let channels = self.shared.channels;
        let capacity_samples = self.shared.capacity_samples();
        let frames = (out.len() / channels).min(self.shared.capacity_frames);
        let len = frames * channels;
        if len == 0 {
            return 0;
        }

        let start = (start_frame % self.shared.capacity_frames) * channels;
        let storage = self.shared.samples.read();
        if start + len <= capacity_samples {
            out[..len].copy_from_slice(&storage[start..start + len]);
        } else {
            let tail = capacity_samples - start;
            out[..tail].copy_from_slice(&storage[start..]);
            out[tail..len].copy_from_slice(&storage[..len - tail]);
        }
        frames
    }

    /// Copy of the whole physical buffer.
    pub fn snapshot(&self) -> Vec<f32> {
        self.shared.samples.read().to_vec()
    }
}

impl fmt::Debug for RingBufferReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBufferReader")
            .field("capacity_frames", &self.shared.capacity_frames)
            .field("channels", &self.shared.channels)
            .field("frames_written", &self.frames_written())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(frames: usize, channels: usize, start: f32) -> Vec<f32> {
        (0..frames * channels).map(|i| start + i as f32).collect()
    }

    #[test]
    fn test_ring_buffer_creation() {
        let buffer = RingBuffer::new(1024, 2).unwrap();
        assert_eq!(buffer.capacity_frames(), 1024);
        assert_eq!(buffer.channels(), 2);
        assert_eq!(buffer.reader().snapshot().len(), 2048);
        assert_eq!(buffer.reader().frames_written(), 0);
    }

    #[test]
    fn test_ring_buffer_rejects_zero_sizes() {
        assert!(RingBuffer::new(0, 2).is_err());
        assert!(RingBuffer::new(16, 0).is_err());
    }

    #[test]
    fn test_ring_buffer_write_read() {
        let mut buffer = RingBuffer::new(8, 2).unwrap();
        let reader = buffer.reader();

        let samples = ramp(3, 2, 1.0);
        assert_eq!(buffer.write(0, &samples).unwrap(), 3);

        let mut out = vec![0.0; 6];
        assert_eq!(reader.read_frames(0, &mut out), 3);
        assert_eq!(out, samples);
        assert_eq!(reader.frames_written(), 3);
    }

    #[test]
    fn test_ring_buffer_wrap_around_split() {
        let mut buffer = RingBuffer::new(5, 2).unwrap();
        let samples = ramp(4, 2, 10.0);

        // logical 13 -> physical 3; frames 3,4 then 0,1
        buffer.write(13, &samples).unwrap();

        let snapshot = buffer.reader().snapshot();
        assert_eq!(&snapshot[6..10], &samples[0..4]);
        assert_eq!(&snapshot[0..4], &samples[4..8]);
        assert_eq!(&snapshot[4..6], &[0.0, 0.0]);
    }

    #[test]
    fn test_ring_buffer_exact_fill_from_zero() {
        let mut buffer = RingBuffer::new(4, 1).unwrap();
        buffer.write(0, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(buffer.reader().snapshot(), vec![1.0, 2.0, 3.0, 4.0]);

        buffer.write(4, &[5.0, 6.0, 7.0, 8.0]).unwrap();
        assert_eq!(buffer.reader().snapshot(), vec![5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn test_ring_buffer_negative_logical_index() {
        let buffer = RingBuffer::new(10, 1).unwrap();
        assert_eq!(buffer.physical_frame(-1), 9);
        assert_eq!(buffer.physical_frame(-10), 0);
        assert_eq!(buffer.physical_frame(23), 3);
    }

    #[test]
    fn test_ring_buffer_rejects_partial_frames() {
        let mut buffer = RingBuffer::new(8, 2).unwrap();
        let err = buffer.write(0, &[0.1, 0.2, 0.3]).unwrap_err();
        assert!(matches!(err, PlaybackError::TruncatedChunk(_)));
        assert_eq!(buffer.reader().frames_written(), 0);
    }

    #[test]
    fn test_ring_buffer_rejects_oversized_chunk() {
        let mut buffer = RingBuffer::new(4, 1).unwrap();
        let err = buffer.write(0, &[0.0; 5]).unwrap_err();
        assert!(matches!(err, PlaybackError::BufferOverrun { .. }));
        assert_eq!(buffer.reader().snapshot(), vec![0.0; 4]);
    }

    #[test]
    fn test_ring_buffer_ensure_fits() {
        let buffer = RingBuffer::new(100, 2).unwrap();

        // writer exactly one capacity ahead is fine
        assert!(buffer.ensure_fits(50, 50, 0).is_ok());
        // one frame more would overwrite frame 0 before it is played
        assert!(buffer.ensure_fits(50, 51, 0).is_err());
        assert!(buffer.ensure_fits(0, 101, 0).is_err());
        assert!(buffer.ensure_fits(1_000, 100, 1_000).is_ok());
    }

    #[test]
    fn test_ring_buffer_read_wraps() {
        let mut buffer = RingBuffer::new(4, 1).unwrap();
        buffer.write(0, &[1.0, 2.0, 3.0, 4.0]).unwrap();

        let mut out = [0.0; 3];
        assert_eq!(buffer.reader().read_frames(3, &mut out), 3);
        assert_eq!(out, [4.0, 1.0, 2.0]);

        // never more than one capacity
        let mut big = [0.0; 10];
        assert_eq!(buffer.reader().read_frames(0, &mut big), 4);
    }

    #[test]
    fn test_ring_buffer_clear() {
        let mut buffer = RingBuffer::new(4, 1).unwrap();
        buffer.write(0, &[1.0, 2.0]).unwrap();
        buffer.clear();
        assert_eq!(buffer.reader().snapshot(), vec![0.0; 4]);
    }
}
