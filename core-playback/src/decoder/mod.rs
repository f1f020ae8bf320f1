//! # PCM Sample Decoder
//!
//! Turns raw payload bytes into interleaved normalized `f32` samples.
//!
//! ## Supported Formats
//!
//! | Bits | Encoding | Normalization |
//! |------|----------|---------------|
//! | 16 | signed little-endian | `s / 32768` |
//! | 8 | unsigned, silence at 128 | `(b - 128) / 128` |
//!
//! Decoding is a pure function of the byte span and the sample width; the
//! decoder never reads beyond the span it is given.

mod sample_converter;

pub use sample_converter::SampleConverter;

use crate::error::{PlaybackError, Result};
use crate::header::FormatDescriptor;

/// Linear PCM decoder for one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleDecoder {
    bits_per_sample: u16,
}

impl SampleDecoder {
    /// Create a decoder for 8- or 16-bit samples.
    pub fn new(bits_per_sample: u16) -> Result<Self> {
        match bits_per_sample {
            8 | 16 => Ok(Self { bits_per_sample }),
            other => Err(PlaybackError::MalformedHeader(format!(
                "unsupported bits per sample: {}",
                other
            ))),
        }
    }

    /// Decoder matching a parsed header.
    pub fn for_format(format: &FormatDescriptor) -> Result<Self> {
        Self::new(format.bits_per_sample)
    }

    /// Bytes per single-channel sample.
    pub fn sample_width(&self) -> usize {
        self.bits_per_sample as usize / 8
    }

    /// Decode `bytes` into a new sample vector.
    ///
    /// # Errors
    ///
    /// [`PlaybackError::TruncatedChunk`] if `bytes.len()` is not a multiple of
    /// the sample width.
    pub fn decode(&self, bytes: &[u8]) -> Result<Vec<f32>> {
        let mut out = Vec::with_capacity(bytes.len() / self.sample_width());
        self.decode_into(bytes, &mut out)?;
        Ok(out)
    }

    /// Decode `bytes`, appending to `out`. Returns the number of samples
    /// appended. On error `out` is left untouched.
    pub fn decode_into(&self, bytes: &[u8], out: &mut Vec<f32>) -> Result<usize> {
        let width = self.sample_width();
        if bytes.len() % width != 0 {
            return Err(PlaybackError::TruncatedChunk(format!(
                "{} bytes is not a multiple of the {}-byte sample width",
                bytes.len(),
                width
            )));
        }

        let count = bytes.len() / width;
        out.reserve(count);
        match self.bits_per_sample {
            16 => out.extend(
                bytes
                    .chunks_exact(2)
                    .map(|pair| SampleConverter::i16_to_f32(i16::from_le_bytes([pair[0], pair[1]]))),
            ),
            _ => out.extend(bytes.iter().map(|&b| SampleConverter::u8_to_f32(b))),
        }
        Ok(count)
    }
}
