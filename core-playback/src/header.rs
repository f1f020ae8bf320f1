//! # WAV Header Parsing
//!
//! Decodes the canonical 44-byte PCM RIFF/WAVE preamble into a
//! [`FormatDescriptor`].
//!
//! ## Layout (little-endian)
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0      | 4    | `"RIFF"` |
//! | 4      | 4    | RIFF chunk size (file size - 8) |
//! | 8      | 4    | `"WAVE"` |
//! | 12     | 4    | `"fmt "` |
//! | 16     | 4    | fmt chunk size (16 for PCM) |
//! | 20     | 2    | audio format (1 = linear PCM) |
//! | 22     | 2    | channel count |
//! | 24     | 4    | sample rate |
//! | 28     | 4    | byte rate |
//! | 32     | 2    | block align |
//! | 34     | 2    | bits per sample |
//! | 36     | 4    | `"data"` |
//! | 40     | 4    | payload size |
//!
//! Only this canonical layout is accepted: fixed offsets are trusted only
//! after every chunk tag has been checked.

use crate::error::{PlaybackError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Size of the canonical PCM WAV header; also the offset of the first payload byte.
pub const WAV_HEADER_LEN: usize = 44;

const RIFF_CHUNK_SIZE_BASE: u32 = 36;
const PCM_FMT_CHUNK_SIZE: u32 = 16;
const FORMAT_TAG_PCM: u16 = 1;

/// Immutable description of a PCM asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatDescriptor {
    /// Interleaved channels per frame
    pub channel_count: u16,
    /// Frames per second
    pub sample_rate_hz: u32,
    /// `sample_rate_hz * channel_count * bytes_per_sample`
    pub bytes_per_second: u32,
    /// 8 or 16
    pub bits_per_sample: u16,
    /// Payload size in bytes, excluding the header
    pub total_data_bytes: u32,
}

impl FormatDescriptor {
    /// Build a descriptor from its independent fields, deriving the byte rate.
    ///
    /// # Errors
    ///
    /// [`PlaybackError::MalformedHeader`] when a field is out of range.
    pub fn new(
        channel_count: u16,
        sample_rate_hz: u32,
        bits_per_sample: u16,
        total_data_bytes: u32,
    ) -> Result<Self> {
        let bytes_per_second = (sample_rate_hz as u64)
            .checked_mul(channel_count as u64 * (bits_per_sample as u64 / 8))
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| PlaybackError::MalformedHeader("byte rate overflows u32".to_string()))?;

        let descriptor = Self {
            channel_count,
            sample_rate_hz,
            bytes_per_second,
            bits_per_sample,
            total_data_bytes,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    fn validate(&self) -> Result<()> {
        if self.channel_count == 0 {
            return Err(malformed("channel count is zero"));
        }
        if self.sample_rate_hz == 0 {
            return Err(malformed("sample rate is zero"));
        }
        if !matches!(self.bits_per_sample, 8 | 16) {
            return Err(PlaybackError::MalformedHeader(format!(
                "unsupported bits per sample: {}",
                self.bits_per_sample
            )));
        }
        let expected = self.sample_rate_hz as u64 * self.block_align() as u64;
        if self.bytes_per_second as u64 != expected || self.bytes_per_second == 0 {
            return Err(PlaybackError::MalformedHeader(format!(
                "byte rate {} inconsistent with {} Hz x {} ch x {} bit",
                self.bytes_per_second, self.sample_rate_hz, self.channel_count, self.bits_per_sample
            )));
        }
        Ok(())
    }

    /// Bytes per single-channel sample (1 or 2).
    pub fn bytes_per_sample(&self) -> u16 {
        self.bits_per_sample / 8
    }

    /// Bytes per frame (all channels).
    pub fn block_align(&self) -> u32 {
        self.channel_count as u32 * self.bytes_per_sample() as u32
    }

    /// Absolute file offset of the first payload byte.
    pub fn data_offset(&self) -> u64 {
        WAV_HEADER_LEN as u64
    }

    /// Whole frames in the payload; a trailing partial frame is ignored.
    pub fn total_frames(&self) -> u64 {
        self.total_data_bytes as u64 / self.block_align() as u64
    }

    /// Payload bytes covering [`total_frames`](Self::total_frames).
    pub fn playable_data_bytes(&self) -> u64 {
        self.total_frames() * self.block_align() as u64
    }

    /// Absolute file offset one past the last playable byte.
    pub fn data_end(&self) -> u64 {
        self.data_offset() + self.playable_data_bytes()
    }

    /// Payload byte count of `frames` frames.
    pub fn frames_to_bytes(&self, frames: u64) -> u64 {
        frames * self.block_align() as u64
    }

    /// Absolute file offset of logical frame `frame`, clamped to the data end.
    pub fn byte_offset_of_frame(&self, frame: i64) -> u64 {
        let frame = frame.clamp(0, self.total_frames() as i64) as u64;
        self.data_offset() + self.frames_to_bytes(frame)
    }

    /// Playback length of the payload.
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.total_frames() as f64 / self.sample_rate_hz as f64)
    }
}

fn malformed(message: &str) -> PlaybackError {
    PlaybackError::MalformedHeader(message.to_string())
}

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

fn expect_tag(bytes: &[u8], offset: usize, tag: &[u8; 4]) -> Result<()> {
    if &bytes[offset..offset + 4] != tag {
        return Err(PlaybackError::MalformedHeader(format!(
            "expected {:?} tag at offset {}, found {:?}",
            String::from_utf8_lossy(tag),
            offset,
            String::from_utf8_lossy(&bytes[offset..offset + 4])
        )));
    }
    Ok(())
}

/// Parser for the canonical PCM WAV preamble.
pub struct HeaderParser;

impl HeaderParser {
    /// Parse the first [`WAV_HEADER_LEN`] bytes of `bytes`.
    ///
    /// # Errors
    ///
    /// [`PlaybackError::MalformedHeader`] when the input is short, a chunk tag
    /// is wrong, the format is not 8/16-bit linear PCM, the rate fields are
    /// inconsistent, or the payload size exceeds the RIFF chunk.
    pub fn parse(bytes: &[u8]) -> Result<FormatDescriptor> {
        if bytes.len() < WAV_HEADER_LEN {
            return Err(PlaybackError::MalformedHeader(format!(
                "header requires {} bytes, got {}",
                WAV_HEADER_LEN,
                bytes.len()
            )));
        }

        expect_tag(bytes, 0, b"RIFF")?;
        expect_tag(bytes, 8, b"WAVE")?;
        expect_tag(bytes, 12, b"fmt ")?;
        expect_tag(bytes, 36, b"data")?;

        let fmt_size = read_u32(bytes, 16);
        if fmt_size != PCM_FMT_CHUNK_SIZE {
            return Err(PlaybackError::MalformedHeader(format!(
                "unsupported fmt chunk size {}",
                fmt_size
            )));
        }

        let format_tag = read_u16(bytes, 20);
        if format_tag != FORMAT_TAG_PCM {
            return Err(PlaybackError::MalformedHeader(format!(
                "audio format {} is not linear PCM",
                format_tag
            )));
        }

        let descriptor = FormatDescriptor {
            channel_count: read_u16(bytes, 22),
            sample_rate_hz: read_u32(bytes, 24),
            bytes_per_second: read_u32(bytes, 28),
            bits_per_sample: read_u16(bytes, 34),
            total_data_bytes: read_u32(bytes, 40),
        };
        descriptor.validate()?;

        let block_align = read_u16(bytes, 32);
        if block_align as u32 != descriptor.block_align() {
            return Err(PlaybackError::MalformedHeader(format!(
                "block align {} inconsistent with {} ch x {} bit",
                block_align, descriptor.channel_count, descriptor.bits_per_sample
            )));
        }

        let riff_size = read_u32(bytes, 4);
        let available = riff_size.saturating_sub(RIFF_CHUNK_SIZE_BASE);
        if riff_size < RIFF_CHUNK_SIZE_BASE || descriptor.total_data_bytes > available {
            return Err(PlaybackError::MalformedHeader(format!(
                "payload size {} exceeds RIFF chunk ({} bytes available)",
                descriptor.total_data_bytes, available
            )));
        }

        Ok(descriptor)
    }

    /// Parse and additionally check the payload against the asset length the
    /// server reported for the header request.
    pub fn parse_with_length(bytes: &[u8], total_length: Option<u64>) -> Result<FormatDescriptor> {
        let descriptor = Self::parse(bytes)?;

        if let Some(total_length) = total_length {
            let available = total_length.saturating_sub(WAV_HEADER_LEN as u64);
            if descriptor.total_data_bytes as u64 > available {
                return Err(PlaybackError::MalformedHeader(format!(
                    "payload size {} exceeds asset length {} ({} bytes available)",
                    descriptor.total_data_bytes, total_length, available
                )));
            }
        }

        Ok(descriptor)
    }

    /// Encode `descriptor` as a canonical header.
    pub fn encode(descriptor: &FormatDescriptor) -> [u8; WAV_HEADER_LEN] {
        let mut out = [0u8; WAV_HEADER_LEN];
        let riff_size = RIFF_CHUNK_SIZE_BASE.saturating_add(descriptor.total_data_bytes);

        out[0..4].copy_from_slice(b"RIFF");
        out[4..8].copy_from_slice(&riff_size.to_le_bytes());
        out[8..12].copy_from_slice(b"WAVE");
        out[12..16].copy_from_slice(b"fmt ");
        out[16..20].copy_from_slice(&PCM_FMT_CHUNK_SIZE.to_le_bytes());
        out[20..22].copy_from_slice(&FORMAT_TAG_PCM.to_le_bytes());
        out[22..24].copy_from_slice(&descriptor.channel_count.to_le_bytes());
        out[24..28].copy_from_slice(&descriptor.sample_rate_hz.to_le_bytes());
        out[28..32].copy_from_slice(&descriptor.bytes_per_second.to_le_bytes());
        out[32..34].copy_from_slice(&(descriptor.block_align() as u16).to_le_bytes());
        out[34..36].copy_from_slice(&descriptor.bits_per_sample.to_le_bytes());
        out[36..40].copy_from_slice(b"data");
        out[40..44].copy_from_slice(&descriptor.total_data_bytes.to_le_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cd_quality() -> FormatDescriptor {
        FormatDescriptor::new(2, 44_100, 16, 441_000).unwrap()
    }

    #[test]
    fn test_parse_canonical_header() {
        let header = HeaderParser::encode(&cd_quality());
        let parsed = HeaderParser::parse(&header).unwrap();

        assert_eq!(parsed.channel_count, 2);
        assert_eq!(parsed.sample_rate_hz, 44_100);
        assert_eq!(parsed.bytes_per_second, 176_400);
        assert_eq!(parsed.bits_per_sample, 16);
        assert_eq!(parsed.total_data_bytes, 441_000);
    }

    #[test]
    fn test_derived_values() {
        let format = cd_quality();
        assert_eq!(format.block_align(), 4);
        assert_eq!(format.total_frames(), 110_250);
        assert_eq!(format.data_end(), 44 + 441_000);
        assert_eq!(format.byte_offset_of_frame(1_000), 44 + 4_000);
        assert_eq!(format.byte_offset_of_frame(-3), 44);
        assert_eq!(format.byte_offset_of_frame(i64::MAX), format.data_end());
        assert_eq!(format.duration(), Duration::from_millis(2_500));
    }

    #[test]
    fn test_trailing_partial_frame_is_not_playable() {
        let format = FormatDescriptor::new(2, 8_000, 16, 4_002).unwrap();
        assert_eq!(format.total_frames(), 1_000);
        assert_eq!(format.playable_data_bytes(), 4_000);
    }

    #[test]
    fn test_short_input_rejected() {
        let header = HeaderParser::encode(&cd_quality());
        let err = HeaderParser::parse(&header[..43]).unwrap_err();
        assert!(matches!(err, PlaybackError::MalformedHeader(_)));
    }

    #[test]
    fn test_each_tag_validated() {
        for offset in [0usize, 8, 12, 36] {
            let mut header = HeaderParser::encode(&cd_quality());
            header[offset] = b'X';
            let err = HeaderParser::parse(&header).unwrap_err();
            assert!(
                err.to_string().contains(&format!("offset {}", offset)),
                "unexpected error for tag at {}: {}",
                offset,
                err
            );
        }
    }

    #[test]
    fn test_non_pcm_rejected() {
        let mut header = HeaderParser::encode(&cd_quality());
        header[20..22].copy_from_slice(&3u16.to_le_bytes()); // IEEE float
        assert!(HeaderParser::parse(&header).is_err());

        let mut header = HeaderParser::encode(&cd_quality());
        header[34..36].copy_from_slice(&24u16.to_le_bytes());
        assert!(HeaderParser::parse(&header).is_err());
    }

    #[test]
    fn test_zero_fields_rejected() {
        let mut header = HeaderParser::encode(&cd_quality());
        header[22..24].copy_from_slice(&0u16.to_le_bytes());
        assert!(HeaderParser::parse(&header).is_err());

        let mut header = HeaderParser::encode(&cd_quality());
        header[24..28].copy_from_slice(&0u32.to_le_bytes());
        assert!(HeaderParser::parse(&header).is_err());
    }

    #[test]
    fn test_inconsistent_byte_rate_rejected() {
        let mut header = HeaderParser::encode(&cd_quality());
        header[28..32].copy_from_slice(&88_200u32.to_le_bytes());
        let err = HeaderParser::parse(&header).unwrap_err();
        assert!(err.to_string().contains("byte rate"));
    }

    #[test]
    fn test_inconsistent_block_align_rejected() {
        let mut header = HeaderParser::encode(&cd_quality());
        header[32..34].copy_from_slice(&2u16.to_le_bytes());
        let err = HeaderParser::parse(&header).unwrap_err();
        assert!(err.to_string().contains("block align"));
    }

    #[test]
    fn test_payload_larger_than_riff_chunk_rejected() {
        let mut header = HeaderParser::encode(&cd_quality());
        header[4..8].copy_from_slice(&1_000u32.to_le_bytes());
        assert!(HeaderParser::parse(&header).is_err());
    }

    #[test]
    fn test_payload_larger_than_asset_rejected() {
        let header = HeaderParser::encode(&cd_quality());
        assert!(HeaderParser::parse_with_length(&header, Some(44 + 441_000)).is_ok());
        assert!(HeaderParser::parse_with_length(&header, None).is_ok());

        let err = HeaderParser::parse_with_length(&header, Some(44 + 1_000)).unwrap_err();
        assert!(matches!(err, PlaybackError::MalformedHeader(_)));
    }

    #[test]
    fn test_eight_bit_mono() {
        let format = FormatDescriptor::new(1, 22_050, 8, 22_050).unwrap();
        let parsed = HeaderParser::parse(&HeaderParser::encode(&format)).unwrap();
        assert_eq!(parsed, format);
        assert_eq!(parsed.block_align(), 1);
        assert_eq!(parsed.bytes_per_second, 22_050);
    }
}
