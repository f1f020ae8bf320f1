//! # Sample Format Converter
//!
//! Per-sample conversions between linear PCM integers and normalized `f32`.

/// Sample converter between integer PCM and normalized `f32`.
///
/// Decoding divides by the full-scale magnitude, so the negative extreme maps
/// to exactly -1.0 and the positive extreme to just below 1.0. Encoding is the
/// inverse with round-to-nearest and clamping, which keeps decode/encode
/// within one LSB.
pub struct SampleConverter;

impl SampleConverter {
    /// Full-scale magnitude of signed 16-bit PCM.
    pub const I16_SCALE: f32 = 32_768.0;

    /// Midpoint and half-range of unsigned 8-bit PCM.
    pub const U8_OFFSET: f32 = 128.0;

    /// Signed 16-bit sample to `[-1.0, 1.0)`.
    #[inline]
    pub fn i16_to_f32(sample: i16) -> f32 {
        sample as f32 / Self::I16_SCALE
    }

    /// Unsigned 8-bit sample (silence at 128) to `[-1.0, 1.0)`.
    #[inline]
    pub fn u8_to_f32(sample: u8) -> f32 {
        (sample as f32 - Self::U8_OFFSET) / Self::U8_OFFSET
    }

    /// Normalized sample to signed 16-bit.
    #[inline]
    pub fn f32_to_i16(sample: f32) -> i16 {
        (sample * Self::I16_SCALE)
            .round()
            .clamp(i16::MIN as f32, i16::MAX as f32) as i16
    }

    /// Normalized sample to unsigned 8-bit.
    #[inline]
    pub fn f32_to_u8(sample: f32) -> u8 {
        (sample * Self::U8_OFFSET + Self::U8_OFFSET)
            .round()
            .clamp(0.0, 255.0) as u8
    }

    /// Encode normalized samples as little-endian 16-bit PCM bytes.
    pub fn encode_i16_le(samples: &[f32]) -> Vec<u8> {
        samples
            .iter()
            .flat_map(|&s| Self::f32_to_i16(s).to_le_bytes())
            .collect()
    }

    /// Encode normalized samples as unsigned 8-bit PCM bytes.
    pub fn encode_u8(samples: &[f32]) -> Vec<u8> {
        samples.iter().map(|&s| Self::f32_to_u8(s)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_i16_extremes() {
        assert_eq!(SampleConverter::i16_to_f32(i16::MIN), -1.0);
        assert_eq!(SampleConverter::i16_to_f32(0), 0.0);
        assert!(SampleConverter::i16_to_f32(i16::MAX) < 1.0);
    }

    #[test]
    fn test_u8_extremes() {
        assert_eq!(SampleConverter::u8_to_f32(0), -1.0);
        assert_eq!(SampleConverter::u8_to_f32(128), 0.0);
        assert!(SampleConverter::u8_to_f32(255) < 1.0);
    }

    #[test]
    fn test_i16_round_trip_within_one_lsb() {
        for value in [i16::MIN, -12_345, -1, 0, 1, 777, 32_000, i16::MAX] {
            let back = SampleConverter::f32_to_i16(SampleConverter::i16_to_f32(value));
            assert!((back as i32 - value as i32).abs() <= 1, "{} -> {}", value, back);
        }
    }

    #[test]
    fn test_encode_clamps_out_of_range() {
        assert_eq!(SampleConverter::f32_to_i16(1.5), i16::MAX);
        assert_eq!(SampleConverter::f32_to_i16(-1.5), i16::MIN);
        assert_eq!(SampleConverter::f32_to_u8(2.0), 255);
        assert_eq!(SampleConverter::f32_to_u8(-2.0), 0);
    }

    #[test]
    fn test_encode_i16_le_layout() {
        let bytes = SampleConverter::encode_i16_le(&[-1.0, 0.0]);
        assert_eq!(bytes, vec![0x00, 0x80, 0x00, 0x00]);
    }
}
