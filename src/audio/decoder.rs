//! # PCM Frame Decoding
//!
//! Turns the raw payload of one binary WebSocket frame into normalized samples.
//!
//! ## Wire Format:
//! - **Encoding**: Signed 16-bit PCM, little-endian
//! - **Channels**: Mono
//! - **Sample Rate**: 44.1kHz, assumed and never negotiated
//!
//! Decoding never fails. A trailing odd byte is dropped and an empty payload
//! gives an empty buffer; the pitch detector's own length gate deals with both.

use byteorder::{ByteOrder, LittleEndian};

/// Sample rate every client is expected to capture at.
pub const SAMPLE_RATE: u32 = 44_100;

/// Divisor mapping the i16 range onto [-1.0, 1.0).
const PCM_SCALE: f32 = 32768.0;

/// Normalized samples decoded from one audio chunk.
///
/// Owned by the call that decoded it and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SampleBuffer {
    samples: Vec<f32>,
}

impl SampleBuffer {
    /// Samples in arrival order.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl From<Vec<f32>> for SampleBuffer {
    fn from(samples: Vec<f32>) -> Self {
        Self { samples }
    }
}

/// Decode little-endian 16-bit PCM into a [`SampleBuffer`].
///
/// ## Process:
/// 1. Walk the payload two bytes at a time (`chunks_exact` ignores a dangling byte)
/// 2. Read each pair as an `i16` with byteorder's `LittleEndian`
/// 3. Scale by 1/32768 so full scale maps to [-1.0, 1.0)
pub fn decode_pcm16le(payload: &[u8]) -> SampleBuffer {
    let samples = payload
        .chunks_exact(2)
        .map(|pair| LittleEndian::read_i16(pair) as f32 / PCM_SCALE)
        .collect();

    SampleBuffer { samples }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_scales_full_range() {
        let mut payload = Vec::new();
        for sample in [0i16, 16384, -16384, i16::MAX, i16::MIN] {
            payload.extend_from_slice(&sample.to_le_bytes());
        }

        let buffer = decode_pcm16le(&payload);
        let samples = buffer.samples();

        assert_eq!(samples.len(), 5);
        assert_eq!(samples[0], 0.0);
        assert_eq!(samples[1], 0.5);
        assert_eq!(samples[2], -0.5);
        assert!((samples[3] - 32767.0 / 32768.0).abs() < f32::EPSILON);
        assert_eq!(samples[4], -1.0);
    }

    #[test]
    fn test_decode_is_little_endian() {
        // 0x0100 little-endian is 1, big-endian would be 256
        let buffer = decode_pcm16le(&[0x01, 0x00]);
        assert_eq!(buffer.samples(), &[1.0 / 32768.0]);
    }

    #[test]
    fn test_odd_length_drops_trailing_byte() {
        for len in [1usize, 3, 101, 4097] {
            let payload = vec![0x7f; len];
            let buffer = decode_pcm16le(&payload);
            assert_eq!(buffer.len(), len / 2, "payload of {} bytes", len);
        }
    }

    #[test]
    fn test_empty_payload() {
        let buffer = decode_pcm16le(&[]);
        assert!(buffer.is_empty());
    }
}
