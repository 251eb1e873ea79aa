//! # Tuner Audio Pipeline
//!
//! Everything between one raw binary frame and one pitch result.
//!
//! ## Key Components:
//! - **Decoder**: 16-bit little-endian PCM into normalized samples
//! - **Pitch**: Normalized autocorrelation pitch detector
//! - **Note**: Frequency to note name and cents
//! - **Session**: Per-connection lifecycle, outbound messages, session registry
//! - **Tuning**: Guitar tuning presets
//!
//! ## Audio Format Requirements:
//! - **Sample Rate**: 44.1kHz (44,100 Hz), fixed
//! - **Bit Depth**: 16-bit PCM
//! - **Channels**: Mono (1 channel)
//! - **Encoding**: Little-endian signed integers
//!
//! The decoder, detector and mapper are pure; only sessions touch I/O.

// WebSocket handler is in src/websocket.rs at the root level
pub mod decoder;  // PCM frame decoding
pub mod note;     // Frequency to note mapping
pub mod pitch;    // Autocorrelation pitch detection
pub mod session;  // Session lifecycle and registry
pub mod tuning;   // Guitar tuning presets

use decoder::{decode_pcm16le, SAMPLE_RATE};
use note::{map_note, NoteResult};
use pitch::{detect, PitchEstimate};

/// Result of analysing one audio chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct TunerReading {
    /// Detected frequency in Hz, `0.0` when undetected
    pub frequency: f64,
    pub note: NoteResult,
}

impl TunerReading {
    pub fn is_detected(&self) -> bool {
        !self.note.is_undetected()
    }
}

/// Run one chunk through decoder, detector and note mapper.
pub fn analyze_chunk(payload: &[u8]) -> TunerReading {
    let samples = decode_pcm16le(payload);

    match detect(&samples, SAMPLE_RATE) {
        PitchEstimate::Detected(frequency) => TunerReading {
            frequency,
            note: map_note(frequency),
        },
        PitchEstimate::Undetected => TunerReading {
            frequency: 0.0,
            note: NoteResult::undetected(),
        },
    }
}

/// 16-bit little-endian PCM sine wave at [`SAMPLE_RATE`], for tests.
#[cfg(test)]
pub(crate) fn pcm_sine(frequency: f64, amplitude: f64, samples: usize) -> Vec<u8> {
    (0..samples)
        .flat_map(|i| {
            let t = i as f64 / SAMPLE_RATE as f64;
            let sample = (amplitude * (2.0 * std::f64::consts::PI * frequency * t).sin() * 32767.0) as i16;
            sample.to_le_bytes()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_chunk() {
        let reading = analyze_chunk(&vec![0u8; 4096]);
        assert_eq!(reading.frequency, 0.0);
        assert_eq!(reading.note, NoteResult::undetected());
        assert!(!reading.is_detected());
    }

    #[test]
    fn test_tiny_chunk() {
        let reading = analyze_chunk(&[0x40; 100]);
        assert_eq!(reading.frequency, 0.0);
        assert_eq!(reading.note.note, "--");
    }

    #[test]
    fn test_tone_chunk() {
        let reading = analyze_chunk(&pcm_sine(440.0, 0.3, 2048));
        assert!(reading.is_detected());
        assert_eq!(reading.note.note, "A4");
    }
}
