//! # Note Mapping
//!
//! Converts a frequency into an equal-tempered note name (sharp spelling,
//! scientific octave numbering) and the cents deviation from that note.
//! A4 = 440 Hz = MIDI note 69.

use serde::Serialize;

/// Pitch-class names indexed by `midi % 12`.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Label sent when no pitch was detected.
pub const UNDETECTED_NOTE: &str = "--";

/// Reference pitch for A4.
pub const A4_HZ: f64 = 440.0;

const A4_MIDI: i32 = 69;

/// Lowest frequency given a note name.
pub const MIN_NOTE_HZ: f64 = 20.0;

/// Highest frequency given a note name.
pub const MAX_NOTE_HZ: f64 = 4200.0;

/// Note label plus tuning offset for one detected frequency.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoteResult {
    /// e.g. `"A4"`, or `"--"` when undetected
    pub note: String,
    /// Deviation from the nearest semitone, in (-50, 50]
    pub cents: f64,
}

impl NoteResult {
    pub fn undetected() -> Self {
        Self {
            note: UNDETECTED_NOTE.to_string(),
            cents: 0.0,
        }
    }

    pub fn is_undetected(&self) -> bool {
        self.note == UNDETECTED_NOTE
    }
}

/// Map `frequency_hz` to its nearest note and cents offset.
///
/// Frequencies that are not positive or fall outside
/// [`MIN_NOTE_HZ`]..=[`MAX_NOTE_HZ`] map to `{"--", 0}`.
pub fn map_note(frequency_hz: f64) -> NoteResult {
    if !(MIN_NOTE_HZ..=MAX_NOTE_HZ).contains(&frequency_hz) {
        return NoteResult::undetected();
    }

    let semitones = semitones_from_a4(frequency_hz);
    let nearest = nearest_semitone(semitones);
    let cents = (semitones - nearest as f64) * 100.0;

    NoteResult {
        note: note_name(nearest + A4_MIDI),
        cents,
    }
}

/// Signed distance from A4 in (fractional) semitones.
pub fn semitones_from_a4(frequency_hz: f64) -> f64 {
    12.0 * (frequency_hz / A4_HZ).log2()
}

/// Cents between `frequency_hz` and `reference_hz`.
pub fn cents_between(frequency_hz: f64, reference_hz: f64) -> f64 {
    1200.0 * (frequency_hz / reference_hz).log2()
}

/// Round to the nearest semitone, ties going down so cents never reaches -50.
fn nearest_semitone(semitones: f64) -> i32 {
    (semitones - 0.5).ceil() as i32
}

/// Name of a MIDI note, e.g. 69 -> "A4", 40 -> "E2".
pub fn note_name(midi: i32) -> String {
    let pitch_class = NOTE_NAMES[midi.rem_euclid(12) as usize];
    let octave = midi.div_euclid(12) - 1;
    format!("{}{}", pitch_class, octave)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_a4_is_in_tune() {
        let result = map_note(440.0);
        assert_eq!(result.note, "A4");
        assert!(result.cents.abs() < 1e-9);
    }

    #[test]
    fn test_undetected_inputs() {
        for hz in [0.0, -440.0, 19.99, 4200.01, f64::NAN] {
            let result = map_note(hz);
            assert!(result.is_undetected(), "{} should be undetected", hz);
            assert_eq!(result.cents, 0.0);
        }
    }

    #[test]
    fn test_guitar_strings() {
        assert_eq!(map_note(82.41).note, "E2");
        assert_eq!(map_note(110.0).note, "A2");
        assert_eq!(map_note(146.83).note, "D3");
        assert_eq!(map_note(196.0).note, "G3");
        assert_eq!(map_note(246.94).note, "B3");
        assert_eq!(map_note(329.63).note, "E4");
    }

    #[test]
    fn test_octave_boundaries() {
        assert_eq!(map_note(261.63).note, "C4");
        assert_eq!(map_note(246.94).note, "B3");
        assert_eq!(map_note(27.5).note, "A0");
        assert_eq!(map_note(4186.01).note, "C8");
        assert_eq!(note_name(0), "C-1");
        assert_eq!(note_name(-1), "B-2");
    }

    #[test]
    fn test_sharp_and_flat_offsets() {
        let sharp = map_note(445.0);
        assert_eq!(sharp.note, "A4");
        assert!((sharp.cents - 19.56).abs() < 0.01, "got {}", sharp.cents);

        let flat = map_note(435.0);
        assert_eq!(flat.note, "A4");
        assert!((flat.cents + 19.78).abs() < 0.01, "got {}", flat.cents);
    }

    #[test]
    fn test_cents_stay_in_half_open_range() {
        let mut hz = MIN_NOTE_HZ;
        while hz <= MAX_NOTE_HZ {
            let cents = map_note(hz).cents;
            assert!(cents > -50.0 && cents <= 50.0, "{}Hz gave {} cents", hz, cents);
            hz += 0.37;
        }
    }

    #[test]
    fn test_quarter_tone_tie_rounds_down() {
        assert_eq!(nearest_semitone(0.5), 0);
        assert_eq!(nearest_semitone(-0.5), -1);
        assert_eq!(nearest_semitone(0.51), 1);
    }

    #[test]
    fn test_cents_between() {
        assert!((cents_between(880.0, 440.0) - 1200.0).abs() < 1e-9);
        assert!(cents_between(440.0, 440.0).abs() < 1e-9);
    }
}
