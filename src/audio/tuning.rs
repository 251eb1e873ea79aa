//! # Guitar Tuning Presets
//!
//! Static string sets for common guitar tunings, listed high string first, and
//! a lookup for the string nearest to a detected frequency.

use serde::Serialize;

/// One string's target pitch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TuningString {
    pub note: &'static str,
    pub frequency: f64,
}

/// A named set of string targets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GuitarTuning {
    pub name: &'static str,
    pub strings: &'static [TuningString],
}

const fn string(note: &'static str, frequency: f64) -> TuningString {
    TuningString { note, frequency }
}

pub static TUNINGS: [GuitarTuning; 5] = [
    GuitarTuning {
        name: "Standard (E)",
        strings: &[
            string("E4", 329.63),
            string("B3", 246.94),
            string("G3", 196.00),
            string("D3", 146.83),
            string("A2", 110.00),
            string("E2", 82.41),
        ],
    },
    GuitarTuning {
        name: "Drop D",
        strings: &[
            string("E4", 329.63),
            string("B3", 246.94),
            string("G3", 196.00),
            string("D3", 146.83),
            string("A2", 110.00),
            string("D2", 73.42),
        ],
    },
    GuitarTuning {
        name: "DADGAD",
        strings: &[
            string("D4", 293.66),
            string("A3", 220.00),
            string("G3", 196.00),
            string("D3", 146.83),
            string("A2", 110.00),
            string("D2", 73.42),
        ],
    },
    GuitarTuning {
        name: "Open G",
        strings: &[
            string("D4", 293.66),
            string("B3", 246.94),
            string("G3", 196.00),
            string("D3", 146.83),
            string("G2", 98.00),
            string("D2", 73.42),
        ],
    },
    GuitarTuning {
        name: "Half Step Down",
        strings: &[
            string("D#4", 311.13),
            string("A#3", 233.08),
            string("F#3", 185.00),
            string("C#3", 138.59),
            string("G#2", 103.83),
            string("D#2", 77.78),
        ],
    },
];

/// Look up a preset by position in [`TUNINGS`].
pub fn tuning(index: usize) -> Option<&'static GuitarTuning> {
    TUNINGS.get(index)
}

/// Index of the string whose target is closest to `frequency_hz` in Hz.
///
/// Returns `None` for an undetected (non-positive) frequency. Ties keep the
/// earlier (higher) string.
pub fn nearest_string(tuning: &GuitarTuning, frequency_hz: f64) -> Option<usize> {
    if !(frequency_hz > 0.0) {
        return None;
    }

    let mut closest: Option<(usize, f64)> = None;
    for (index, target) in tuning.strings.iter().enumerate() {
        let diff = (frequency_hz - target.frequency).abs();
        if closest.map_or(true, |(_, best)| diff < best) {
            closest = Some((index, diff));
        }
    }
    closest.map(|(index, _)| index)
}
