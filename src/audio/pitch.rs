//! # Pitch Detection
//!
//! Monophonic fundamental-frequency estimation for a single audio chunk using
//! normalized autocorrelation with parabolic sub-sample refinement.
//!
//! ## Algorithm:
//! 1. **Length gate**: chunks shorter than [`MIN_SAMPLES`] are undetected
//! 2. **Energy gate**: RMS below [`RMS_GATE`] is treated as silence
//! 3. **Lag range**: lags covering [`MIN_FREQUENCY_HZ`]..=[`MAX_FREQUENCY_HZ`]
//! 4. **Autocorrelation** over that range, normalized by its maximum
//! 5. **Peak selection**: strongest local maximum above [`CLARITY_THRESHOLD`]
//! 6. **Parabolic interpolation** around the peak for a fractional lag
//!
//! Detection is a pure function of its inputs. Nothing is carried between
//! chunks, so two calls with the same buffer always agree.

use crate::audio::decoder::SampleBuffer;

/// Fewest samples a chunk needs before detection is attempted.
pub const MIN_SAMPLES: usize = 1024;

/// RMS level below which a chunk counts as silence.
pub const RMS_GATE: f64 = 0.01;

/// Lowest fundamental searched for (just under a guitar's low E).
pub const MIN_FREQUENCY_HZ: u32 = 82;

/// Highest fundamental searched for.
pub const MAX_FREQUENCY_HZ: u32 = 1200;

/// Minimum normalized correlation for a peak to count as periodic.
pub const CLARITY_THRESHOLD: f64 = 0.3;

/// Parabolas flatter than this are not used for refinement.
const PARABOLA_EPSILON: f64 = 1e-12;

/// Outcome of analysing one chunk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PitchEstimate {
    /// Fundamental frequency in Hz.
    Detected(f64),
    /// Too short, too quiet, or not periodic enough.
    Undetected,
}

impl PitchEstimate {
    /// Frequency in Hz, with `0.0` standing in for undetected.
    pub fn frequency(&self) -> f64 {
        match self {
            PitchEstimate::Detected(hz) => *hz,
            PitchEstimate::Undetected => 0.0,
        }
    }

    pub fn is_detected(&self) -> bool {
        matches!(self, PitchEstimate::Detected(_))
    }
}

/// Estimate the fundamental frequency of `buffer` captured at `sample_rate`.
pub fn detect(buffer: &SampleBuffer, sample_rate: u32) -> PitchEstimate {
    let samples = buffer.samples();
    let size = samples.len();

    if size < MIN_SAMPLES {
        return PitchEstimate::Undetected;
    }

    if rms(samples) < RMS_GATE {
        return PitchEstimate::Undetected;
    }

    let min_lag = ((sample_rate / MAX_FREQUENCY_HZ) as usize).max(1);
    let max_lag = ((sample_rate / MIN_FREQUENCY_HZ) as usize).min(size / 2 - 1);
    if max_lag <= min_lag {
        return PitchEstimate::Undetected;
    }

    let nsdf = match normalized_autocorrelation(samples, min_lag, max_lag) {
        Some(nsdf) => nsdf,
        None => return PitchEstimate::Undetected,
    };

    // nsdf[0] corresponds to min_lag
    let value_at = |lag: usize| nsdf[lag - min_lag];

    let mut best: Option<(usize, f64)> = None;
    for lag in (min_lag + 1)..=max_lag.saturating_sub(2) {
        let value = value_at(lag);
        let is_peak = value > value_at(lag - 1) && value > value_at(lag + 1);
        if !is_peak || value <= CLARITY_THRESHOLD {
            continue;
        }
        if best.map_or(true, |(_, best_value)| value > best_value) {
            best = Some((lag, value));
        }
    }

    let best_lag = match best {
        Some((lag, value)) if value >= CLARITY_THRESHOLD => lag,
        _ => return PitchEstimate::Undetected,
    };

    let refined_lag = parabolic_peak(
        best_lag,
        value_at(best_lag - 1),
        value_at(best_lag),
        value_at(best_lag + 1),
    );

    PitchEstimate::Detected(sample_rate as f64 / refined_lag)
}

/// Root mean square of the samples, accumulated in f64.
fn rms(samples: &[f32]) -> f64 {
    let energy: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (energy / samples.len() as f64).sqrt()
}

/// Autocorrelation for every lag in `min_lag..=max_lag`, divided by its maximum.
///
/// Returns `None` when the maximum is not positive, which leaves nothing
/// meaningful to normalize against.
fn normalized_autocorrelation(samples: &[f32], min_lag: usize, max_lag: usize) -> Option<Vec<f64>> {
    let acf: Vec<f64> = (min_lag..=max_lag)
        .map(|lag| {
            samples[..samples.len() - lag]
                .iter()
                .zip(&samples[lag..])
                .map(|(&a, &b)| a as f64 * b as f64)
                .sum()
        })
        .collect();

    let max_acf = acf.iter().copied().fold(0.0_f64, f64::max);
    if max_acf <= 0.0 {
        return None;
    }

    Some(acf.into_iter().map(|value| value / max_acf).collect())
}

/// Vertex of the parabola through `(lag-1, s0)`, `(lag, s1)`, `(lag+1, s2)`.
fn parabolic_peak(lag: usize, s0: f64, s1: f64, s2: f64) -> f64 {
    let denom = s0 - 2.0 * s1 + s2;
    if denom.abs() < PARABOLA_EPSILON {
        return lag as f64;
    }
    lag as f64 + 0.5 * (s0 - s2) / denom
}
