//! Semitone pitch shifting of f0 frame sequences.

use crate::constants::REFERENCE_FREQ_HZ;

/// Replace unusable f0 values (NaN, infinities, negatives) with 0 (unvoiced).
///
/// Returns the number of frames that were replaced.
pub fn sanitize_f0(f0: &mut [f32]) -> usize {
    let mut replaced = 0;
    for v in f0.iter_mut() {
        if !v.is_finite() || *v < 0.0 {
            *v = 0.0;
            replaced += 1;
        }
    }
    replaced
}

/// Shift one f0 value by `semitones` on the log2 scale around 440 Hz.
///
/// Unvoiced input (`<= 0` or non-finite) and results that overflow or
/// underflow to a non-positive value come back as 0.
pub fn shift_hz(f0: f32, semitones: f32) -> f32 {
    if !(f0.is_finite() && f0 > 0.0) {
        return 0.0;
    }
    let mut scale = 12.0 * (f0 as f64 / REFERENCE_FREQ_HZ).log2();
    scale += semitones as f64;
    let shifted = (REFERENCE_FREQ_HZ * (scale / 12.0).exp2()) as f32;
    if shifted.is_finite() && shifted > 0.0 {
        shifted
    } else {
        0.0
    }
}

/// Shift every frame of an f0 sequence.
pub fn shift_pitch(f0: &[f32], semitones: f32) -> Vec<f32> {
    f0.iter().map(|&p| shift_hz(p, semitones)).collect()
}
