use crate::error::{VcError, VcResult};

/// Per-frame RMS energy over non-overlapping `frame_size` windows.
///
/// Produces `wave.len() / frame_size` values, aligned with the content and
/// pitch frames of the same window. A trailing partial frame is dropped.
pub fn frame_energy(wave: &[f32], frame_size: usize) -> VcResult<Vec<f32>> {
    if wave.is_empty() {
        return Err(VcError::invalid("energy of an empty waveform"));
    }
    if frame_size == 0 {
        return Err(VcError::invalid("frame_size must be positive"));
    }

    let energy = wave
        .chunks_exact(frame_size)
        .map(|frame| {
            let sum_sq: f64 = frame.iter().map(|&s| (s as f64) * (s as f64)).sum();
            (sum_sq / frame_size as f64).sqrt() as f32
        })
        .collect();
    Ok(energy)
}
