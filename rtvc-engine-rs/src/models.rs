//! Contracts of the three opaque models consumed by the pipeline.
//!
//! Implementations run inference only; they hold no per-stream state, so one
//! model set can serve any number of streams sequentially.

use anyhow::Result;

use crate::types::FrameSequence;

/// `waveform[N] -> content[T, D]` with `T = N / frame_size`.
pub trait ContentEncoder: Send {
    fn encode(&mut self, wave: &[f32]) -> Result<FrameSequence>;
}

/// `waveform[N] -> f0[T]` in Hz, 0 for unvoiced frames.
pub trait PitchEstimator: Send {
    fn estimate(&mut self, wave: &[f32]) -> Result<Vec<f32>>;
}

/// `(content[T, D], f0[T], energy[T], excitation[N]) -> waveform[N]`.
pub trait Decoder: Send {
    fn synthesize(
        &mut self,
        content: &FrameSequence,
        f0: &[f32],
        energy: &[f32],
        excitation: &[f32],
    ) -> Result<Vec<f32>>;
}
