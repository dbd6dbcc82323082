//! Chunk-boundary bookkeeping for streaming conversion.
//!
//! Each call works on `history (B) ++ chunk (C)`. The decoder output for that
//! window is read back at `[B - L, B + C - L)` with `L = TRIM_FRAMES *
//! frame_size`, i.e. delayed by `L` samples so the unsettled tail of the
//! window is never emitted. The last `B` window samples become the next
//! history.

use crate::config::Device;
use crate::error::{VcError, VcResult};
use crate::oscillator::PhaseState;

/// Per-stream state threaded through consecutive `convert_rt` calls.
///
/// Calls return a fresh state instead of mutating this one, so a failed call
/// leaves the caller's state exactly as it was.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionState {
    history: Vec<f32>,
    phase: PhaseState,
    device: Device,
}

impl ConversionState {
    /// The most recent `buffer_size` input samples, oldest first.
    pub fn history(&self) -> &[f32] {
        &self.history
    }

    pub fn phase(&self) -> &PhaseState {
        &self.phase
    }

    pub fn buffer_size(&self) -> usize {
        self.history.len()
    }

    pub fn device(&self) -> Device {
        self.device
    }
}

/// Window assembly, output trimming and history rotation.
#[derive(Debug, Clone)]
pub struct StreamBufferManager {
    trim: usize,
}

impl StreamBufferManager {
    /// `trim` is the tail discarded from every window, `TRIM_FRAMES * frame_size`.
    pub fn new(trim: usize) -> Self {
        Self { trim }
    }

    pub fn trim(&self) -> usize {
        self.trim
    }

    /// Zero-filled history of `buffer_size` samples and a zeroed phase.
    ///
    /// `buffer_size` must exceed the trim length, otherwise the trimmed
    /// output would reach before the start of the window.
    pub fn init(
        &self,
        buffer_size: usize,
        num_harmonics: usize,
        device: Device,
    ) -> VcResult<ConversionState> {
        if buffer_size <= self.trim {
            return Err(VcError::config(format!(
                "buffer_size {} must exceed the trim length {}",
                buffer_size, self.trim
            )));
        }
        log::debug!(
            "Stream state initialized: buffer_size={}, partials={}",
            buffer_size,
            num_harmonics + 1
        );
        Ok(ConversionState {
            history: vec![0.0; buffer_size],
            phase: PhaseState::zeroed(num_harmonics),
            device,
        })
    }

    /// `history ++ chunk`.
    pub fn window(&self, state: &ConversionState, chunk: &[f32]) -> VcResult<Vec<f32>> {
        if chunk.is_empty() {
            return Err(VcError::invalid("chunk is empty"));
        }
        if state.history.len() <= self.trim {
            return Err(VcError::config(format!(
                "state buffer of {} samples is not longer than the trim length {}",
                state.history.len(),
                self.trim
            )));
        }
        let mut window = Vec::with_capacity(state.history.len() + chunk.len());
        window.extend_from_slice(&state.history);
        window.extend_from_slice(chunk);
        Ok(window)
    }

    /// Oscillator anchor: the last history sample, which is the last sample
    /// synthesized by the previous call.
    pub fn begin_point(&self, state: &ConversionState) -> usize {
        state.history.len() - 1
    }

    /// Cut the `chunk_len` output samples out of a full-window synthesis.
    pub fn trim_output(
        &self,
        state: &ConversionState,
        synthesized: &[f32],
        chunk_len: usize,
    ) -> VcResult<Vec<f32>> {
        let b = state.history.len();
        if synthesized.len() != b + chunk_len {
            return Err(VcError::invalid(format!(
                "synthesized {} samples for a window of {}",
                synthesized.len(),
                b + chunk_len
            )));
        }
        let start = b - self.trim;
        Ok(synthesized[start..start + chunk_len].to_vec())
    }

    /// Next state: the last `B` samples of the window and the new phase.
    pub fn advance(
        &self,
        state: &ConversionState,
        window: &[f32],
        phase: PhaseState,
    ) -> ConversionState {
        let b = state.history.len();
        ConversionState {
            history: window[window.len() - b..].to_vec(),
            phase,
            device: state.device,
        }
    }
}
