//! Model-facing defaults shared by the pipeline, the ONNX backend and the CLI.

/// Sample rate the content encoder, pitch estimator and decoder operate at.
pub const SAMPLE_RATE: u32 = 48_000;

/// Samples per analysis frame (content / pitch / energy hop).
pub const FRAME_SIZE: usize = 480;

/// Harmonics synthesized above the fundamental.
pub const NUM_HARMONICS: usize = 14;

/// Pitch shift is expressed in semitones relative to A4.
pub const REFERENCE_FREQ_HZ: f64 = 440.0;

/// Frames discarded at the tail of each streaming window (decoder lookahead).
pub const TRIM_FRAMES: usize = 3;

/// Default frame stride when building a style bank.
pub const DEFAULT_STRIDE: usize = 4;

/// Default neighbor count for style matching.
pub const DEFAULT_K: usize = 4;

// Excitation mix
pub const HARMONIC_GAIN: f32 = 0.3;
pub const NOISE_GAIN: f32 = 0.003;
pub const NOISE_SEED: u64 = 0x5EED_CAFE_F00D_0001;

// Signal-processing pitch detectors
pub const F0_MIN_HZ: f32 = 50.0;
pub const F0_MAX_HZ: f32 = 1100.0;
pub const VOICING_THRESHOLD: f32 = 0.6;
/// A candidate peak is accepted when it reaches this fraction of the best peak.
pub const PEAK_PICK_RATIO: f32 = 0.9;
/// Mean-square level below which a detector frame is treated as silence.
pub const SILENCE_MEAN_SQUARE: f32 = 1e-7;

// Parameter files inside a model directory
pub const CONTENT_ENCODER_FILE: &str = "content_encoder.onnx";
pub const PITCH_ESTIMATOR_FILE: &str = "pitch_estimator.onnx";
pub const DECODER_FILE: &str = "decoder.onnx";
pub const CONFIG_FILE: &str = "config.json";
