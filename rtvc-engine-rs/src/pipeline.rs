use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use atomic_float::AtomicF32;

use crate::config::{Device, PipelineConfig};
use crate::constants::DEFAULT_K;
use crate::energy::frame_energy;
use crate::error::{VcError, VcResult};
use crate::matcher::{FeatureMatcher, StyleBank};
use crate::models::{ContentEncoder, Decoder, PitchEstimator};
use crate::ort_bundle::OrtBundle;
use crate::oscillator::{HarmonicOscillator, PhaseState};
use crate::pitch::{sanitize_f0, shift_pitch};
use crate::pitch_detect::{DetectorKind, FftPitchDetector, PitchAlgorithm};
use crate::stream_buffer::{ConversionState, StreamBufferManager};
use crate::types::{FrameSequence, Waveform};

/// Per-call conversion parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertParams {
    /// Semitones added to the estimated pitch.
    pub pitch_shift: f32,
    /// Neighbours averaged per content frame.
    pub k: usize,
    /// Weight of the source content: 0 = pure target style, 1 = unchanged.
    pub alpha: f32,
    pub pitch_algorithm: PitchAlgorithm,
}

impl Default for ConvertParams {
    fn default() -> Self {
        Self {
            pitch_shift: 0.0,
            k: DEFAULT_K,
            alpha: 0.0,
            pitch_algorithm: PitchAlgorithm::Default,
        }
    }
}

impl ConvertParams {
    pub fn validate(&self) -> VcResult<()> {
        if !self.pitch_shift.is_finite() {
            return Err(VcError::invalid("pitch_shift must be finite"));
        }
        if self.k == 0 {
            return Err(VcError::invalid("k must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(VcError::invalid(format!("alpha {} outside [0, 1]", self.alpha)));
        }
        Ok(())
    }
}

/// Shared atomic status values, readable from another thread.
pub struct SharedStatus {
    pub input_level_db: AtomicF32,
    pub output_level_db: AtomicF32,
    pub inference_ms: AtomicF32,
    pub chunk_count: AtomicU64,
    pub overrun_count: AtomicU64,
    pub unvoiced_fixups: AtomicU64,
}

impl SharedStatus {
    pub fn new() -> Self {
        Self {
            input_level_db: AtomicF32::new(-100.0),
            output_level_db: AtomicF32::new(-100.0),
            inference_ms: AtomicF32::new(0.0),
            chunk_count: AtomicU64::new(0),
            overrun_count: AtomicU64::new(0),
            unvoiced_fixups: AtomicU64::new(0),
        }
    }
}

impl Default for SharedStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Frame-rate analysis of one window, ready for synthesis.
struct Analysis {
    content: FrameSequence,
    f0: Vec<f32>,
    energy: Vec<f32>,
}

/// ConversionPipeline: content extraction, style matching, pitch shift,
/// excitation and decoding for one-shot and streaming conversion.
///
/// The pipeline holds no per-stream state. Streams carry a
/// [`ConversionState`] each; style banks are read-only and may be shared.
pub struct ConversionPipeline {
    config: PipelineConfig,
    content_encoder: Box<dyn ContentEncoder>,
    pitch_estimator: Box<dyn PitchEstimator>,
    decoder: Box<dyn Decoder>,
    autocorrelation: FftPitchDetector,
    nsdf: FftPitchDetector,
    matcher: FeatureMatcher,
    oscillator: HarmonicOscillator,
    buffers: StreamBufferManager,
    status: Option<Arc<SharedStatus>>,
}

impl ConversionPipeline {
    pub fn new(
        config: PipelineConfig,
        content_encoder: Box<dyn ContentEncoder>,
        pitch_estimator: Box<dyn PitchEstimator>,
        decoder: Box<dyn Decoder>,
    ) -> VcResult<Self> {
        config.validate()?;
        Ok(Self {
            autocorrelation: FftPitchDetector::new(DetectorKind::Autocorrelation, &config),
            nsdf: FftPitchDetector::new(DetectorKind::Nsdf, &config),
            matcher: FeatureMatcher::new(),
            oscillator: HarmonicOscillator::new(&config),
            buffers: StreamBufferManager::new(config.trim_len()),
            config,
            content_encoder,
            pitch_estimator,
            decoder,
            status: None,
        })
    }

    /// Load the three ONNX models (and `config.json`, if any) from a directory.
    ///
    /// Any missing or unreadable file is a configuration error.
    pub fn load(model_dir: &Path) -> VcResult<Self> {
        let config = PipelineConfig::from_model_dir(model_dir)?;
        let bundle = OrtBundle::load(model_dir)
            .map_err(|e| VcError::config(format!("failed to load models: {:#}", e)))?;
        log::info!("Models loaded from {:?}", model_dir);
        Self::new(
            config,
            Box::new(bundle.content_encoder),
            Box::new(bundle.pitch_estimator),
            Box::new(bundle.decoder),
        )
    }

    /// Publish levels and timings of `convert_rt` calls to `status`.
    pub fn with_status(mut self, status: Arc<SharedStatus>) -> Self {
        self.status = Some(status);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Fresh state for a new stream: zero history of `buffer_size` samples
    /// and zero phase.
    pub fn init_buffer(&self, buffer_size: usize, device: Device) -> VcResult<ConversionState> {
        self.buffers
            .init(buffer_size, self.oscillator.num_harmonics(), device)
    }

    /// Build a style bank from a reference utterance, keeping every
    /// `stride`-th content frame.
    pub fn encode_target(&mut self, wave: Waveform<'_>, stride: usize) -> VcResult<StyleBank> {
        self.check_rate(&wave)?;
        if stride == 0 {
            return Err(VcError::invalid("stride must be at least 1"));
        }
        if wave.len() < self.config.frame_size {
            return Err(VcError::invalid(format!(
                "reference of {} samples is shorter than one frame",
                wave.len()
            )));
        }

        let content = self
            .content_encoder
            .encode(wave.samples)
            .map_err(|e| VcError::model("content encoder", e))?;
        if !content.is_finite() {
            return Err(VcError::NumericInstability(
                "content encoder produced non-finite features".into(),
            ));
        }
        let frames = content.subsample(stride);
        if frames.is_empty() {
            return Err(VcError::invalid("reference produced no content frames"));
        }

        log::debug!(
            "Style bank built: {} of {} frames (stride {}), width {}",
            frames.len(),
            content.len(),
            stride,
            frames.width()
        );
        Ok(StyleBank::new(frames))
    }

    /// Convert a whole utterance in one pass, without streaming state.
    pub fn convert(
        &mut self,
        wave: Waveform<'_>,
        bank: &StyleBank,
        params: &ConvertParams,
    ) -> VcResult<Vec<f32>> {
        params.validate()?;
        self.check_rate(&wave)?;
        if wave.len() < self.config.frame_size {
            return Err(VcError::invalid(format!(
                "input of {} samples is shorter than one frame",
                wave.len()
            )));
        }

        let analysis = self.analyze(wave.samples, bank, params)?;
        let (excitation, _) = self.oscillator.oscillate(
            &analysis.f0,
            &self.oscillator.initial_state(),
            0,
            wave.len(),
        )?;
        self.synthesize(&analysis, &excitation)
    }

    /// Convert one chunk of a stream.
    ///
    /// Returns exactly `chunk.len()` output samples and the state for the next
    /// call. On error `state` is still valid and unchanged.
    pub fn convert_rt(
        &mut self,
        chunk: Waveform<'_>,
        state: &ConversionState,
        bank: &StyleBank,
        params: &ConvertParams,
    ) -> VcResult<(Vec<f32>, ConversionState)> {
        let start = Instant::now();
        params.validate()?;
        self.check_rate(&chunk)?;

        let window = self.buffers.window(state, chunk.samples)?;
        let analysis = self.analyze(&window, bank, params)?;

        let (excitation, phase): (Vec<f32>, PhaseState) = self.oscillator.oscillate(
            &analysis.f0,
            state.phase(),
            self.buffers.begin_point(state),
            window.len(),
        )?;
        let synthesized = self.synthesize(&analysis, &excitation)?;

        let output = self
            .buffers
            .trim_output(state, &synthesized, chunk.len())?;
        let next = self.buffers.advance(state, &window, phase);

        self.report(chunk.samples, &output, start);
        Ok((output, next))
    }

    fn check_rate(&self, wave: &Waveform<'_>) -> VcResult<()> {
        if wave.sample_rate != self.config.sample_rate {
            return Err(VcError::invalid(format!(
                "sample rate {} Hz does not match the model rate {} Hz",
                wave.sample_rate, self.config.sample_rate
            )));
        }
        Ok(())
    }

    /// Content, f0 and energy of a window; content matched to the style bank
    /// and f0 shifted.
    fn analyze(
        &mut self,
        window: &[f32],
        bank: &StyleBank,
        params: &ConvertParams,
    ) -> VcResult<Analysis> {
        let content = self
            .content_encoder
            .encode(window)
            .map_err(|e| VcError::model("content encoder", e))?;
        if !content.is_finite() {
            return Err(VcError::NumericInstability(
                "content encoder produced non-finite features".into(),
            ));
        }

        let mut f0 = self.estimate_f0(window, params.pitch_algorithm)?;
        let energy = frame_energy(window, self.config.frame_size)?;

        let frames = energy.len();
        if content.len() != frames {
            return Err(VcError::model(
                "content encoder",
                anyhow::anyhow!("produced {} frames, expected {}", content.len(), frames),
            ));
        }
        if f0.len() != frames {
            return Err(VcError::model(
                "pitch estimator",
                anyhow::anyhow!("produced {} frames, expected {}", f0.len(), frames),
            ));
        }

        let fixed = sanitize_f0(&mut f0);
        if fixed > 0 {
            log::warn!("{} non-finite or negative f0 frames treated as unvoiced", fixed);
            if let Some(ref status) = self.status {
                status
                    .unvoiced_fixups
                    .fetch_add(fixed as u64, Ordering::Relaxed);
            }
        }

        let content = self
            .matcher
            .apply(&content, bank, params.k, params.alpha)?;
        let f0 = shift_pitch(&f0, params.pitch_shift);

        Ok(Analysis {
            content,
            f0,
            energy,
        })
    }

    fn estimate_f0(&mut self, window: &[f32], algorithm: PitchAlgorithm) -> VcResult<Vec<f32>> {
        let estimator: &mut dyn PitchEstimator = match algorithm {
            PitchAlgorithm::Default => &mut *self.pitch_estimator,
            PitchAlgorithm::Autocorrelation => &mut self.autocorrelation,
            PitchAlgorithm::Nsdf => &mut self.nsdf,
        };
        estimator
            .estimate(window)
            .map_err(|e| VcError::model("pitch estimator", e))
    }

    fn synthesize(&mut self, analysis: &Analysis, excitation: &[f32]) -> VcResult<Vec<f32>> {
        let wave = self
            .decoder
            .synthesize(&analysis.content, &analysis.f0, &analysis.energy, excitation)
            .map_err(|e| VcError::model("decoder", e))?;
        if wave.len() != excitation.len() {
            return Err(VcError::model(
                "decoder",
                anyhow::anyhow!(
                    "produced {} samples, expected {}",
                    wave.len(),
                    excitation.len()
                ),
            ));
        }
        if wave.iter().any(|v| !v.is_finite()) {
            return Err(VcError::NumericInstability(
                "decoder produced non-finite samples".into(),
            ));
        }
        Ok(wave)
    }

    fn report(&self, input: &[f32], output: &[f32], start: Instant) {
        let elapsed_ms = start.elapsed().as_secs_f32() * 1000.0;
        let budget_ms = input.len() as f32 / self.config.sample_rate as f32 * 1000.0;
        let overrun = elapsed_ms > budget_ms;
        if overrun {
            log::warn!(
                "convert_rt overrun: {:.2} ms for a {:.2} ms chunk",
                elapsed_ms,
                budget_ms
            );
        }

        if let Some(ref status) = self.status {
            status.input_level_db.store(rms_db(input), Ordering::Relaxed);
            status.output_level_db.store(rms_db(output), Ordering::Relaxed);
            status.inference_ms.store(elapsed_ms, Ordering::Relaxed);
            status.chunk_count.fetch_add(1, Ordering::Relaxed);
            if overrun {
                status.overrun_count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Compute RMS level in dB.
pub fn rms_db(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return -100.0;
    }
    let sum_sq: f32 = samples.iter().map(|&s| s * s).sum();
    let rms = (sum_sq / samples.len() as f32).sqrt();
    if rms < 1e-10 {
        -100.0
    } else {
        20.0 * rms.log10()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_validation() {
        assert!(ConvertParams::default().validate().is_ok());
        let bad = [
            ConvertParams { k: 0, ..Default::default() },
            ConvertParams { alpha: -0.1, ..Default::default() },
            ConvertParams { alpha: 1.01, ..Default::default() },
            ConvertParams { pitch_shift: f32::NAN, ..Default::default() },
        ];
        for p in bad {
            assert!(matches!(p.validate(), Err(VcError::InvalidInput(_))), "{:?}", p);
        }
    }

    #[test]
    fn test_rms_db() {
        assert_eq!(rms_db(&[]), -100.0);
        assert_eq!(rms_db(&[0.0; 64]), -100.0);
        assert!(rms_db(&[1.0; 64]).abs() < 1e-4);
        assert!((rms_db(&[0.1; 64]) + 20.0).abs() < 1e-3);
    }

    #[test]
    fn test_load_missing_models_is_config_error() {
        let dir = std::env::temp_dir().join("rtvc_no_models_here");
        let _ = std::fs::create_dir_all(&dir);
        assert!(matches!(
            ConversionPipeline::load(&dir),
            Err(VcError::Configuration(_))
        ));
    }
}
