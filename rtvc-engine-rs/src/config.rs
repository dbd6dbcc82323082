use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::{VcError, VcResult};

/// Where conversion state is allocated.
///
/// History and phase buffers are plain host memory; accelerator placement of
/// the models themselves is decided by the ONNX Runtime session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Cpu,
}

/// Static pipeline configuration, shared by every stream of one model set.
///
/// Read from `config.json` next to the model files when present; every field
/// falls back to the value in [`crate::constants`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub sample_rate: u32,
    pub frame_size: usize,
    pub num_harmonics: usize,
    pub harmonic_gain: f32,
    pub noise_gain: f32,
    pub noise_seed: u64,
    pub f0_min_hz: f32,
    pub f0_max_hz: f32,
    pub voicing_threshold: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            frame_size: FRAME_SIZE,
            num_harmonics: NUM_HARMONICS,
            harmonic_gain: HARMONIC_GAIN,
            noise_gain: NOISE_GAIN,
            noise_seed: NOISE_SEED,
            f0_min_hz: F0_MIN_HZ,
            f0_max_hz: F0_MAX_HZ,
            voicing_threshold: VOICING_THRESHOLD,
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a JSON config file.
    pub fn load(path: &Path) -> VcResult<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| VcError::config(format!("failed to read {:?}: {}", path, e)))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| VcError::config(format!("failed to parse {:?}: {}", path, e)))?;
        config.validate()?;
        log::info!("Pipeline config loaded from {:?}", path);
        Ok(config)
    }

    /// Load `config.json` from a model directory, or use defaults if absent.
    pub fn from_model_dir(dir: &Path) -> VcResult<Self> {
        let path = dir.join(CONFIG_FILE);
        if path.exists() {
            Self::load(&path)
        } else {
            log::info!("No {} in {:?}, using default pipeline config", CONFIG_FILE, dir);
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> VcResult<()> {
        if self.sample_rate == 0 {
            return Err(VcError::config("sample_rate must be positive"));
        }
        if self.frame_size == 0 {
            return Err(VcError::config("frame_size must be positive"));
        }
        if !(self.harmonic_gain >= 0.0 && self.noise_gain >= 0.0) {
            return Err(VcError::config("excitation gains must be non-negative"));
        }
        let nyquist = self.sample_rate as f32 / 2.0;
        if !(self.f0_min_hz > 0.0 && self.f0_min_hz < self.f0_max_hz && self.f0_max_hz < nyquist) {
            return Err(VcError::config(format!(
                "f0 search range {}..{} Hz is invalid for {} Hz audio",
                self.f0_min_hz, self.f0_max_hz, self.sample_rate
            )));
        }
        if !(0.0..=1.0).contains(&self.voicing_threshold) {
            return Err(VcError::config("voicing_threshold must lie in [0, 1]"));
        }
        Ok(())
    }

    /// Samples dropped from the tail of every streaming window.
    pub fn trim_len(&self) -> usize {
        self.frame_size * TRIM_FRAMES
    }
}
