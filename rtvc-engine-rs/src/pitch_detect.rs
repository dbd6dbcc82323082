//! Signal-processing f0 detectors selectable by name at call time.
//!
//! Both detectors share the pitch model's output contract: one value per
//! `frame_size` hop, in Hz, 0 for unvoiced frames.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::constants::{PEAK_PICK_RATIO, SILENCE_MEAN_SQUARE};
use crate::error::VcError;
use crate::models::PitchEstimator;

/// Which f0 source a conversion call uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PitchAlgorithm {
    /// The loaded pitch estimation model.
    #[default]
    Default,
    /// Normalized autocorrelation.
    Autocorrelation,
    /// McLeod normalized square difference function.
    Nsdf,
}

impl PitchAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            PitchAlgorithm::Default => "default",
            PitchAlgorithm::Autocorrelation => "autocorrelation",
            PitchAlgorithm::Nsdf => "nsdf",
        }
    }
}

impl fmt::Display for PitchAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PitchAlgorithm {
    type Err = VcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(PitchAlgorithm::Default),
            "autocorr" | "autocorrelation" => Ok(PitchAlgorithm::Autocorrelation),
            "nsdf" | "mpm" => Ok(PitchAlgorithm::Nsdf),
            other => Err(VcError::invalid(format!(
                "unknown pitch algorithm '{}' (expected default, autocorrelation or nsdf)",
                other
            ))),
        }
    }
}

/// Lag-domain similarity measure used by [`FftPitchDetector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorKind {
    /// `r(τ) / sqrt(E_head(τ) * E_tail(τ))`
    Autocorrelation,
    /// `2 r(τ) / (E_head(τ) + E_tail(τ))`
    Nsdf,
}

/// Frame-wise f0 detector computing lag correlations through the FFT.
///
/// Each frame is analysed on a window centred on the frame, zero-padded past
/// the waveform edges. FFT plans and scratch buffers are sized once at
/// construction.
pub struct FftPitchDetector {
    kind: DetectorKind,
    sample_rate: u32,
    frame_size: usize,
    min_lag: usize,
    max_lag: usize,
    f0_min_hz: f32,
    f0_max_hz: f32,
    voicing_threshold: f32,
    window_len: usize,
    fft_len: usize,
    fft: Arc<dyn Fft<f32>>,
    ifft: Arc<dyn Fft<f32>>,
    frame: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    fft_scratch: Vec<Complex<f32>>,
    energy_prefix: Vec<f64>,
    score: Vec<f32>,
}

impl FftPitchDetector {
    pub fn new(kind: DetectorKind, config: &PipelineConfig) -> Self {
        let sr = config.sample_rate as f32;
        let min_lag = ((sr / config.f0_max_hz).floor() as usize).max(2);
        let max_lag = ((sr / config.f0_min_hz).ceil() as usize).max(min_lag + 1);
        let window_len = (2 * max_lag + 2).max(2 * config.frame_size);
        let fft_len = (2 * window_len).next_power_of_two();

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_len);
        let ifft = planner.plan_fft_inverse(fft_len);
        let scratch_len = fft
            .get_inplace_scratch_len()
            .max(ifft.get_inplace_scratch_len());

        Self {
            kind,
            sample_rate: config.sample_rate,
            frame_size: config.frame_size,
            min_lag,
            max_lag,
            f0_min_hz: config.f0_min_hz,
            f0_max_hz: config.f0_max_hz,
            voicing_threshold: config.voicing_threshold,
            window_len,
            fft_len,
            fft,
            ifft,
            frame: vec![0.0; window_len],
            spectrum: vec![Complex::new(0.0, 0.0); fft_len],
            fft_scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            energy_prefix: vec![0.0; window_len + 1],
            score: vec![0.0; max_lag + 2],
        }
    }

    pub fn kind(&self) -> DetectorKind {
        self.kind
    }

    /// f0 for every complete frame of `wave`.
    pub fn detect(&mut self, wave: &[f32]) -> Vec<f32> {
        let num_frames = wave.len() / self.frame_size;
        (0..num_frames)
            .map(|t| {
                let center = t * self.frame_size + self.frame_size / 2;
                self.detect_frame(wave, center)
            })
            .collect()
    }

    fn detect_frame(&mut self, wave: &[f32], center: usize) -> f32 {
        if !self.load_frame(wave, center) {
            return 0.0;
        }
        self.compute_scores();
        match pick_period(
            &self.score,
            self.min_lag,
            self.max_lag,
            self.voicing_threshold,
        ) {
            Some(lag) => {
                let f0 = self.sample_rate as f32 / lag;
                if f0.is_finite() && f0 >= self.f0_min_hz * 0.97 && f0 <= self.f0_max_hz * 1.03 {
                    f0
                } else {
                    0.0
                }
            }
            None => 0.0,
        }
    }

    /// Copy the analysis window around `center`, remove DC and gate silence.
    ///
    /// Returns false when the window is too quiet to carry a pitch.
    fn load_frame(&mut self, wave: &[f32], center: usize) -> bool {
        let start = center as isize - (self.window_len / 2) as isize;
        let lo = start.max(0) as usize;
        let hi = ((start + self.window_len as isize).max(0) as usize).min(wave.len());
        if hi <= lo {
            return false;
        }
        let offset = (lo as isize - start) as usize;

        self.frame.fill(0.0);
        let valid = &wave[lo..hi];
        let mean = valid.iter().map(|&v| v as f64).sum::<f64>() / valid.len() as f64;
        let mut sum_sq = 0.0f64;
        for (dst, &src) in self.frame[offset..offset + valid.len()].iter_mut().zip(valid) {
            let v = src as f64 - mean;
            *dst = v as f32;
            sum_sq += v * v;
        }

        let mean_sq = sum_sq / valid.len() as f64;
        mean_sq.is_finite() && mean_sq >= SILENCE_MEAN_SQUARE as f64
    }

    /// Fill `score[0..=max_lag + 1]` with the normalized lag similarity.
    fn compute_scores(&mut self) {
        let w = self.window_len;

        // Linear autocorrelation via zero-padded FFT (Wiener-Khinchin)
        for (c, &x) in self.spectrum.iter_mut().zip(self.frame.iter()) {
            *c = Complex::new(x, 0.0);
        }
        self.spectrum[w..].fill(Complex::new(0.0, 0.0));
        self.fft
            .process_with_scratch(&mut self.spectrum, &mut self.fft_scratch);
        for c in self.spectrum.iter_mut() {
            *c = Complex::new(c.norm_sqr(), 0.0);
        }
        self.ifft
            .process_with_scratch(&mut self.spectrum, &mut self.fft_scratch);
        let norm = 1.0 / self.fft_len as f32;

        self.energy_prefix[0] = 0.0;
        for i in 0..w {
            let x = self.frame[i] as f64;
            self.energy_prefix[i + 1] = self.energy_prefix[i] + x * x;
        }

        let total = self.energy_prefix[w];
        for tau in 0..self.score.len() {
            let r = (self.spectrum[tau].re * norm) as f64;
            let head = self.energy_prefix[w - tau];
            let tail = total - self.energy_prefix[tau];
            let value = match self.kind {
                DetectorKind::Autocorrelation => {
                    let denom = (head * tail).sqrt();
                    if denom > 1e-12 {
                        r / denom
                    } else {
                        0.0
                    }
                }
                DetectorKind::Nsdf => {
                    let m = head + tail;
                    if m > 1e-12 {
                        2.0 * r / m
                    } else {
                        0.0
                    }
                }
            };
            self.score[tau] = value as f32;
        }
    }
}

impl PitchEstimator for FftPitchDetector {
    fn estimate(&mut self, wave: &[f32]) -> anyhow::Result<Vec<f32>> {
        Ok(self.detect(wave))
    }
}

/// Pick the fundamental period (in fractional samples) from a lag score.
///
/// Skips the main lobe around lag 0, then takes the first local maximum that
/// reaches `PEAK_PICK_RATIO` of the strongest one, which avoids locking onto
/// period multiples. Returns `None` for unvoiced frames.
fn pick_period(score: &[f32], min_lag: usize, max_lag: usize, threshold: f32) -> Option<f32> {
    let last = max_lag.min(score.len().saturating_sub(2));

    let mut tau = 1;
    while tau <= last && score[tau] > 0.0 {
        tau += 1;
    }
    let first = tau.max(min_lag).max(1);
    if first > last {
        return None;
    }

    let is_peak = |t: usize| score[t] > 0.0 && score[t - 1] < score[t] && score[t] >= score[t + 1];

    let best = (first..=last)
        .filter(|&t| is_peak(t))
        .map(|t| score[t])
        .fold(f32::NEG_INFINITY, f32::max);
    if !(best >= threshold) {
        return None;
    }

    let chosen = (first..=last).find(|&t| is_peak(t) && score[t] >= PEAK_PICK_RATIO * best)?;

    // Parabolic refinement around the chosen peak
    let (a, b, c) = (score[chosen - 1], score[chosen], score[chosen + 1]);
    let curvature = a - 2.0 * b + c;
    let shift = if curvature.abs() > 1e-12 {
        (0.5 * (a - c) / curvature).clamp(-0.5, 0.5)
    } else {
        0.0
    };
    Some(chosen as f32 + shift)
}
