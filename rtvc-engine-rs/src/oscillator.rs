//! Phase-continuous harmonic-plus-noise excitation.
//!
//! The phase of every partial is anchored at a `begin_point` sample: that
//! sample takes exactly the carried phase, later samples accumulate forward
//! and earlier samples backward. In streaming use the anchor is the last
//! sample of the history buffer, which is the same instant as the last
//! sample synthesized by the previous call, so overlapping windows agree.
//!
//! Noise is white, drawn from a counter-based generator keyed by an absolute
//! sample position. The position of the anchor is carried in the state, so
//! re-synthesized samples repeat the same noise.

use std::f64::consts::TAU;

use crate::config::PipelineConfig;
use crate::error::{VcError, VcResult};

/// Phase carried across chunk boundaries.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseState {
    /// Radians in `[0, 2π)`; slot 0 is the fundamental, slot `h` harmonic `h + 1`.
    harmonics: Vec<f64>,
    /// Absolute sample position of the anchor sample for the noise band.
    noise_position: i64,
}

impl PhaseState {
    /// All partials at phase 0, noise at position 0.
    pub fn zeroed(num_harmonics: usize) -> Self {
        Self {
            harmonics: vec![0.0; num_harmonics + 1],
            noise_position: 0,
        }
    }

    pub fn harmonics(&self) -> &[f64] {
        &self.harmonics
    }

    pub fn noise_position(&self) -> i64 {
        self.noise_position
    }

    /// Number of partials, fundamental included.
    pub fn len(&self) -> usize {
        self.harmonics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.harmonics.is_empty()
    }
}

/// Synthesizes the excitation signal fed to the decoder.
#[derive(Debug, Clone)]
pub struct HarmonicOscillator {
    sample_rate: f64,
    frame_size: usize,
    num_harmonics: usize,
    harmonic_gain: f64,
    noise_gain: f32,
    noise_seed: u64,
}

impl HarmonicOscillator {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            sample_rate: config.sample_rate as f64,
            frame_size: config.frame_size,
            num_harmonics: config.num_harmonics,
            harmonic_gain: config.harmonic_gain as f64,
            noise_gain: config.noise_gain,
            noise_seed: config.noise_seed,
        }
    }

    pub fn num_harmonics(&self) -> usize {
        self.num_harmonics
    }

    pub fn initial_state(&self) -> PhaseState {
        PhaseState::zeroed(self.num_harmonics)
    }

    /// Render `num_samples` of excitation from frame-rate f0.
    ///
    /// `f0` is upsampled to a per-sample track by linear interpolation between
    /// frame centres (held flat past the first and last centre). Frames with
    /// `f0 <= 0` are unvoiced and silence the harmonic stack; partials above
    /// Nyquist are muted. Returns the excitation and the phase at the last
    /// sample, ready to seed the next call.
    pub fn oscillate(
        &self,
        f0: &[f32],
        state: &PhaseState,
        begin_point: usize,
        num_samples: usize,
    ) -> VcResult<(Vec<f32>, PhaseState)> {
        if f0.is_empty() {
            return Err(VcError::invalid("oscillator needs at least one f0 frame"));
        }
        if state.len() != self.num_harmonics + 1 {
            return Err(VcError::invalid(format!(
                "phase state has {} partials, oscillator expects {}",
                state.len(),
                self.num_harmonics + 1
            )));
        }
        if begin_point >= num_samples {
            return Err(VcError::invalid(format!(
                "begin point {} outside {} samples",
                begin_point, num_samples
            )));
        }

        let (freq, voiced) = self.frequency_track(f0, num_samples);

        // cycles[n] = sum_{m <= n} f[m] / sr
        let mut cycles = Vec::with_capacity(num_samples);
        let mut acc = 0.0f64;
        for &f in &freq {
            acc += f / self.sample_rate;
            cycles.push(acc);
        }
        let anchor = cycles[begin_point];

        let nyquist = self.sample_rate / 2.0;
        let mut out = vec![0.0f32; num_samples];
        for (n, sample) in out.iter_mut().enumerate() {
            let mut harmonic_sum = 0.0f64;
            if voiced[n] > 0.0 {
                let d = cycles[n] - anchor;
                for (h, &phase0) in state.harmonics.iter().enumerate() {
                    let mult = (h + 1) as f64;
                    if freq[n] * mult >= nyquist {
                        break;
                    }
                    let theta = phase0 + TAU * (d * mult).rem_euclid(1.0);
                    harmonic_sum += theta.sin() / mult;
                }
                harmonic_sum *= voiced[n] * self.harmonic_gain;
            }

            let position = state.noise_position + (n as i64 - begin_point as i64);
            *sample = harmonic_sum as f32 + self.noise_gain * white_noise(self.noise_seed, position);
        }

        let last = num_samples - 1;
        let d_last = cycles[last] - anchor;
        let harmonics = state
            .harmonics
            .iter()
            .enumerate()
            .map(|(h, &phase0)| {
                let mult = (h + 1) as f64;
                (phase0 + TAU * (d_last * mult).rem_euclid(1.0)).rem_euclid(TAU)
            })
            .collect();
        let next = PhaseState {
            harmonics,
            noise_position: state.noise_position + (last as i64 - begin_point as i64),
        };

        Ok((out, next))
    }

    /// Per-sample frequency (Hz) and voicing weight in `[0, 1]`.
    fn frequency_track(&self, f0: &[f32], num_samples: usize) -> (Vec<f64>, Vec<f64>) {
        let fs = self.frame_size as f64;
        let last_frame = f0.len() - 1;
        let hz = |t: usize| {
            let v = f0[t] as f64;
            if v.is_finite() && v > 0.0 {
                v
            } else {
                0.0
            }
        };
        let uv = |t: usize| if hz(t) > 0.0 { 1.0 } else { 0.0 };

        let mut freq = Vec::with_capacity(num_samples);
        let mut voiced = Vec::with_capacity(num_samples);
        for n in 0..num_samples {
            // frame t is centred on sample t * fs + fs / 2
            let x = ((n as f64 + 0.5) / fs - 0.5).clamp(0.0, last_frame as f64);
            let i0 = x.floor() as usize;
            let i1 = (i0 + 1).min(last_frame);
            let w = x - i0 as f64;
            freq.push(hz(i0) * (1.0 - w) + hz(i1) * w);
            voiced.push(uv(i0) * (1.0 - w) + uv(i1) * w);
        }
        (freq, voiced)
    }
}

/// Uniform white noise in `[-1, 1)` as a pure function of (seed, position).
fn white_noise(seed: u64, position: i64) -> f32 {
    // SplitMix64 finalizer over the position
    let mut z = seed ^ (position as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^= z >> 31;
    ((z >> 40) as f32 / (1u64 << 24) as f32) * 2.0 - 1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn osc(noise_gain: f32) -> HarmonicOscillator {
        HarmonicOscillator::new(&PipelineConfig {
            noise_gain,
            ..Default::default()
        })
    }

    #[test]
    fn test_chunked_matches_single_call() {
        // Mirrors the streaming layout: history B, chunk C, anchor at B - 1.
        let osc = osc(0.01);
        let (b, c) = (2400usize, 960usize);
        let f0_long = vec![220.0f32; (b + 2 * c) / 480];
        let f0_win = vec![220.0f32; (b + c) / 480];

        let (reference, _) = osc
            .oscillate(&f0_long, &osc.initial_state(), b - 1, b + 2 * c)
            .unwrap();

        let (first, state) = osc
            .oscillate(&f0_win, &osc.initial_state(), b - 1, b + c)
            .unwrap();
        let (second, _) = osc.oscillate(&f0_win, &state, b - 1, b + c).unwrap();

        for n in 0..b + c {
            assert!((first[n] - reference[n]).abs() < 1e-5, "first window, n={}", n);
        }
        // second window starts c samples later; compare from its anchor on
        for n in b - 1..b + c {
            assert!(
                (second[n] - reference[n + c]).abs() < 1e-5,
                "second window, n={}: {} vs {}",
                n,
                second[n],
                reference[n + c]
            );
        }
    }

    #[test]
    fn test_adjacent_windows_with_shared_anchor() {
        // [0, 1200) then [1199, 2400): the shared sample is the anchor
        let osc = osc(0.0);
        let f0 = vec![180.0f32; 5];
        let (whole, _) = osc.oscillate(&f0, &osc.initial_state(), 0, 2400).unwrap();
        let (_, state) = osc.oscillate(&f0, &osc.initial_state(), 0, 1200).unwrap();
        let (tail, _) = osc.oscillate(&f0, &state, 0, 1201).unwrap();
        for n in 0..1201 {
            assert!((tail[n] - whole[1199 + n]).abs() < 1e-5, "n={}", n);
        }
    }

    #[test]
    fn test_unvoiced_is_noise_only() {
        let osc = osc(0.0);
        let (out, state) = osc.oscillate(&[0.0; 4], &osc.initial_state(), 0, 1920).unwrap();
        assert!(out.iter().all(|&v| v == 0.0));
        assert!(state.harmonics().iter().all(|&p| p == 0.0));

        let noisy = HarmonicOscillator::new(&PipelineConfig::default());
        let (out, _) = noisy.oscillate(&[0.0; 4], &noisy.initial_state(), 0, 1920).unwrap();
        let peak = out.iter().fold(0.0f32, |a, v| a.max(v.abs()));
        assert!(peak > 0.0 && peak <= PipelineConfig::default().noise_gain);
    }

    #[test]
    fn test_final_phase_of_fundamental() {
        // 100 Hz for 480 samples at 48 kHz advances exactly one cycle from the anchor
        let osc = osc(0.0);
        let (_, state) = osc.oscillate(&[100.0], &osc.initial_state(), 0, 481).unwrap();
        let p = state.harmonics()[0];
        assert!(p.min(TAU - p) < 1e-9, "phase {}", p);
        assert_eq!(state.noise_position(), 480);
    }

    #[test]
    fn test_harmonics_above_nyquist_muted() {
        // 2 kHz fundamental: partials from 12 upward exceed 24 kHz and are skipped
        let osc = osc(0.0);
        let (out, _) = osc.oscillate(&[2000.0; 2], &osc.initial_state(), 0, 960).unwrap();
        assert!(out.iter().all(|v| v.is_finite()));
        assert!(out.iter().any(|&v| v.abs() > 0.01));
    }

    #[test]
    fn test_invalid_arguments() {
        let osc = osc(0.0);
        let state = osc.initial_state();
        assert!(osc.oscillate(&[], &state, 0, 10).is_err());
        assert!(osc.oscillate(&[100.0], &state, 10, 10).is_err());
        assert!(osc.oscillate(&[100.0], &PhaseState::zeroed(2), 0, 10).is_err());
    }

    #[test]
    fn test_white_noise_range_and_determinism() {
        let a: Vec<f32> = (-500..500).map(|p| white_noise(7, p)).collect();
        let b: Vec<f32> = (-500..500).map(|p| white_noise(7, p)).collect();
        assert_eq!(a, b);
        assert!(a.iter().all(|&v| (-1.0..1.0).contains(&v)));
        let mean = a.iter().sum::<f32>() / a.len() as f32;
        assert!(mean.abs() < 0.1);
    }
}
