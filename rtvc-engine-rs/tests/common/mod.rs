#![allow(dead_code)]

use std::f32::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use rtvc_engine_rs::config::PipelineConfig;
use rtvc_engine_rs::models::{ContentEncoder, Decoder, PitchEstimator};
use rtvc_engine_rs::pipeline::ConversionPipeline;
use rtvc_engine_rs::types::FrameSequence;

pub const SR: u32 = 48_000;
pub const FS: usize = 480;

pub fn gen_sine(freq_hz: f32, sr: u32, n: usize, amp: f32) -> Vec<f32> {
    (0..n)
        .map(|i| amp * (2.0 * PI * freq_hz * i as f32 / sr as f32).sin())
        .collect()
}

pub fn median(values: &mut [f32]) -> f32 {
    values.sort_by(|a, b| a.total_cmp(b));
    values[values.len() / 2]
}

/// Frame-local summary features: `[rms + 0.01, mean, peak]`.
///
/// Identical audio frames always map to identical content, whichever window
/// they appear in.
pub fn frame_features(wave: &[f32]) -> FrameSequence {
    let mut data = Vec::new();
    for frame in wave.chunks_exact(FS) {
        let n = frame.len() as f32;
        let rms = (frame.iter().map(|v| v * v).sum::<f32>() / n).sqrt();
        let mean = frame.iter().sum::<f32>() / n;
        let peak = frame.iter().fold(0.0f32, |a, v| a.max(v.abs()));
        data.extend_from_slice(&[rms + 0.01, mean, peak]);
    }
    FrameSequence::new(data, 3).unwrap()
}

pub struct StatsEncoder;

impl ContentEncoder for StatsEncoder {
    fn encode(&mut self, wave: &[f32]) -> Result<FrameSequence> {
        Ok(frame_features(wave))
    }
}

/// Encoder that drops the last frame.
pub struct ShortEncoder;

impl ContentEncoder for ShortEncoder {
    fn encode(&mut self, wave: &[f32]) -> Result<FrameSequence> {
        let full = frame_features(wave);
        let keep = full.len().saturating_sub(1) * full.width();
        Ok(FrameSequence::new(full.as_slice()[..keep].to_vec(), full.width())?)
    }
}

/// Every frame at the same frequency.
pub struct ConstantPitch(pub f32);

impl PitchEstimator for ConstantPitch {
    fn estimate(&mut self, wave: &[f32]) -> Result<Vec<f32>> {
        Ok(vec![self.0; wave.len() / FS])
    }
}

/// Inputs seen by a decoder call.
#[derive(Debug, Clone)]
pub struct DecoderCall {
    pub content: FrameSequence,
    pub f0: Vec<f32>,
    pub energy: Vec<f32>,
}

/// Returns the excitation unchanged and records what it was given.
///
/// Setting `fail` makes the next calls error out until it is cleared.
#[derive(Default, Clone)]
pub struct EchoDecoder {
    pub calls: Arc<Mutex<Vec<DecoderCall>>>,
    pub fail: Arc<AtomicBool>,
}

impl Decoder for EchoDecoder {
    fn synthesize(
        &mut self,
        content: &FrameSequence,
        f0: &[f32],
        energy: &[f32],
        excitation: &[f32],
    ) -> Result<Vec<f32>> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("decoder unavailable");
        }
        self.calls.lock().unwrap().push(DecoderCall {
            content: content.clone(),
            f0: f0.to_vec(),
            energy: energy.to_vec(),
        });
        Ok(excitation.to_vec())
    }
}

/// Produces NaN everywhere.
pub struct NanDecoder;

impl Decoder for NanDecoder {
    fn synthesize(&mut self, _: &FrameSequence, _: &[f32], _: &[f32], excitation: &[f32]) -> Result<Vec<f32>> {
        Ok(vec![f32::NAN; excitation.len()])
    }
}

/// Returns one sample too few.
pub struct TruncatingDecoder;

impl Decoder for TruncatingDecoder {
    fn synthesize(&mut self, _: &FrameSequence, _: &[f32], _: &[f32], excitation: &[f32]) -> Result<Vec<f32>> {
        Ok(excitation[..excitation.len() - 1].to_vec())
    }
}

pub fn quiet_config() -> PipelineConfig {
    PipelineConfig {
        noise_gain: 0.0,
        ..Default::default()
    }
}

pub fn echo_pipeline(config: PipelineConfig, f0: f32) -> (ConversionPipeline, EchoDecoder) {
    let decoder = EchoDecoder::default();
    let pipeline = ConversionPipeline::new(
        config,
        Box::new(StatsEncoder),
        Box::new(ConstantPitch(f0)),
        Box::new(decoder.clone()),
    )
    .unwrap();
    (pipeline, decoder)
}
