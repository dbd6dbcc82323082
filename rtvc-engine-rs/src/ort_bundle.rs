use std::path::Path;

use anyhow::{bail, Context, Result};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;

use crate::constants::*;
use crate::models::{ContentEncoder, Decoder, PitchEstimator};
use crate::types::FrameSequence;

/// The three ONNX Runtime sessions behind the model traits.
///
/// Tensor layout is channel-first with a batch of one:
/// content `[1, D, T]`, f0 / energy `[1, 1, T]`, excitation `[1, 1, N]`,
/// waveforms `[1, N]`.
pub struct OrtBundle {
    pub content_encoder: OrtContentEncoder,
    pub pitch_estimator: OrtPitchEstimator,
    pub decoder: OrtDecoder,
}

/// Helper to build a session with standard options.
fn build_session(model_path: impl AsRef<Path>) -> Result<Session> {
    Session::builder()?
        .with_intra_threads(1)?
        .with_inter_threads(1)?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .commit_from_file(model_path.as_ref())
        .map_err(Into::into)
}

fn load_required(dir: &Path, filename: &str) -> Result<Session> {
    let path = dir.join(filename);
    if !path.exists() {
        bail!("{} not found in {:?}", filename, dir);
    }
    let session = build_session(&path).with_context(|| format!("Failed to load {}", filename))?;
    log::info!("Loaded model: {}", filename);
    Ok(session)
}

fn dims(shape: &[i64]) -> Result<Vec<usize>> {
    shape
        .iter()
        .map(|&d| usize::try_from(d).context("negative tensor dimension"))
        .collect()
}

impl OrtBundle {
    /// Load `content_encoder.onnx`, `pitch_estimator.onnx` and `decoder.onnx`.
    pub fn load(model_dir: &Path) -> Result<Self> {
        Ok(Self {
            content_encoder: OrtContentEncoder {
                session: load_required(model_dir, CONTENT_ENCODER_FILE)?,
            },
            pitch_estimator: OrtPitchEstimator {
                session: load_required(model_dir, PITCH_ESTIMATOR_FILE)?,
            },
            decoder: OrtDecoder {
                session: load_required(model_dir, DECODER_FILE)?,
            },
        })
    }
}

pub struct OrtContentEncoder {
    session: Session,
}

impl ContentEncoder for OrtContentEncoder {
    /// wave[1, N] -> content[1, D, T]
    fn encode(&mut self, wave: &[f32]) -> Result<FrameSequence> {
        let outputs = self.session.run(ort::inputs![
            "wave" => TensorRef::from_array_view(([1usize, wave.len()], wave))?,
        ])?;

        let (shape, data) = outputs["content"].try_extract_tensor::<f32>()?;
        let shape = dims(shape)?;
        if shape.len() != 3 || shape[0] != 1 {
            bail!("content output must be [1, D, T], got {:?}", shape);
        }
        let frames = FrameSequence::from_channel_major(data, shape[1], shape[2])?;
        Ok(frames)
    }
}

pub struct OrtPitchEstimator {
    session: Session,
}

impl PitchEstimator for OrtPitchEstimator {
    /// wave[1, N] -> f0[1, 1, T]
    fn estimate(&mut self, wave: &[f32]) -> Result<Vec<f32>> {
        let outputs = self.session.run(ort::inputs![
            "wave" => TensorRef::from_array_view(([1usize, wave.len()], wave))?,
        ])?;

        let (shape, data) = outputs["f0"].try_extract_tensor::<f32>()?;
        let shape = dims(shape)?;
        if shape.iter().product::<usize>() != data.len() || shape.last().copied() != Some(data.len()) {
            bail!("f0 output must be [1, 1, T], got {:?}", shape);
        }
        Ok(data.to_vec())
    }
}

pub struct OrtDecoder {
    session: Session,
}

impl Decoder for OrtDecoder {
    /// content[1, D, T] + f0[1, 1, T] + energy[1, 1, T] + source[1, 1, N] -> wave[1, N]
    fn synthesize(
        &mut self,
        content: &FrameSequence,
        f0: &[f32],
        energy: &[f32],
        excitation: &[f32],
    ) -> Result<Vec<f32>> {
        let t = content.len();
        let content_cm = content.to_channel_major();
        let outputs = self.session.run(ort::inputs![
            "content" => TensorRef::from_array_view(([1, content.width(), t], content_cm.as_slice()))?,
            "f0" => TensorRef::from_array_view(([1usize, 1, f0.len()], f0))?,
            "energy" => TensorRef::from_array_view(([1usize, 1, energy.len()], energy))?,
            "source" => TensorRef::from_array_view(([1usize, 1, excitation.len()], excitation))?,
        ])?;

        let (_, data) = outputs["wave"].try_extract_tensor::<f32>()?;
        Ok(data.to_vec())
    }
}
