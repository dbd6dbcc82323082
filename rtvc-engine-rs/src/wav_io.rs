use std::path::Path;

use anyhow::{bail, Context, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

/// Mono audio as loaded from disk.
#[derive(Debug, Clone)]
pub struct MonoAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Read a WAV file as mono f32 in [-1.0, 1.0].
///
/// Integer PCM (16/24/32-bit) and 32-bit float are accepted; extra channels
/// are averaged.
pub fn read_mono(path: &Path) -> Result<MonoAudio> {
    let reader = WavReader::open(path).with_context(|| format!("Failed to open WAV: {:?}", path))?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        bail!("WAV file has 0 channels");
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Int => {
            let scale = match spec.bits_per_sample {
                16 => 1.0 / 32768.0,
                24 => 1.0 / 8388608.0,
                32 => 1.0 / 2147483648.0,
                bits => bail!("Unsupported bit depth: {}", bits),
            };
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<std::result::Result<_, _>>()
                .context("Failed to read integer samples")?
        }
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .context("Failed to read float samples")?,
    };

    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    log::debug!(
        "Read {:?}: {} samples @ {} Hz ({} ch)",
        path,
        samples.len(),
        spec.sample_rate,
        channels
    );
    Ok(MonoAudio {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Write mono 16-bit PCM, clipping to [-1.0, 1.0].
pub fn write_mono_16(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("failed to create output wav: {}", path.display()))?;
    for &s in samples {
        writer.write_sample((s.clamp(-1.0, 1.0) * 32767.0).round() as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Scale `samples` down so the peak is at most `target_peak`; returns the gain.
pub fn normalize_peak(samples: &mut [f32], target_peak: f32) -> f32 {
    let peak = samples.iter().fold(0.0f32, |a, v| a.max(v.abs()));
    if peak <= 1e-9 || peak <= target_peak {
        return 1.0;
    }
    let scale = target_peak / peak;
    for s in samples {
        *s *= scale;
    }
    scale
}
