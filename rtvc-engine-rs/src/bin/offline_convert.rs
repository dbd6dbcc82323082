use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use rtvc_engine_rs::constants::{DEFAULT_K, DEFAULT_STRIDE};
use rtvc_engine_rs::pipeline::{ConversionPipeline, ConvertParams, SharedStatus};
use rtvc_engine_rs::pitch_detect::PitchAlgorithm;
use rtvc_engine_rs::wav_io::{normalize_peak, read_mono, write_mono_16};
use rtvc_engine_rs::{Device, Waveform};

fn parse_arg(args: &[String], key: &str) -> Option<String> {
    args.windows(2).find(|w| w[0] == key).map(|w| w[1].clone())
}

fn parse_or<T: std::str::FromStr>(args: &[String], key: &str, default: T) -> Result<T> {
    match parse_arg(args, key) {
        Some(v) => v
            .parse::<T>()
            .map_err(|_| anyhow::anyhow!("invalid value for {}: {}", key, v)),
        None => Ok(default),
    }
}

fn required(args: &[String], key: &str) -> Result<PathBuf> {
    parse_arg(args, key)
        .map(PathBuf::from)
        .with_context(|| format!("missing {}", key))
}

fn usage() -> ! {
    eprintln!(
        "Usage: offline_convert --input <in.wav> --target <ref.wav> --output <out.wav> \\\n  \
         [--model-dir models] [--pitch-shift 0] [--k {}] [--alpha 0.0] [--stride {}] \\\n  \
         [--pitch-algorithm default|autocorr|nsdf] [--stream] [--chunk-size 4800] [--buffer-size 9600]",
        DEFAULT_K, DEFAULT_STRIDE
    );
    std::process::exit(2);
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if ["--input", "--target", "--output"]
        .iter()
        .any(|k| parse_arg(&args, k).is_none())
    {
        usage();
    }

    let input_path = required(&args, "--input")?;
    let target_path = required(&args, "--target")?;
    let output_path = required(&args, "--output")?;
    let model_dir = PathBuf::from(parse_arg(&args, "--model-dir").unwrap_or_else(|| "models".to_string()));
    let stride: usize = parse_or(&args, "--stride", DEFAULT_STRIDE)?;
    let streaming = args.iter().any(|a| a == "--stream");
    let chunk_size: usize = parse_or(&args, "--chunk-size", 4800)?;
    let buffer_size: usize = parse_or(&args, "--buffer-size", 9600)?;
    let params = ConvertParams {
        pitch_shift: parse_or(&args, "--pitch-shift", 0.0)?,
        k: parse_or(&args, "--k", DEFAULT_K)?,
        alpha: parse_or(&args, "--alpha", 0.0)?,
        pitch_algorithm: parse_or(&args, "--pitch-algorithm", PitchAlgorithm::Default)?,
    };
    if chunk_size == 0 {
        bail!("--chunk-size must be positive");
    }

    let mut pipeline = ConversionPipeline::load(&model_dir)
        .with_context(|| format!("failed to load models: {}", model_dir.display()))?;
    let sample_rate = pipeline.config().sample_rate;

    let source = read_mono(&input_path)
        .with_context(|| format!("failed to read input wav: {}", input_path.display()))?;
    let target = read_mono(&target_path)
        .with_context(|| format!("failed to read target wav: {}", target_path.display()))?;
    for (path, audio) in [(&input_path, &source), (&target_path, &target)] {
        if audio.sample_rate != sample_rate {
            bail!(
                "{} is {} Hz; the models expect {} Hz",
                path.display(),
                audio.sample_rate,
                sample_rate
            );
        }
    }

    let bank = pipeline.encode_target(Waveform::new(&target.samples, sample_rate), stride)?;
    log::info!("Style bank: {} frames", bank.len());

    let mut out = if streaming {
        let status = Arc::new(SharedStatus::new());
        pipeline = pipeline.with_status(Arc::clone(&status));
        let mut state = pipeline.init_buffer(buffer_size, Device::Cpu)?;
        let mut out = Vec::with_capacity(source.samples.len());
        for chunk in source.samples.chunks(chunk_size) {
            let (y, next) = pipeline.convert_rt(Waveform::new(chunk, sample_rate), &state, &bank, &params)?;
            out.extend_from_slice(&y);
            state = next;
        }
        log::info!(
            "Streamed {} chunks, {} overruns, last chunk {:.2} ms",
            status.chunk_count.load(std::sync::atomic::Ordering::Relaxed),
            status.overrun_count.load(std::sync::atomic::Ordering::Relaxed),
            status.inference_ms.load(std::sync::atomic::Ordering::Relaxed)
        );
        out
    } else {
        pipeline.convert(Waveform::new(&source.samples, sample_rate), &bank, &params)?
    };

    let norm_scale = normalize_peak(&mut out, 0.95);
    write_mono_16(&output_path, &out, sample_rate)?;
    println!(
        "done: {} ({} samples @{} Hz, norm_scale={:.4}, shift={:+.1}, k={}, alpha={:.2}, f0={}, mode={})",
        output_path.display(),
        out.len(),
        sample_rate,
        norm_scale,
        params.pitch_shift,
        params.k,
        params.alpha,
        params.pitch_algorithm,
        if streaming { "stream" } else { "offline" }
    );
    Ok(())
}
