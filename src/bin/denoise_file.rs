//! Process a WAV file through the enhancement pipeline.
//!
//! Usage: denoise_file <input.wav> <output.wav> [min_gain_db] [naturalness]
//!
//! Accepts 16 kHz input directly and 8 kHz input via the 2x resampler;
//! other rates are rejected. This driver runs the pipeline with placeholder
//! (zeroed) weights - supply trained tensors through the library API.

use denoise_rt::{resample, Config, DenoiseStream, GainTuning, ModelKind, ModelWeights, SAMPLE_RATE};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!(
            "Usage: {} <input.wav> <output.wav> [min_gain_db] [naturalness]",
            args[0]
        );
        std::process::exit(1);
    }
    let input_path = &args[1];
    let output_path = &args[2];
    let min_gain_db: f32 = args.get(3).map(|s| s.parse()).transpose()?.unwrap_or(-30.0);
    let naturalness: f32 = args.get(4).map(|s| s.parse()).transpose()?.unwrap_or(0.5);

    let mut reader = hound::WavReader::open(input_path)?;
    let spec = reader.spec();
    println!(
        "Input: {} Hz, {} channels, {:?}",
        spec.sample_rate, spec.channels, spec.sample_format
    );
    resample::ensure_supported(spec.sample_rate)?;

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().map(|s| s.unwrap()).collect(),
        hound::SampleFormat::Int => match spec.bits_per_sample {
            16 => reader
                .samples::<i16>()
                .map(|s| s.unwrap() as f32 / 32768.0)
                .collect(),
            24 | 32 => reader
                .samples::<i32>()
                .map(|s| s.unwrap() as f32 / 2147483648.0)
                .collect(),
            other => {
                eprintln!("Unsupported bits per sample: {}", other);
                std::process::exit(1);
            }
        },
    };

    // Mix down to mono if needed.
    let mono: Vec<f32> = if spec.channels == 1 {
        samples
    } else {
        samples
            .chunks(spec.channels as usize)
            .map(|c| c.iter().sum::<f32>() / c.len() as f32)
            .collect()
    };

    // Bring 8 kHz input up to the pipeline rate.
    let narrowband = spec.sample_rate == 8000;
    let pipeline_input = if narrowband {
        let mut up = resample::Upsampler2x::new();
        let mut wide = Vec::new();
        up.process(&mono, &mut wide);
        wide
    } else {
        mono
    };

    let config = Config::default();
    let weights = ModelWeights::zeroed(config.io_size, &config.hidden_sizes);
    let tuning = GainTuning::clamped(min_gain_db, naturalness);
    let mut stream = DenoiseStream::new(config, ModelKind::Gru3, weights, tuning)?;
    println!(
        "Processing {} samples ({:.2}s, latency {:.1} ms)...",
        pipeline_input.len(),
        pipeline_input.len() as f32 / SAMPLE_RATE as f32,
        stream.latency_ms()
    );

    let start = std::time::Instant::now();
    let mut enhanced = stream.process(&pipeline_input)?;
    enhanced.extend(stream.flush()?);
    let elapsed = start.elapsed();
    let rtf = elapsed.as_secs_f32() / (pipeline_input.len() as f32 / SAMPLE_RATE as f32);
    println!("Done in {:.2}s (RTF: {:.3}x realtime)", elapsed.as_secs_f32(), rtf);

    let output = if narrowband {
        resample::downsample_2x(&enhanced)
    } else {
        enhanced
    };

    let out_spec = hound::WavSpec {
        channels: 1,
        sample_rate: spec.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(output_path, out_spec)?;
    for sample in &output {
        writer.write_sample((sample.clamp(-1.0, 1.0) * 32767.0) as i16)?;
    }
    writer.finalize()?;
    println!("Saved to {}", output_path);
    Ok(())
}
