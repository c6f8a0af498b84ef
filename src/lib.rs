//! # denoise-rt
//!
//! Streaming single-channel speech enhancement with a recurrent spectral
//! mask estimator.
//!
//! Noisy audio is analyzed into windowed spectral frames, a stacked-GRU
//! network predicts a per-frequency-bin suppression gain from log-power
//! features, the gains are shaped against a suppression floor, and cleaned
//! audio is reconstructed by masked overlap-add synthesis.
//!
//! ## Quick Start
//!
//! Use [`DenoiseStream`] for the simplest API - it handles buffering
//! internally:
//!
//! ```
//! use denoise_rt::{Config, DenoiseStream, GainTuning, ModelKind, ModelWeights};
//!
//! let config = Config::default();
//! let weights = ModelWeights::zeroed(config.io_size, &config.hidden_sizes);
//! let tuning = GainTuning::clamped(config.min_gain_db, config.naturalness);
//! let mut stream = DenoiseStream::new(config, ModelKind::Gru3, weights, tuning)?;
//!
//! // Process any length of audio (16 kHz mono f32).
//! let noisy = vec![0.0f32; 4000];
//! let mut enhanced = stream.process(&noisy)?;
//! enhanced.extend(stream.flush()?);
//! # Ok::<(), denoise_rt::DenoiseError>(())
//! ```
//!
//! ## API Levels
//!
//! - [`DenoiseStream`] - High-level streaming API. Pass any length of
//!   samples, get enhanced audio back.
//! - [`DenoiseProcessor`] - Low-level frame API for integration with audio
//!   callbacks. You manage hop-sized frames yourself.
//!
//! The component layer ([`FrameAnalyzer`], [`MaskEstimator`],
//! [`FrameSynthesizer`], the [`gain`] shaping functions) is public for
//! custom pipelines and for parity testing against reference runtimes.
//!
//! ## Audio Requirements
//!
//! - **Sample rate**: 16 kHz mono f32 in `[-1.0, 1.0]`. 8 kHz input can be
//!   doubled with [`resample::Upsampler2x`]; other rates are rejected.
//!
//! ## Streaming semantics
//!
//! The pipeline is strictly sequential within one stream: frame `k+1`'s
//! recurrent step depends on frame `k`'s hidden state. Running the
//! estimator frame by frame with threaded state is numerically equivalent
//! to one batched call over the whole sequence from zero initial state
//! ([`MaskEstimator::forward`]), which keeps streaming and offline
//! inference consistent.
//!
//! ## Logging
//!
//! This crate uses the `log` facade. Configure a logger in the host
//! application to see construction info and parameter-clamping warnings.
//!
//! ## Thread Safety
//!
//! Each processor instance is independent and `Send`. Create separate
//! instances (each owning its own [`HiddenState`]) for parallel streams -
//! they share no state.

use num_complex::Complex32;

pub mod error;
pub mod features;
pub mod gain;
pub mod gru;
pub mod resample;
pub mod stft;
pub mod tanh_table;

pub use error::{DenoiseError, Result};
pub use gain::GainTuning;
pub use gru::{HiddenState, MaskEstimator, ModelKind, ModelWeights};
pub use stft::{FrameAnalyzer, FrameSynthesizer, SpectralFrame};
pub use tanh_table::TanhTable;

/// Nominal pipeline sample rate in Hz.
pub const SAMPLE_RATE: usize = 16000;

/// Pipeline configuration, loaded once per stream from the model
/// description and validated at construction.
#[derive(Debug, Clone)]
pub struct Config {
    /// FFT size in samples.
    pub n_fft: usize,
    /// Sample advance between consecutive frames. Must be smaller than
    /// `n_fft`.
    pub hop_length: usize,
    /// Additive floor inside the log-power feature; strictly positive.
    pub logmag_epsilon: f32,
    /// Network input/output width in frequency bins; at most `n_fft/2 + 1`.
    pub io_size: usize,
    /// Per-layer recurrent hidden sizes (2 or 3 layers).
    pub hidden_sizes: Vec<usize>,
    /// Default suppression floor in dB, `[-60, 0]`.
    pub min_gain_db: f32,
    /// Default naturalness blend, `[0, 1]`.
    pub naturalness: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            n_fft: 320,
            hop_length: 160,
            logmag_epsilon: 1e-3,
            io_size: 161,
            hidden_sizes: vec![512, 512, 512],
            min_gain_db: -30.0,
            naturalness: 0.5,
        }
    }
}

impl Config {
    /// Number of frequency bins per spectral frame: `n_fft/2 + 1`.
    pub fn num_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Check framing and model parameters for consistency.
    pub fn validate(&self) -> Result<()> {
        if self.n_fft == 0 {
            return Err(DenoiseError::InvalidConfig("n_fft must be positive".into()));
        }
        if self.hop_length == 0 || self.hop_length >= self.n_fft {
            return Err(DenoiseError::InvalidConfig(format!(
                "hop_length {} must be in 1..n_fft ({})",
                self.hop_length, self.n_fft
            )));
        }
        if self.io_size == 0 || self.io_size > self.num_bins() {
            return Err(DenoiseError::InvalidConfig(format!(
                "io_size {} must be in 1..=n_fft/2+1 ({})",
                self.io_size,
                self.num_bins()
            )));
        }
        if !(self.logmag_epsilon > 0.0) {
            return Err(DenoiseError::InvalidConfig(
                "logmag_epsilon must be strictly positive".into(),
            ));
        }
        if !(2..=3).contains(&self.hidden_sizes.len()) {
            return Err(DenoiseError::InvalidConfig(format!(
                "expected 2 or 3 recurrent layers, got {}",
                self.hidden_sizes.len()
            )));
        }
        if self.hidden_sizes.iter().any(|&h| h == 0) {
            return Err(DenoiseError::InvalidConfig(
                "hidden sizes must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Low-level frame-by-frame enhancement pipeline.
///
/// Owns the analyzer, the mask estimator with its per-stream
/// [`HiddenState`], the gain shaping parameters and the synthesizer, plus
/// pre-allocated work buffers: [`process_frame`](Self::process_frame)
/// performs zero heap allocations.
pub struct DenoiseProcessor {
    config: Config,
    analyzer: FrameAnalyzer,
    synthesizer: FrameSynthesizer,
    estimator: MaskEstimator,
    tuning: GainTuning,
    state: HiddenState,
    frames_processed: u64,
    // Per-frame work buffers.
    spectrum: Vec<Complex32>,
    magnitude: Vec<f32>,
    phase: Vec<Complex32>,
    feature_buf: Vec<f32>,
    gain_buf: Vec<f32>,
    masked: Vec<Complex32>,
}

impl DenoiseProcessor {
    /// Build the full pipeline. Structural problems (inconsistent framing,
    /// non-reconstructing window/hop pair, weight shape mismatches) fail
    /// here; no partial pipeline is returned.
    pub fn new(
        config: Config,
        kind: ModelKind,
        weights: ModelWeights,
        tuning: GainTuning,
    ) -> Result<Self> {
        config.validate()?;
        let analyzer = FrameAnalyzer::new(config.n_fft, config.hop_length)?;
        let synthesizer = FrameSynthesizer::new(config.n_fft, config.hop_length)?;
        let estimator = MaskEstimator::new(&config, kind, weights)?;
        let state = estimator.new_state();
        let num_bins = config.num_bins();

        log::info!(
            "denoise pipeline: {} fft {} hop {} io {} ({} bins)",
            kind.tag(),
            config.n_fft,
            config.hop_length,
            config.io_size,
            num_bins
        );

        Ok(Self {
            spectrum: vec![Complex32::new(0.0, 0.0); num_bins],
            magnitude: vec![0.0; num_bins],
            phase: vec![Complex32::new(1.0, 0.0); num_bins],
            feature_buf: vec![0.0; config.io_size],
            gain_buf: vec![0.0; config.io_size],
            masked: vec![Complex32::new(0.0, 0.0); num_bins],
            config,
            analyzer,
            synthesizer,
            estimator,
            tuning,
            state,
            frames_processed: 0,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tuning(&self) -> &GainTuning {
        &self.tuning
    }

    /// Algorithmic latency of the streaming pipeline in samples:
    /// `n_fft - hop_length`.
    pub fn latency(&self) -> usize {
        self.config.n_fft - self.config.hop_length
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Enhance one hop of audio.
    ///
    /// - `input`: exactly `hop_length` samples
    /// - `output`: exactly `hop_length` samples
    ///
    /// Numeric problems in the input (NaN, infinities) are not repaired;
    /// they propagate to the caller rather than silently corrupting the
    /// stream state behind a substituted value.
    pub fn process_frame(&mut self, input: &[f32], output: &mut [f32]) -> Result<()> {
        debug_assert_eq!(input.len(), self.config.hop_length);
        debug_assert_eq!(output.len(), self.config.hop_length);

        self.analyzer.analyze_frame(input, &mut self.spectrum);
        stft::magnitude_phase(&self.spectrum, &mut self.magnitude, &mut self.phase);
        features::log_power(&self.magnitude, self.config.logmag_epsilon, &mut self.feature_buf);
        self.estimator
            .step(&self.feature_buf, &mut self.state, &mut self.gain_buf)?;
        gain::apply_gain_mask(
            &self.gain_buf,
            &self.tuning,
            &self.magnitude,
            &self.phase,
            &mut self.masked,
        );
        self.synthesizer.synthesize_frame(&self.masked, output);
        self.frames_processed += 1;
        Ok(())
    }

    /// Reset all stream state (analysis memory, overlap-add memory, hidden
    /// state) for re-use on a new stream.
    pub fn reset(&mut self) {
        self.analyzer.reset();
        self.synthesizer.reset();
        self.state.reset();
        self.frames_processed = 0;
    }
}

/// High-level streaming API with automatic buffering.
///
/// Pass any length of audio, get enhanced audio back; frame alignment is
/// handled internally. Call [`flush`](Self::flush) at end of stream for the
/// remaining buffered samples.
pub struct DenoiseStream {
    processor: DenoiseProcessor,
    input_buffer: Vec<f32>,
}

impl DenoiseStream {
    pub fn new(
        config: Config,
        kind: ModelKind,
        weights: ModelWeights,
        tuning: GainTuning,
    ) -> Result<Self> {
        let hop = config.hop_length;
        Ok(Self {
            processor: DenoiseProcessor::new(config, kind, weights, tuning)?,
            input_buffer: Vec::with_capacity(hop * 2),
        })
    }

    /// Process audio samples at [`SAMPLE_RATE`], any length. Output may be
    /// shorter than input due to internal buffering.
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        self.input_buffer.extend_from_slice(input);
        let hop = self.processor.config.hop_length;
        let mut output = Vec::new();

        while self.input_buffer.len() >= hop {
            let frame_in: Vec<f32> = self.input_buffer.drain(..hop).collect();
            let mut frame_out = vec![0.0f32; hop];
            self.processor.process_frame(&frame_in, &mut frame_out)?;
            output.extend_from_slice(&frame_out);
        }
        Ok(output)
    }

    /// Flush the final partial frame (zero-padded) and return its valid
    /// prefix. Call at end of stream.
    pub fn flush(&mut self) -> Result<Vec<f32>> {
        if self.input_buffer.is_empty() {
            return Ok(Vec::new());
        }
        let hop = self.processor.config.hop_length;
        let valid_len = self.input_buffer.len();
        self.input_buffer.resize(hop, 0.0);
        let frame_in: Vec<f32> = self.input_buffer.drain(..).collect();
        let mut frame_out = vec![0.0f32; hop];
        self.processor.process_frame(&frame_in, &mut frame_out)?;
        Ok(frame_out[..valid_len].to_vec())
    }

    /// Reset processor state and clear buffers between streams.
    pub fn reset(&mut self) {
        self.processor.reset();
        self.input_buffer.clear();
    }

    pub fn sample_rate(&self) -> usize {
        SAMPLE_RATE
    }

    /// Algorithmic latency in milliseconds.
    pub fn latency_ms(&self) -> f32 {
        self.processor.latency() as f32 / SAMPLE_RATE as f32 * 1000.0
    }

    /// Access the underlying processor for advanced use.
    pub fn processor_mut(&mut self) -> &mut DenoiseProcessor {
        &mut self.processor
    }
}

// Compile-time check that independent streams can move across threads.
fn _assert_send<T: Send>() {}
fn _assert_pipeline_is_send() {
    _assert_send::<DenoiseProcessor>();
    _assert_send::<DenoiseStream>();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> Config {
        Config {
            n_fft: 64,
            hop_length: 32,
            io_size: 16,
            hidden_sizes: vec![8, 8, 8],
            ..Config::default()
        }
    }

    fn build(config: Config) -> Result<DenoiseProcessor> {
        let weights = ModelWeights::zeroed(config.io_size, &config.hidden_sizes);
        let tuning = GainTuning::clamped(config.min_gain_db, config.naturalness);
        DenoiseProcessor::new(config, ModelKind::Gru3, weights, tuning)
    }

    #[test]
    fn hop_not_smaller_than_fft_is_rejected() {
        let config = Config {
            hop_length: 320,
            ..Config::default()
        };
        assert!(matches!(build(config), Err(DenoiseError::InvalidConfig(_))));
    }

    #[test]
    fn io_size_beyond_bins_is_rejected() {
        let config = Config {
            io_size: 162, // n_fft/2 + 1 = 161
            ..Config::default()
        };
        assert!(matches!(build(config), Err(DenoiseError::InvalidConfig(_))));
    }

    #[test]
    fn zero_epsilon_is_rejected() {
        let config = Config {
            logmag_epsilon: 0.0,
            ..Config::default()
        };
        assert!(matches!(build(config), Err(DenoiseError::InvalidConfig(_))));
    }

    #[test]
    fn non_reconstructing_hop_is_rejected() {
        let config = Config {
            n_fft: 320,
            hop_length: 150,
            ..Config::default()
        };
        assert!(matches!(
            build(config),
            Err(DenoiseError::InvalidWindowConfig(_))
        ));
    }

    #[test]
    fn latency_is_overlap_length() {
        let p = build(small_config()).unwrap();
        assert_eq!(p.latency(), 32);
    }

    #[test]
    fn stream_preserves_length_and_stays_finite() {
        let config = small_config();
        let weights = ModelWeights::zeroed(config.io_size, &config.hidden_sizes);
        let tuning = GainTuning::clamped(config.min_gain_db, config.naturalness);
        let mut stream = DenoiseStream::new(config, ModelKind::Gru3, weights, tuning).unwrap();

        let noisy: Vec<f32> = (0..500).map(|i| (0.11 * i as f32).sin() * 0.4).collect();
        let mut out = stream.process(&noisy).unwrap();
        out.extend(stream.flush().unwrap());
        assert_eq!(out.len(), noisy.len());
        assert!(out.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn reset_restores_the_initial_stream_state() {
        let mut p = build(small_config()).unwrap();
        let input: Vec<f32> = (0..32).map(|i| (0.2 * i as f32).cos() * 0.3).collect();
        let mut first = vec![0.0f32; 32];
        p.process_frame(&input, &mut first).unwrap();
        assert_eq!(p.frames_processed(), 1);

        let mut second = vec![0.0f32; 32];
        p.process_frame(&input, &mut second).unwrap();

        p.reset();
        assert_eq!(p.frames_processed(), 0);
        let mut again = vec![0.0f32; 32];
        p.process_frame(&input, &mut again).unwrap();
        assert_eq!(first, again);
    }
}
