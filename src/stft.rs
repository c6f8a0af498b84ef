//! Frame analysis and synthesis: windowed STFT/ISTFT with overlap-add.
//!
//! Analysis and synthesis share one square-root Hann window, chosen so that
//! the squared overlap-add of the window pair sums to a constant over full
//! hops. The constant is measured at construction and folded into the
//! synthesis scale, so a validated window/hop pair reconstructs to unity.
//! Pairs that break the constant-overlap-add constraint are rejected with
//! [`DenoiseError::InvalidWindowConfig`] instead of producing amplitude
//! modulation artifacts.
//!
//! All buffers are pre-allocated at construction time; the per-frame calls
//! perform zero heap allocations.

use num_complex::Complex32;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use std::sync::Arc;

use crate::error::{DenoiseError, Result};

/// Relative flatness tolerance for the overlap-add constant.
const COLA_TOLERANCE: f64 = 1e-3;

/// Periodic square-root Hann window: `sqrt(0.5 - 0.5*cos(2*pi*n/N))`.
pub fn sqrt_hann_window(size: usize) -> Vec<f32> {
    let two_pi_by_n = 2.0 * std::f64::consts::PI / size as f64;
    (0..size)
        .map(|n| (0.5 - 0.5 * (two_pi_by_n * n as f64).cos()).sqrt() as f32)
        .collect()
}

/// Measure the squared overlap-add sum of `window` at the given hop.
///
/// In the fully-overlapped region, sample position `p` accumulates
/// `w^2[j]` over every window index `j` congruent to `p` modulo `hop`.
/// Returns the constant, or `InvalidWindowConfig` if the sum is not flat.
fn overlap_add_gain(window: &[f32], hop: usize) -> Result<f32> {
    let mut sums = vec![0.0f64; hop];
    for (j, &w) in window.iter().enumerate() {
        sums[j % hop] += w as f64 * w as f64;
    }
    let mean = sums.iter().sum::<f64>() / hop as f64;
    let max_dev = sums
        .iter()
        .map(|s| (s - mean).abs())
        .fold(0.0f64, f64::max);
    if mean <= 0.0 || max_dev / mean > COLA_TOLERANCE {
        return Err(DenoiseError::InvalidWindowConfig(format!(
            "window/hop pair is not constant-overlap-add (hop {}, fft {}, deviation {:.2e})",
            hop,
            window.len(),
            max_dev / mean.max(f64::MIN_POSITIVE),
        )));
    }
    Ok(mean as f32)
}

fn check_framing(n_fft: usize, hop_length: usize) -> Result<()> {
    if n_fft == 0 {
        return Err(DenoiseError::InvalidConfig("n_fft must be positive".into()));
    }
    if hop_length == 0 {
        return Err(DenoiseError::InvalidConfig(
            "hop_length must be positive".into(),
        ));
    }
    if hop_length >= n_fft {
        return Err(DenoiseError::InvalidConfig(format!(
            "hop_length {} must be smaller than n_fft {}",
            hop_length, n_fft
        )));
    }
    Ok(())
}

/// One analyzed frame: per-bin magnitude and unit-modulus phase.
#[derive(Debug, Clone)]
pub struct SpectralFrame {
    /// Non-negative magnitude per frequency bin, length `n_fft/2 + 1`.
    pub magnitude: Vec<f32>,
    /// Unit-modulus phase per bin (bins with zero magnitude get `1 + 0i`).
    pub phase: Vec<Complex32>,
}

impl SpectralFrame {
    fn from_spectrum(spectrum: &[Complex32]) -> Self {
        let mut magnitude = vec![0.0f32; spectrum.len()];
        let mut phase = vec![Complex32::new(1.0, 0.0); spectrum.len()];
        magnitude_phase(spectrum, &mut magnitude, &mut phase);
        Self { magnitude, phase }
    }
}

/// Decompose a complex spectrum into magnitude and unit-modulus phase.
pub fn magnitude_phase(spectrum: &[Complex32], magnitude: &mut [f32], phase: &mut [Complex32]) {
    debug_assert_eq!(spectrum.len(), magnitude.len());
    debug_assert_eq!(spectrum.len(), phase.len());
    for ((x, m), p) in spectrum.iter().zip(magnitude.iter_mut()).zip(phase.iter_mut()) {
        let mag = x.norm();
        *m = mag;
        *p = if mag > 0.0 {
            Complex32::new(x.re / mag, x.im / mag)
        } else {
            Complex32::new(1.0, 0.0)
        };
    }
}

/// Windowed STFT analyzer.
///
/// Two operation modes share one window and FFT plan:
///
/// - [`frames`](Self::frames): lazy offline analysis of a whole signal,
///   one frame per hop-aligned offset, no centering or edge padding; the
///   trailing partial frame is dropped.
/// - [`analyze_frame`](Self::analyze_frame): streaming analysis of
///   hop-sized chunks through an `n_fft`-sample sliding buffer. The buffer
///   starts zeroed, so the stream carries `n_fft - hop` samples of
///   algorithmic latency relative to the offline framing.
pub struct FrameAnalyzer {
    n_fft: usize,
    hop_length: usize,
    num_bins: usize,
    window: Vec<f32>,
    /// Sliding input buffer for streaming mode (`n_fft` samples).
    input_mem: Vec<f32>,
    /// Windowed FFT input.
    fft_buf: Vec<f32>,
    fft_scratch: Vec<Complex32>,
    fft_forward: Arc<dyn RealToComplex<f32>>,
}

impl FrameAnalyzer {
    pub fn new(n_fft: usize, hop_length: usize) -> Result<Self> {
        check_framing(n_fft, hop_length)?;
        let window = sqrt_hann_window(n_fft);
        overlap_add_gain(&window, hop_length)?;

        let mut planner = RealFftPlanner::<f32>::new();
        let fft_forward = planner.plan_fft_forward(n_fft);
        let fft_scratch = fft_forward.make_scratch_vec();

        Ok(Self {
            n_fft,
            hop_length,
            num_bins: n_fft / 2 + 1,
            window,
            input_mem: vec![0.0; n_fft],
            fft_buf: vec![0.0; n_fft],
            fft_scratch,
            fft_forward,
        })
    }

    pub fn n_fft(&self) -> usize {
        self.n_fft
    }

    pub fn hop_length(&self) -> usize {
        self.hop_length
    }

    /// Number of frequency bins: `n_fft/2 + 1`.
    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    /// Analyze one hop of streaming input.
    ///
    /// - `input`: exactly `hop_length` time-domain samples
    /// - `output`: exactly `num_bins` complex frequency bins
    ///
    /// Zero heap allocations per call.
    pub fn analyze_frame(&mut self, input: &[f32], output: &mut [Complex32]) {
        debug_assert_eq!(input.len(), self.hop_length);
        debug_assert_eq!(output.len(), self.num_bins);

        // Slide the input buffer by one hop and append the new samples.
        self.input_mem.copy_within(self.hop_length.., 0);
        let tail = self.n_fft - self.hop_length;
        self.input_mem[tail..].copy_from_slice(input);

        for ((&x, &w), buf) in self
            .input_mem
            .iter()
            .zip(self.window.iter())
            .zip(self.fft_buf.iter_mut())
        {
            *buf = x * w;
        }

        self.fft_forward
            .process_with_scratch(&mut self.fft_buf, output, &mut self.fft_scratch)
            .expect("FFT forward failed");
    }

    /// Lazily analyze a whole signal: one [`SpectralFrame`] per hop-aligned
    /// frame `k*hop .. k*hop + n_fft`. The last partial frame is dropped.
    /// Does not touch the streaming buffer.
    pub fn frames<'a>(&'a mut self, signal: &'a [f32]) -> Frames<'a> {
        Frames {
            analyzer: self,
            signal,
            offset: 0,
        }
    }

    /// Reset the streaming input buffer.
    pub fn reset(&mut self) {
        self.input_mem.fill(0.0);
    }
}

/// Lazy, finite iterator over the hop-aligned frames of one signal.
pub struct Frames<'a> {
    analyzer: &'a mut FrameAnalyzer,
    signal: &'a [f32],
    offset: usize,
}

impl Iterator for Frames<'_> {
    type Item = SpectralFrame;

    fn next(&mut self) -> Option<SpectralFrame> {
        let a = &mut *self.analyzer;
        if self.offset + a.n_fft > self.signal.len() {
            return None;
        }
        let frame = &self.signal[self.offset..self.offset + a.n_fft];
        for ((&x, &w), buf) in frame.iter().zip(a.window.iter()).zip(a.fft_buf.iter_mut()) {
            *buf = x * w;
        }
        let mut spectrum = vec![Complex32::new(0.0, 0.0); a.num_bins];
        a.fft_forward
            .process_with_scratch(&mut a.fft_buf, &mut spectrum, &mut a.fft_scratch)
            .expect("FFT forward failed");
        self.offset += a.hop_length;
        Some(SpectralFrame::from_spectrum(&spectrum))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.signal.len().saturating_sub(self.offset);
        let n = if remaining >= self.analyzer.n_fft {
            (remaining - self.analyzer.n_fft) / self.analyzer.hop_length + 1
        } else {
            0
        };
        (n, Some(n))
    }
}

/// Windowed ISTFT synthesizer with overlap-add.
///
/// The inverse transform of [`FrameAnalyzer`]: applies the same window,
/// overlap-adds at the hop length with no edge padding, so frame boundaries
/// align exactly with the analyzer's framing.
pub struct FrameSynthesizer {
    n_fft: usize,
    hop_length: usize,
    num_bins: usize,
    window: Vec<f32>,
    /// Combined inverse-FFT and overlap-add normalization.
    scale: f32,
    /// Overlap-add accumulator (`n_fft` samples).
    ola_mem: Vec<f32>,
    spec_buf: Vec<Complex32>,
    ifft_buf: Vec<f32>,
    ifft_scratch: Vec<Complex32>,
    fft_inverse: Arc<dyn ComplexToReal<f32>>,
}

impl FrameSynthesizer {
    pub fn new(n_fft: usize, hop_length: usize) -> Result<Self> {
        check_framing(n_fft, hop_length)?;
        let window = sqrt_hann_window(n_fft);
        let cola_gain = overlap_add_gain(&window, hop_length)?;

        let mut planner = RealFftPlanner::<f32>::new();
        let fft_inverse = planner.plan_fft_inverse(n_fft);
        let ifft_scratch = fft_inverse.make_scratch_vec();
        let ifft_buf = fft_inverse.make_output_vec();

        Ok(Self {
            n_fft,
            hop_length,
            num_bins: n_fft / 2 + 1,
            window,
            scale: 1.0 / (n_fft as f32 * cola_gain),
            ola_mem: vec![0.0; n_fft],
            spec_buf: vec![Complex32::new(0.0, 0.0); n_fft / 2 + 1],
            ifft_buf,
            ifft_scratch,
            fft_inverse,
        })
    }

    pub fn hop_length(&self) -> usize {
        self.hop_length
    }

    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    /// Synthesize one hop of output from a masked spectrum.
    ///
    /// - `spectrum`: exactly `num_bins` complex frequency bins
    /// - `output`: exactly `hop_length` time-domain samples
    ///
    /// Zero heap allocations per call.
    pub fn synthesize_frame(&mut self, spectrum: &[Complex32], output: &mut [f32]) {
        debug_assert_eq!(spectrum.len(), self.num_bins);
        debug_assert_eq!(output.len(), self.hop_length);

        self.spec_buf.copy_from_slice(spectrum);
        let _ = self.fft_inverse.process_with_scratch(
            &mut self.spec_buf,
            &mut self.ifft_buf,
            &mut self.ifft_scratch,
        );

        // Slide the accumulator by one hop, then add the windowed frame.
        self.ola_mem.copy_within(self.hop_length.., 0);
        let tail = self.n_fft - self.hop_length;
        self.ola_mem[tail..].fill(0.0);
        for ((acc, &x), &w) in self
            .ola_mem
            .iter_mut()
            .zip(self.ifft_buf.iter())
            .zip(self.window.iter())
        {
            *acc += x * w * self.scale;
        }

        output.copy_from_slice(&self.ola_mem[..self.hop_length]);
    }

    /// Synthesize a whole frame sequence with a unit mask applied, draining
    /// the overlap-add tail at the end.
    pub fn synthesize(&mut self, frames: impl IntoIterator<Item = SpectralFrame>) -> Vec<f32> {
        let mut out = Vec::new();
        let mut hop = vec![0.0f32; self.hop_length];
        let mut spectrum = vec![Complex32::new(0.0, 0.0); self.num_bins];
        for frame in frames {
            for ((s, &m), &p) in spectrum
                .iter_mut()
                .zip(frame.magnitude.iter())
                .zip(frame.phase.iter())
            {
                *s = p * m;
            }
            self.synthesize_frame(&spectrum, &mut hop);
            out.extend_from_slice(&hop);
        }
        out.extend_from_slice(&self.flush());
        out
    }

    /// Drain the `n_fft - hop` samples still held in the overlap-add
    /// accumulator. The tail is edge-attenuated by the window.
    pub fn flush(&mut self) -> Vec<f32> {
        let tail = self.ola_mem[self.hop_length..].to_vec();
        self.ola_mem.fill(0.0);
        tail
    }

    /// Reset the overlap-add accumulator.
    pub fn reset(&mut self) {
        self.ola_mem.fill(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_matches_hann_square() {
        let n = 256;
        let w = sqrt_hann_window(n);
        for (i, &wi) in w.iter().enumerate() {
            let hann = 0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / n as f32).cos();
            assert!((wi * wi - hann).abs() < 1e-5);
        }
    }

    #[test]
    fn cola_holds_for_half_and_quarter_hop() {
        let w = sqrt_hann_window(320);
        let g = overlap_add_gain(&w, 160).unwrap();
        assert!((g - 1.0).abs() < 1e-4, "half-overlap gain {}", g);
        let g = overlap_add_gain(&w, 80).unwrap();
        assert!((g - 2.0).abs() < 1e-4, "quarter-overlap gain {}", g);
    }

    #[test]
    fn cola_rejects_bad_hop() {
        let w = sqrt_hann_window(320);
        assert!(matches!(
            overlap_add_gain(&w, 150),
            Err(DenoiseError::InvalidWindowConfig(_))
        ));
    }

    #[test]
    fn analyzer_rejects_bad_framing() {
        assert!(matches!(
            FrameAnalyzer::new(256, 256),
            Err(DenoiseError::InvalidConfig(_))
        ));
        assert!(matches!(
            FrameAnalyzer::new(0, 128),
            Err(DenoiseError::InvalidConfig(_))
        ));
        assert!(matches!(
            FrameSynthesizer::new(256, 512),
            Err(DenoiseError::InvalidConfig(_))
        ));
    }

    #[test]
    fn offline_framing_drops_partial_frame() {
        let mut analyzer = FrameAnalyzer::new(256, 128).unwrap();
        let signal = vec![0.25f32; 256 + 128 + 100]; // two full frames plus a partial
        let frames: Vec<_> = analyzer.frames(&signal).collect();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].magnitude.len(), 129);
        assert_eq!(frames[0].phase.len(), 129);
    }

    #[test]
    fn phase_is_unit_modulus() {
        let mut analyzer = FrameAnalyzer::new(256, 128).unwrap();
        let signal: Vec<f32> = (0..1024)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 16000.0).sin())
            .collect();
        for frame in analyzer.frames(&signal) {
            for (&m, p) in frame.magnitude.iter().zip(frame.phase.iter()) {
                assert!(m >= 0.0);
                assert!((p.norm() - 1.0).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn unit_mask_reconstruction_identity() {
        let n_fft = 320;
        let hop = 160;
        let mut analyzer = FrameAnalyzer::new(n_fft, hop).unwrap();
        let mut synthesizer = FrameSynthesizer::new(n_fft, hop).unwrap();

        // Two tones plus a slow ramp, 16 kHz.
        let signal: Vec<f32> = (0..8000)
            .map(|i| {
                let t = i as f32 / 16000.0;
                0.4 * (2.0 * std::f32::consts::PI * 440.0 * t).sin()
                    + 0.2 * (2.0 * std::f32::consts::PI * 1330.0 * t).sin()
                    + 0.05 * (i % 100) as f32 / 100.0
            })
            .collect();

        let frames: Vec<_> = analyzer.frames(&signal).collect();
        let num_frames = frames.len();
        let output = synthesizer.synthesize(frames);

        // Interior region: every sample covered by a full set of windows.
        let start = n_fft - hop;
        let end = num_frames * hop - (n_fft - hop);
        let mut max_err = 0.0f32;
        for i in start..end {
            max_err = max_err.max((output[i] - signal[i]).abs());
        }
        assert!(max_err < 1e-5, "reconstruction error {}", max_err);
    }

    #[test]
    fn streaming_analysis_is_delayed_offline_analysis() {
        let n_fft = 256;
        let hop = 128;
        let mut streaming = FrameAnalyzer::new(n_fft, hop).unwrap();
        let mut offline = FrameAnalyzer::new(n_fft, hop).unwrap();

        let signal: Vec<f32> = (0..hop * 8)
            .map(|i| (0.3 * i as f32).sin() * 0.5)
            .collect();

        // Streaming over hop-sized chunks.
        let mut spectra = Vec::new();
        let mut spec = vec![Complex32::new(0.0, 0.0); n_fft / 2 + 1];
        for chunk in signal.chunks_exact(hop) {
            streaming.analyze_frame(chunk, &mut spec);
            spectra.push(SpectralFrame::from_spectrum(&spec));
        }

        // Offline over the zero-prefixed signal.
        let mut padded = vec![0.0f32; n_fft - hop];
        padded.extend_from_slice(&signal);
        let reference: Vec<_> = offline.frames(&padded).collect();

        assert_eq!(spectra.len(), reference.len());
        for (got, want) in spectra.iter().zip(reference.iter()) {
            for (&a, &b) in got.magnitude.iter().zip(want.magnitude.iter()) {
                assert!((a - b).abs() < 1e-4, "magnitude mismatch {} vs {}", a, b);
            }
        }
    }
}
