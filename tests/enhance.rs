//! End-to-end pipeline properties: reconstruction through the full chain,
//! streaming/batched equivalence, and fixed-point activation parity.

use denoise_rt::tanh_table::{disagreements, TanhTable, DEFAULT_DELTA_X, DEFAULT_MAX_X};
use denoise_rt::{
    Config, DenoiseProcessor, DenoiseStream, GainTuning, MaskEstimator, ModelKind, ModelWeights,
};

/// Deterministic pseudo-random source so tests are reproducible without a
/// randomness dependency.
struct Lcg(u64);

impl Lcg {
    fn next_f32(&mut self) -> f32 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((self.0 >> 33) as f32 / (1u64 << 31) as f32) - 1.0
    }

    fn fill(&mut self, buf: &mut [f32], scale: f32) {
        for x in buf.iter_mut() {
            *x = self.next_f32() * scale;
        }
    }
}

fn random_weights(io_size: usize, hidden_sizes: &[usize], seed: u64) -> ModelWeights {
    let mut rng = Lcg(seed);
    let mut weights = ModelWeights::zeroed(io_size, hidden_sizes);
    for layer in &mut weights.gru {
        rng.fill(&mut layer.w_ih, 0.4);
        rng.fill(&mut layer.w_hh, 0.4);
        rng.fill(&mut layer.b_ih, 0.1);
        rng.fill(&mut layer.b_hh, 0.1);
    }
    rng.fill(&mut weights.linear.weight, 0.4);
    rng.fill(&mut weights.linear.bias, 0.1);
    weights
}

#[test]
fn streaming_equals_batched_inference() {
    let config = Config {
        n_fft: 64,
        hop_length: 32,
        io_size: 12,
        hidden_sizes: vec![10, 9, 8],
        ..Config::default()
    };
    let weights = random_weights(config.io_size, &config.hidden_sizes, 7);
    let mut est = MaskEstimator::new(&config, ModelKind::Gru3, weights).unwrap();

    let mut rng = Lcg(11);
    let frames: Vec<Vec<f32>> = (0..40)
        .map(|_| {
            let mut f = vec![0.0f32; 12];
            rng.fill(&mut f, 3.0);
            f
        })
        .collect();

    // Frame by frame with threaded state.
    let mut state = est.new_state();
    let mut streamed = Vec::new();
    for frame in &frames {
        let mut gains = vec![0.0f32; 12];
        est.step(frame, &mut state, &mut gains).unwrap();
        streamed.push(gains);
    }

    // One batched call from zero initial state.
    let batched = est.forward(&frames).unwrap();

    for (s, b) in streamed.iter().zip(batched.iter()) {
        for (&x, &y) in s.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-4, "streaming {} vs batched {}", x, y);
        }
    }
}

#[test]
fn unit_gain_pipeline_reconstructs_the_input() {
    // A depth-2 model with zero recurrent weights and a unit dense bias
    // emits a gain of exactly 1.0 for every bin (no output nonlinearity),
    // turning the pipeline into analysis + synthesis.
    let config = Config {
        n_fft: 128,
        hop_length: 64,
        io_size: 65, // all bins masked by the network
        hidden_sizes: vec![8, 8],
        ..Config::default()
    };
    let mut weights = ModelWeights::zeroed(config.io_size, &config.hidden_sizes);
    weights.linear.bias.fill(1.0);
    let tuning = GainTuning::new(-30.0, 0.5).unwrap();
    let mut processor =
        DenoiseProcessor::new(config, ModelKind::Gru2, weights, tuning).unwrap();

    let hop = 64;
    let latency = processor.latency();
    let signal: Vec<f32> = (0..hop * 50)
        .map(|i| {
            let t = i as f32 / 16000.0;
            0.4 * (2.0 * std::f32::consts::PI * 350.0 * t).sin()
                + 0.2 * (2.0 * std::f32::consts::PI * 1100.0 * t).cos()
        })
        .collect();

    let mut output = Vec::new();
    let mut frame_out = vec![0.0f32; hop];
    for chunk in signal.chunks_exact(hop) {
        processor.process_frame(chunk, &mut frame_out).unwrap();
        output.extend_from_slice(&frame_out);
    }

    // Skip the start-up transient; output trails the input by the overlap.
    let mut max_err = 0.0f32;
    for i in 2 * latency..output.len() {
        max_err = max_err.max((output[i] - signal[i - latency]).abs());
    }
    assert!(max_err < 1e-5, "reconstruction error {}", max_err);
}

#[test]
fn both_model_depths_run_end_to_end() {
    for (kind, hidden) in [
        (ModelKind::Gru2, vec![16, 16]),
        (ModelKind::Gru3, vec![16, 12, 8]),
    ] {
        let config = Config {
            n_fft: 64,
            hop_length: 32,
            io_size: 20,
            hidden_sizes: hidden,
            ..Config::default()
        };
        let weights = random_weights(config.io_size, &config.hidden_sizes, 23);
        let tuning = GainTuning::clamped(config.min_gain_db, config.naturalness);
        let mut stream = DenoiseStream::new(config, kind, weights, tuning).unwrap();

        let mut rng = Lcg(99);
        let mut noisy = vec![0.0f32; 777];
        rng.fill(&mut noisy, 0.5);

        let mut out = stream.process(&noisy).unwrap();
        out.extend(stream.flush().unwrap());
        assert_eq!(out.len(), noisy.len());
        assert!(
            out.iter().all(|x| x.is_finite()),
            "{:?} produced non-finite output",
            kind
        );
    }
}

#[test]
fn fixed_point_activation_matches_float_reference() {
    // Pre-activation tensor from a fixed seed, zero-state scenario; the Q15
    // datapath must agree with the float reference within 1e-3 on all but a
    // handful of elements.
    let table = TanhTable::generate(DEFAULT_MAX_X, DEFAULT_DELTA_X).unwrap();
    let mut rng = Lcg(42);
    let mut pre_activations = vec![0.0f32; 1024];
    rng.fill(&mut pre_activations, 6.0);

    let reference: Vec<f32> = pre_activations.iter().map(|&x| x.tanh()).collect();
    let fixed: Vec<f32> = pre_activations
        .iter()
        .map(|&x| {
            let x_q15 = (x * 32768.0).round() as i32;
            table.tanh_q15(x_q15) as f32 / 32768.0
        })
        .collect();

    let n = disagreements(&reference, &fixed, 1e-3);
    assert!(n < 8, "{} of {} elements disagree", n, reference.len());

    // Literal spot check from the acceptance scenario.
    assert!((table.approximate(0.05) - 0.0499583).abs() < 1e-3);
}
