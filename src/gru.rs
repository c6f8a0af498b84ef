//! Recurrent mask estimation: stacked GRU layers with a dense projection.
//!
//! Implements the standard GRU equations in the PyTorch weight layout
//! (gate order reset/update/new within the stacked `3H` dimension):
//!
//! ```text
//! r = sigmoid(Wr*x + br_x + Ur*h + br_h)
//! z = sigmoid(Wz*x + bz_x + Uz*h + bz_h)
//! n = tanh(Wn*x + bn_x + r*(Un*h + bn_h))
//! h' = (1-z)*n + z*h
//! ```
//!
//! The estimator owns weights and scratch buffers only; the per-layer hidden
//! state lives in a [`HiddenState`] owned by the stream context and passed in
//! on every step. One frame through the stack performs zero heap allocations.
//!
//! Two stack depths exist, preserved as distinct behaviors: the depth-3 stack
//! clamps its dense projection with a sigmoid, the depth-2 stack emits the
//! raw pre-activation output.

use crate::error::{DenoiseError, Result};
use crate::Config;

/// Dense-projection output nonlinearity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Sigmoid,
    Tanh,
    Relu,
}

impl Activation {
    pub fn apply(self, x: f32) -> f32 {
        match self {
            Activation::Sigmoid => sigmoid(x),
            Activation::Tanh => x.tanh(),
            Activation::Relu => x.max(0.0),
        }
    }
}

/// Model architecture tag.
///
/// The registry maps each tag to its constructor; an unrecognized tag fails
/// with [`DenoiseError::UnknownModelType`] at configuration-load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    /// Two GRU layers, dense projection with no output nonlinearity
    /// (raw pre-activation gains).
    Gru2,
    /// Three GRU layers, dense projection clamped by a sigmoid.
    Gru3,
}

impl ModelKind {
    /// Resolve a model-type tag from a model description.
    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag {
            "gru2" => Ok(ModelKind::Gru2),
            "gru3" => Ok(ModelKind::Gru3),
            other => Err(DenoiseError::UnknownModelType(other.to_string())),
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            ModelKind::Gru2 => "gru2",
            ModelKind::Gru3 => "gru3",
        }
    }

    /// Number of recurrent layers.
    pub fn depth(self) -> usize {
        match self {
            ModelKind::Gru2 => 2,
            ModelKind::Gru3 => 3,
        }
    }

    /// Output nonlinearity of the dense projection. The depth-2 model has
    /// none; this asymmetry is intentional and must not be unified.
    pub fn output_activation(self) -> Option<Activation> {
        match self {
            ModelKind::Gru2 => None,
            ModelKind::Gru3 => Some(Activation::Sigmoid),
        }
    }
}

/// Weights for one GRU layer, PyTorch flat layout.
#[derive(Debug, Clone)]
pub struct GruWeights {
    /// `[3H, I]` row-major: `[Wr; Wz; Wn]`.
    pub w_ih: Vec<f32>,
    /// `[3H, H]` row-major: `[Ur; Uz; Un]`.
    pub w_hh: Vec<f32>,
    /// `[3H]`: `[br_x; bz_x; bn_x]`.
    pub b_ih: Vec<f32>,
    /// `[3H]`: `[br_h; bz_h; bn_h]`.
    pub b_hh: Vec<f32>,
}

impl GruWeights {
    pub fn zeroed(input_size: usize, hidden_size: usize) -> Self {
        let gates = 3 * hidden_size;
        Self {
            w_ih: vec![0.0; gates * input_size],
            w_hh: vec![0.0; gates * hidden_size],
            b_ih: vec![0.0; gates],
            b_hh: vec![0.0; gates],
        }
    }
}

/// Weights for the dense projection.
#[derive(Debug, Clone)]
pub struct LinearWeights {
    /// `[O, I]` row-major.
    pub weight: Vec<f32>,
    /// `[O]`.
    pub bias: Vec<f32>,
}

impl LinearWeights {
    pub fn zeroed(input_size: usize, output_size: usize) -> Self {
        Self {
            weight: vec![0.0; output_size * input_size],
            bias: vec![0.0; output_size],
        }
    }
}

/// Trained weight tensors for one model, supplied by the model collaborator.
///
/// Shapes are validated against the configured layer dimensions at
/// construction; a mismatch fails with [`DenoiseError::IncompatibleModel`]
/// and no estimator is returned.
#[derive(Debug, Clone)]
pub struct ModelWeights {
    pub gru: Vec<GruWeights>,
    pub linear: LinearWeights,
}

impl ModelWeights {
    /// All-zero weights matching `io_size`/`hidden_sizes`, for tests and
    /// benchmarks.
    pub fn zeroed(io_size: usize, hidden_sizes: &[usize]) -> Self {
        let mut gru = Vec::with_capacity(hidden_sizes.len());
        let mut input = io_size;
        for &h in hidden_sizes {
            gru.push(GruWeights::zeroed(input, h));
            input = h;
        }
        Self {
            gru,
            linear: LinearWeights::zeroed(input, io_size),
        }
    }
}

/// Per-stream recurrent memory: one buffer per GRU layer.
///
/// Created at stream start (explicitly zeroed), mutated in place every frame
/// by [`MaskEstimator::step`], owned exclusively by one stream context.
#[derive(Debug, Clone)]
pub struct HiddenState {
    layers: Vec<Vec<f32>>,
}

impl HiddenState {
    /// Zero-initialized state for the given per-layer hidden sizes.
    pub fn zeros(hidden_sizes: &[usize]) -> Self {
        Self {
            layers: hidden_sizes.iter().map(|&h| vec![0.0; h]).collect(),
        }
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Read access to one layer's state buffer.
    pub fn layer(&self, index: usize) -> &[f32] {
        &self.layers[index]
    }

    /// Zero all layer buffers for stream re-use.
    pub fn reset(&mut self) {
        for layer in &mut self.layers {
            layer.fill(0.0);
        }
    }

    fn check_shape(&self, hidden_sizes: &[usize]) -> Result<()> {
        if self.layers.len() != hidden_sizes.len() {
            return Err(DenoiseError::StateShape(format!(
                "expected {} layer buffers, got {}",
                hidden_sizes.len(),
                self.layers.len()
            )));
        }
        for (i, (layer, &h)) in self.layers.iter().zip(hidden_sizes.iter()).enumerate() {
            if layer.len() != h {
                return Err(DenoiseError::StateShape(format!(
                    "layer {} state has dimension {}, expected {}",
                    i,
                    layer.len(),
                    h
                )));
            }
        }
        Ok(())
    }
}

struct GruLayer {
    input_size: usize,
    hidden_size: usize,
    w_ih: Vec<f32>,
    w_hh: Vec<f32>,
    b_ih: Vec<f32>,
    b_hh: Vec<f32>,
}

impl GruLayer {
    fn new(index: usize, input_size: usize, hidden_size: usize, w: GruWeights) -> Result<Self> {
        let gates = 3 * hidden_size;
        let check = |name: &str, got: usize, want: usize| -> Result<()> {
            if got != want {
                return Err(DenoiseError::IncompatibleModel(format!(
                    "gru layer {}: {} has {} elements, expected {}",
                    index, name, got, want
                )));
            }
            Ok(())
        };
        check("w_ih", w.w_ih.len(), gates * input_size)?;
        check("w_hh", w.w_hh.len(), gates * hidden_size)?;
        check("b_ih", w.b_ih.len(), gates)?;
        check("b_hh", w.b_hh.len(), gates)?;
        Ok(Self {
            input_size,
            hidden_size,
            w_ih: w.w_ih,
            w_hh: w.w_hh,
            b_ih: w.b_ih,
            b_hh: w.b_hh,
        })
    }

    /// One GRU step: reads `input`, updates `h` in place, mirrors the new
    /// state into `output`. `wx`/`uh` are caller scratch of size `3H`.
    fn step(&self, input: &[f32], h: &mut [f32], wx: &mut [f32], uh: &mut [f32], output: &mut [f32]) {
        debug_assert_eq!(input.len(), self.input_size);
        debug_assert_eq!(h.len(), self.hidden_size);
        let hs = self.hidden_size;

        wx.copy_from_slice(&self.b_ih);
        mat_vec_add(&self.w_ih, input, wx, 3 * hs, self.input_size);
        uh.copy_from_slice(&self.b_hh);
        mat_vec_add(&self.w_hh, h, uh, 3 * hs, hs);

        for i in 0..hs {
            let r = sigmoid(wx[i] + uh[i]);
            let z = sigmoid(wx[hs + i] + uh[hs + i]);
            let n = (wx[2 * hs + i] + r * uh[2 * hs + i]).tanh();
            let h_new = (1.0 - z) * n + z * h[i];
            h[i] = h_new;
            output[i] = h_new;
        }
    }
}

struct LinearLayer {
    input_size: usize,
    output_size: usize,
    weight: Vec<f32>,
    bias: Vec<f32>,
    activation: Option<Activation>,
}

impl LinearLayer {
    fn new(
        input_size: usize,
        output_size: usize,
        w: LinearWeights,
        activation: Option<Activation>,
    ) -> Result<Self> {
        if w.weight.len() != output_size * input_size || w.bias.len() != output_size {
            return Err(DenoiseError::IncompatibleModel(format!(
                "dense projection: weight {}x{} with bias {} does not match [{} x {}]",
                w.weight.len() / input_size.max(1),
                input_size,
                w.bias.len(),
                output_size,
                input_size
            )));
        }
        Ok(Self {
            input_size,
            output_size,
            weight: w.weight,
            bias: w.bias,
            activation,
        })
    }

    fn compute(&self, input: &[f32], output: &mut [f32]) {
        debug_assert_eq!(input.len(), self.input_size);
        debug_assert_eq!(output.len(), self.output_size);
        output.copy_from_slice(&self.bias);
        mat_vec_add(&self.weight, input, output, self.output_size, self.input_size);
        if let Some(act) = self.activation {
            for y in output.iter_mut() {
                *y = act.apply(*y);
            }
        }
    }
}

/// Stateful recurrent gain-mask estimator.
///
/// The estimator is a pure function of (features, hidden state): all mutable
/// per-stream memory is passed in via [`HiddenState`], so one stream context
/// owns its recurrence exclusively. `&mut self` is needed only for the
/// pre-allocated scratch buffers.
pub struct MaskEstimator {
    kind: ModelKind,
    io_size: usize,
    hidden_sizes: Vec<usize>,
    layers: Vec<GruLayer>,
    projection: LinearLayer,
    // Scratch, sized for the widest layer.
    wx: Vec<f32>,
    uh: Vec<f32>,
    buf_a: Vec<f32>,
    buf_b: Vec<f32>,
}

impl MaskEstimator {
    /// Build an estimator for `kind` from configured dimensions and trained
    /// weights. Every tensor shape is validated up front; on mismatch no
    /// partial estimator is returned.
    pub fn new(config: &Config, kind: ModelKind, weights: ModelWeights) -> Result<Self> {
        config.validate()?;
        if config.hidden_sizes.len() != kind.depth() {
            return Err(DenoiseError::IncompatibleModel(format!(
                "model {:?} expects {} recurrent layers, config has {}",
                kind.tag(),
                kind.depth(),
                config.hidden_sizes.len()
            )));
        }
        if weights.gru.len() != kind.depth() {
            return Err(DenoiseError::IncompatibleModel(format!(
                "model {:?} expects {} weight sets, got {}",
                kind.tag(),
                kind.depth(),
                weights.gru.len()
            )));
        }

        let mut layers = Vec::with_capacity(kind.depth());
        let mut input_size = config.io_size;
        for (i, (w, &h)) in weights
            .gru
            .into_iter()
            .zip(config.hidden_sizes.iter())
            .enumerate()
        {
            layers.push(GruLayer::new(i, input_size, h, w)?);
            input_size = h;
        }
        let projection = LinearLayer::new(
            input_size,
            config.io_size,
            weights.linear,
            kind.output_activation(),
        )?;

        let max_hidden = config.hidden_sizes.iter().copied().max().unwrap_or(0);
        let max_dim = max_hidden.max(config.io_size);
        log::debug!(
            "mask estimator: {} io {} hidden {:?}",
            kind.tag(),
            config.io_size,
            config.hidden_sizes
        );

        Ok(Self {
            kind,
            io_size: config.io_size,
            hidden_sizes: config.hidden_sizes.clone(),
            layers,
            projection,
            wx: vec![0.0; 3 * max_hidden],
            uh: vec![0.0; 3 * max_hidden],
            buf_a: vec![0.0; max_dim],
            buf_b: vec![0.0; max_dim],
        })
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn io_size(&self) -> usize {
        self.io_size
    }

    pub fn hidden_sizes(&self) -> &[usize] {
        &self.hidden_sizes
    }

    /// Fresh zeroed state matching this estimator's layer dimensions.
    pub fn new_state(&self) -> HiddenState {
        HiddenState::zeros(&self.hidden_sizes)
    }

    /// Run one frame through the layer stack, threading `state` forward.
    ///
    /// - `features`: `io_size` log-power features
    /// - `gains`: `io_size` output gains (depth-3: in `[0,1]`; depth-2: raw
    ///   pre-activation values)
    ///
    /// Fails with [`DenoiseError::StateShape`] if `state` does not match the
    /// configured layer dimensions. Zero heap allocations.
    pub fn step(&mut self, features: &[f32], state: &mut HiddenState, gains: &mut [f32]) -> Result<()> {
        debug_assert_eq!(features.len(), self.io_size);
        debug_assert_eq!(gains.len(), self.io_size);
        state.check_shape(&self.hidden_sizes)?;

        let Self {
            layers,
            projection,
            wx,
            uh,
            buf_a,
            buf_b,
            ..
        } = self;

        buf_a[..features.len()].copy_from_slice(features);
        for (layer, h) in layers.iter().zip(state.layers.iter_mut()) {
            let hs = layer.hidden_size;
            layer.step(
                &buf_a[..layer.input_size],
                h,
                &mut wx[..3 * hs],
                &mut uh[..3 * hs],
                &mut buf_b[..hs],
            );
            std::mem::swap(buf_a, buf_b);
        }
        projection.compute(&buf_a[..projection.input_size], gains);
        Ok(())
    }

    /// Run a whole feature sequence as one batched call from zero initial
    /// state. Equivalent to threading [`step`](Self::step) frame by frame
    /// with a fresh [`HiddenState`]; streaming and offline inference must
    /// agree within floating tolerance.
    pub fn forward(&mut self, features: &[Vec<f32>]) -> Result<Vec<Vec<f32>>> {
        let mut state = self.new_state();
        let mut out = Vec::with_capacity(features.len());
        for frame in features {
            let mut gains = vec![0.0f32; self.io_size];
            self.step(frame, &mut state, &mut gains)?;
            out.push(gains);
        }
        Ok(out)
    }
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Matrix-vector multiply-add: `out += m @ x`, `m` is `[rows x cols]`
/// row-major.
#[inline]
fn mat_vec_add(m: &[f32], x: &[f32], out: &mut [f32], rows: usize, cols: usize) {
    debug_assert_eq!(m.len(), rows * cols);
    debug_assert_eq!(x.len(), cols);
    debug_assert_eq!(out.len(), rows);
    for i in 0..rows {
        let row = &m[i * cols..(i + 1) * cols];
        let mut acc = 0.0f32;
        for (&mj, &xj) in row.iter().zip(x.iter()) {
            acc += mj * xj;
        }
        out[i] += acc;
    }
}
