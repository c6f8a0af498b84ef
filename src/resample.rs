//! Sample-rate conversion at the audio I/O boundary.
//!
//! The pipeline runs at 16 kHz; 8 kHz input is doubled with a
//! linear-interpolating upsampler on the way in and averaged back down on
//! the way out. Any other rate is rejected.

use crate::error::{DenoiseError, Result};
use crate::SAMPLE_RATE;

/// Accept only the rates the pipeline can consume.
pub fn ensure_supported(rate: u32) -> Result<()> {
    match rate {
        8000 | 16000 => Ok(()),
        other => Err(DenoiseError::UnsupportedSampleRate(other)),
    }
}

/// Streaming 2x upsampler (8 kHz -> 16 kHz).
///
/// Emits the midpoint of the previous and current sample followed by the
/// sample itself, carrying the last sample across calls so chunk boundaries
/// stay continuous.
#[derive(Debug, Default)]
pub struct Upsampler2x {
    last: f32,
}

impl Upsampler2x {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsample one chunk; output has exactly twice the input length.
    pub fn process(&mut self, input: &[f32], output: &mut Vec<f32>) {
        output.clear();
        output.reserve(input.len() * 2);
        for &x in input {
            output.push(0.5 * (self.last + x));
            output.push(x);
            self.last = x;
        }
    }

    pub fn reset(&mut self) {
        self.last = 0.0;
    }
}

/// Downsample 16 kHz -> 8 kHz by pairwise averaging. A trailing odd sample
/// is dropped.
pub fn downsample_2x(input: &[f32]) -> Vec<f32> {
    input.chunks_exact(2).map(|p| 0.5 * (p[0] + p[1])).collect()
}
