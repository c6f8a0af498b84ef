//! Gain post-processing and spectral masking.
//!
//! The raw network gains are reshaped before masking: a `sin`-weighted term
//! steepens the attenuation of noise-dominated bins, while two floor terms
//! (the minimum gain and a naturalness-weighted linear blend) bound how far
//! any bin can be suppressed, trading suppression depth for speech
//! naturalness.

use num_complex::Complex32;
use std::f32::consts::FRAC_PI_2;

use crate::error::{DenoiseError, Result};

/// Valid range of the suppression floor, in dB.
pub const MIN_GAIN_DB_RANGE: (f32, f32) = (-60.0, 0.0);
/// Valid range of the naturalness blend.
pub const NATURALNESS_RANGE: (f32, f32) = (0.0, 1.0);

/// User-facing gain shaping parameters.
///
/// The suppression floor is supplied in dB and stored as the linear ratio
/// `10^(dB/10)`; naturalness is a unitless blend in `[0, 1]`.
#[derive(Debug, Clone, Copy)]
pub struct GainTuning {
    min_gain: f32,
    naturalness: f32,
}

impl GainTuning {
    /// Strict constructor: out-of-range parameters fail with
    /// [`DenoiseError::OutOfRangeParameter`].
    pub fn new(min_gain_db: f32, naturalness: f32) -> Result<Self> {
        if !(MIN_GAIN_DB_RANGE.0..=MIN_GAIN_DB_RANGE.1).contains(&min_gain_db) {
            return Err(DenoiseError::OutOfRangeParameter(format!(
                "min_gain {} dB outside [{}, {}] dB",
                min_gain_db, MIN_GAIN_DB_RANGE.0, MIN_GAIN_DB_RANGE.1
            )));
        }
        if !(NATURALNESS_RANGE.0..=NATURALNESS_RANGE.1).contains(&naturalness) {
            return Err(DenoiseError::OutOfRangeParameter(format!(
                "naturalness {} outside [{}, {}]",
                naturalness, NATURALNESS_RANGE.0, NATURALNESS_RANGE.1
            )));
        }
        Ok(Self {
            min_gain: 10f32.powf(min_gain_db / 10.0),
            naturalness,
        })
    }

    /// Lenient constructor: clamps out-of-range parameters to their valid
    /// bounds and reports the correction as a warning.
    pub fn clamped(min_gain_db: f32, naturalness: f32) -> Self {
        let db = min_gain_db.clamp(MIN_GAIN_DB_RANGE.0, MIN_GAIN_DB_RANGE.1);
        if db != min_gain_db {
            log::warn!("min_gain {} dB out of range, clamped to {} dB", min_gain_db, db);
        }
        let nat = naturalness.clamp(NATURALNESS_RANGE.0, NATURALNESS_RANGE.1);
        if nat != naturalness {
            log::warn!("naturalness {} out of range, clamped to {}", naturalness, nat);
        }
        Self {
            min_gain: 10f32.powf(db / 10.0),
            naturalness: nat,
        }
    }

    /// Suppression floor as a linear ratio.
    pub fn min_gain(&self) -> f32 {
        self.min_gain
    }

    pub fn naturalness(&self) -> f32 {
        self.naturalness
    }
}

/// Shape one raw gain value:
/// `max(naturalness * g, max(g * sin(pi/2 * g), min_gain))`.
///
/// Non-decreasing in `g` over `[0, 1]`, with `shape(1) = 1`.
pub fn shape(gain: f32, tuning: &GainTuning) -> f32 {
    let shaped = (gain * (FRAC_PI_2 * gain).sin()).max(tuning.min_gain);
    shaped.max(tuning.naturalness * gain)
}

/// Build the masked spectrum: `spectrum[i] = magnitude[i] * shape(gains[i])
/// * phase[i]` over the first `gains.len()` bins. Bins beyond the network
/// output carry the zero mask and are fully suppressed.
pub fn apply_gain_mask(
    gains: &[f32],
    tuning: &GainTuning,
    magnitude: &[f32],
    phase: &[Complex32],
    spectrum: &mut [Complex32],
) {
    debug_assert!(gains.len() <= magnitude.len());
    debug_assert_eq!(magnitude.len(), phase.len());
    debug_assert_eq!(magnitude.len(), spectrum.len());

    for i in 0..gains.len() {
        spectrum[i] = phase[i] * (magnitude[i] * shape(gains[i], tuning));
    }
    for s in spectrum[gains.len()..].iter_mut() {
        *s = Complex32::new(0.0, 0.0);
    }
}
