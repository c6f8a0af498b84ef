//! Log-power feature extraction.

/// Compute the network input features from a magnitude spectrum:
/// `10 * log10(m^2 + epsilon)` elementwise over the first `features.len()`
/// bins. Bins beyond the feature length are excluded from the network input.
///
/// `epsilon` must be strictly positive so the logarithm is never evaluated
/// at zero; [`Config::validate`](crate::Config::validate) enforces this.
pub fn log_power(magnitude: &[f32], epsilon: f32, features: &mut [f32]) {
    debug_assert!(features.len() <= magnitude.len());
    debug_assert!(epsilon > 0.0);
    for (f, &m) in features.iter_mut().zip(magnitude.iter()) {
        *f = 10.0 * (m * m + epsilon).log10();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_maps_to_epsilon_floor() {
        let magnitude = vec![0.0f32; 8];
        let mut features = vec![0.0f32; 8];
        log_power(&magnitude, 1e-3, &mut features);
        for &f in &features {
            assert!((f - (-30.0)).abs() < 1e-4); // 10*log10(1e-3)
        }
    }

    #[test]
    fn unit_magnitude_is_near_zero_db() {
        let magnitude = vec![1.0f32; 4];
        let mut features = vec![0.0f32; 4];
        log_power(&magnitude, 1e-3, &mut features);
        for &f in &features {
            // 10*log10(1 + 1e-3) ~ 0.0043 dB
            assert!(f.abs() < 0.01);
        }
    }

    #[test]
    fn truncates_to_feature_length() {
        let magnitude = vec![1.0f32; 129];
        let mut features = vec![0.0f32; 128];
        log_power(&magnitude, 1e-3, &mut features);
        assert_eq!(features.len(), 128);
    }
}
