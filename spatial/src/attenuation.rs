use voice_core::{AttenuationConfig, DistanceModel};

/// Concrete curve parameters applied to a peer's spatial node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttenuationParams {
    pub model: DistanceModel,
    pub ref_distance: f32,
    pub max_distance: f32,
    pub rolloff: f32,
}

impl Default for AttenuationParams {
    fn default() -> Self {
        Self::from_config(&AttenuationConfig::default())
    }
}

impl AttenuationParams {
    pub fn from_config(config: &AttenuationConfig) -> Self {
        Self {
            model: config.distance_formula,
            ref_distance: config.ref_distance.max(1e-6),
            max_distance: config.max_distance,
            rolloff: config.rolloff_factor,
        }
    }

    /// Gain in [0, 1] for a source at `distance`. Curves match the panner
    /// semantics the server config was written against.
    pub fn gain_at(&self, distance: f32) -> f32 {
        let r = self.ref_distance;
        match self.model {
            DistanceModel::Linear => {
                if self.max_distance <= r {
                    return 1.0;
                }
                let d = distance.clamp(r, self.max_distance);
                (1.0 - self.rolloff * (d - r) / (self.max_distance - r)).clamp(0.0, 1.0)
            }
            DistanceModel::Exponential => (distance.max(r) / r).powf(-self.rolloff),
            DistanceModel::InverseSquare => r / (r + self.rolloff * (distance.max(r) - r)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(model: DistanceModel, ref_d: f32, max_d: f32, rolloff: f32) -> AttenuationParams {
        AttenuationParams {
            model,
            ref_distance: ref_d,
            max_distance: max_d,
            rolloff,
        }
    }

    #[test]
    fn defaults_match_no_config_fallback() {
        let p = AttenuationParams::default();
        assert_eq!(p.model, DistanceModel::Linear);
        assert!((p.ref_distance - 1.0).abs() < f32::EPSILON);
        assert!((p.max_distance - 150.0).abs() < f32::EPSILON);
        assert!((p.rolloff - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn unity_gain_at_or_below_reference() {
        for model in [
            DistanceModel::Linear,
            DistanceModel::Exponential,
            DistanceModel::InverseSquare,
        ] {
            let p = params(model, 5.0, 100.0, 1.0);
            assert!((p.gain_at(5.0) - 1.0).abs() < 1e-6, "{:?}", model);
            assert!((p.gain_at(0.5) - 1.0).abs() < 1e-6, "{:?}", model);
        }
    }

    #[test]
    fn linear_reaches_silence_at_max() {
        let p = params(DistanceModel::Linear, 1.0, 150.0, 1.0);
        assert!(p.gain_at(150.0).abs() < 1e-6);
        assert!(p.gain_at(400.0).abs() < 1e-6);
        assert!((p.gain_at(75.5) - 0.5).abs() < 1e-3);
    }

    #[test]
    fn exponential_halves_per_doubling_at_unit_rolloff() {
        let p = params(DistanceModel::Exponential, 10.0, 75.0, 1.0);
        assert!((p.gain_at(20.0) - 0.5).abs() < 1e-6);
        assert!((p.gain_at(40.0) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn inverse_square_follows_ref_over_distance() {
        let p = params(DistanceModel::InverseSquare, 1.0, 150.0, 1.0);
        // ref / (ref + rolloff * (d - ref))
        assert!((p.gain_at(2.0) - 0.5).abs() < 1e-6);
        assert!((p.gain_at(11.0) - 1.0 / 11.0).abs() < 1e-6);
    }

    #[test]
    fn curves_are_monotone_nonincreasing() {
        for model in [
            DistanceModel::Linear,
            DistanceModel::Exponential,
            DistanceModel::InverseSquare,
        ] {
            let p = params(model, 1.0, 150.0, 1.5);
            let mut last = f32::INFINITY;
            for step in 0..60 {
                let g = p.gain_at(step as f32 * 3.0);
                assert!(g <= last + 1e-6, "{:?} at {}", model, step);
                last = g;
            }
        }
    }

    #[test]
    fn degenerate_linear_range_stays_audible() {
        let p = params(DistanceModel::Linear, 10.0, 10.0, 1.0);
        assert!((p.gain_at(50.0) - 1.0).abs() < 1e-6);
    }
}
