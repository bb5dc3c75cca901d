//! Per-channel dynamics stage, keeping close or loud speakers from
//! overwhelming the mix.

const MIN_DB: f32 = -100.0;

/// Soft-knee downward compressor with an attack/release envelope follower.
#[derive(Debug, Clone)]
pub struct Compressor {
    threshold_db: f32,
    knee_db: f32,
    ratio: f32,
    attack_coeff: f32,
    release_coeff: f32,
    envelope_db: f32,
}

impl Compressor {
    /// Voice-chat settings: -24 dB threshold, 30 dB knee, 12:1 ratio.
    pub fn new(sample_rate: u32) -> Self {
        let mut c = Self {
            threshold_db: -24.0,
            knee_db: 30.0,
            ratio: 12.0,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            envelope_db: MIN_DB,
        };
        c.set_attack(3.0, sample_rate);
        c.set_release(250.0, sample_rate);
        c
    }

    fn set_attack(&mut self, attack_ms: f32, sample_rate: u32) {
        self.attack_coeff = (-1.0 / (attack_ms * 0.001 * sample_rate as f32)).exp();
    }

    fn set_release(&mut self, release_ms: f32, sample_rate: u32) {
        self.release_coeff = (-1.0 / (release_ms * 0.001 * sample_rate as f32)).exp();
    }

    /// Gain reduction in dB for a signal at `level_db`, with a quadratic
    /// soft-knee transition around the threshold.
    fn reduction_db(&self, level_db: f32) -> f32 {
        let over = level_db - self.threshold_db;
        let half_knee = self.knee_db / 2.0;

        if over <= -half_knee {
            0.0
        } else if over < half_knee {
            let t = over + half_knee;
            (1.0 - 1.0 / self.ratio) * t * t / (2.0 * self.knee_db)
        } else {
            (1.0 - 1.0 / self.ratio) * over
        }
    }

    pub fn process(&mut self, samples: &mut [f32]) {
        for sample in samples.iter_mut() {
            let level = sample.abs();
            let level_db = if level > 1e-5 {
                (20.0 * level.log10()).max(MIN_DB)
            } else {
                MIN_DB
            };

            let coeff = if level_db > self.envelope_db {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.envelope_db = level_db + (self.envelope_db - level_db) * coeff;

            let reduction = self.reduction_db(self.envelope_db).clamp(0.0, 60.0);
            *sample *= 10f32.powf(-reduction / 20.0);
        }
    }

    /// Drop the envelope back to silence, e.g. after a long playback gap.
    pub fn reset(&mut self) {
        self.envelope_db = MIN_DB;
    }
}
