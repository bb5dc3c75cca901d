//! Decorative microphone level meter.
//!
//! Mirrors an analyser-style readout: average byte-range magnitude over the
//! frequency bins of a small FFT, mapped to 0-100. Polled by the UI tick, not
//! by the audio path.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

const FFT_SIZE: usize = 256;

/// Decibel window the byte range is stretched over.
const DB_FLOOR: f32 = -100.0;
const DB_CEIL: f32 = -30.0;

pub struct MicMeter {
    fft: Arc<dyn Fft<f32>>,
    bins: Vec<Complex<f32>>,
}

impl MicMeter {
    pub fn new() -> Self {
        let mut planner = FftPlanner::new();
        Self {
            fft: planner.plan_fft_forward(FFT_SIZE),
            bins: vec![Complex::default(); FFT_SIZE],
        }
    }

    /// Level 0-100 for the most recent capture frame.
    pub fn level(&mut self, samples: &[f32]) -> u8 {
        if samples.len() < FFT_SIZE {
            return 0;
        }

        let window = &samples[samples.len() - FFT_SIZE..];
        for (bin, &s) in self.bins.iter_mut().zip(window) {
            *bin = Complex::new(s, 0.0);
        }
        self.fft.process(&mut self.bins);

        let half = FFT_SIZE / 2;
        let mut acc = 0.0f32;
        for bin in &self.bins[..half] {
            let norm = bin.norm() * 2.0 / FFT_SIZE as f32;
            let db = 20.0 * norm.max(1e-10).log10();
            let byte = ((db - DB_FLOOR) / (DB_CEIL - DB_FLOOR) * 255.0).clamp(0.0, 255.0);
            acc += byte;
        }

        let avg = acc / half as f32;
        ((avg / 128.0) * 100.0).min(100.0) as u8
    }
}

impl Default for MicMeter {
    fn default() -> Self {
        Self::new()
    }
}
