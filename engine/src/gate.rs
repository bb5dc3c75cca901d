//! Voice activity gate and frame encoder for the capture path.

use crate::pcm;
use voice_core::EncodedFrame;

/// Full-scale RMS the sensitivity slider maps onto: a threshold setting of
/// 100% gates everything below 0.15 RMS.
pub const SILENCE_FLOOR: f32 = 0.15;

/// Drive into the tanh soft-clip, compressing peaks before quantization.
pub const SOFT_CLIP_DRIVE: f32 = 1.5;

/// Root-mean-square energy of a frame.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// Gate and encode one capture frame.
///
/// Frames below the energy threshold are silence and produce nothing;
/// everything else is soft-clipped and quantized for transport. This stage
/// touches no shared state.
pub fn encode_frame(samples: &[f32], threshold_pct: u8) -> Option<EncodedFrame> {
    if rms(samples) < (threshold_pct as f32 / 100.0) * SILENCE_FLOOR {
        return None;
    }

    let encoded = samples
        .iter()
        .map(|&s| pcm::quantize((s * SOFT_CLIP_DRIVE).tanh()))
        .collect();

    Some(EncodedFrame { samples: encoded })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn speech_frame(amplitude: f32) -> Vec<f32> {
        (0..8192)
            .map(|i| (i as f32 * 0.05).sin() * amplitude)
            .collect()
    }

    #[test]
    fn silence_is_gated() {
        assert!(encode_frame(&vec![0.0; 8192], 5).is_none());
        // Low hiss under the floor at a mid sensitivity setting.
        assert!(encode_frame(&speech_frame(0.01), 50).is_none());
    }

    #[test]
    fn speech_passes_the_gate() {
        let frame = encode_frame(&speech_frame(0.5), 5).unwrap();
        assert_eq!(frame.len(), 8192);
    }

    #[test]
    fn zero_threshold_passes_everything() {
        assert!(encode_frame(&speech_frame(0.001), 0).is_some());
    }

    #[test]
    fn soft_clip_bounds_hot_input() {
        // Samples beyond full scale must still quantize without wrapping.
        let hot: Vec<f32> = (0..8192).map(|i| if i % 2 == 0 { 3.0 } else { -3.0 }).collect();
        let frame = encode_frame(&hot, 0).unwrap();
        for &s in &frame.samples {
            assert!(s > -32768 && s < 32768);
        }
        // tanh(4.5) is close to but below full scale.
        assert!(frame.samples[0] > 32000);
    }

    #[test]
    fn rms_of_known_signal() {
        let square: Vec<f32> = (0..1024).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }).collect();
        assert!((rms(&square) - 0.5).abs() < 1e-6);
    }
}
