//! PCM16 sample conversion shared by the capture and playback sides.

use voice_core::EncodedFrame;

/// Playback-side makeup gain compensating the capture soft-clip compression.
pub const MAKEUP_GAIN: f32 = 1.2;

/// Quantize one soft-clipped float sample to i16. Negative values map over
/// the 32768 half of the range, non-negative over 32767.
pub fn quantize(sample: f32) -> i16 {
    if sample < 0.0 {
        (sample * 32768.0) as i16
    } else {
        (sample * 32767.0) as i16
    }
}

/// Reverse of [`quantize`], with makeup gain applied.
pub fn dequantize(sample: i16) -> f32 {
    let divisor = if sample < 0 { 32768.0 } else { 32767.0 };
    (sample as f32 / divisor) * MAKEUP_GAIN
}

/// Decode a transport payload into playable samples. Returns `None` for
/// truncated payloads; the caller drops those silently.
pub fn decode_payload(payload: &[u8]) -> Option<Vec<f32>> {
    let frame = EncodedFrame::from_le_bytes(payload)?;
    Some(frame.samples.iter().copied().map(dequantize).collect())
}
