use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Unique identifier for a remote participant, assigned by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct PeerId(i32);

impl PeerId {
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> i32 {
        self.0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A world position plus facing direction.
///
/// `yaw` is in degrees and may arrive outside [0, 360); consumers normalize.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub yaw: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32, z: f32, yaw: f32) -> Self {
        Self { x, y, z, yaw }
    }

    /// Straight-line distance to another position.
    pub fn distance_to(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Whether voice collapses to distance-only panning or uses full 3D placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dimension {
    #[serde(rename = "2D")]
    TwoD,
    #[serde(rename = "3D")]
    ThreeD,
}

impl Default for Dimension {
    fn default() -> Self {
        // Until a server config arrives, voice is distance-only.
        Dimension::TwoD
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dimension::TwoD => write!(f, "2D"),
            Dimension::ThreeD => write!(f, "3D"),
        }
    }
}

/// Distance falloff curve selected by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DistanceModel {
    Linear,
    Exponential,
    InverseSquare,
}

impl Default for DistanceModel {
    fn default() -> Self {
        DistanceModel::Linear
    }
}

/// Server-supplied attenuation configuration, replaced wholesale whenever the
/// server pushes a new `config` message.
///
/// Field names follow the wire format (camelCase JSON). The blend thresholds
/// are carried for completeness; placement collapses purely on
/// `voice_dimension`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttenuationConfig {
    pub distance_formula: DistanceModel,
    pub voice_dimension: Dimension,
    pub ref_distance: f32,
    pub max_distance: f32,
    pub rolloff_factor: f32,
    pub blend_2d_distance: Option<f32>,
    pub full_3d_distance: Option<f32>,
}

impl Default for AttenuationConfig {
    fn default() -> Self {
        // Client-side fallback when no server config has been seen yet.
        Self {
            distance_formula: DistanceModel::Linear,
            voice_dimension: Dimension::TwoD,
            ref_distance: 1.0,
            max_distance: 150.0,
            rolloff_factor: 1.0,
            blend_2d_distance: None,
            full_3d_distance: None,
        }
    }
}

/// Unified error type for the engine and its device layer.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Playback error: {0}")]
    Playback(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// Basic audio format definitions
pub const SAMPLE_RATE: u32 = 48000;
pub const CAPTURE_CHANNELS: u16 = 1;
pub const OUTPUT_CHANNELS: u16 = 2;

/// Capture frame size in samples (~170 ms at 48 kHz, sized for fidelity
/// over latency).
pub const FRAME_SAMPLES: usize = 8192;

/// Represents a buffer of mono audio samples.
pub type AudioBuffer = Vec<f32>;

/// A gated, soft-clipped, quantized voice frame ready for transport.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFrame {
    pub samples: Vec<i16>,
}

impl EncodedFrame {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback time this frame occupies at the engine sample rate.
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / SAMPLE_RATE as f64)
    }

    /// Serialize as little-endian PCM16 for the transport.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.samples.len() * 2);
        for s in &self.samples {
            out.extend_from_slice(&s.to_le_bytes());
        }
        out
    }

    /// Parse a little-endian PCM16 payload. Returns `None` for truncated
    /// (odd-length) payloads.
    pub fn from_le_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() % 2 != 0 {
            return None;
        }
        let samples = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Some(Self { samples })
    }
}

pub mod events;
pub mod sink;

pub use events::EngineEvent;
pub use sink::FrameSink;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_id_display() {
        let peer_id = PeerId::new(42);
        assert_eq!(format!("{}", peer_id), "42");
        assert_eq!(peer_id.raw(), 42);
    }

    #[test]
    fn position_distance() {
        let a = Position::new(0.0, 0.0, 0.0, 0.0);
        let b = Position::new(3.0, 4.0, 0.0, 90.0);
        assert!((a.distance_to(&b) - 5.0).abs() < f32::EPSILON);
    }

    #[test]
    fn config_parses_server_message() {
        // Shape of the server's `config` message, type tag included.
        let json = r#"{
            "type": "config",
            "maxDistance": 75.0,
            "distanceFormula": "EXPONENTIAL",
            "voiceDimension": "3D",
            "rolloffFactor": 1.5,
            "refDistance": 10.0,
            "blend2dDistance": 20.0,
            "full3dDistance": 30.0
        }"#;

        let config: AttenuationConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.distance_formula, DistanceModel::Exponential);
        assert_eq!(config.voice_dimension, Dimension::ThreeD);
        assert!((config.ref_distance - 10.0).abs() < f32::EPSILON);
        assert!((config.max_distance - 75.0).abs() < f32::EPSILON);
        assert!((config.rolloff_factor - 1.5).abs() < f32::EPSILON);
        assert_eq!(config.blend_2d_distance, Some(20.0));
    }

    #[test]
    fn config_defaults_when_fields_missing() {
        let config: AttenuationConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, AttenuationConfig::default());
        assert_eq!(config.distance_formula, DistanceModel::Linear);
        assert_eq!(config.voice_dimension, Dimension::TwoD);
    }

    #[test]
    fn encoded_frame_round_trips_le_bytes() {
        let frame = EncodedFrame {
            samples: vec![0, -1, 32767, -32768, 12345],
        };
        let bytes = frame.to_le_bytes();
        let parsed = EncodedFrame::from_le_bytes(&bytes).unwrap();
        assert_eq!(parsed, frame);
    }

    #[test]
    fn truncated_payload_rejected() {
        assert!(EncodedFrame::from_le_bytes(&[0x01, 0x02, 0x03]).is_none());
    }

    #[test]
    fn frame_duration() {
        let frame = EncodedFrame {
            samples: vec![0; 48000],
        };
        assert_eq!(frame.duration(), Duration::from_secs(1));
    }
}
