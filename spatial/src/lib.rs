//! Placement and distance-attenuation math for the voice engine.
//!
//! Everything here is pure. The engine recomputes placements whenever the
//! listener moves or turns, a peer moves, the dimensionality mode flips, or
//! a new server config arrives.

use std::f32::consts::{PI, TAU};
use voice_core::{Dimension, Position};

mod attenuation;

pub use attenuation::AttenuationParams;

/// Horizontal distances below this are treated as co-located and centered.
pub const MIN_HORIZONTAL_DISTANCE: f32 = 0.1;

/// Scale on the softened lateral component, compressing hard-left/hard-right
/// placement into a less disorienting range.
pub const MAX_STEREO_SEPARATION: f32 = 0.6;

/// Exponent of the stereo-softening curve.
pub const STEREO_SOFTENING_EXPONENT: f32 = 0.7;

/// The local player's position, facing and dimensionality mode.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ListenerState {
    pub position: Position,
    pub dimension: Dimension,
}

/// Three-axis offset positioning a peer's voice relative to the listener,
/// who sits at the origin facing -Z.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Placement {
    /// Distance the attenuation curve sees for this placement.
    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Stereo pan in [-1, 1] derived from the horizontal components;
    /// zero when the placement is centered.
    pub fn pan(&self) -> f32 {
        let horizontal = (self.x * self.x + self.z * self.z).sqrt();
        if horizontal <= f32::EPSILON {
            0.0
        } else {
            (self.x / horizontal).clamp(-1.0, 1.0)
        }
    }
}

/// Stereo-softening curve: odd-symmetric, compresses extremes while
/// preserving direction.
pub fn soften_lateral(lateral: f32) -> f32 {
    let sign = if lateral >= 0.0 { 1.0 } else { -1.0 };
    sign * lateral.abs().powf(STEREO_SOFTENING_EXPONENT) * MAX_STEREO_SEPARATION
}

/// Map listener state and a peer's world position to a placement.
pub fn compute_placement(listener: &ListenerState, peer: &Position) -> Placement {
    let dx = peer.x - listener.position.x;
    let dy = peer.y - listener.position.y;
    let dz = peer.z - listener.position.z;
    let horizontal_dist = (dx * dx + dz * dz).sqrt();

    if listener.dimension == Dimension::TwoD {
        return Placement {
            x: 0.0,
            y: 0.0,
            z: -horizontal_dist,
        };
    }

    // Co-located: center the sound, keep a minimal forward offset so the
    // bearing math stays stable.
    if horizontal_dist < MIN_HORIZONTAL_DISTANCE {
        return Placement {
            x: 0.0,
            y: dy,
            z: -MIN_HORIZONTAL_DISTANCE,
        };
    }

    let bearing = dx.atan2(dz);
    let listener_yaw = listener.position.yaw.rem_euclid(360.0).to_radians();

    let mut relative = bearing - listener_yaw;
    while relative > PI {
        relative -= TAU;
    }
    while relative < -PI {
        relative += TAU;
    }

    let lateral = relative.sin();
    let forward = relative.cos();

    Placement {
        x: soften_lateral(lateral) * horizontal_dist,
        y: dy,
        z: -forward * horizontal_dist,
    }
}
