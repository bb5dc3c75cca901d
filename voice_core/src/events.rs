use crate::{AttenuationConfig, PeerId, Position};
use bytes::Bytes;

/// Events delivered to the engine by the transport layer.
///
/// Each variant carries only the fields relevant to that event. The transport
/// has already routed and decoded its own framing; audio payloads arrive with
/// the 4-byte sender header stripped.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// The server replaced the distance-model configuration.
    ConfigUpdate(AttenuationConfig),

    /// A participant moved. When the id is the local player's, this updates
    /// the listener instead of a peer channel.
    PeerPosition { peer_id: PeerId, position: Position },

    /// A participant entered voice range.
    PeerJoined { peer_id: PeerId },

    /// A participant left voice range; their channel is torn down.
    PeerLeft { peer_id: PeerId },

    /// A voice frame for a peer: little-endian PCM16 mono samples.
    AudioFrame { peer_id: PeerId, payload: Bytes },
}
