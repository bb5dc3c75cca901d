//! Spatial mixing and playback-scheduling engine.
//!
//! Owns one playback channel per remote speaker, the listener state, the
//! active attenuation config and the capture gate. Network events arrive via
//! [`VoiceEngine::handle_event`]; the output device pulls mixed audio through
//! [`VoiceEngine::render`].

use log::{debug, info};
use spatial::{AttenuationParams, ListenerState};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use voice_core::{
    AttenuationConfig, Dimension, EncodedFrame, EngineEvent, PeerId, Position, SAMPLE_RATE,
};

pub mod channel;
pub mod clock;
pub mod compressor;
pub mod gate;
pub mod meter;
pub mod pcm;
pub mod scheduler;
pub mod tasks;
pub mod volume;

pub use channel::PeerChannel;
pub use clock::{Clock, ManualClock, SampleClock};
pub use scheduler::PlaybackScheduler;
pub use volume::VolumeTable;

use meter::MicMeter;

/// Engine tuning knobs. The defaults are the values the rest of the system
/// is calibrated against.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Fixed look-ahead absorbing arrival jitter before playback starts.
    pub lookahead: Duration,
    /// Accumulated scheduling latency beyond this is skipped away.
    pub max_drift: Duration,
    /// A peer counts as speaking this long after their last frame.
    pub speaking_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lookahead: Duration::from_millis(80),
            max_drift: Duration::from_millis(500),
            speaking_timeout: Duration::from_millis(300),
        }
    }
}

/// UI-facing view of one live peer channel.
#[derive(Debug, Clone)]
pub struct PeerSnapshot {
    pub peer_id: PeerId,
    pub position: Position,
    pub distance: f32,
    pub speaking: bool,
    pub gain: f32,
    pub attenuation: AttenuationParams,
}

/// The per-peer pipeline owner and control surface.
///
/// All shared state sits behind short critical sections or atomics so the
/// real-time capture and render callbacks never block for long. Lock order,
/// where more than one is held: listener, attenuation, volumes, channels.
pub struct VoiceEngine {
    self_id: PeerId,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    listener: Mutex<ListenerState>,
    attenuation: Mutex<AttenuationConfig>,
    volumes: Mutex<VolumeTable>,
    channels: Mutex<HashMap<PeerId, PeerChannel>>,
    meter: Mutex<MicMeter>,
    meter_level: AtomicU8,
    muted: AtomicBool,
    deafened: AtomicBool,
    threshold_pct: AtomicU8,
    mic_volume_pct: AtomicU16,
}

impl VoiceEngine {
    pub fn new(self_id: PeerId, clock: Arc<dyn Clock>) -> Self {
        Self::with_config(self_id, clock, EngineConfig::default())
    }

    pub fn with_config(self_id: PeerId, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        Self {
            self_id,
            config,
            clock,
            listener: Mutex::new(ListenerState::default()),
            attenuation: Mutex::new(AttenuationConfig::default()),
            volumes: Mutex::new(VolumeTable::default()),
            channels: Mutex::new(HashMap::new()),
            meter: Mutex::new(MicMeter::new()),
            meter_level: AtomicU8::new(0),
            muted: AtomicBool::new(false),
            deafened: AtomicBool::new(false),
            threshold_pct: AtomicU8::new(5),
            mic_volume_pct: AtomicU16::new(100),
        }
    }

    pub fn self_id(&self) -> PeerId {
        self.self_id
    }

    /// Apply one transport event.
    pub fn handle_event(&self, event: EngineEvent) {
        match event {
            EngineEvent::ConfigUpdate(config) => self.on_config_update(config),
            EngineEvent::PeerPosition { peer_id, position } => {
                self.on_peer_position(peer_id, position)
            }
            EngineEvent::PeerJoined { peer_id } => {
                // Channels are created lazily on first position or audio.
                debug!("peer {} entered voice range", peer_id);
            }
            EngineEvent::PeerLeft { peer_id } => self.on_peer_left(peer_id),
            EngineEvent::AudioFrame { peer_id, payload } => {
                self.on_audio_frame(peer_id, &payload)
            }
        }
    }

    // ---- capture side -----------------------------------------------------

    /// Gate and encode one captured microphone frame.
    ///
    /// Returns `None` while muted or when the frame is gated as silence.
    pub fn capture_frame(&self, samples: &[f32]) -> Option<EncodedFrame> {
        if self.muted.load(Ordering::Relaxed) {
            self.meter_level.store(0, Ordering::Relaxed);
            return None;
        }

        let mic_gain = self.mic_volume_pct.load(Ordering::Relaxed) as f32 / 100.0;
        let gained: Vec<f32> = samples.iter().map(|s| s * mic_gain).collect();

        let level = self.meter.lock().unwrap().level(&gained);
        self.meter_level.store(level, Ordering::Relaxed);

        gate::encode_frame(&gained, self.threshold_pct.load(Ordering::Relaxed))
    }

    // ---- playback side ----------------------------------------------------

    /// Mix all live channels into an interleaved stereo block. The block
    /// timestamp is taken from the playback clock at entry.
    pub fn render(&self, out: &mut [f32]) {
        out.fill(0.0);
        let now = self.clock.now();
        let mut channels = self.channels.lock().unwrap();
        for ch in channels.values_mut() {
            ch.render(out, now);
        }
    }

    fn on_audio_frame(&self, peer_id: PeerId, payload: &[u8]) {
        if peer_id == self.self_id || self.deafened.load(Ordering::Relaxed) {
            return;
        }

        let samples = match pcm::decode_payload(payload) {
            Some(s) if !s.is_empty() => s,
            Some(_) => return,
            None => {
                debug!(
                    "dropping malformed frame from peer {} ({} bytes)",
                    peer_id,
                    payload.len()
                );
                return;
            }
        };

        let now = self.clock.now();
        let listener = *self.listener.lock().unwrap();
        let config = self.attenuation.lock().unwrap().clone();
        let gain = self.volumes.lock().unwrap().gain_for(peer_id);

        let mut channels = self.channels.lock().unwrap();
        let ch = match channels.entry(peer_id) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(v) => {
                debug!("creating channel for peer {} on first frame", peer_id);
                v.insert(self.new_channel(peer_id, Position::default(), &listener, &config, gain))
            }
        };
        ch.enqueue(samples, now);
    }

    fn on_peer_position(&self, peer_id: PeerId, position: Position) {
        if peer_id == self.self_id {
            let listener = {
                let mut l = self.listener.lock().unwrap();
                l.position = position;
                *l
            };
            let mut channels = self.channels.lock().unwrap();
            for ch in channels.values_mut() {
                ch.refresh_placement(&listener);
            }
            return;
        }

        let listener = *self.listener.lock().unwrap();
        let config = self.attenuation.lock().unwrap().clone();
        let gain = self.volumes.lock().unwrap().gain_for(peer_id);

        let mut channels = self.channels.lock().unwrap();
        match channels.entry(peer_id) {
            Entry::Occupied(mut e) => e.get_mut().set_position(position, &listener),
            Entry::Vacant(v) => {
                debug!("creating channel for peer {} on first sighting", peer_id);
                v.insert(self.new_channel(peer_id, position, &listener, &config, gain));
            }
        }
    }

    fn on_config_update(&self, config: AttenuationConfig) {
        info!(
            "attenuation config replaced: {:?}, {} mode, ref {}, max {}, rolloff {}",
            config.distance_formula,
            config.voice_dimension,
            config.ref_distance,
            config.max_distance,
            config.rolloff_factor
        );

        let listener = {
            let mut l = self.listener.lock().unwrap();
            l.dimension = config.voice_dimension;
            *l
        };
        {
            let mut active = self.attenuation.lock().unwrap();
            *active = config.clone();
        }

        let mut channels = self.channels.lock().unwrap();
        for ch in channels.values_mut() {
            ch.apply_config(&config);
            ch.refresh_placement(&listener);
        }
    }

    fn on_peer_left(&self, peer_id: PeerId) {
        let mut channels = self.channels.lock().unwrap();
        if channels.remove(&peer_id).is_some() {
            // Anything still queued for this peer is abandoned with it.
            info!("peer {} left, channel released", peer_id);
        } else {
            debug!("peer {} left without a channel", peer_id);
        }
    }

    fn new_channel(
        &self,
        peer_id: PeerId,
        position: Position,
        listener: &ListenerState,
        config: &AttenuationConfig,
        gain: f32,
    ) -> PeerChannel {
        PeerChannel::new(
            peer_id,
            position,
            listener,
            config,
            gain,
            self.config.lookahead,
            self.config.max_drift,
            SAMPLE_RATE,
        )
    }

    // ---- control surface --------------------------------------------------

    pub fn set_listener_position(&self, position: Position) {
        self.on_peer_position(self.self_id, position);
    }

    pub fn set_dimension(&self, dimension: Dimension) {
        let listener = {
            let mut l = self.listener.lock().unwrap();
            if l.dimension == dimension {
                return;
            }
            l.dimension = dimension;
            *l
        };
        info!("dimensionality mode set to {}", dimension);
        let mut channels = self.channels.lock().unwrap();
        for ch in channels.values_mut() {
            ch.refresh_placement(&listener);
        }
    }

    pub fn set_peer_volume(&self, peer_id: PeerId, pct: u16) {
        let gain = {
            let mut volumes = self.volumes.lock().unwrap();
            volumes.set_peer(peer_id, pct);
            volumes.gain_for(peer_id)
        };
        let mut channels = self.channels.lock().unwrap();
        if let Some(ch) = channels.get_mut(&peer_id) {
            ch.set_gain(gain);
        }
    }

    pub fn set_master_volume(&self, pct: u16) {
        let volumes = {
            let mut v = self.volumes.lock().unwrap();
            v.set_master(pct);
            v.clone()
        };
        let mut channels = self.channels.lock().unwrap();
        for ch in channels.values_mut() {
            let gain = volumes.gain_for(ch.peer_id());
            ch.set_gain(gain);
        }
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    /// Deafening drops inbound frames at the engine boundary.
    pub fn set_deafened(&self, deafened: bool) {
        self.deafened.store(deafened, Ordering::Relaxed);
        if deafened && !self.is_muted() {
            self.set_muted(true);
        }
    }

    pub fn is_deafened(&self) -> bool {
        self.deafened.load(Ordering::Relaxed)
    }

    pub fn set_threshold(&self, pct: u8) {
        self.threshold_pct.store(pct.min(100), Ordering::Relaxed);
    }

    pub fn set_mic_volume(&self, pct: u16) {
        self.mic_volume_pct.store(pct.min(200), Ordering::Relaxed);
    }

    /// Mic activity 0-100, updated once per capture frame.
    pub fn meter_level(&self) -> u8 {
        self.meter_level.load(Ordering::Relaxed)
    }

    pub fn is_self_speaking(&self) -> bool {
        !self.is_muted()
            && self.meter_level() > self.threshold_pct.load(Ordering::Relaxed)
    }

    pub fn is_peer_speaking(&self, peer_id: PeerId) -> bool {
        let now = self.clock.now();
        let channels = self.channels.lock().unwrap();
        channels
            .get(&peer_id)
            .map(|ch| ch.is_speaking(now, self.config.speaking_timeout))
            .unwrap_or(false)
    }

    pub fn live_peer_count(&self) -> usize {
        self.channels.lock().unwrap().len()
    }

    /// Snapshot of every live channel for the peer list UI.
    pub fn peer_snapshots(&self) -> Vec<PeerSnapshot> {
        let now = self.clock.now();
        let listener = *self.listener.lock().unwrap();
        let channels = self.channels.lock().unwrap();

        let mut snapshots: Vec<PeerSnapshot> = channels
            .values()
            .map(|ch| PeerSnapshot {
                peer_id: ch.peer_id(),
                position: ch.position(),
                distance: listener.position.distance_to(&ch.position()),
                speaking: ch.is_speaking(now, self.config.speaking_timeout),
                gain: ch.gain(),
                attenuation: ch.attenuation(),
            })
            .collect();
        snapshots.sort_by_key(|s| s.peer_id);
        snapshots
    }
}

impl std::fmt::Debug for VoiceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceEngine")
            .field("self_id", &self.self_id)
            .field("live_peers", &self.live_peer_count())
            .finish()
    }
}
