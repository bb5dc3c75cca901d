//! Per-peer playback channel: spatial placement, dynamics, gain and the
//! jitter-buffered frame queue.

use crate::compressor::Compressor;
use crate::scheduler::PlaybackScheduler;
use spatial::{compute_placement, AttenuationParams, ListenerState, Placement};
use std::collections::VecDeque;
use std::f32::consts::FRAC_PI_4;
use std::time::Duration;
use voice_core::{AttenuationConfig, PeerId, Position};

/// A decoded frame waiting on the playback timeline.
#[derive(Debug)]
struct ScheduledFrame {
    start: Duration,
    samples: Vec<f32>,
    /// Samples already rendered (or dropped as late).
    cursor: usize,
}

/// Mixing chain and playback queue for one remote speaker.
///
/// Placement, attenuation and gain are read live at render time, so a peer
/// moving while frames sit in the queue is reflected in-flight.
pub struct PeerChannel {
    peer_id: PeerId,
    position: Position,
    placement: Placement,
    attenuation: AttenuationParams,
    compressor: Compressor,
    gain: f32,
    scheduler: PlaybackScheduler,
    queue: VecDeque<ScheduledFrame>,
    last_voice_at: Option<Duration>,
    scratch: Vec<f32>,
    sample_rate: u32,
}

impl PeerChannel {
    pub fn new(
        peer_id: PeerId,
        position: Position,
        listener: &ListenerState,
        config: &AttenuationConfig,
        gain: f32,
        lookahead: Duration,
        max_drift: Duration,
        sample_rate: u32,
    ) -> Self {
        Self {
            peer_id,
            position,
            placement: compute_placement(listener, &position),
            attenuation: AttenuationParams::from_config(config),
            compressor: Compressor::new(sample_rate),
            gain,
            scheduler: PlaybackScheduler::new(lookahead, max_drift),
            queue: VecDeque::new(),
            last_voice_at: None,
            scratch: Vec::new(),
            sample_rate,
        }
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn placement(&self) -> Placement {
        self.placement
    }

    pub fn attenuation(&self) -> AttenuationParams {
        self.attenuation
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
    }

    /// Upsert of positional fields: the mixing chain and schedule cursor are
    /// left untouched.
    pub fn set_position(&mut self, position: Position, listener: &ListenerState) {
        self.position = position;
        self.refresh_placement(listener);
    }

    pub fn refresh_placement(&mut self, listener: &ListenerState) {
        self.placement = compute_placement(listener, &self.position);
    }

    pub fn apply_config(&mut self, config: &AttenuationConfig) {
        self.attenuation = AttenuationParams::from_config(config);
    }

    /// Queue decoded samples, scheduling their start on the playback clock.
    pub fn enqueue(&mut self, samples: Vec<f32>, now: Duration) {
        if samples.is_empty() {
            return;
        }
        let frame_len = samples_to_dur(samples.len(), self.sample_rate);
        let start = self.scheduler.schedule(now, frame_len);
        self.queue.push_back(ScheduledFrame {
            start,
            samples,
            cursor: 0,
        });
        self.last_voice_at = Some(now);
    }

    pub fn next_play_time(&self) -> Option<Duration> {
        self.scheduler.next_play_time()
    }

    pub fn queued_frames(&self) -> usize {
        self.queue.len()
    }

    pub fn is_speaking(&self, now: Duration, timeout: Duration) -> bool {
        self.last_voice_at
            .map(|at| now.saturating_sub(at) <= timeout)
            .unwrap_or(false)
    }

    /// Mix due samples into the interleaved stereo block starting at
    /// `block_start` on the playback clock.
    pub fn render(&mut self, out: &mut [f32], block_start: Duration) {
        let frames_out = out.len() / 2;
        if frames_out == 0 {
            return;
        }
        let block_end = block_start + samples_to_dur(frames_out, self.sample_rate);

        self.scratch.clear();
        self.scratch.resize(frames_out, 0.0);

        let distance_gain = self.attenuation.gain_at(self.placement.magnitude());
        let mut mixed_any = false;

        for frame in self.queue.iter_mut() {
            let remaining = frame.samples.len() - frame.cursor;
            if remaining == 0 {
                continue;
            }

            let play_pos = frame.start + samples_to_dur(frame.cursor, self.sample_rate);
            if play_pos >= block_end {
                continue;
            }

            let mut src = frame.cursor;
            let mut dst = 0usize;
            if play_pos > block_start {
                dst = dur_to_samples(play_pos - block_start, self.sample_rate);
            } else if play_pos < block_start {
                // Running late; the missed span is dropped.
                let missed = dur_to_samples(block_start - play_pos, self.sample_rate);
                src = (src + missed).min(frame.samples.len());
            }
            if dst >= frames_out || src >= frame.samples.len() {
                frame.cursor = src;
                continue;
            }

            let n = (frame.samples.len() - src).min(frames_out - dst);
            for k in 0..n {
                self.scratch[dst + k] += frame.samples[src + k] * distance_gain;
            }
            frame.cursor = src + n;
            mixed_any = true;
        }

        self.queue.retain(|f| f.cursor < f.samples.len());

        // Keep the envelope follower running through silence as well.
        self.compressor.process(&mut self.scratch);

        if !mixed_any {
            return;
        }

        let angle = (self.placement.pan() + 1.0) * FRAC_PI_4;
        let left_gain = angle.cos() * self.gain;
        let right_gain = angle.sin() * self.gain;

        for (i, &s) in self.scratch.iter().enumerate() {
            out[2 * i] += s * left_gain;
            out[2 * i + 1] += s * right_gain;
        }
    }
}

fn samples_to_dur(samples: usize, sample_rate: u32) -> Duration {
    Duration::from_secs_f64(samples as f64 / sample_rate as f64)
}

fn dur_to_samples(dur: Duration, sample_rate: u32) -> usize {
    (dur.as_secs_f64() * sample_rate as f64).round() as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_core::{AttenuationConfig, Dimension};

    const SR: u32 = 48000;
    const LOOKAHEAD: Duration = Duration::from_millis(80);
    const MAX_DRIFT: Duration = Duration::from_millis(500);

    fn listener() -> ListenerState {
        ListenerState {
            position: Position::default(),
            dimension: Dimension::ThreeD,
        }
    }

    fn channel_at(x: f32, z: f32) -> PeerChannel {
        PeerChannel::new(
            PeerId::new(9),
            Position::new(x, 0.0, z, 0.0),
            &listener(),
            &AttenuationConfig::default(),
            1.0,
            LOOKAHEAD,
            MAX_DRIFT,
            SR,
        )
    }

    fn dc_frame(len: usize) -> Vec<f32> {
        vec![0.25; len]
    }

    fn block_energy(out: &[f32]) -> f32 {
        out.iter().map(|s| s * s).sum()
    }

    fn render_block(ch: &mut PeerChannel, start_ms: u64, ms: u64) -> Vec<f32> {
        let frames = (SR as u64 * ms / 1000) as usize;
        let mut out = vec![0.0f32; frames * 2];
        ch.render(&mut out, Duration::from_millis(start_ms));
        out
    }

    #[test]
    fn playback_starts_after_lookahead() {
        let mut ch = channel_at(0.0, 2.0);
        ch.enqueue(dc_frame(1920), Duration::ZERO);

        assert!(block_energy(&render_block(&mut ch, 0, 20)) == 0.0);
        assert!(block_energy(&render_block(&mut ch, 20, 20)) == 0.0);
        assert!(block_energy(&render_block(&mut ch, 40, 20)) == 0.0);
        assert!(block_energy(&render_block(&mut ch, 60, 20)) == 0.0);
        // Frame occupies [80, 120) ms.
        assert!(block_energy(&render_block(&mut ch, 80, 20)) > 0.0);
        assert!(block_energy(&render_block(&mut ch, 100, 20)) > 0.0);
        assert!(block_energy(&render_block(&mut ch, 120, 20)) == 0.0);
    }

    #[test]
    fn back_to_back_frames_render_gap_free() {
        let mut ch = channel_at(0.0, 2.0);
        // Two 40 ms frames arriving together: scheduled [80, 120) and
        // [120, 160).
        ch.enqueue(dc_frame(1920), Duration::ZERO);
        ch.enqueue(dc_frame(1920), Duration::ZERO);

        for start in (80..160).step_by(10) {
            let out = render_block(&mut ch, start, 10);
            let frames = out.len() / 2;
            // Every mono sample position in the span is covered.
            for i in 0..frames {
                let magnitude = out[2 * i].abs() + out[2 * i + 1].abs();
                assert!(magnitude > 0.0, "gap at block {} sample {}", start, i);
            }
        }
        assert_eq!(ch.queued_frames(), 0);
    }

    #[test]
    fn movement_is_reflected_mid_stream() {
        let l = listener();
        let mut ch = channel_at(10.0, 0.0);
        ch.enqueue(dc_frame(1920 * 4), Duration::ZERO);

        let right_biased = render_block(&mut ch, 80, 20);
        let (mut left, mut right) = (0.0f32, 0.0f32);
        for pair in right_biased.chunks_exact(2) {
            left += pair[0].abs();
            right += pair[1].abs();
        }
        assert!(right > left, "peer to the east should favor the right ear");

        // Peer crosses to the other side while its audio is still queued.
        ch.set_position(Position::new(-10.0, 0.0, 0.0, 0.0), &l);

        let left_biased = render_block(&mut ch, 100, 20);
        let (mut left2, mut right2) = (0.0f32, 0.0f32);
        for pair in left_biased.chunks_exact(2) {
            left2 += pair[0].abs();
            right2 += pair[1].abs();
        }
        assert!(left2 > right2, "peer to the west should favor the left ear");
    }

    #[test]
    fn zero_gain_silences_output() {
        let mut ch = channel_at(0.0, 2.0);
        ch.set_gain(0.0);
        ch.enqueue(dc_frame(1920), Duration::ZERO);
        assert!(block_energy(&render_block(&mut ch, 80, 40)) == 0.0);
    }

    #[test]
    fn distance_attenuates_the_mix() {
        let near_out = {
            let mut near = channel_at(0.0, 2.0);
            near.enqueue(dc_frame(1920), Duration::ZERO);
            render_block(&mut near, 80, 20)
        };
        let far_out = {
            let mut far = channel_at(0.0, 145.0);
            far.enqueue(dc_frame(1920), Duration::ZERO);
            render_block(&mut far, 80, 20)
        };
        assert!(block_energy(&near_out) > block_energy(&far_out) * 4.0);
    }

    #[test]
    fn speaking_state_times_out() {
        let timeout = Duration::from_millis(300);
        let mut ch = channel_at(0.0, 2.0);
        assert!(!ch.is_speaking(Duration::ZERO, timeout));

        ch.enqueue(dc_frame(1920), Duration::from_secs(1));
        assert!(ch.is_speaking(Duration::from_millis(1200), timeout));
        assert!(!ch.is_speaking(Duration::from_millis(1400), timeout));
    }
}
