//! Jitter-absorbing playback scheduler: one cursor per peer channel.

use std::time::Duration;

/// Schedules frame start times for one peer so frames play back-to-back
/// despite irregular network arrival.
#[derive(Debug, Clone, Copy)]
pub struct PlaybackScheduler {
    lookahead: Duration,
    max_drift: Duration,
    next_play_time: Option<Duration>,
}

impl PlaybackScheduler {
    pub fn new(lookahead: Duration, max_drift: Duration) -> Self {
        Self {
            lookahead,
            max_drift,
            next_play_time: None,
        }
    }

    /// Pick the start time for a frame of length `frame_len` arriving at
    /// `now` on the playback clock.
    ///
    /// A fresh or stale cursor starts the frame `lookahead` in the future;
    /// otherwise the frame starts exactly where the previous one ends. When
    /// the advanced cursor has drifted more than `max_drift` ahead of the
    /// clock, it is pulled back to `now + lookahead`, repositioning the next
    /// frame at the cost of a brief skip.
    pub fn schedule(&mut self, now: Duration, frame_len: Duration) -> Duration {
        let start = match self.next_play_time {
            Some(t) if t >= now => t,
            _ => now + self.lookahead,
        };

        let mut next = start + frame_len;
        if next.saturating_sub(now) > self.max_drift {
            next = now + self.lookahead;
        }
        self.next_play_time = Some(next);

        start
    }

    pub fn next_play_time(&self) -> Option<Duration> {
        self.next_play_time
    }
}
