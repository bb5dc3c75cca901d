use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Monotonic playback timeline read by the scheduler and the render path.
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;
}

/// Sample-accurate clock: time is the number of frames the output stream has
/// handed to the device, advanced once per render block.
pub struct SampleClock {
    frames: AtomicU64,
    sample_rate: u32,
}

impl SampleClock {
    pub fn new(sample_rate: u32) -> Arc<Self> {
        Arc::new(Self {
            frames: AtomicU64::new(0),
            sample_rate,
        })
    }

    pub fn advance(&self, frames: u64) {
        self.frames.fetch_add(frames, Ordering::Release);
    }
}

impl Clock for SampleClock {
    fn now(&self) -> Duration {
        let frames = self.frames.load(Ordering::Acquire);
        Duration::from_secs_f64(frames as f64 / self.sample_rate as f64)
    }
}

/// Hand-driven clock for tests and offline runs.
#[derive(Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, to: Duration) {
        *self.now.lock().unwrap() = to;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock().unwrap()
    }
}
