use std::thread;
use std::time::{Duration, Instant};

/// Paces the render loop to the display refresh.
pub trait RefreshClock {
    /// Blocks until the next refresh is due. Returns false once the clock has
    /// run out and no further frame should be scheduled.
    fn wait_for_refresh(&mut self) -> bool;
}

/// Fixed-rate clock backed by `thread::sleep`, optionally bounded in time.
#[derive(Debug, Clone)]
pub struct FrameClock {
    interval: Duration,
    started: Instant,
    next: Instant,
    limit: Option<Duration>,
    ticks: u64,
}

impl FrameClock {
    pub fn for_rate(frame_rate: u32) -> Self {
        let interval = Duration::from_secs_f64(1.0 / frame_rate.max(1) as f64);
        let now = Instant::now();
        Self {
            interval,
            started: now,
            next: now + interval,
            limit: None,
            ticks: 0,
        }
    }

    /// Stops the clock once `limit` has elapsed since creation.
    pub fn with_limit(mut self, limit: Duration) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

impl RefreshClock for FrameClock {
    fn wait_for_refresh(&mut self) -> bool {
        if self.limit.is_some_and(|limit| self.elapsed() >= limit) {
            return false;
        }

        let now = Instant::now();
        if self.next > now {
            thread::sleep(self.next - now);
            self.next += self.interval;
        } else {
            // Fell behind; drop the missed refreshes instead of bursting.
            self.next = now + self.interval;
        }
        self.ticks += 1;
        true
    }
}

/// Clock that grants a fixed number of refreshes without waiting, for
/// headless rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameBudget {
    remaining: u64,
}

impl FrameBudget {
    pub fn new(refreshes: u64) -> Self {
        Self {
            remaining: refreshes,
        }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl RefreshClock for FrameBudget {
    fn wait_for_refresh(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }
}
