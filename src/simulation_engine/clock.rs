use std::time::Duration;
use tokio::time::Instant;

/// Monotonic simulation clock shared by all schedules of one run.
///
/// Backed by tokio's clock so a paused test runtime drives it deterministically.
#[derive(Debug, Clone, Copy)]
pub struct SimClock {
    started: Instant,
}

impl SimClock {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn started_at(&self) -> Instant {
        self.started
    }

    /// Time since the run started.
    pub fn now(&self) -> Duration {
        self.started.elapsed()
    }
}
