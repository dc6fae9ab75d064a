//! Per-bay dwell timer.
//!
//! Times are monotonic milliseconds supplied by the caller, so the ledger can
//! be driven by a real clock or a simulated one.

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerRecord {
    running: bool,
    start_ms: u64,
    accumulated_ms: u64,
}

impl TimerRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn start_ms(&self) -> u64 {
        self.start_ms
    }

    /// Start a new episode. No-op while already running, so the start
    /// timestamp of the current episode is never overwritten.
    pub fn start(&mut self, now_ms: u64) {
        if self.running {
            return;
        }
        self.start_ms = now_ms;
        self.accumulated_ms = 0;
        self.running = true;
    }

    /// Stop the current episode. No-op when already stopped.
    pub fn stop(&mut self, now_ms: u64) {
        if !self.running {
            return;
        }
        self.accumulated_ms = now_ms.saturating_sub(self.start_ms);
        self.running = false;
    }

    pub fn elapsed_ms(&self, now_ms: u64) -> u64 {
        if self.running {
            now_ms.saturating_sub(self.start_ms)
        } else {
            self.accumulated_ms
        }
    }

    pub fn elapsed_secs(&self, now_ms: u64) -> u64 {
        self.elapsed_ms(now_ms) / 1000
    }
}
