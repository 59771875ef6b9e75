// src/runner/countdown.rs

/// Result of one per-second tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Running(u32),
    Expired,
}

/// Per-question countdown, decremented once per second by the run registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    limit: u32,
    remaining: u32,
}

impl Countdown {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            remaining: limit,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_expired(&self) -> bool {
        self.remaining == 0
    }

    /// A tick that would land on zero expires the countdown.
    pub fn tick(&mut self) -> Tick {
        if self.remaining <= 1 {
            self.remaining = 0;
            Tick::Expired
        } else {
            self.remaining -= 1;
            Tick::Running(self.remaining)
        }
    }
}
