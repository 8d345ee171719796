use serde::{Deserialize, Serialize};

pub const DEFAULT_DURATION_SECS: u64 = 7200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerState {
    Running,
    /// Reached zero
    Expired,
    /// Frozen by a manual submission
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Running(u64),
    /// Returned exactly once, on the tick that reaches zero
    Expired,
    Ignored,
}

/// Colour banding of the clock; presentational only
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum TimeBand {
    #[strum(serialize = "calm")]
    Calm,
    #[strum(serialize = "warning")]
    Warning,
    #[strum(serialize = "critical")]
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBands {
    pub warning_at_secs: u64,
    pub critical_at_secs: u64,
}

impl Default for TimeBands {
    fn default() -> Self {
        Self {
            warning_at_secs: 1800,
            critical_at_secs: 600,
        }
    }
}

impl TimeBands {
    pub fn band_for(&self, remaining: u64) -> TimeBand {
        if remaining > self.warning_at_secs {
            TimeBand::Calm
        } else if remaining >= self.critical_at_secs {
            TimeBand::Warning
        } else {
            TimeBand::Critical
        }
    }
}

/// Whole-second countdown driven by external ticks
#[derive(Debug, Clone)]
pub struct Countdown {
    duration: u64,
    remaining: u64,
    state: TimerState,
    bands: TimeBands,
}

impl Countdown {
    pub fn new(duration: u64, bands: TimeBands) -> Self {
        let state = if duration == 0 {
            TimerState::Expired
        } else {
            TimerState::Running
        };
        Self {
            duration,
            remaining: duration,
            state,
            bands,
        }
    }

    pub fn tick(&mut self) -> TickOutcome {
        if self.state != TimerState::Running {
            return TickOutcome::Ignored;
        }

        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.state = TimerState::Expired;
            TickOutcome::Expired
        } else {
            TickOutcome::Running(self.remaining)
        }
    }

    pub fn stop(&mut self) {
        if self.state == TimerState::Running {
            self.state = TimerState::Stopped;
        }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn duration(&self) -> u64 {
        self.duration
    }

    pub fn elapsed(&self) -> u64 {
        self.duration - self.remaining
    }

    pub fn band(&self) -> TimeBand {
        self.bands.band_for(self.remaining)
    }
}

/// Formats seconds as HH:MM:SS
pub fn format_clock(secs: u64) -> String {
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
