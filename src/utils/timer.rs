//! Timer utilities
//!
//! Phase timing for multi-step procedures.

use std::time::{Duration, Instant};

/// Stopwatch that records named phases
#[derive(Debug)]
pub struct PhaseTimer {
    label: String,
    start: Instant,
    phases: Vec<(String, Duration)>,
}

impl PhaseTimer {
    /// Create and start a new timer
    pub fn start(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            start: Instant::now(),
            phases: Vec::new(),
        }
    }

    /// Close the current phase under `name`
    pub fn lap(&mut self, name: impl Into<String>) {
        self.phases.push((name.into(), self.start.elapsed()));
    }

    /// Get total elapsed time
    pub fn total(&self) -> Duration {
        self.start.elapsed()
    }

    /// Duration of each phase, not cumulative
    pub fn phase_times(&self) -> Vec<(String, Duration)> {
        let mut prev = Duration::ZERO;
        self.phases
            .iter()
            .map(|(name, cumulative)| {
                let phase = *cumulative - prev;
                prev = *cumulative;
                (name.clone(), phase)
            })
            .collect()
    }

    /// Log the phases at debug level and return the total
    pub fn finish(self) -> Duration {
        let total = self.total();
        for (name, duration) in self.phase_times() {
            tracing::debug!("{} / {}: {}ms", self.label, name, duration.as_millis());
        }
        tracing::debug!("{}: {}ms total", self.label, total.as_millis());
        total
    }
}
