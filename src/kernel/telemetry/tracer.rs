use std::fmt::Write as _;
use std::sync::Arc;

use crate::kernel::diagnostics::DiagnosticSink;
use crate::kernel::time::TimeSource;

/// Minimum spacing between two emitted epoch reports.
pub const MIN_PRINT_PERIOD_US: u64 = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochSample {
    pub label: String,
    pub duration_us: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracerState {
    Idle,
    Running,
}

/// Partitions a cycle's elapsed time into named epochs.
///
/// Call `reset_timer` before the traced work, then `add_epoch` right after
/// each phase finishes. Each epoch measures the time since the previous
/// reset-or-epoch boundary. A label that repeats inside one window replaces
/// its earlier duration and keeps its original position.
pub struct EpochTracer {
    clock: Arc<dyn TimeSource>,
    epochs: Vec<EpochSample>,
    start_us: u64,
    last_print_us: Option<u64>,
    state: TracerState,
}

impl EpochTracer {
    pub fn new(clock: Arc<dyn TimeSource>) -> Self {
        let start_us = clock.now_micros();
        Self {
            clock,
            epochs: Vec::new(),
            start_us,
            last_print_us: None,
            state: TracerState::Idle,
        }
    }

    pub fn state(&self) -> TracerState {
        self.state
    }

    /// Drops every epoch and restarts the timer.
    pub fn clear_epochs(&mut self) {
        self.epochs.clear();
        self.start_us = self.clock.now_micros();
        self.state = TracerState::Idle;
    }

    pub fn reset_timer(&mut self) {
        self.start_us = self.clock.now_micros();
        self.state = TracerState::Running;
    }

    pub fn add_epoch(&mut self, label: &str) {
        let now = self.clock.now_micros();
        let duration_us = now.saturating_sub(self.start_us);
        match self.epochs.iter_mut().find(|e| e.label == label) {
            Some(existing) => existing.duration_us = duration_us,
            None => self.epochs.push(EpochSample {
                label: label.to_string(),
                duration_us,
            }),
        }
        self.start_us = now;
    }

    pub fn epochs(&self) -> &[EpochSample] {
        &self.epochs
    }

    pub fn total_us(&self) -> u64 {
        self.epochs.iter().map(|e| e.duration_us).sum()
    }

    /// Emits the accumulated epochs to `output`, at most once per
    /// `MIN_PRINT_PERIOD_US`. Returns whether a report went out.
    ///
    /// With no epochs recorded nothing is emitted and the throttle window is
    /// left untouched.
    pub fn print_epochs<F>(&mut self, mut output: F) -> bool
    where
        F: FnMut(&str),
    {
        let now = self.clock.now_micros();
        if let Some(last) = self.last_print_us {
            if now.saturating_sub(last) < MIN_PRINT_PERIOD_US {
                return false;
            }
        }
        if self.epochs.is_empty() {
            return false;
        }

        let mut report = String::new();
        for epoch in &self.epochs {
            let _ = writeln!(report, "\t{}: {:.6}s", epoch.label, epoch.duration_us as f64 / 1.0e6);
        }
        self.last_print_us = Some(now);
        output(&report);
        true
    }

    /// Same as `print_epochs`, routed to a sink as a non-fatal warning.
    pub fn print_epochs_to(&mut self, sink: &dyn DiagnosticSink) -> bool {
        self.print_epochs(|report| sink.report(report, false))
    }
}

impl std::fmt::Debug for EpochTracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EpochTracer")
            .field("epochs", &self.epochs)
            .field("start_us", &self.start_us)
            .field("last_print_us", &self.last_print_us)
            .field("state", &self.state)
            .finish()
    }
}
