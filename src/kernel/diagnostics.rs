use std::sync::Mutex;

use tracing::{error, warn};

/// Receiver for non-fatal diagnostics (missing console file, epoch reports).
///
/// `is_fatal` classifies the message; the sink never terminates the process.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, message: &str, is_fatal: bool);
}

/// Forwards every report to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, message: &str, is_fatal: bool) {
        if is_fatal {
            error!(target: "cyclelog::diagnostics", "{}", message);
        } else {
            warn!(target: "cyclelog::diagnostics", "{}", message);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub message: String,
    pub is_fatal: bool,
}

/// Keeps every report in memory. Handy in tests and for surfacing
/// diagnostics to an outer layer.
#[derive(Debug, Default)]
pub struct RecordingSink {
    reports: Mutex<Vec<Report>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<Report> {
        match self.reports.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.reports().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DiagnosticSink for RecordingSink {
    fn report(&self, message: &str, is_fatal: bool) {
        let entry = Report {
            message: message.to_string(),
            is_fatal,
        };
        match self.reports.lock() {
            Ok(mut guard) => guard.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}
