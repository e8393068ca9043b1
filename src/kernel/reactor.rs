use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::time::{interval, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::session::Session;
use super::telemetry::{ConsoleSource, EpochTracer};
use super::time::{CycleNumber, MonotonicClock};
use crate::config::TelemetryConfig;
use crate::io::port::IoPort;
use crate::io::snapshot::InputSnapshot;
use crate::logger::{LogError, WriterStats};

#[derive(Debug, Clone, Copy)]
pub struct LoopConfig {
    pub period_ms: u64,
    pub console_poll_every: u64,
    pub print_epochs: bool,
}

impl From<&TelemetryConfig> for LoopConfig {
    fn from(config: &TelemetryConfig) -> Self {
        Self {
            period_ms: config.cycle_period_ms,
            console_poll_every: config.console_poll_every,
            print_epochs: config.print_epochs,
        }
    }
}

/// Outcome of one `tick_step`.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub cycle: CycleNumber,
    pub timestamp_us: u64,
    /// Ports refreshed successfully this cycle, with their snapshots.
    pub inputs: Vec<(String, InputSnapshot)>,
    /// Ports halted during this cycle.
    pub halted: Vec<String>,
    pub console: String,
    /// Set when the cycle clock itself ran past the end of a replayed log.
    pub run_complete: bool,
}

/// Fixed-period driver: refreshes every bound port once per cycle, traces
/// the phases, and tails the console.
pub struct ControlLoop {
    session: Session,
    ports: Vec<Box<dyn IoPort>>,
    halted: BTreeSet<String>,
    tracer: EpochTracer,
    console: Option<Box<dyn ConsoleSource>>,
    config: LoopConfig,
    pub cycle: CycleNumber,
}

impl ControlLoop {
    pub fn new(session: Session, config: LoopConfig) -> Self {
        Self {
            session,
            ports: Vec::new(),
            halted: BTreeSet::new(),
            tracer: EpochTracer::new(Arc::new(MonotonicClock::new())),
            console: None,
            config,
            cycle: CycleNumber::new(),
        }
    }

    pub fn with_tracer(mut self, tracer: EpochTracer) -> Self {
        self.tracer = tracer;
        self
    }

    pub fn with_console(mut self, console: Box<dyn ConsoleSource>) -> Self {
        self.console = Some(console);
        self
    }

    pub fn add_port(&mut self, port: Box<dyn IoPort>) {
        self.ports.push(port);
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn tracer(&self) -> &EpochTracer {
        &self.tracer
    }

    pub fn port(&self, name: &str) -> Option<&dyn IoPort> {
        self.ports.iter().find(|p| p.name() == name).map(|p| p.as_ref())
    }

    pub fn port_mut(&mut self, name: &str) -> Option<&mut Box<dyn IoPort>> {
        self.ports.iter_mut().find(|p| p.name() == name)
    }

    pub fn is_halted(&self, name: &str) -> bool {
        self.halted.contains(name)
    }

    /// True once every port has halted (or a replayed log is over).
    pub fn is_finished(&self) -> bool {
        !self.ports.is_empty() && self.halted.len() == self.ports.len()
    }

    /// Runs one cycle. The cycle number advances first; everything below
    /// happens in the context of the new cycle.
    pub fn tick_step(&mut self) -> CycleReport {
        self.cycle = self.cycle.next();
        self.tracer.clear_epochs();
        self.tracer.reset_timer();

        let sink = self.session.sink();
        let mut report = CycleReport {
            cycle: self.cycle,
            ..CycleReport::default()
        };

        match self.session.begin_cycle(self.cycle) {
            Ok(ts) => report.timestamp_us = ts,
            Err(LogError::RunEnded { .. }) => {
                info!("Recorded run ended at cycle {}", self.cycle);
                for port in &self.ports {
                    if self.halted.insert(port.name().to_string()) {
                        report.halted.push(port.name().to_string());
                    }
                }
                report.run_complete = true;
                return report;
            }
            Err(e) => sink.report(&format!("cycle {} marker not captured: {}", self.cycle, e), false),
        }
        self.tracer.add_epoch("begin_cycle");

        for port in self.ports.iter_mut() {
            let name = port.name().to_string();
            if self.halted.contains(&name) {
                continue;
            }
            match port.refresh_inputs(self.cycle) {
                Ok(snapshot) => report.inputs.push((name.clone(), snapshot)),
                Err(e) if e.is_replay_exhausted() => {
                    info!(subsystem = %name, cycle = %self.cycle, "replay exhausted; halting subsystem");
                    self.halted.insert(name.clone());
                    report.halted.push(name.clone());
                }
                Err(e) => sink.report(&format!("{} refresh failed at cycle {}: {}", name, self.cycle, e), false),
            }
            self.tracer.add_epoch(&name);
        }

        if let Some(console) = self.console.as_mut() {
            let every = self.config.console_poll_every;
            if every > 0 && self.cycle.value() % every == 0 {
                report.console = console.poll_new_text();
                self.tracer.add_epoch("console");
            }
        }

        if self.config.print_epochs {
            self.tracer.print_epochs_to(sink.as_ref());
        }

        debug!(cycle = %self.cycle, total_us = self.tracer.total_us(), "cycle complete");
        report
    }

    /// Drives `tick_step` every `period_ms` until all ports halt or `cancel`
    /// fires.
    pub async fn run(&mut self, cancel: CancellationToken) {
        info!("Control loop started. Period: {}ms, mode: {}", self.config.period_ms, self.session.mode());

        let mut cadence = interval(Duration::from_millis(self.config.period_ms));
        cadence.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Control loop cancelled at cycle {}", self.cycle);
                    break;
                }
                _ = cadence.tick() => {}
            }

            let report = self.tick_step();
            if !report.console.is_empty() {
                info!(target: "cyclelog::console", "{}", report.console.trim_end());
            }
            if report.run_complete || self.is_finished() {
                info!("All subsystems halted after cycle {}", self.cycle);
                break;
            }
        }
    }

    /// Closes the capture log. Call once the loop has stopped.
    pub fn shutdown(&self) -> Result<Option<WriterStats>, LogError> {
        let stats = self.session.finish();
        if let Err(e) = &stats {
            warn!("Input log did not close cleanly: {}", e);
        }
        stats
    }
}
