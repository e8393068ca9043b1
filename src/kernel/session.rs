use std::sync::Arc;

use tracing::{info, warn};

use super::diagnostics::DiagnosticSink;
use super::mode::{ModeController, OperatingMode};
use super::time::{CycleNumber, ManualClock, MonotonicClock, ReplayClock, TimeSource};
use crate::config::{ConfigError, TelemetryConfig};
use crate::error::Error;
use crate::io::port::{BackendKind, InputSource, IoPort, LivePort, ReplayPort};
use crate::logger::{InputLogger, LogError, LogHeader, LogPlayer, WriterStats};

enum Recorder {
    Capture(InputLogger),
    Replay(Arc<LogPlayer>),
    Disabled,
}

enum CycleClock {
    Real(Arc<MonotonicClock>),
    Simulated(Arc<ManualClock>),
    Replay(Arc<ReplayClock>),
}

/// Process-scoped wiring derived from the operating mode.
///
/// Holds the single log writer or the single log player, the cycle clock,
/// and the diagnostics sink. Ports are bound through `bind_port`, which
/// resolves the backend once so no port branches on mode afterwards.
pub struct Session {
    mode: OperatingMode,
    recorder: Recorder,
    clock: CycleClock,
    sink: Arc<dyn DiagnosticSink>,
    cycle_period_us: u64,
}

impl Session {
    /// Builds the session for the mode already set on `controller`.
    pub fn start(
        controller: &ModeController,
        config: &TelemetryConfig,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Result<Self, Error> {
        let mode = controller.current_mode()?;
        config.validate()?;

        let recorder = match (mode, &config.log_path) {
            (OperatingMode::Replay, Some(path)) => Recorder::Replay(Arc::new(LogPlayer::open(path)?)),
            (OperatingMode::Replay, None) => return Err(ConfigError::MissingReplayLog.into()),
            (_, Some(path)) => {
                Recorder::Capture(InputLogger::create(path, LogHeader::new(mode), config.queue_capacity)?)
            }
            (_, None) => {
                warn!("No log path configured; inputs will not be captured");
                Recorder::Disabled
            }
        };

        let clock = match (&recorder, mode) {
            (Recorder::Replay(player), _) => CycleClock::Replay(Arc::new(ReplayClock::new(player.clone()))),
            (_, OperatingMode::Simulated) => CycleClock::Simulated(Arc::new(ManualClock::new(0))),
            _ => CycleClock::Real(Arc::new(MonotonicClock::new())),
        };

        info!("Session started in {} mode", mode);
        Ok(Self {
            mode,
            recorder,
            clock,
            sink,
            cycle_period_us: config.cycle_period_us(),
        })
    }

    pub fn mode(&self) -> OperatingMode {
        self.mode
    }

    pub fn sink(&self) -> Arc<dyn DiagnosticSink> {
        self.sink.clone()
    }

    /// Time source for the current cycle: live monotonic time, simulated
    /// time, or the recorded timestamps.
    pub fn clock(&self) -> Arc<dyn TimeSource> {
        match &self.clock {
            CycleClock::Real(c) => c.clone(),
            CycleClock::Simulated(c) => c.clone(),
            CycleClock::Replay(c) => c.clone(),
        }
    }

    pub fn logger(&self) -> Option<&InputLogger> {
        match &self.recorder {
            Recorder::Capture(logger) => Some(logger),
            _ => None,
        }
    }

    pub fn player(&self) -> Option<&Arc<LogPlayer>> {
        match &self.recorder {
            Recorder::Replay(player) => Some(player),
            _ => None,
        }
    }

    /// Binds `name` to a backend for this session's mode. The factories are
    /// only invoked for the matching live mode; in replay neither runs.
    pub fn bind_port<R, S>(&self, name: &str, real: R, simulated: S) -> Box<dyn IoPort>
    where
        R: FnOnce() -> Box<dyn InputSource>,
        S: FnOnce() -> Box<dyn InputSource>,
    {
        let logger = self.logger().cloned();
        match (self.mode, &self.recorder) {
            (_, Recorder::Replay(player)) => Box::new(ReplayPort::new(name, player.clone())),
            (OperatingMode::Simulated, _) => Box::new(LivePort::new(name, BackendKind::Simulated, simulated(), logger)),
            _ => Box::new(LivePort::new(name, BackendKind::Real, real(), logger)),
        }
    }

    /// Establishes `cycle`'s timestamp and returns it.
    ///
    /// Live runs stamp the cycle (capturing a marker when logging); replay
    /// seeks the recorded timestamp and reports `RunEnded` once
    /// `cycle` is past the end of the log.
    pub fn begin_cycle(&self, cycle: CycleNumber) -> Result<u64, LogError> {
        let timestamp_us = match &self.clock {
            CycleClock::Real(c) => c.now_micros(),
            CycleClock::Simulated(c) => {
                c.set(cycle.value() * self.cycle_period_us);
                c.now_micros()
            }
            CycleClock::Replay(c) => {
                if let Some(ts) = c.seek(cycle) {
                    return Ok(ts);
                }
                // Logs without a marker for this cycle keep the previous
                // timestamp until the recorded run is over.
                let within_run = self
                    .player()
                    .and_then(|p| p.last_cycle())
                    .is_some_and(|last| cycle <= last);
                if within_run {
                    return Ok(c.now_micros());
                }
                return Err(LogError::RunEnded { cycle });
            }
        };
        if let Recorder::Capture(logger) = &self.recorder {
            logger.begin_cycle(cycle, timestamp_us)?;
        }
        Ok(timestamp_us)
    }

    /// Flushes and closes the capture log, if any.
    pub fn finish(&self) -> Result<Option<WriterStats>, LogError> {
        match &self.recorder {
            Recorder::Capture(logger) => logger.finish().map(Some),
            _ => Ok(None),
        }
    }
}
