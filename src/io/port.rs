use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::snapshot::{Actuation, InputSnapshot};
use crate::kernel::time::CycleNumber;
use crate::logger::{InputLogger, LogError, LogPlayer};

#[derive(Debug, Error)]
pub enum PortError {
    #[error("actuation rejected for {subsystem:?}: ports are read-only during replay")]
    ReplayWriteRejected { subsystem: String },

    #[error("backend failure in {subsystem:?}: {message}")]
    Backend { subsystem: String, message: String },

    #[error(transparent)]
    Log(#[from] LogError),
}

impl PortError {
    /// True when the recorded run has nothing more for this port.
    pub fn is_replay_exhausted(&self) -> bool {
        matches!(self, PortError::Log(LogError::ReplayExhausted { .. }))
    }
}

/// Capability set every subsystem backend binding exposes to the control
/// loop. There are no default methods: each binding spells out every
/// operation.
pub trait IoPort {
    fn name(&self) -> &str;

    /// Produces this cycle's input snapshot.
    fn refresh_inputs(&mut self, cycle: CycleNumber) -> Result<InputSnapshot, PortError>;

    fn apply_actuation(&mut self, command: &Actuation) -> Result<(), PortError>;

    /// Most recent snapshot, without reading anything. A refresh that
    /// failed to capture leaves the previous snapshot in place.
    fn current_state(&self) -> &InputSnapshot;
}

/// Live hardware or physics behind a port. Supplied by subsystem code.
pub trait InputSource {
    fn read_inputs(&mut self) -> InputSnapshot;

    fn actuate(&mut self, command: &Actuation) -> Result<(), String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Real,
    Simulated,
}

/// Port reading a live `InputSource`, capturing every snapshot when a logger
/// is attached.
pub struct LivePort {
    name: String,
    kind: BackendKind,
    source: Box<dyn InputSource>,
    logger: Option<InputLogger>,
    state: InputSnapshot,
}

impl LivePort {
    pub fn new(name: &str, kind: BackendKind, source: Box<dyn InputSource>, logger: Option<InputLogger>) -> Self {
        Self {
            name: name.to_string(),
            kind,
            source,
            logger,
            state: InputSnapshot::new(),
        }
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }
}

impl IoPort for LivePort {
    fn name(&self) -> &str {
        &self.name
    }

    fn refresh_inputs(&mut self, cycle: CycleNumber) -> Result<InputSnapshot, PortError> {
        let snapshot = self.source.read_inputs();
        if let Some(logger) = &self.logger {
            logger.capture(cycle, &self.name, &snapshot)?;
        }
        self.state = snapshot.clone();
        Ok(snapshot)
    }

    fn apply_actuation(&mut self, command: &Actuation) -> Result<(), PortError> {
        self.source.actuate(command).map_err(|message| PortError::Backend {
            subsystem: self.name.clone(),
            message,
        })
    }

    fn current_state(&self) -> &InputSnapshot {
        &self.state
    }
}

/// Port fed from a recorded log. Never touches hardware.
pub struct ReplayPort {
    name: String,
    player: Arc<LogPlayer>,
    state: InputSnapshot,
}

impl ReplayPort {
    pub fn new(name: &str, player: Arc<LogPlayer>) -> Self {
        Self {
            name: name.to_string(),
            player,
            state: InputSnapshot::new(),
        }
    }
}

impl IoPort for ReplayPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn refresh_inputs(&mut self, cycle: CycleNumber) -> Result<InputSnapshot, PortError> {
        let snapshot = self.player.next(cycle, &self.name)?;
        self.state = snapshot.clone();
        Ok(snapshot)
    }

    fn apply_actuation(&mut self, _command: &Actuation) -> Result<(), PortError> {
        debug!(subsystem = %self.name, "actuation rejected during replay");
        Err(PortError::ReplayWriteRejected {
            subsystem: self.name.clone(),
        })
    }

    fn current_state(&self) -> &InputSnapshot {
        &self.state
    }
}
