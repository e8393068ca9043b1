use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Where subsystem inputs come from for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingMode {
    /// Live hardware. Inputs are captured.
    Real,
    /// Physics simulation. Inputs are captured.
    Simulated,
    /// Inputs come from a recorded log; no backend is touched.
    Replay,
}

impl OperatingMode {
    /// True when ports read live backends and the logger captures.
    pub fn is_live(&self) -> bool {
        !matches!(self, OperatingMode::Replay)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperatingMode::Real => "real",
            OperatingMode::Simulated => "simulated",
            OperatingMode::Replay => "replay",
        }
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperatingMode {
    type Err = ModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "real" => Ok(OperatingMode::Real),
            "sim" | "simulated" | "simulation" => Ok(OperatingMode::Simulated),
            "replay" => Ok(OperatingMode::Replay),
            other => Err(ModeError::InvalidMode(other.to_string())),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModeError {
    #[error("operating mode already initialized as {current}")]
    AlreadyInitialized { current: OperatingMode },

    #[error("operating mode has not been initialized")]
    NotInitialized,

    #[error("invalid operating mode {0:?} (expected real, simulated or replay)")]
    InvalidMode(String),
}

/// Process-scoped, set-once holder of the operating mode.
///
/// Created explicitly at startup and passed by reference to whatever needs
/// the mode. There is no ambient global.
#[derive(Debug, Default)]
pub struct ModeController {
    mode: OnceLock<OperatingMode>,
}

impl ModeController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initialize(&self, mode: OperatingMode) -> Result<(), ModeError> {
        self.mode
            .set(mode)
            .map_err(|_| ModeError::AlreadyInitialized {
                current: self.mode.get().copied().unwrap_or(mode),
            })?;
        info!("Operating mode initialized: {}", mode);
        Ok(())
    }

    pub fn current_mode(&self) -> Result<OperatingMode, ModeError> {
        self.mode.get().copied().ok_or(ModeError::NotInitialized)
    }

    pub fn is_initialized(&self) -> bool {
        self.mode.get().is_some()
    }
}
