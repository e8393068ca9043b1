use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::kernel::mode::{ModeError, OperatingMode};
use crate::kernel::telemetry::DEFAULT_CONSOLE_PATH;
use crate::kernel::time::CYCLE_MS;
use crate::logger::DEFAULT_QUEUE_CAPACITY;

pub const ENV_MODE: &str = "CYCLELOG_MODE";
pub const ENV_LOG: &str = "CYCLELOG_LOG";
pub const ENV_CONSOLE: &str = "CYCLELOG_CONSOLE";
pub const ENV_PERIOD_MS: &str = "CYCLELOG_PERIOD_MS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Mode(#[from] ModeError),

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    #[error("replay mode requires a log path")]
    MissingReplayLog,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// One of "real", "simulated", "replay". Parsed by `operating_mode`.
    pub mode: String,
    /// Log to create (Real/Simulated) or to replay. Capture is disabled when
    /// absent in live modes.
    pub log_path: Option<PathBuf>,
    pub console_path: PathBuf,
    pub cycle_period_ms: u64,
    pub queue_capacity: usize,
    /// Poll the console once every this many cycles. Zero disables polling.
    pub console_poll_every: u64,
    pub print_epochs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            mode: OperatingMode::Simulated.as_str().to_string(),
            log_path: None,
            console_path: PathBuf::from(DEFAULT_CONSOLE_PATH),
            cycle_period_ms: CYCLE_MS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            console_poll_every: 1,
            print_epochs: true,
        }
    }
}

impl TelemetryConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overrides fields from the process environment.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    /// Overrides fields from `lookup`, keyed by the `CYCLELOG_*` names.
    pub fn apply_vars<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = lookup(ENV_MODE) {
            self.mode = mode;
        }
        if let Some(log) = lookup(ENV_LOG) {
            self.log_path = Some(PathBuf::from(log));
        }
        if let Some(console) = lookup(ENV_CONSOLE) {
            self.console_path = PathBuf::from(console);
        }
        if let Some(period) = lookup(ENV_PERIOD_MS) {
            self.cycle_period_ms = period.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: ENV_PERIOD_MS,
                value: period.clone(),
            })?;
        }
        Ok(self)
    }

    pub fn operating_mode(&self) -> Result<OperatingMode, ConfigError> {
        Ok(self.mode.parse()?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mode = self.operating_mode()?;
        if self.cycle_period_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "cycle_period_ms",
                value: "0".to_string(),
            });
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "queue_capacity",
                value: "0".to_string(),
            });
        }
        if mode == OperatingMode::Replay && self.log_path.is_none() {
            return Err(ConfigError::MissingReplayLog);
        }
        Ok(())
    }

    pub fn cycle_period_us(&self) -> u64 {
        self.cycle_period_ms * 1_000
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = TelemetryConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cycle_period_ms, 20);
        assert_eq!(config.operating_mode().unwrap(), OperatingMode::Simulated);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: TelemetryConfig = serde_json::from_str(r#"{"mode":"real","queue_capacity":8}"#).unwrap();
        assert_eq!(config.operating_mode().unwrap(), OperatingMode::Real);
        assert_eq!(config.queue_capacity, 8);
        assert_eq!(config.console_path, PathBuf::from(DEFAULT_CONSOLE_PATH));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [(ENV_MODE, "replay"), (ENV_LOG, "/tmp/run.jsonl"), (ENV_PERIOD_MS, "10")]
            .into_iter()
            .collect();
        let config = TelemetryConfig::default()
            .apply_vars(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.operating_mode().unwrap(), OperatingMode::Replay);
        assert_eq!(config.log_path, Some(PathBuf::from("/tmp/run.jsonl")));
        assert_eq!(config.cycle_period_us(), 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_mode_is_rejected() {
        let config = TelemetryConfig {
            mode: "turbo".to_string(),
            ..TelemetryConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Mode(ModeError::InvalidMode(_)))
        ));
    }

    #[test]
    fn test_replay_requires_log() {
        let config = TelemetryConfig {
            mode: "replay".to_string(),
            ..TelemetryConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::MissingReplayLog)));
    }

    #[test]
    fn test_bad_period_is_rejected() {
        let err = TelemetryConfig::default()
            .apply_vars(|k| (k == ENV_PERIOD_MS).then(|| "fast".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: ENV_PERIOD_MS, .. }));
    }
}
