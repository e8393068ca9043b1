//! Crate-wide error type.

use thiserror::Error;

use crate::config::ConfigError;
use crate::io::port::PortError;
use crate::kernel::mode::ModeError;
use crate::logger::LogError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Mode(#[from] ModeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Log(#[from] LogError),

    #[error(transparent)]
    Port(#[from] PortError),
}

/// How the control loop is expected to react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad startup state. Fatal, not retried.
    Configuration,
    /// Capture or replay sequencing. Halt the affected subsystem.
    Sequencing,
    /// A resource is missing; the component degrades and keeps going.
    ResourceUnavailable,
    /// The caller asked for something forbidden in the current mode.
    RejectedOperation,
    /// Storage failure.
    Io,
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Mode(_) | Error::Config(_) => ErrorCategory::Configuration,
            Error::Log(e) => log_category(e),
            Error::Port(PortError::ReplayWriteRejected { .. }) => ErrorCategory::RejectedOperation,
            Error::Port(PortError::Backend { .. }) => ErrorCategory::ResourceUnavailable,
            Error::Port(PortError::Log(e)) => log_category(e),
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.category() == ErrorCategory::Configuration
    }
}

fn log_category(e: &LogError) -> ErrorCategory {
    match e {
        LogError::OutOfOrderCapture { .. }
        | LogError::ReplayExhausted { .. }
        | LogError::RunEnded { .. }
        | LogError::QueueFull { .. } => ErrorCategory::Sequencing,
        LogError::MalformedLog { .. }
        | LogError::IncompatibleSchema { .. }
        | LogError::InvalidSubsystem(_)
        | LogError::Create { .. }
        | LogError::Open { .. } => ErrorCategory::Configuration,
        LogError::WriterClosed | LogError::WriterPanicked | LogError::Io(_) | LogError::Json(_) => ErrorCategory::Io,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::mode::OperatingMode;
    use crate::kernel::time::CycleNumber;

    #[test]
    fn test_categories() {
        let double_init = Error::from(ModeError::AlreadyInitialized {
            current: OperatingMode::Real,
        });
        assert_eq!(double_init.category(), ErrorCategory::Configuration);
        assert!(double_init.is_fatal());

        let exhausted = Error::from(PortError::from(LogError::ReplayExhausted {
            subsystem: "Arm".to_string(),
            cycle: CycleNumber(9),
        }));
        assert_eq!(exhausted.category(), ErrorCategory::Sequencing);
        assert!(!exhausted.is_fatal());

        let rejected = Error::from(PortError::ReplayWriteRejected {
            subsystem: "Arm".to_string(),
        });
        assert_eq!(rejected.category(), ErrorCategory::RejectedOperation);
    }
}
