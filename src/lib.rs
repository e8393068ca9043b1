pub mod config;
pub mod error;
pub mod io;
pub mod kernel;
pub mod logger;

// Re-export specific items for convenient access
pub use config::TelemetryConfig;
pub use error::{Error, ErrorCategory, Result};
pub use kernel::mode::{ModeController, OperatingMode};
pub use kernel::reactor::ControlLoop;
pub use kernel::session::Session;
