pub mod diagnostics;
pub mod mode;
pub mod reactor;
pub mod session;
pub mod telemetry;
pub mod time;
