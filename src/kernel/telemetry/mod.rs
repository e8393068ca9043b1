//! Per-cycle instrumentation: epoch timing and console tailing.
//!
//! # INVARIANT
//! Telemetry is a side-effect layer. Nothing recorded here may feed back
//! into control decisions; replayed runs must behave identically whether or
//! not a tracer or console source is attached.

pub mod console;
pub mod tracer;

pub use console::{ConsoleSource, ConsoleTailReader, DEFAULT_CONSOLE_PATH};
pub use tracer::{EpochSample, EpochTracer, TracerState, MIN_PRINT_PERIOD_US};
