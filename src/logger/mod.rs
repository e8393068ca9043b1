//! Structured input logging: capture every subsystem's inputs each cycle in
//! live runs, and play them back cycle by cycle in replay runs.
//!
//! A process holds either an `InputLogger` (single writer) or a `LogPlayer`
//! (single reader), never both.

use std::path::PathBuf;

use thiserror::Error;

use crate::kernel::time::CycleNumber;

pub mod player;
pub mod record;
pub mod writer;

pub use player::LogPlayer;
pub use record::{LogHeader, LogRecord, LOG_SCHEMA_VERSION};
pub use writer::{InputLogger, WriterStats, DEFAULT_QUEUE_CAPACITY};

#[derive(Debug, Error)]
pub enum LogError {
    #[error("out-of-order capture for {subsystem:?}: cycle {cycle} is not after {last}")]
    OutOfOrderCapture {
        subsystem: String,
        cycle: CycleNumber,
        last: CycleNumber,
    },

    #[error("replay exhausted for {subsystem:?} at cycle {cycle}")]
    ReplayExhausted { subsystem: String, cycle: CycleNumber },

    #[error("recorded run ended before cycle {cycle}")]
    RunEnded { cycle: CycleNumber },

    #[error("capture queue full; record for {subsystem:?} at cycle {cycle} rejected")]
    QueueFull { subsystem: String, cycle: CycleNumber },

    #[error("input log writer is closed")]
    WriterClosed,

    #[error("input log writer thread panicked")]
    WriterPanicked,

    #[error("invalid subsystem name {0:?}")]
    InvalidSubsystem(String),

    #[error("cannot create input log {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot open input log {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed input log at line {line}: {reason}")]
    MalformedLog { line: usize, reason: String },

    #[error("input log schema version {found} is not compatible (expected {expected})")]
    IncompatibleSchema { found: String, expected: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
