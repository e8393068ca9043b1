use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tracing::{debug, error, info};

use super::record::{LogHeader, LogLine, LogRecord};
use super::LogError;
use crate::io::snapshot::InputSnapshot;
use crate::kernel::time::CycleNumber;

pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Key under which cycle markers are sequenced. Not a valid subsystem name
/// for capture.
const CYCLE_STREAM: &str = "";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub lines_written: u64,
    pub records_written: u64,
}

/// Capture side of the input log.
///
/// `capture` validates ordering and hands the record to a dedicated writer
/// thread through a bounded FIFO queue; it never waits on storage. Clones
/// share the same queue and the same per-subsystem ordering table.
#[derive(Clone)]
pub struct InputLogger {
    inner: Arc<LoggerInner>,
}

struct LoggerInner {
    path: PathBuf,
    tx: Mutex<Option<mpsc::Sender<LogLine>>>,
    last_cycles: Mutex<HashMap<String, CycleNumber>>,
    worker: Mutex<Option<JoinHandle<Result<WriterStats, LogError>>>>,
}

impl InputLogger {
    /// Creates a fresh log at `path` and starts the writer thread.
    /// Fails if the file already exists: recorded logs are never reopened for
    /// writing.
    pub fn create(path: impl AsRef<Path>, header: LogHeader, capacity: usize) -> Result<Self, LogError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|source| LogError::Create {
                path: path.clone(),
                source,
            })?;

        let mut out = BufWriter::new(file);
        write_line(&mut out, &LogLine::Header(header.clone()))?;
        out.flush()?;

        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = std::thread::Builder::new()
            .name("cyclelog-writer".to_string())
            .spawn(move || run_writer(out, rx))?;

        info!(path = %path.display(), run_id = %header.run_id, mode = %header.mode, "Input log opened for capture");

        Ok(Self {
            inner: Arc::new(LoggerInner {
                path,
                tx: Mutex::new(Some(tx)),
                last_cycles: Mutex::new(HashMap::new()),
                worker: Mutex::new(Some(worker)),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Queues `snapshot` as the record for (`cycle`, `subsystem`).
    ///
    /// `cycle` must be strictly greater than the last cycle captured for the
    /// same subsystem.
    pub fn capture(&self, cycle: CycleNumber, subsystem: &str, snapshot: &InputSnapshot) -> Result<(), LogError> {
        if subsystem == CYCLE_STREAM {
            return Err(LogError::InvalidSubsystem(subsystem.to_string()));
        }
        let record = LogRecord {
            cycle,
            subsystem: subsystem.to_string(),
            snapshot: snapshot.clone(),
        };
        self.enqueue(subsystem, cycle, LogLine::record(&record))
    }

    /// Queues the marker carrying `cycle`'s timestamp. Markers follow the
    /// same strictly increasing rule as records.
    pub fn begin_cycle(&self, cycle: CycleNumber, timestamp_us: u64) -> Result<(), LogError> {
        self.enqueue(CYCLE_STREAM, cycle, LogLine::Cycle { cycle, timestamp_us })
    }

    /// Last cycle successfully queued for `subsystem`.
    pub fn last_captured(&self, subsystem: &str) -> Option<CycleNumber> {
        self.inner
            .last_cycles
            .lock()
            .ok()
            .and_then(|table| table.get(subsystem).copied())
    }

    fn enqueue(&self, stream: &str, cycle: CycleNumber, line: LogLine) -> Result<(), LogError> {
        let mut table = self.inner.last_cycles.lock().map_err(|_| LogError::WriterClosed)?;
        if let Some(&last) = table.get(stream) {
            if cycle <= last {
                return Err(LogError::OutOfOrderCapture {
                    subsystem: stream.to_string(),
                    cycle,
                    last,
                });
            }
        }

        let guard = self.inner.tx.lock().map_err(|_| LogError::WriterClosed)?;
        let tx = guard.as_ref().ok_or(LogError::WriterClosed)?;
        match tx.try_send(line) {
            Ok(()) => {
                table.insert(stream.to_string(), cycle);
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(LogError::QueueFull {
                subsystem: stream.to_string(),
                cycle,
            }),
            Err(TrySendError::Closed(_)) => Err(LogError::WriterClosed),
        }
    }

    /// Closes the queue and waits for every queued line to reach the file.
    ///
    /// Blocks the caller; run it at shutdown, never inside a cycle. Once
    /// finished, further captures fail with `WriterClosed`.
    pub fn finish(&self) -> Result<WriterStats, LogError> {
        if let Ok(mut tx) = self.inner.tx.lock() {
            tx.take();
        }
        let worker = self
            .inner
            .worker
            .lock()
            .map_err(|_| LogError::WriterClosed)?
            .take()
            .ok_or(LogError::WriterClosed)?;
        let stats = worker.join().map_err(|_| LogError::WriterPanicked)??;
        info!(
            path = %self.inner.path.display(),
            records = stats.records_written,
            "Input log closed"
        );
        Ok(stats)
    }
}

impl std::fmt::Debug for InputLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputLogger").field("path", &self.inner.path).finish()
    }
}

fn write_line<W: Write>(out: &mut W, line: &LogLine) -> Result<(), LogError> {
    serde_json::to_writer(&mut *out, line)?;
    out.write_all(b"\n")?;
    Ok(())
}

/// Writer thread body. Drains the queue in order, flushing whenever it runs
/// dry so a crash loses at most the lines still in flight.
fn run_writer<W: Write>(mut out: W, mut rx: mpsc::Receiver<LogLine>) -> Result<WriterStats, LogError> {
    let mut stats = WriterStats::default();
    let result = loop {
        let line = match rx.try_recv() {
            Ok(line) => line,
            Err(TryRecvError::Empty) => {
                if let Err(e) = out.flush() {
                    break Err(LogError::from(e));
                }
                match rx.blocking_recv() {
                    Some(line) => line,
                    None => break Ok(()),
                }
            }
            Err(TryRecvError::Disconnected) => break Ok(()),
        };

        if let Err(e) = write_line(&mut out, &line) {
            break Err(e);
        }
        stats.lines_written += 1;
        if matches!(line, LogLine::Record { .. }) {
            stats.records_written += 1;
        }
    };

    // Closing the receiver makes later captures fail fast with WriterClosed.
    rx.close();
    match result.and_then(|()| out.flush().map_err(LogError::from)) {
        Ok(()) => {
            debug!(lines = stats.lines_written, "writer drained");
            Ok(stats)
        }
        Err(e) => {
            error!("Input log writer stopped: {}", e);
            Err(e)
        }
    }
}
