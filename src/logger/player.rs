use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::info;

use super::record::{decode_fields, LogHeader, LogLine, LOG_SCHEMA_VERSION};
use super::LogError;
use crate::io::snapshot::InputSnapshot;
use crate::kernel::time::CycleNumber;

/// Replay side of the input log.
///
/// The whole log is loaded and indexed when opened; lookups afterwards are
/// pure in-memory reads through `&self`, so repeated replays of the same
/// cycle range return identical snapshots.
#[derive(Debug)]
pub struct LogPlayer {
    header: LogHeader,
    records: HashMap<String, BTreeMap<CycleNumber, InputSnapshot>>,
    timestamps: BTreeMap<CycleNumber, u64>,
}

impl LogPlayer {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LogError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| LogError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let player = Self::from_reader(BufReader::new(file))?;
        info!(
            path = %path.display(),
            run_id = %player.header.run_id,
            subsystems = player.records.len(),
            cycles = player.timestamps.len(),
            "Input log loaded for replay"
        );
        Ok(player)
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, LogError> {
        let mut lines = reader.lines().enumerate();

        let header = match lines.next() {
            Some((_, line)) => match serde_json::from_str::<LogLine>(&line?) {
                Ok(LogLine::Header(header)) => header,
                Ok(_) => return Err(malformed(1, "first line is not a header")),
                Err(e) => return Err(malformed(1, e)),
            },
            None => return Err(malformed(1, "log is empty")),
        };
        if header.schema_version != LOG_SCHEMA_VERSION {
            return Err(LogError::IncompatibleSchema {
                found: header.schema_version,
                expected: LOG_SCHEMA_VERSION.to_string(),
            });
        }

        let mut records: HashMap<String, BTreeMap<CycleNumber, InputSnapshot>> = HashMap::new();
        let mut timestamps = BTreeMap::new();

        for (idx, line) in lines {
            let line_no = idx + 1;
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LogLine>(&line).map_err(|e| malformed(line_no, e))? {
                LogLine::Header(_) => return Err(malformed(line_no, "unexpected second header")),
                LogLine::Cycle { cycle, timestamp_us } => {
                    if let Some((&last, _)) = timestamps.last_key_value() {
                        if cycle <= last {
                            return Err(malformed(line_no, format!("cycle marker {cycle} after {last}")));
                        }
                    }
                    timestamps.insert(cycle, timestamp_us);
                }
                LogLine::Record { cycle, subsystem, fields } => {
                    let snapshot = decode_fields(&fields).map_err(|e| malformed(line_no, e))?;
                    let stream = records.entry(subsystem.clone()).or_default();
                    if let Some((&last, _)) = stream.last_key_value() {
                        if cycle <= last {
                            return Err(malformed(
                                line_no,
                                format!("record for {subsystem} at cycle {cycle} after {last}"),
                            ));
                        }
                    }
                    stream.insert(cycle, snapshot);
                }
            }
        }

        Ok(Self {
            header,
            records,
            timestamps,
        })
    }

    pub fn header(&self) -> &LogHeader {
        &self.header
    }

    /// Recorded snapshot for exactly (`cycle`, `subsystem`).
    ///
    /// A gap or a cycle past the end of the subsystem's stream is
    /// `ReplayExhausted`; callers treat it as the end of the recorded run.
    pub fn next(&self, cycle: CycleNumber, subsystem: &str) -> Result<InputSnapshot, LogError> {
        self.records
            .get(subsystem)
            .and_then(|stream| stream.get(&cycle))
            .cloned()
            .ok_or_else(|| LogError::ReplayExhausted {
                subsystem: subsystem.to_string(),
                cycle,
            })
    }

    pub fn timestamp_at(&self, cycle: CycleNumber) -> Option<u64> {
        self.timestamps.get(&cycle).copied()
    }

    /// Highest cycle carrying either a marker or a record.
    pub fn last_cycle(&self) -> Option<CycleNumber> {
        let markers = self.timestamps.keys().next_back().copied();
        let records = self
            .records
            .values()
            .filter_map(|stream| stream.keys().next_back().copied())
            .max();
        markers.max(records)
    }

    pub fn last_cycle_for(&self, subsystem: &str) -> Option<CycleNumber> {
        self.records
            .get(subsystem)
            .and_then(|stream| stream.keys().next_back().copied())
    }

    /// Recorded subsystem names, sorted.
    pub fn subsystems(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.records.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn record_count(&self) -> usize {
        self.records.values().map(BTreeMap::len).sum()
    }
}

fn malformed(line: usize, reason: impl ToString) -> LogError {
    LogError::MalformedLog {
        line,
        reason: reason.to_string(),
    }
}
