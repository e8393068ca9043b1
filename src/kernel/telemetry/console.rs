use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::kernel::diagnostics::DiagnosticSink;

/// Console log written by the robot controller's user program.
pub const DEFAULT_CONSOLE_PATH: &str = "/home/lvuser/FRC_UserProgram.log";

/// Anything that can be polled for console text produced since the last poll.
pub trait ConsoleSource {
    fn poll_new_text(&mut self) -> String;
}

/// Incremental reader over an append-only text file.
///
/// The byte cursor only moves forward. Rotation or truncation of the file
/// while it is being tailed is unsupported.
pub struct ConsoleTailReader {
    path: PathBuf,
    file: Option<File>,
    cursor: u64,
    pending: Vec<u8>,
    sink: Arc<dyn DiagnosticSink>,
}

impl ConsoleTailReader {
    /// Opens `path` for tailing. A missing file is reported once through
    /// `sink`; the reader then stays empty for its whole lifetime.
    pub fn open(path: impl AsRef<Path>, sink: Arc<dyn DiagnosticSink>) -> Self {
        let path = path.as_ref().to_path_buf();
        let file = match File::open(&path) {
            Ok(f) => Some(f),
            Err(e) => {
                sink.report(
                    &format!("Failed to open console file \"{}\": {}", path.display(), e),
                    false,
                );
                None
            }
        };
        Self {
            path,
            file,
            cursor: 0,
            pending: Vec::new(),
            sink,
        }
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn poll_new_text(&mut self) -> String {
        let Some(file) = self.file.as_mut() else {
            return String::new();
        };

        let mut chunk = Vec::new();
        if let Err(e) = read_from(file, self.cursor, &mut chunk) {
            self.sink.report(
                &format!("Failed to read console file \"{}\": {}", self.path.display(), e),
                false,
            );
            return String::new();
        }
        if chunk.is_empty() {
            return String::new();
        }

        self.cursor += chunk.len() as u64;
        debug!(bytes = chunk.len(), cursor = self.cursor, "console tail advanced");

        self.pending.extend_from_slice(&chunk);
        let (text, rest) = split_utf8(std::mem::take(&mut self.pending));
        self.pending = rest;
        text
    }
}

impl ConsoleSource for ConsoleTailReader {
    fn poll_new_text(&mut self) -> String {
        ConsoleTailReader::poll_new_text(self)
    }
}

fn read_from(file: &mut File, offset: u64, buf: &mut Vec<u8>) -> std::io::Result<usize> {
    file.seek(SeekFrom::Start(offset))?;
    file.read_to_end(buf)
}

/// Decodes `bytes`, holding back an incomplete UTF-8 sequence at the end.
/// Invalid sequences in the middle are replaced with U+FFFD.
fn split_utf8(bytes: Vec<u8>) -> (String, Vec<u8>) {
    let mut out = String::new();
    let mut rest: &[u8] = &bytes;
    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                out.push_str(valid);
                return (out, Vec::new());
            }
            Err(e) => {
                let (valid, after) = rest.split_at(e.valid_up_to());
                out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                match e.error_len() {
                    None => return (out, after.to_vec()),
                    Some(len) => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        rest = &after[len..];
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::split_utf8;

    #[test]
    fn test_split_holds_back_partial_sequence() {
        // "é" is 0xC3 0xA9
        let (text, rest) = split_utf8(vec![b'a', 0xC3]);
        assert_eq!(text, "a");
        assert_eq!(rest, vec![0xC3]);

        let (text, rest) = split_utf8(vec![0xC3, 0xA9, b'\n']);
        assert_eq!(text, "é\n");
        assert!(rest.is_empty());
    }

    #[test]
    fn test_split_replaces_invalid_bytes() {
        let (text, rest) = split_utf8(vec![b'x', 0xFF, b'y']);
        assert_eq!(text, "x\u{FFFD}y");
        assert!(rest.is_empty());
    }
}
