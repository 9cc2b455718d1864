//! Line-oriented input and output seams.
//!
//! The protocol engines never touch files directly: the transmitter pulls
//! payload records from a [`LineSource`] and the receiver pushes delivered
//! lines into a [`LineSink`]. File-backed implementations live here; tests
//! substitute in-memory ones.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::protocol::PAYLOAD_LEN;

/// Produces the full ordered list of payload records for one session.
pub trait LineSource {
    /// Read every input line into a NUL-padded payload record.
    fn read_records(&mut self) -> Result<Vec<[u8; PAYLOAD_LEN]>>;
}

/// Consumes delivered payload lines in sequence order.
pub trait LineSink: Send {
    /// Append one delivered line (newline included) to the output.
    fn append(&mut self, line: &[u8]) -> Result<()>;
}

/// [`LineSource`] reading a text file, one record per line.
#[derive(Debug)]
pub struct FileLineSource {
    reader: BufReader<File>,
}

impl FileLineSource {
    /// Open an input file; unreadable paths are a configuration error.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| Error::config(format!("cannot open {}: {}", path.display(), e)))?;
        Ok(Self {
            reader: BufReader::new(file),
        })
    }
}

impl LineSource for FileLineSource {
    fn read_records(&mut self) -> Result<Vec<[u8; PAYLOAD_LEN]>> {
        let mut records = Vec::new();
        let mut line = Vec::new();
        let mut line_no = 0usize;

        loop {
            line.clear();
            let read = self.reader.read_until(b'\n', &mut line)?;
            if read == 0 {
                break;
            }
            line_no += 1;

            if line.len() > PAYLOAD_LEN {
                return Err(Error::LineTooLong {
                    line: line_no,
                    len: line.len(),
                    max: PAYLOAD_LEN,
                });
            }

            let mut record = [0u8; PAYLOAD_LEN];
            record[..line.len()].copy_from_slice(&line);
            records.push(record);
        }

        Ok(records)
    }
}

/// [`LineSink`] appending raw payload bytes to a file, creating the parent
/// directory on demand.
pub struct FileLineSink {
    file: File,
}

impl FileLineSink {
    /// Open (or create) the output file in append mode.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }
}

impl LineSink for FileLineSink {
    fn append(&mut self, line: &[u8]) -> Result<()> {
        self.file.write_all(line)?;
        Ok(())
    }
}

/// In-memory [`LineSink`] collecting output for assertions.
///
/// Cheaply cloneable so a test can keep a handle while the receiver owns
/// the sink itself.
#[derive(Debug, Default, Clone)]
pub struct MemoryLineSink {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl MemoryLineSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything appended so far.
    pub fn contents(&self) -> Vec<u8> {
        self.bytes.lock().clone()
    }
}

impl LineSink for MemoryLineSink {
    fn append(&mut self, line: &[u8]) -> Result<()> {
        self.bytes.lock().extend_from_slice(line);
        Ok(())
    }
}
