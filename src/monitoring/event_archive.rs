use log::debug;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::control_system::event_log::EventRecord;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventArchiveRecord {
    pub seq: u64,
    pub time: String,
    pub message: String,
}

impl From<&EventRecord> for EventArchiveRecord {
    fn from(record: &EventRecord) -> Self {
        Self {
            seq: record.seq,
            time: record.time.to_rfc3339(),
            message: record.message.clone(),
        }
    }
}

/// Appends event-log entries to a CSV file, each entry at most once.
#[derive(Debug)]
pub struct EventArchive {
    path: PathBuf,
    last_seq: Option<u64>,
}

impl EventArchive {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_seq: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the entries newer than the last archived one. Returns how
    /// many rows were written.
    pub fn archive(&mut self, events: &[EventRecord]) -> Result<usize> {
        let fresh: Vec<EventArchiveRecord> = events
            .iter()
            .filter(|e| self.last_seq.map_or(true, |last| e.seq > last))
            .map(EventArchiveRecord::from)
            .collect();
        if fresh.is_empty() {
            return Ok(0);
        }
        log_to_csv(&self.path, &fresh)?;
        self.last_seq = fresh.last().map(|r| r.seq);
        debug!("Archived {} events to {}", fresh.len(), self.path.display());
        Ok(fresh.len())
    }
}

/// Appends rows, writing the header only when the file is new.
fn log_to_csv<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    let file_exists = path.exists();
    let file = OpenOptions::new().append(true).create(true).open(path)?;
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(!file_exists)
        .from_writer(file);
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn read_archive(path: impl AsRef<Path>) -> Result<Vec<EventArchiveRecord>> {
    let file = File::open(path)?;
    let mut rdr = csv::Reader::from_reader(file);
    let mut records = Vec::new();
    for result in rdr.deserialize() {
        records.push(result?);
    }
    Ok(records)
}
