//! Persistence collaborators for accepted events

use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use vitalwatch_core::{Error, EventRecord, Result};

/// Accepts finalised event records. Failures are logged by the caller and
/// never stop processing.
pub trait EventStore: Send + Sync {
    fn record(&self, record: &EventRecord) -> Result<()>;
}

/// Bounded in-memory history, oldest dropped first
pub struct MemoryEventStore {
    records: RwLock<VecDeque<EventRecord>>,
    capacity: usize,
}

impl Default for MemoryEventStore {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl MemoryEventStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    pub fn records(&self) -> Vec<EventRecord> {
        self.records.read().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl EventStore for MemoryEventStore {
    fn record(&self, record: &EventRecord) -> Result<()> {
        let mut records = self.records.write();
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record.clone());
        Ok(())
    }
}

/// Appends one JSON object per record to a file
pub struct JsonlEventStore {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonlEventStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventStore for JsonlEventStore {
    fn record(&self, record: &EventRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;
        let mut writer = self.writer.lock();
        writeln!(writer, "{}", line)
            .and_then(|_| writer.flush())
            .map_err(|e| Error::Persistence(format!("{}: {}", self.path.display(), e)))?;
        debug!(event_type = %record.event_type, path = %self.path.display(), "Event persisted");
        Ok(())
    }
}
