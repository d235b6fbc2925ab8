//! In-memory store backend.
//!
//! Intended for tests and embedded usage, and as a reference implementation of
//! the store traits. [`MemorySink`] records every call in order so ordering
//! properties can be asserted directly.

use crate::record::{GlobalRecord, PrimaryRecord};
use crate::store::traits::{RecordSink, RecordSource, StoreError};

/// A tree held in a vector.
#[derive(Debug, Clone, Default)]
pub struct MemorySource<T> {
    name: String,
    records: Vec<T>,
    reads: Vec<usize>,
}

impl<T> MemorySource<T> {
    #[must_use]
    pub fn new(name: impl Into<String>, records: Vec<T>) -> Self {
        Self {
            name: name.into(),
            records,
            reads: Vec::new(),
        }
    }

    /// Every index read so far, in call order.
    #[must_use]
    pub fn read_log(&self) -> &[usize] {
        &self.reads
    }
}

impl<T: Clone> RecordSource<T> for MemorySource<T> {
    fn len(&self) -> usize {
        self.records.len()
    }

    fn read(&mut self, index: usize) -> Result<T, StoreError> {
        let record = self
            .records
            .get(index)
            .cloned()
            .ok_or_else(|| StoreError::IndexOutOfRange {
                tree: self.name.clone(),
                index,
                len: self.records.len(),
            })?;
        self.reads.push(index);
        Ok(record)
    }
}

/// One call received by a [`MemorySink`].
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    /// `write_global`
    Global(GlobalRecord),
    /// `write_record`
    Record(PrimaryRecord),
    /// `finalize`
    Finalized,
}

/// Sink that keeps everything written to it.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    events: Vec<SinkEvent>,
}

impl MemorySink {
    /// An empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All calls, in order.
    #[must_use]
    pub fn events(&self) -> &[SinkEvent] {
        &self.events
    }

    /// Global records written.
    pub fn globals(&self) -> impl Iterator<Item = &GlobalRecord> {
        self.events.iter().filter_map(|e| match e {
            SinkEvent::Global(g) => Some(g),
            _ => None,
        })
    }

    /// Event records written, in order.
    pub fn records(&self) -> impl Iterator<Item = &PrimaryRecord> {
        self.events.iter().filter_map(|e| match e {
            SinkEvent::Record(r) => Some(r),
            _ => None,
        })
    }

    /// Whether the last call was `finalize`.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        matches!(self.events.last(), Some(SinkEvent::Finalized))
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.is_finalized() {
            return Err(StoreError::BackendError("sink already finalized".to_string()));
        }
        Ok(())
    }
}

impl RecordSink for MemorySink {
    fn write_global(&mut self, global: &GlobalRecord) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.events.push(SinkEvent::Global(global.clone()));
        Ok(())
    }

    fn write_record(&mut self, record: &PrimaryRecord) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.events.push(SinkEvent::Record(record.clone()));
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.events.push(SinkEvent::Finalized);
        Ok(())
    }
}
