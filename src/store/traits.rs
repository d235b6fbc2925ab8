//! Abstract record store traits.
//!
//! These traits define the contract the pipeline needs from a store:
//! - positional random access over an ordered, fixed-length tree
//! - an append-only sink for the global record and event records

use thiserror::Error;

use crate::record::{GlobalRecord, PrimaryRecord};

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested tree is not in the store.
    #[error("Tree '{name}' not found in {store}")]
    MissingTree {
        /// Store path.
        store: String,
        /// Tree that was asked for.
        name: String,
    },

    /// The store has no valid trailer, so it was never finalized.
    #[error("Store {path} was not finalized (truncated or still being written)")]
    NotFinalized {
        /// Store path.
        path: String,
    },

    /// Positional read past the end of a tree.
    #[error("Index {index} out of range for tree '{tree}' ({len} entries)")]
    IndexOutOfRange {
        /// Tree name.
        tree: String,
        /// Requested index.
        index: usize,
        /// Entries in the tree.
        len: usize,
    },

    /// Data failed an integrity check.
    #[error("Corrupted store: {0}")]
    Corrupted(String),

    /// Serialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Backend error.
    #[error("Store backend error: {0}")]
    BackendError(String),
}

/// Random-access reader over one ordered tree of records.
pub trait RecordSource<T> {
    /// Number of records in the tree.
    fn len(&self) -> usize;

    /// Whether the tree holds no records.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read and deserialize the record at `index`.
    ///
    /// # Errors
    /// `IndexOutOfRange` past the end, or any backend failure.
    fn read(&mut self, index: usize) -> Result<T, StoreError>;
}

/// Append-only writer for an output store.
pub trait RecordSink {
    /// Write the global metadata record.
    fn write_global(&mut self, global: &GlobalRecord) -> Result<(), StoreError>;

    /// Append one event record.
    fn write_record(&mut self, record: &PrimaryRecord) -> Result<(), StoreError>;

    /// Flush and close the output. Nothing may be written afterwards.
    fn finalize(&mut self) -> Result<(), StoreError>;
}

impl<S: RecordSink + ?Sized> RecordSink for &mut S {
    fn write_global(&mut self, global: &GlobalRecord) -> Result<(), StoreError> {
        (**self).write_global(global)
    }

    fn write_record(&mut self, record: &PrimaryRecord) -> Result<(), StoreError> {
        (**self).write_record(record)
    }

    fn finalize(&mut self) -> Result<(), StoreError> {
        (**self).finalize()
    }
}

impl<T, S: RecordSource<T> + ?Sized> RecordSource<T> for &mut S {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn read(&mut self, index: usize) -> Result<T, StoreError> {
        (**self).read(index)
    }
}
