//! File-backed record stores.
//!
//! One store file holds any number of named trees (see [`container`] for the
//! layout). Input files carry the primary and secondary trees; output files
//! carry the global tree and the rewritten primary tree.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  TreeReader<T> (RecordSource)       FileSink (RecordSink)    │
//! │          │                                 │                 │
//! │          ↓                                 ↓                 │
//! │   StoreReader (seek + decode)     StoreWriter (temp+rename)  │
//! │          │                                 │                 │
//! │          └──────────────┬──────────────────┘                 │
//! │                         ↓                                    │
//! │               codec (framing + CRC32)                        │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod codec;
pub mod container;

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tracing::info;

use crate::config::StoreLayout;
use crate::record::{GlobalRecord, PrimaryRecord};
use crate::store::traits::{RecordSink, RecordSource, StoreError};

pub use container::{StoreFooter, StoreReader, StoreWriter, TreeIndex};

/// Configuration for file stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// Whether to fsync before the final rename (slower but safer).
    pub sync_on_finalize: bool,
    /// Largest accepted entry payload (bytes).
    pub max_entry_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sync_on_finalize: true,
            max_entry_size: 64 * 1024 * 1024, // 64 MB
        }
    }
}

impl StoreConfig {
    /// Smallest accepted `max_entry_size`.
    pub const MIN_ENTRY_SIZE: usize = 1024;
    /// Largest accepted `max_entry_size`; frame lengths are 32-bit.
    pub const MAX_ENTRY_SIZE: usize = u32::MAX as usize;

    /// Reject an entry size limit outside `[MIN_ENTRY_SIZE, MAX_ENTRY_SIZE]`.
    pub fn validate(self) -> Result<Self, StoreError> {
        if self.max_entry_size < Self::MIN_ENTRY_SIZE || self.max_entry_size > Self::MAX_ENTRY_SIZE {
            return Err(StoreError::BackendError(format!(
                "max_entry_size must be within [{}, {}] bytes (got {})",
                Self::MIN_ENTRY_SIZE,
                Self::MAX_ENTRY_SIZE,
                self.max_entry_size
            )));
        }
        Ok(self)
    }
}

/// Typed random-access view of one tree in a store file.
///
/// Each `TreeReader` owns its own file handle, so two trees of the same file
/// can be read independently.
#[derive(Debug)]
pub struct TreeReader<T> {
    store: StoreReader,
    tree: String,
    len: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TreeReader<T> {
    /// Open `tree` in the store at `path`.
    ///
    /// # Errors
    /// - any error from [`StoreReader::open`]
    /// - `MissingTree` if the store has no such tree
    pub fn open(path: impl AsRef<Path>, tree: &str, config: StoreConfig) -> Result<Self, StoreError> {
        let store = StoreReader::open(path, config.validate()?)?;
        let len = store.tree_len(tree).ok_or_else(|| StoreError::MissingTree {
            store: store.path().display().to_string(),
            name: tree.to_string(),
        })?;
        Ok(Self {
            store,
            tree: tree.to_string(),
            len,
            _marker: PhantomData,
        })
    }

    /// Tree name.
    #[must_use]
    pub fn tree(&self) -> &str {
        &self.tree
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &StoreReader {
        &self.store
    }
}

impl<T: DeserializeOwned> RecordSource<T> for TreeReader<T> {
    fn len(&self) -> usize {
        self.len
    }

    fn read(&mut self, index: usize) -> Result<T, StoreError> {
        self.store.read(&self.tree, index)
    }
}

/// Output store writing the global and primary trees of a [`StoreLayout`].
#[derive(Debug)]
pub struct FileSink {
    writer: Option<StoreWriter>,
    layout: StoreLayout,
    path: PathBuf,
}

impl FileSink {
    /// Start a new output store at `path`. Nothing appears at `path` until
    /// [`RecordSink::finalize`] succeeds.
    pub fn create(path: impl Into<PathBuf>, layout: StoreLayout, config: StoreConfig) -> Result<Self, StoreError> {
        let path = path.into();
        let mut writer = StoreWriter::create(path.clone(), config.validate()?)?;
        writer.declare_tree(&layout.global_tree);
        writer.declare_tree(&layout.primary_tree);
        info!("@@ Creating output file: {}", path.display());
        Ok(Self {
            writer: Some(writer),
            layout,
            path,
        })
    }

    /// Final output path; it only exists after finalize.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn writer(&mut self) -> Result<&mut StoreWriter, StoreError> {
        self.writer
            .as_mut()
            .ok_or_else(|| StoreError::BackendError("output store already finalized".to_string()))
    }
}

impl RecordSink for FileSink {
    fn write_global(&mut self, global: &GlobalRecord) -> Result<(), StoreError> {
        let tree = self.layout.global_tree.clone();
        self.writer()?.append(&tree, global)?;
        Ok(())
    }

    fn write_record(&mut self, record: &PrimaryRecord) -> Result<(), StoreError> {
        let tree = self.layout.primary_tree.clone();
        self.writer()?.append(&tree, record)?;
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), StoreError> {
        let writer = self
            .writer
            .take()
            .ok_or_else(|| StoreError::BackendError("output store already finalized".to_string()))?;
        info!(
            "@@ - Writing {} ({} entries), {} ({} entries)",
            self.layout.global_tree,
            writer.entries(&self.layout.global_tree),
            self.layout.primary_tree,
            writer.entries(&self.layout.primary_tree)
        );
        writer.finalize()?;
        info!("@@ Closing output");
        Ok(())
    }
}
