//! Single-file container of named record trees.
//!
//! # File Format
//! ```text
//! [MAGIC: 4 bytes][VERSION: 1 byte]
//! [FRAME: codec-encoded entry]      <- entries of all trees, in append order
//! ...
//! [FRAME: codec-encoded StoreFooter] <- per-tree entry offsets
//! [FOOTER OFFSET: 8 bytes LE][TRAILER MAGIC: 4 bytes]
//! ```
//!
//! The footer and trailer are only written by [`StoreWriter::finalize`]. A file
//! without a valid trailer was never finalized and is rejected on open.
//! Writers stream into a temporary sibling file and rename it into place on
//! finalize, so the final path only ever holds complete stores.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::store::traits::StoreError;

use super::codec;
use super::StoreConfig;

/// Magic bytes closing a finalized store.
pub const TRAILER_MAGIC: [u8; 4] = *b"CAFE";

/// Footer offset plus trailer magic.
const TRAILER_LEN: u64 = 8 + 4;

/// Footer frames hold one offset per entry, so they may exceed a single
/// entry's size limit by a wide margin.
const MAX_FOOTER_SIZE: usize = 1024 * 1024 * 1024;

fn codec_err(e: std::io::Error) -> StoreError {
    match e.kind() {
        ErrorKind::InvalidData => StoreError::Corrupted(e.to_string()),
        ErrorKind::UnexpectedEof => StoreError::Corrupted(format!("truncated frame: {e}")),
        _ => StoreError::Io(e),
    }
}

/// Entry offsets of one tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeIndex {
    /// Byte offset of every entry frame, in entry order.
    pub offsets: Vec<u64>,
}

/// Index written at finalize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreFooter {
    /// Every tree in the store, by name.
    pub trees: BTreeMap<String, TreeIndex>,
    /// When the writer finalized this store.
    pub finalized_at: DateTime<Utc>,
}

/// Streaming writer for a new store.
///
/// Writes to a temporary file first, then atomically renames on finalize.
/// Dropping an unfinalized writer removes the temporary file.
pub struct StoreWriter {
    temp_path: Option<PathBuf>,
    final_path: PathBuf,
    writer: Option<BufWriter<File>>,
    position: u64,
    trees: BTreeMap<String, TreeIndex>,
    config: StoreConfig,
}

impl std::fmt::Debug for StoreWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreWriter")
            .field("final_path", &self.final_path)
            .field("temp_path", &self.temp_path)
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}

impl StoreWriter {
    /// Start writing a store that will appear at `final_path` once finalized.
    pub fn create(final_path: impl Into<PathBuf>, config: StoreConfig) -> Result<Self, StoreError> {
        let final_path = final_path.into();
        let file_name = final_path
            .file_name()
            .ok_or_else(|| StoreError::BackendError(format!("invalid output path {}", final_path.display())))?
            .to_string_lossy()
            .into_owned();
        let temp_path = final_path.with_file_name(format!(".{file_name}.partial-{}", Uuid::new_v4()));

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;

        let mut writer = BufWriter::new(file);
        codec::write_header(&mut writer)?;
        debug!(temp = %temp_path.display(), "opened store for writing");

        Ok(Self {
            temp_path: Some(temp_path),
            final_path,
            writer: Some(writer),
            position: codec::HEADER_LEN,
            trees: BTreeMap::new(),
            config,
        })
    }

    /// Path of the temporary file while the store is being written.
    #[must_use]
    pub fn temp_path(&self) -> Option<&Path> {
        self.temp_path.as_deref()
    }

    /// Make `tree` part of the store even if nothing is appended to it.
    pub fn declare_tree(&mut self, tree: &str) {
        self.trees.entry(tree.to_string()).or_default();
    }

    /// Number of entries appended to `tree` so far.
    #[must_use]
    pub fn entries(&self, tree: &str) -> usize {
        self.trees.get(tree).map_or(0, |t| t.offsets.len())
    }

    /// Append one entry to `tree`, returning its index within the tree.
    ///
    /// Each entry is one complete frame; a crash never leaves a half-written
    /// frame ahead of a complete one.
    pub fn append<T: Serialize>(&mut self, tree: &str, value: &T) -> Result<usize, StoreError> {
        let frame = codec::encode(value).map_err(|e| StoreError::SerializationError(e.to_string()))?;
        if frame.len() as u64 - codec::FRAME_OVERHEAD > self.config.max_entry_size as u64 {
            return Err(StoreError::SerializationError(format!(
                "entry of {} bytes exceeds maximum {}",
                frame.len() as u64 - codec::FRAME_OVERHEAD,
                self.config.max_entry_size
            )));
        }

        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| StoreError::BackendError("writer already consumed".to_string()))?;
        writer.write_all(&frame)?;

        let index = self.trees.entry(tree.to_string()).or_default();
        index.offsets.push(self.position);
        self.position += frame.len() as u64;
        Ok(index.offsets.len() - 1)
    }

    /// Write the footer, flush, fsync and rename into place.
    ///
    /// This is the commit point: after this returns successfully the store at
    /// the final path is complete.
    pub fn finalize(mut self) -> Result<PathBuf, StoreError> {
        let mut writer = self
            .writer
            .take()
            .ok_or_else(|| StoreError::BackendError("writer already consumed".to_string()))?;
        // The temp path stays set until the rename lands, so a failure below
        // leaves cleanup to Drop.
        let temp_path = self
            .temp_path
            .clone()
            .ok_or_else(|| StoreError::BackendError("temp_path already consumed".to_string()))?;

        let footer = StoreFooter {
            trees: std::mem::take(&mut self.trees),
            finalized_at: Utc::now(),
        };
        let footer_offset = self.position;
        let frame = codec::encode(&footer).map_err(|e| StoreError::SerializationError(e.to_string()))?;
        writer.write_all(&frame)?;
        writer.write_all(&footer_offset.to_le_bytes())?;
        writer.write_all(&TRAILER_MAGIC)?;

        writer.flush()?;
        if self.config.sync_on_finalize {
            writer.get_ref().sync_all()?;
        }
        drop(writer);

        fs::rename(&temp_path, &self.final_path)?;
        self.temp_path = None;
        debug!(path = %self.final_path.display(), "finalized store");
        Ok(self.final_path.clone())
    }

    /// Abandon the store and remove the temporary file.
    pub fn abort(mut self) -> std::io::Result<()> {
        self.writer.take();
        if let Some(temp_path) = self.temp_path.take() {
            if temp_path.exists() {
                fs::remove_file(temp_path)?;
            }
        }
        Ok(())
    }
}

impl Drop for StoreWriter {
    fn drop(&mut self) {
        // Best-effort cleanup of temp file if not finalized
        self.writer.take();
        if let Some(ref temp_path) = self.temp_path {
            if temp_path.exists() {
                warn!(path = %self.final_path.display(), "discarding unfinalized store");
                let _ = fs::remove_file(temp_path);
            }
        }
    }
}

/// Random-access reader over a finalized store.
#[derive(Debug)]
pub struct StoreReader {
    path: PathBuf,
    reader: BufReader<File>,
    footer: StoreFooter,
    config: StoreConfig,
}

impl StoreReader {
    /// Open a finalized store.
    ///
    /// # Errors
    /// - `Io` if the file cannot be opened
    /// - `Corrupted` if the header or footer fails validation
    /// - `NotFinalized` if the trailer is missing
    pub fn open(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        codec::read_header(&mut reader).map_err(codec_err)?;

        let not_finalized = || StoreError::NotFinalized {
            path: path.display().to_string(),
        };
        if file_len < codec::HEADER_LEN + TRAILER_LEN {
            return Err(not_finalized());
        }

        reader.seek(SeekFrom::Start(file_len - TRAILER_LEN))?;
        let mut offset_bytes = [0u8; 8];
        reader.read_exact(&mut offset_bytes)?;
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != TRAILER_MAGIC {
            return Err(not_finalized());
        }

        let footer_offset = u64::from_le_bytes(offset_bytes);
        if footer_offset < codec::HEADER_LEN || footer_offset >= file_len - TRAILER_LEN {
            return Err(StoreError::Corrupted(format!(
                "footer offset {footer_offset} outside file of {file_len} bytes"
            )));
        }
        reader.seek(SeekFrom::Start(footer_offset))?;
        let footer: StoreFooter = codec::decode(&mut reader, MAX_FOOTER_SIZE).map_err(codec_err)?;

        for (name, tree) in &footer.trees {
            if let Some(bad) = tree.offsets.iter().find(|&&o| o < codec::HEADER_LEN || o >= footer_offset) {
                return Err(StoreError::Corrupted(format!(
                    "tree '{name}' has entry offset {bad} outside the data section"
                )));
            }
        }

        Ok(Self {
            path,
            reader,
            footer,
            config,
        })
    }

    /// Path of the open store.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The index read at open.
    #[must_use]
    pub fn footer(&self) -> &StoreFooter {
        &self.footer
    }

    /// Names of all trees, sorted.
    pub fn tree_names(&self) -> impl Iterator<Item = &str> {
        self.footer.trees.keys().map(String::as_str)
    }

    /// Whether the store holds a tree named `tree`.
    #[must_use]
    pub fn has_tree(&self, tree: &str) -> bool {
        self.footer.trees.contains_key(tree)
    }

    /// Number of entries in `tree`, if present.
    #[must_use]
    pub fn tree_len(&self, tree: &str) -> Option<usize> {
        self.footer.trees.get(tree).map(|t| t.offsets.len())
    }

    /// Read and deserialize entry `index` of `tree`.
    pub fn read<T: DeserializeOwned>(&mut self, tree: &str, index: usize) -> Result<T, StoreError> {
        let offsets = &self
            .footer
            .trees
            .get(tree)
            .ok_or_else(|| StoreError::MissingTree {
                store: self.path.display().to_string(),
                name: tree.to_string(),
            })?
            .offsets;
        let offset = *offsets.get(index).ok_or_else(|| StoreError::IndexOutOfRange {
            tree: tree.to_string(),
            index,
            len: offsets.len(),
        })?;

        self.reader.seek(SeekFrom::Start(offset))?;
        codec::decode(&mut self.reader, self.config.max_entry_size).map_err(codec_err)
    }
}
