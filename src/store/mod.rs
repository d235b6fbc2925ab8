//! Record stores.
//!
//! Reading and writing go through two small traits, [`RecordSource`] and
//! [`RecordSink`], so the pipeline never depends on a concrete format. Two
//! backends are provided:
//!
//! - [`memory`]: vectors in memory, for tests and embedding
//! - [`file`]: a single-file container of named trees with CRC-protected
//!   frames and an offset index, written via temp-then-rename

mod traits;
pub mod file;
pub mod memory;

pub use traits::{RecordSink, RecordSource, StoreError};
pub use file::{FileSink, StoreConfig, StoreReader, StoreWriter, TreeReader};
pub use memory::{MemorySink, MemorySource, SinkEvent};
