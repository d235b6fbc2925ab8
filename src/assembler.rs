//! Output assembler.
//!
//! Enforces the output contract on top of any [`RecordSink`]: the metadata
//! table goes out exactly once and first, event records follow in strictly
//! increasing input order, and nothing is written after finalize.

use tracing::info;

use crate::error::{ReweightError, ReweightResult};
use crate::record::{GlobalRecord, PrimaryRecord};
use crate::registry::MetadataTable;
use crate::store::RecordSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitingMetadata,
    Streaming,
    Finalized,
}

/// Writes the metadata table and augmented records to a sink, in order.
#[derive(Debug)]
pub struct OutputAssembler<S> {
    sink: S,
    phase: Phase,
    last_index: Option<usize>,
    written: usize,
}

impl<S: RecordSink> OutputAssembler<S> {
    /// Wrap `sink`; nothing is written until [`Self::write_metadata`].
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            phase: Phase::AwaitingMetadata,
            last_index: None,
            written: 0,
        }
    }

    /// Write the metadata table. Must be the first call, and only once.
    ///
    /// # Errors
    /// `OrderingViolation` if metadata was already written or the output is
    /// finalized; store errors from the sink.
    pub fn write_metadata(&mut self, table: &MetadataTable) -> ReweightResult<()> {
        if self.phase != Phase::AwaitingMetadata {
            return Err(ReweightError::ordering("metadata table written more than once"));
        }
        let global = GlobalRecord::from_table(table);
        info!("@@ Writing header ({} parameters, {})", global.params.len(), global.fingerprint);
        self.sink.write_global(&global)?;
        self.phase = Phase::Streaming;
        Ok(())
    }

    /// Append the augmented record read from input position `index`.
    ///
    /// # Errors
    /// `OrderingViolation` before metadata, after finalize, or when `index`
    /// does not exceed the previous record's index; store errors from the sink.
    pub fn write_record(&mut self, index: usize, record: &PrimaryRecord) -> ReweightResult<()> {
        match self.phase {
            Phase::AwaitingMetadata => {
                return Err(ReweightError::ordering(format!(
                    "record {index} written before the metadata table"
                )));
            }
            Phase::Finalized => {
                return Err(ReweightError::ordering(format!(
                    "record {index} written after finalize"
                )));
            }
            Phase::Streaming => {}
        }
        if let Some(last) = self.last_index {
            if index <= last {
                return Err(ReweightError::ordering(format!(
                    "record {index} written after record {last}"
                )));
            }
        }

        self.sink.write_record(record)?;
        self.last_index = Some(index);
        self.written += 1;
        Ok(())
    }

    /// Flush and close the output. Returns the number of records written.
    ///
    /// # Errors
    /// `OrderingViolation` if metadata was never written or finalize already
    /// ran; store errors from the sink.
    pub fn finalize(&mut self) -> ReweightResult<usize> {
        match self.phase {
            Phase::AwaitingMetadata => {
                return Err(ReweightError::ordering("finalize before the metadata table"));
            }
            Phase::Finalized => return Err(ReweightError::ordering("finalize called twice")),
            Phase::Streaming => {}
        }
        info!("@@ Finalizing output");
        self.sink.finalize()?;
        self.phase = Phase::Finalized;
        Ok(self.written)
    }

    /// Records written so far.
    #[must_use]
    pub fn records_written(&self) -> usize {
        self.written
    }

    /// True once [`Self::finalize`] has succeeded.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.phase == Phase::Finalized
    }

    /// Give back the sink.
    pub fn into_sink(self) -> S {
        self.sink
    }
}
