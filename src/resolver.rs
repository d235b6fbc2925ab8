//! Foreign-key resolution from interactions to generator records.

use crate::error::{ExecutionError, ReweightResult};
use crate::record::{PrimaryRecord, SecondaryRecord};
use crate::store::{RecordSource, StoreError};

/// Fetches the secondary record an interaction points at.
///
/// A pure positional lookup with one bounds check; nothing is cached, every
/// call reads from the underlying store.
#[derive(Debug)]
pub struct ForeignKeyResolver<S> {
    secondary: S,
}

impl<S: RecordSource<SecondaryRecord>> ForeignKeyResolver<S> {
    /// Resolve against `secondary`.
    pub fn new(secondary: S) -> Self {
        Self { secondary }
    }

    /// Number of records in the secondary store.
    pub fn available(&self) -> usize {
        self.secondary.len()
    }

    /// Resolve interaction `interaction` of `record`, read from primary index `record_index`.
    ///
    /// # Errors
    /// - `ExecutionError::Resolution` when the interaction does not exist or
    ///   its foreign index is outside the secondary store
    /// - store errors from the read itself
    pub fn resolve(
        &mut self,
        record_index: usize,
        record: &PrimaryRecord,
        interaction: usize,
    ) -> ReweightResult<SecondaryRecord> {
        let available = self.secondary.len();
        let out_of_range = |foreign_index: u64| ExecutionError::Resolution {
            record: record_index,
            interaction,
            foreign_index,
            available,
        };

        let nu = record
            .mc
            .nu
            .get(interaction)
            .ok_or_else(|| out_of_range(u64::MAX))?;
        let index = usize::try_from(nu.foreign_index)
            .ok()
            .filter(|&i| i < available)
            .ok_or_else(|| out_of_range(nu.foreign_index))?;

        match self.secondary.read(index) {
            Ok(rec) => Ok(rec),
            Err(StoreError::IndexOutOfRange { .. }) => Err(out_of_range(nu.foreign_index).into()),
            Err(e) => Err(e.into()),
        }
    }

    /// Give back the secondary store.
    pub fn into_inner(self) -> S {
        self.secondary
    }
}
