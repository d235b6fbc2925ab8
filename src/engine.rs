//! Response engine.
//!
//! Fans a generator record out to every provider that can act on it, in
//! configuration order, and validates what comes back against the metadata
//! table. Invalid entries are set aside, not fatal; a provider error is.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{ConfigError, ExecutionError, ReweightResult, ValidationError};
use crate::provider::{ProviderSet, ResponseEntry};
use crate::record::SecondaryRecord;
use crate::registry::{MetadataTable, ParamId};

/// An entry the engine refused, and which provider produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    /// Name of the provider instance that produced the entry.
    pub provider: String,
    /// Why it was refused.
    pub error: ValidationError,
}

/// Validated responses for one interaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseSet {
    /// Entries that passed validation, in provider order.
    pub accepted: Vec<ResponseEntry>,
    /// Entries that were discarded.
    pub rejected: Vec<Rejection>,
}

/// Computes and validates responses for generator records.
#[derive(Debug)]
pub struct ResponseEngine {
    table: Arc<MetadataTable>,
    providers: ProviderSet,
}

impl ResponseEngine {
    /// Pair a provider set with the metadata table it must honour.
    ///
    /// # Errors
    /// `ConfigError::UndeclaredParameter` if a provider declares an id the
    /// table does not contain. Table ids that no provider declares are only
    /// logged: they can never appear in output.
    pub fn new(table: Arc<MetadataTable>, providers: ProviderSet) -> Result<Self, ConfigError> {
        let mut declared: HashSet<ParamId> = HashSet::new();
        for provider in providers.iter() {
            for id in provider.parameter_ids() {
                if !table.contains(id) {
                    return Err(ConfigError::UndeclaredParameter {
                        provider: provider.name().to_string(),
                        id,
                    });
                }
                declared.insert(id);
            }
        }
        for header in table.headers() {
            if !declared.contains(&header.id) {
                warn!(id = header.id, name = %header.name, "no provider declares this parameter");
            }
        }

        Ok(Self { table, providers })
    }

    /// The metadata table entries are validated against.
    #[must_use]
    pub fn table(&self) -> &Arc<MetadataTable> {
        &self.table
    }

    /// The providers, in configuration order.
    #[must_use]
    pub fn providers(&self) -> &ProviderSet {
        &self.providers
    }

    /// Check one entry against the metadata table.
    ///
    /// # Errors
    /// `UnknownParameter` or `ArityMismatch`.
    pub fn validate(&self, entry: &ResponseEntry) -> Result<(), ValidationError> {
        let header = self
            .table
            .get(entry.id)
            .ok_or(ValidationError::UnknownParameter { id: entry.id })?;
        if entry.responses.len() != header.expected_responses() {
            return Err(ValidationError::ArityMismatch {
                id: entry.id,
                expected: header.expected_responses(),
                actual: entry.responses.len(),
            });
        }
        Ok(())
    }

    /// Run every applicable provider on `secondary` and validate the results.
    ///
    /// The result is a pure function of `secondary` and the configuration.
    ///
    /// # Errors
    /// `ExecutionError::ProviderFailure` if any provider fails; the run must stop.
    pub fn compute_responses(&self, secondary: &SecondaryRecord) -> ReweightResult<ResponseSet> {
        let mut set = ResponseSet::default();
        let mut seen: HashSet<ParamId> = HashSet::new();

        for provider in self.providers.iter().filter(|p| p.can_respond(secondary)) {
            let entries = provider
                .responses(secondary)
                .map_err(|e| ExecutionError::ProviderFailure {
                    provider: provider.name().to_string(),
                    message: e.to_string(),
                })?;

            for entry in entries {
                let verdict = self.validate(&entry).and_then(|()| {
                    if seen.insert(entry.id) {
                        Ok(())
                    } else {
                        Err(ValidationError::DuplicateResponse { id: entry.id })
                    }
                });
                match verdict {
                    Ok(()) => {
                        debug!(
                            "- ParamID:{}: RW values = {:?} (CV {})",
                            entry.id, entry.responses, entry.cv_response
                        );
                        set.accepted.push(entry);
                    }
                    Err(error) => set.rejected.push(Rejection {
                        provider: provider.name().to_string(),
                        error,
                    }),
                }
            }
        }

        Ok(set)
    }
}
