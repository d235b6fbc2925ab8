//! Error types for caf-reweight.
//!
//! All errors are strongly typed using thiserror. The taxonomy separates
//! per-entry rejections, which the pipeline logs and skips, from everything
//! else, which aborts the run.

use thiserror::Error;

use crate::registry::ParamId;
use crate::store::StoreError;

/// Rejections of a single response entry.
///
/// These are recoverable: the offending entry is discarded and the
/// interaction, and the record that holds it, still proceed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The entry names an id the metadata table does not contain.
    #[error("Parameter {id} is not present in the metadata table")]
    UnknownParameter {
        /// Parameter id.
        id: ParamId,
    },

    /// The entry carries the wrong number of responses.
    #[error("Parameter {id} returned {actual} responses, expected {expected}")]
    ArityMismatch {
        /// Parameter id.
        id: ParamId,
        /// Responses the metadata table requires.
        expected: usize,
        /// Responses the provider returned.
        actual: usize,
    },

    /// A second entry for an id already accepted on this interaction.
    #[error("Parameter {id} was produced more than once for the same interaction")]
    DuplicateResponse {
        /// Parameter id.
        id: ParamId,
    },
}

impl ValidationError {
    /// The parameter the rejected entry claimed to respond for.
    #[must_use]
    pub const fn param_id(&self) -> ParamId {
        match self {
            Self::UnknownParameter { id }
            | Self::ArityMismatch { id, .. }
            | Self::DuplicateResponse { id } => *id,
        }
    }
}

/// Errors raised while reading or interpreting the provider configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read configuration {path}: {message}")]
    Read {
        /// Path that was read.
        path: String,
        /// Underlying error text.
        message: String,
    },

    /// The configuration is not valid TOML or has the wrong shape.
    #[error("Failed to parse configuration: {message}")]
    Parse {
        /// Underlying error text.
        message: String,
    },

    /// The lookup key does not name a table.
    #[error("Configuration key '{key}' not found")]
    MissingKey {
        /// Key that was looked up.
        key: String,
    },

    /// A listed provider has no table of its own.
    #[error("Provider '{name}' is listed in syst_providers but has no configuration table")]
    MissingProvider {
        /// Provider instance name.
        name: String,
    },

    /// A provider names a tool type that does not exist.
    #[error("Provider '{name}' has unknown tool_type '{tool_type}'")]
    UnknownToolType {
        /// Provider instance name.
        name: String,
        /// Configured tool type.
        tool_type: String,
    },

    /// Two parameters share an id.
    #[error("Parameter id {id} is defined by both '{first}' and '{second}'")]
    DuplicateParameter {
        /// Parameter id.
        id: ParamId,
        /// Provider that defined the id first.
        first: String,
        /// Provider that defined it again.
        second: String,
    },

    /// A parameter definition is unusable.
    #[error("Parameter {id} is invalid: {reason}")]
    InvalidParameter {
        /// Parameter id.
        id: ParamId,
        /// What is wrong.
        reason: String,
    },

    /// A provider declares an id missing from the metadata table.
    #[error("Provider '{provider}' declares parameter {id}, which is not in the metadata table")]
    UndeclaredParameter {
        /// Provider instance name.
        provider: String,
        /// Parameter id.
        id: ParamId,
    },
}

/// Errors that abort the run while it is executing.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// An interaction points outside the secondary store.
    #[error(
        "Record {record}, interaction {interaction}: foreign index {foreign_index} is out of range (secondary store holds {available} records)"
    )]
    Resolution {
        /// Index of the primary record.
        record: usize,
        /// Position of the interaction within the record.
        interaction: usize,
        /// The dangling foreign index.
        foreign_index: u64,
        /// Number of records in the secondary store.
        available: usize,
    },

    /// The output was written out of order.
    #[error("Output ordering violation: {reason}")]
    OrderingViolation {
        /// What is wrong.
        reason: String,
    },

    /// The inputs cannot be processed at all.
    #[error("Precondition failed: {reason}")]
    Precondition {
        /// What is wrong.
        reason: String,
    },

    /// A response provider failed.
    #[error("Provider '{provider}' failed: {message}")]
    ProviderFailure {
        /// Provider instance name.
        provider: String,
        /// Underlying error text.
        message: String,
    },
}

/// Top-level error type for caf-reweight.
#[derive(Debug, Error)]
pub enum ReweightError {
    /// A rejected response entry.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The run failed while executing.
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// The record store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A bug: an invariant of this crate did not hold.
    #[error("Internal error: {message}")]
    Internal {
        /// Underlying error text.
        message: String,
    },
}

impl ReweightError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates an ordering violation.
    #[must_use]
    pub fn ordering(reason: impl Into<String>) -> Self {
        Self::Execution(ExecutionError::OrderingViolation {
            reason: reason.into(),
        })
    }

    /// Returns true if this is a per-entry validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if this is a store error.
    #[must_use]
    pub const fn is_store(&self) -> bool {
        matches!(self, Self::Store(_))
    }

    /// Returns true if the pipeline may discard the offending entry and continue.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        self.is_validation()
    }

    /// Returns true if this error is retryable.
    ///
    /// Inputs are deterministic local reads and writes, so nothing is.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        false
    }
}

/// Result type alias for caf-reweight operations.
pub type ReweightResult<T> = Result<T, ReweightError>;
