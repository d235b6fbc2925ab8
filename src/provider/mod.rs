//! Response providers.
//!
//! A provider computes systematic-variation weights for the generator records
//! it knows how to handle. Providers are plugged into the response engine as
//! trait objects, in configuration order; the built-in tool types live in
//! [`builtin`].

pub mod builtin;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ProviderConfiguration;
use crate::error::ConfigError;
use crate::record::SecondaryRecord;
use crate::registry::ParamId;

pub use builtin::{EnergyTilt, ModeNormalization, ToolType};

/// Weights one provider produced for one parameter and one interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEntry {
    /// Parameter the weights belong to.
    pub id: ParamId,
    /// Weight at the nominal parameter value.
    pub cv_response: f64,
    /// Weight at each configured variation.
    pub responses: Vec<f64>,
}

impl ResponseEntry {
    /// An entry for `id`.
    #[must_use]
    pub fn new(id: ParamId, cv_response: f64, responses: Vec<f64>) -> Self {
        Self {
            id,
            cv_response,
            responses,
        }
    }
}

/// Failure inside a provider.
///
/// Any provider error is unrecoverable: weights computed past it cannot be
/// trusted, so the run stops.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The provider hit an error of its own.
    #[error("{0}")]
    Internal(String),

    /// The generator record cannot be evaluated.
    #[error("record is not physical: {0}")]
    UnphysicalRecord(String),
}

/// A pluggable source of systematic responses.
pub trait ResponseProvider: Send + Sync {
    /// Instance name, for logging.
    fn name(&self) -> &str;

    /// Every parameter id this provider may emit.
    fn parameter_ids(&self) -> Vec<ParamId>;

    /// Whether this provider acts on `record` at all.
    fn can_respond(&self, record: &SecondaryRecord) -> bool;

    /// Compute zero or more response entries for `record`.
    ///
    /// # Errors
    /// Returns `ProviderError` when the provider cannot produce trustworthy weights.
    fn responses(&self, record: &SecondaryRecord) -> Result<Vec<ResponseEntry>, ProviderError>;
}

/// Ordered collection of providers.
#[derive(Default)]
pub struct ProviderSet {
    providers: Vec<Box<dyn ResponseProvider>>,
}

impl std::fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.providers.iter().map(|p| p.name()))
            .finish()
    }
}

impl ProviderSet {
    /// An empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Instantiate one built-in provider per configured instance, in order.
    ///
    /// # Errors
    /// - `ConfigError::UnknownToolType` for an unrecognised `tool_type`
    /// - `ConfigError::InvalidParameter` for unusable provider options
    pub fn from_config(config: &ProviderConfiguration) -> Result<Self, ConfigError> {
        let mut set = Self::new();
        for provider in &config.providers {
            set.push(builtin::build(provider)?);
        }
        Ok(set)
    }

    /// Append a provider; it runs after every provider already present.
    pub fn push(&mut self, provider: Box<dyn ResponseProvider>) {
        self.providers.push(provider);
    }

    /// Providers in evaluation order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn ResponseProvider> {
        self.providers.iter().map(|p| &**p)
    }

    /// Number of providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// True if no provider is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
