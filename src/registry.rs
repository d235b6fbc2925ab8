//! Parameter registry and the global metadata table.
//!
//! The registry runs once, before any event is read. It turns the configured
//! parameters into an ordered, immutable [`MetadataTable`] that becomes the
//! schema every later response entry is validated against.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{ParameterConfig, ProviderConfiguration};
use crate::error::ConfigError;

/// Systematic parameter identifier.
pub type ParamId = u32;

/// Metadata describing one systematic parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParameterHeader {
    /// Globally unique, stable id.
    pub id: ParamId,
    /// Display name.
    pub name: String,
    /// Number of per-variation responses every entry for this id carries.
    pub variation_count: u32,
    /// A correction carries exactly one response.
    pub is_correction: bool,
}

impl ParameterHeader {
    /// Derive the header for a configured parameter.
    ///
    /// # Errors
    /// `ConfigError::InvalidParameter` when the configuration cannot describe a
    /// usable parameter.
    pub fn from_config(cfg: &ParameterConfig) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidParameter {
            id: cfg.id,
            reason: reason.to_string(),
        };

        let name = cfg.pretty_name.trim();
        if name.is_empty() {
            return Err(invalid("pretty_name cannot be empty"));
        }

        let variation_count = if cfg.is_correction {
            if cfg.central_value.is_none() {
                return Err(invalid("a correction requires a central_value"));
            }
            1
        } else {
            let distinct = cfg.distinct_variations().len();
            u32::try_from(distinct).map_err(|_| invalid("too many variations"))?
        };

        Ok(Self {
            id: cfg.id,
            name: name.to_string(),
            variation_count,
            is_correction: cfg.is_correction,
        })
    }

    /// `variation_count` as a length.
    #[must_use]
    pub fn expected_responses(&self) -> usize {
        self.variation_count as usize
    }
}

/// Ordered, immutable table of parameter headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataTable {
    headers: Vec<ParameterHeader>,
    by_id: HashMap<ParamId, usize>,
}

impl MetadataTable {
    /// Build a table, rejecting duplicate ids and inconsistent correction headers.
    ///
    /// # Errors
    /// - `ConfigError::DuplicateParameter` if two headers share an id
    /// - `ConfigError::InvalidParameter` if a correction has more than one variation
    pub fn new(headers: Vec<ParameterHeader>) -> Result<Self, ConfigError> {
        let mut by_id = HashMap::with_capacity(headers.len());
        for (pos, header) in headers.iter().enumerate() {
            if header.is_correction && header.variation_count != 1 {
                return Err(ConfigError::InvalidParameter {
                    id: header.id,
                    reason: "a correction must have exactly one variation".to_string(),
                });
            }
            if let Some(prev) = by_id.insert(header.id, pos) {
                return Err(ConfigError::DuplicateParameter {
                    id: header.id,
                    first: headers[prev].name.clone(),
                    second: header.name.clone(),
                });
            }
        }
        Ok(Self { headers, by_id })
    }

    /// Headers in registry order.
    #[must_use]
    pub fn headers(&self) -> &[ParameterHeader] {
        &self.headers
    }

    /// Header for `id`.
    #[must_use]
    pub fn get(&self, id: ParamId) -> Option<&ParameterHeader> {
        self.by_id.get(&id).map(|&pos| &self.headers[pos])
    }

    /// Whether `id` is in the table.
    #[must_use]
    pub fn contains(&self, id: ParamId) -> bool {
        self.by_id.contains_key(&id)
    }

    /// Parameter ids in registry order.
    pub fn ids(&self) -> impl Iterator<Item = ParamId> + '_ {
        self.headers.iter().map(|h| h.id)
    }

    /// Number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// True for a table with no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Stable hex digest of the table contents and order.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for h in &self.headers {
            hasher.update(&h.id.to_le_bytes());
            hasher.update(&(h.name.len() as u64).to_le_bytes());
            hasher.update(h.name.as_bytes());
            hasher.update(&h.variation_count.to_le_bytes());
            hasher.update(&[u8::from(h.is_correction)]);
        }
        hasher.finalize().to_hex().to_string()
    }
}

/// Builds the metadata table from a provider configuration.
pub struct ParameterRegistry;

impl ParameterRegistry {
    /// Enumerate every configured parameter into a shared metadata table.
    ///
    /// Parameters keep provider order, then declaration order within a provider.
    ///
    /// # Errors
    /// - `ConfigError::DuplicateParameter` if two parameters share an id; the
    ///   error names the providers that define it
    /// - `ConfigError::InvalidParameter` for unusable parameter definitions
    pub fn build(config: &ProviderConfiguration) -> Result<Arc<MetadataTable>, ConfigError> {
        let mut owners: HashMap<ParamId, &str> = HashMap::new();
        let mut headers = Vec::new();

        for (provider, param) in config.parameters() {
            if let Some(first) = owners.insert(param.id, provider.instance_name.as_str()) {
                return Err(ConfigError::DuplicateParameter {
                    id: param.id,
                    first: first.to_string(),
                    second: provider.instance_name.clone(),
                });
            }
            headers.push(ParameterHeader::from_config(param)?);
        }

        let table = MetadataTable::new(headers)?;
        info!(
            parameters = table.len(),
            fingerprint = %table.fingerprint(),
            "built parameter registry"
        );
        for h in table.headers() {
            info!(
                "- (id, name, nshifts) = ({}, {}, {})",
                h.id, h.name, h.variation_count
            );
        }
        Ok(Arc::new(table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;

    fn param(id: ParamId, name: &str, variations: &[f64]) -> ParameterConfig {
        ParameterConfig {
            id,
            pretty_name: name.to_string(),
            is_correction: false,
            central_value: Some(0.0),
            variations: variations.to_vec(),
            options: toml::Table::new(),
        }
    }

    fn provider(name: &str, params: Vec<ParameterConfig>) -> ProviderConfig {
        ProviderConfig {
            instance_name: name.to_string(),
            tool_type: "ModeNormalization".to_string(),
            parameter_headers: params,
        }
    }

    fn config(providers: Vec<ProviderConfig>) -> ProviderConfiguration {
        ProviderConfiguration {
            key: "test".to_string(),
            providers,
        }
    }

    #[test]
    fn test_build_preserves_order() {
        let cfg = config(vec![
            provider("a", vec![param(5, "A5", &[-1.0, 1.0]), param(2, "A2", &[1.0])]),
            provider("b", vec![param(9, "B9", &[-2.0, -1.0, 1.0, 2.0])]),
        ]);
        let table = ParameterRegistry::build(&cfg).unwrap();
        assert_eq!(table.ids().collect::<Vec<_>>(), vec![5, 2, 9]);
        assert_eq!(table.get(9).unwrap().variation_count, 4);
    }

    #[test]
    fn test_variation_count_counts_distinct_values() {
        let cfg = config(vec![provider("a", vec![param(1, "A", &[-1.0, 1.0, -1.0])])]);
        let table = ParameterRegistry::build(&cfg).unwrap();
        assert_eq!(table.get(1).unwrap().variation_count, 2);
    }

    #[test]
    fn test_correction_forces_single_variation() {
        let mut p = param(4, "Corr", &[-1.0, 0.0, 1.0]);
        p.is_correction = true;
        let table = ParameterRegistry::build(&config(vec![provider("a", vec![p])])).unwrap();
        let h = table.get(4).unwrap();
        assert!(h.is_correction);
        assert_eq!(h.variation_count, 1);
    }

    #[test]
    fn test_duplicate_id_fails() {
        let cfg = config(vec![
            provider("first", vec![param(3, "X", &[1.0])]),
            provider("second", vec![param(3, "Y", &[1.0])]),
        ]);
        let err = ParameterRegistry::build(&cfg).unwrap_err();
        match err {
            ConfigError::DuplicateParameter { id, first, second } => {
                assert_eq!(id, 3);
                assert_eq!(first, "first");
                assert_eq!(second, "second");
            }
            other => panic!("expected DuplicateParameter, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_empty_name() {
        let cfg = config(vec![provider("a", vec![param(1, "  ", &[1.0])])]);
        assert!(matches!(
            ParameterRegistry::build(&cfg),
            Err(ConfigError::InvalidParameter { id: 1, .. })
        ));
    }

    #[test]
    fn test_parameter_without_variations_has_zero_count() {
        let cfg = config(vec![provider("a", vec![param(2, "NoShifts", &[])])]);
        let table = ParameterRegistry::build(&cfg).unwrap();
        let h = table.get(2).unwrap();
        assert_eq!(h.variation_count, 0);
        assert_eq!(h.expected_responses(), 0);
    }

    #[test]
    fn test_correction_requires_central_value() {
        let mut p = param(6, "Corr", &[]);
        p.is_correction = true;
        p.central_value = None;
        assert!(matches!(
            ParameterRegistry::build(&config(vec![provider("a", vec![p])])),
            Err(ConfigError::InvalidParameter { id: 6, .. })
        ));
    }

    #[test]
    fn test_table_rejects_inconsistent_correction() {
        let err = MetadataTable::new(vec![ParameterHeader {
            id: 1,
            name: "Bad".to_string(),
            variation_count: 3,
            is_correction: true,
        }])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidParameter { id: 1, .. }));
    }

    #[test]
    fn test_fingerprint_is_stable_and_order_sensitive() {
        let a = ParameterHeader {
            id: 1,
            name: "A".to_string(),
            variation_count: 2,
            is_correction: false,
        };
        let b = ParameterHeader {
            id: 2,
            name: "B".to_string(),
            variation_count: 1,
            is_correction: true,
        };
        let t1 = MetadataTable::new(vec![a.clone(), b.clone()]).unwrap();
        let t2 = MetadataTable::new(vec![a.clone(), b.clone()]).unwrap();
        let t3 = MetadataTable::new(vec![b, a]).unwrap();
        assert_eq!(t1.fingerprint(), t2.fingerprint());
        assert_ne!(t1.fingerprint(), t3.fingerprint());
    }
}
