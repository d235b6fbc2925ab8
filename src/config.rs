//! Provider configuration and run options.
//!
//! The configuration source is a TOML document plus a lookup key. The keyed
//! table lists provider instances in `syst_providers`; each instance has its
//! own sub-table naming a `tool_type` and the parameters it owns:
//!
//! ```toml
//! [generated_systematic_provider_configuration]
//! syst_providers = ["ccqe_norm"]
//!
//! [generated_systematic_provider_configuration.ccqe_norm]
//! tool_type = "ModeNormalization"
//!
//! [[generated_systematic_provider_configuration.ccqe_norm.parameter_headers]]
//! id = 0
//! pretty_name = "NormCCQE"
//! variations = [-1.0, 1.0]
//! mode = "qe"
//! uncertainty = 0.2
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::registry::ParamId;

/// Default lookup key for the provider configuration table.
pub const DEFAULT_CONFIG_KEY: &str = "generated_systematic_provider_configuration";

/// Configuration of one systematic parameter, as written by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterConfig {
    /// Globally unique parameter id.
    pub id: ParamId,
    /// Display name.
    pub pretty_name: String,
    /// A correction is a single always-applied factor, not a spread of variations.
    #[serde(default)]
    pub is_correction: bool,
    /// Nominal parameter value (in units of the parameter's uncertainty).
    #[serde(default)]
    pub central_value: Option<f64>,
    /// Shifted parameter values to evaluate.
    #[serde(default)]
    pub variations: Vec<f64>,
    /// Provider-specific options.
    #[serde(flatten)]
    pub options: toml::Table,
}

impl ParameterConfig {
    /// Configured variations with duplicates removed, first occurrence kept.
    #[must_use]
    pub fn distinct_variations(&self) -> Vec<f64> {
        let mut out: Vec<f64> = Vec::with_capacity(self.variations.len());
        for &v in &self.variations {
            if !out.iter().any(|seen| seen.to_bits() == v.to_bits()) {
                out.push(v);
            }
        }
        out
    }

    /// Look up a string option.
    #[must_use]
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(toml::Value::as_str)
    }

    /// Look up a numeric option, accepting integers as well as floats.
    #[must_use]
    pub fn option_f64(&self, key: &str) -> Option<f64> {
        match self.options.get(key)? {
            toml::Value::Float(f) => Some(*f),
            #[allow(clippy::cast_precision_loss)]
            toml::Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }
}

/// Configuration of one provider instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Instance name (the sub-table key).
    #[serde(skip)]
    pub instance_name: String,
    /// Which built-in provider implements this instance.
    pub tool_type: String,
    /// Parameters owned by this instance.
    #[serde(default)]
    pub parameter_headers: Vec<ParameterConfig>,
}

#[derive(Debug, Deserialize)]
struct ProviderList {
    syst_providers: Vec<String>,
}

/// The ordered provider configuration read from a configuration source.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfiguration {
    /// Key the configuration was found under.
    pub key: String,
    /// Provider instances in `syst_providers` order.
    pub providers: Vec<ProviderConfig>,
}

impl ProviderConfiguration {
    /// Read and parse a configuration file.
    ///
    /// # Errors
    /// - `ConfigError::Read` if the file cannot be read
    /// - any error from [`ProviderConfiguration::from_toml_str`]
    pub fn load(path: impl AsRef<Path>, key: &str) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&content, key)
    }

    /// Parse a configuration document and extract the table under `key`.
    ///
    /// `key` may be dotted (`outer.inner`) to reach a nested table.
    ///
    /// # Errors
    /// - `ConfigError::Parse` for malformed TOML or provider tables
    /// - `ConfigError::MissingKey` if `key` does not name a table
    /// - `ConfigError::MissingProvider` if a listed provider has no table
    pub fn from_toml_str(content: &str, key: &str) -> Result<Self, ConfigError> {
        let root: toml::Table = toml::from_str(content).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;

        let mut table = &root;
        for segment in key.split('.') {
            table = table
                .get(segment)
                .and_then(toml::Value::as_table)
                .ok_or_else(|| ConfigError::MissingKey {
                    key: key.to_string(),
                })?;
        }

        let list: ProviderList = toml::Value::Table(table.clone())
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Parse {
                message: format!("{key}: {e}"),
            })?;

        let mut providers = Vec::with_capacity(list.syst_providers.len());
        for name in list.syst_providers {
            let raw = table.get(&name).ok_or_else(|| ConfigError::MissingProvider {
                name: name.clone(),
            })?;
            let mut provider: ProviderConfig =
                raw.clone()
                    .try_into()
                    .map_err(|e: toml::de::Error| ConfigError::Parse {
                        message: format!("{name}: {e}"),
                    })?;
            provider.instance_name = name;
            debug!(
                provider = %provider.instance_name,
                tool_type = %provider.tool_type,
                parameters = provider.parameter_headers.len(),
                "parsed provider configuration"
            );
            providers.push(provider);
        }

        Ok(Self {
            key: key.to_string(),
            providers,
        })
    }

    /// All configured parameters, in provider then declaration order.
    pub fn parameters(&self) -> impl Iterator<Item = (&ProviderConfig, &ParameterConfig)> {
        self.providers
            .iter()
            .flat_map(|p| p.parameter_headers.iter().map(move |h| (p, h)))
    }
}

/// Which slice of the primary tree to process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Number of leading records to skip.
    pub skip: usize,
    /// Maximum number of records to process after skipping.
    pub max_events: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            skip: 0,
            max_events: usize::MAX,
        }
    }
}

impl RunOptions {
    /// The half-open index range `[skip, skip + min(max_events, total - skip))`.
    ///
    /// Empty when `skip >= total` or `max_events == 0`.
    #[must_use]
    pub fn range(&self, total: usize) -> std::ops::Range<usize> {
        let start = self.skip.min(total);
        let end = start.saturating_add(self.max_events).min(total);
        start..end
    }
}

/// Tree names used inside record store files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    /// Tree holding primary event records (input and output).
    pub primary_tree: String,
    /// Tree holding detailed generator records.
    pub secondary_tree: String,
    /// Tree holding the single global metadata record.
    pub global_tree: String,
}

impl Default for StoreLayout {
    fn default() -> Self {
        Self {
            primary_tree: "cafTree".to_string(),
            secondary_tree: "genieEvt".to_string(),
            global_tree: "globalTree".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[generated_systematic_provider_configuration]
syst_providers = ["res_norm", "ccqe_norm"]

[generated_systematic_provider_configuration.ccqe_norm]
tool_type = "ModeNormalization"

[[generated_systematic_provider_configuration.ccqe_norm.parameter_headers]]
id = 0
pretty_name = "NormCCQE"
variations = [-1.0, 1.0, 1.0]
mode = "qe"
uncertainty = 0.2

[generated_systematic_provider_configuration.res_norm]
tool_type = "ModeNormalization"

[[generated_systematic_provider_configuration.res_norm.parameter_headers]]
id = 1
pretty_name = "NormRES"
is_correction = true
central_value = 1
mode = "res"
uncertainty = 1
"#;

    #[test]
    fn test_providers_follow_list_order() {
        let cfg = ProviderConfiguration::from_toml_str(SAMPLE, DEFAULT_CONFIG_KEY).unwrap();
        let names: Vec<_> = cfg.providers.iter().map(|p| p.instance_name.as_str()).collect();
        assert_eq!(names, vec!["res_norm", "ccqe_norm"]);
        assert_eq!(cfg.parameters().count(), 2);
    }

    #[test]
    fn test_parameter_options_are_flattened() {
        let cfg = ProviderConfiguration::from_toml_str(SAMPLE, DEFAULT_CONFIG_KEY).unwrap();
        let ccqe = &cfg.providers[1].parameter_headers[0];
        assert_eq!(ccqe.option_str("mode"), Some("qe"));
        assert_eq!(ccqe.option_f64("uncertainty"), Some(0.2));
        assert_eq!(ccqe.distinct_variations(), vec![-1.0, 1.0]);

        let res = &cfg.providers[0].parameter_headers[0];
        assert!(res.is_correction);
        assert_eq!(res.option_f64("uncertainty"), Some(1.0));
    }

    #[test]
    fn test_missing_key() {
        let err = ProviderConfiguration::from_toml_str(SAMPLE, "nope").unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey { .. }));
    }

    #[test]
    fn test_missing_provider_table() {
        let doc = r#"
[cfg]
syst_providers = ["ghost"]
"#;
        let err = ProviderConfiguration::from_toml_str(doc, "cfg").unwrap_err();
        assert!(matches!(err, ConfigError::MissingProvider { name } if name == "ghost"));
    }

    #[test]
    fn test_dotted_key() {
        let doc = r#"
[outer.inner]
syst_providers = []
"#;
        let cfg = ProviderConfiguration::from_toml_str(doc, "outer.inner").unwrap();
        assert!(cfg.providers.is_empty());
    }

    #[test]
    fn test_malformed_toml() {
        let err = ProviderConfiguration::from_toml_str("[[[", DEFAULT_CONFIG_KEY).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_run_range() {
        let all = RunOptions::default();
        assert_eq!(all.range(10), 0..10);

        let window = RunOptions { skip: 2, max_events: 5 };
        assert_eq!(window.range(10), 2..7);

        let past_end = RunOptions { skip: 12, max_events: 5 };
        assert!(past_end.range(10).is_empty());

        let none = RunOptions { skip: 0, max_events: 0 };
        assert!(none.range(10).is_empty());

        let tail = RunOptions { skip: 8, max_events: usize::MAX };
        assert_eq!(tail.range(10), 8..10);
    }
}
