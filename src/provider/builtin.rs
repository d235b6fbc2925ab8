//! Built-in response providers.
//!
//! Both tool types are simple parametric shapes:
//!
//! - `ModeNormalization`: `w(x) = max(0, 1 + x * uncertainty)` for interactions
//!   matching a selection.
//! - `EnergyTilt`: `w(x) = max(0, 1 + x * uncertainty * (E - E0) / E0)`, a
//!   linear tilt around `pivot_energy` E0.
//!
//! `x` is the parameter value in units of its uncertainty. The central-value
//! response is `w(central_value)`; a correction emits `w(central_value)` as its
//! single response.

use std::str::FromStr;

use crate::config::{ParameterConfig, ProviderConfig};
use crate::error::ConfigError;
use crate::record::{InteractionMode, SecondaryRecord};
use crate::registry::ParamId;

use super::{ProviderError, ResponseEntry, ResponseProvider};

/// Names accepted in `tool_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolType {
    /// Scales interactions of one mode and current.
    ModeNormalization,
    /// Linear tilt in probe energy about a pivot.
    EnergyTilt,
}

impl FromStr for ToolType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ModeNormalization" => Ok(Self::ModeNormalization),
            "EnergyTilt" => Ok(Self::EnergyTilt),
            _ => Err(()),
        }
    }
}

/// Instantiate the provider a configuration entry names.
///
/// # Errors
/// `UnknownToolType` or `InvalidParameter`.
pub fn build(cfg: &ProviderConfig) -> Result<Box<dyn ResponseProvider>, ConfigError> {
    let tool = ToolType::from_str(&cfg.tool_type).map_err(|()| ConfigError::UnknownToolType {
        name: cfg.instance_name.clone(),
        tool_type: cfg.tool_type.clone(),
    })?;

    let params = cfg
        .parameter_headers
        .iter()
        .map(|p| ShapeParameter::from_config(p, tool))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(match tool {
        ToolType::ModeNormalization => Box::new(ModeNormalization {
            name: cfg.instance_name.clone(),
            params,
        }),
        ToolType::EnergyTilt => Box::new(EnergyTilt {
            name: cfg.instance_name.clone(),
            params,
        }),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Current {
    Any,
    Cc,
    Nc,
}

/// Which interactions a parameter applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Selection {
    mode: Option<InteractionMode>,
    current: Current,
}

impl Selection {
    fn matches(self, record: &SecondaryRecord) -> bool {
        let mode_ok = self.mode.map_or(true, |m| m == record.mode);
        let current_ok = match self.current {
            Current::Any => true,
            Current::Cc => record.is_cc,
            Current::Nc => !record.is_cc,
        };
        mode_ok && current_ok
    }
}

#[derive(Debug, Clone)]
struct ShapeParameter {
    id: ParamId,
    is_correction: bool,
    central_value: f64,
    variations: Vec<f64>,
    uncertainty: f64,
    pivot_energy: f64,
    selection: Selection,
}

impl ShapeParameter {
    fn from_config(cfg: &ParameterConfig, tool: ToolType) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidParameter { id: cfg.id, reason };

        let mode = match cfg.option_str("mode").unwrap_or("any") {
            "any" => None,
            "qe" => Some(InteractionMode::Qe),
            "mec" => Some(InteractionMode::Mec),
            "res" => Some(InteractionMode::Res),
            "dis" => Some(InteractionMode::Dis),
            "coh" => Some(InteractionMode::Coh),
            "other" => Some(InteractionMode::Other),
            other => return Err(invalid(format!("unknown mode '{other}'"))),
        };
        let current = match cfg.option_str("current").unwrap_or("any") {
            "any" => Current::Any,
            "cc" => Current::Cc,
            "nc" => Current::Nc,
            other => return Err(invalid(format!("unknown current '{other}'"))),
        };

        let uncertainty = cfg
            .option_f64("uncertainty")
            .ok_or_else(|| invalid("missing numeric option 'uncertainty'".to_string()))?;
        if !uncertainty.is_finite() || uncertainty < 0.0 {
            return Err(invalid(format!("uncertainty must be finite and >= 0 (got {uncertainty})")));
        }

        let pivot_energy = match tool {
            ToolType::EnergyTilt => {
                let pivot = cfg.option_f64("pivot_energy").unwrap_or(1.0);
                if !pivot.is_finite() || pivot <= 0.0 {
                    return Err(invalid(format!("pivot_energy must be > 0 (got {pivot})")));
                }
                pivot
            }
            ToolType::ModeNormalization => 1.0,
        };

        Ok(Self {
            id: cfg.id,
            is_correction: cfg.is_correction,
            central_value: cfg.central_value.unwrap_or(0.0),
            variations: cfg.distinct_variations(),
            uncertainty,
            pivot_energy,
            selection: Selection { mode, current },
        })
    }

    fn entry(&self, weight: impl Fn(f64) -> f64) -> ResponseEntry {
        let cv = weight(self.central_value);
        let responses = if self.is_correction {
            vec![cv]
        } else {
            self.variations.iter().map(|&x| weight(x)).collect()
        };
        ResponseEntry::new(self.id, cv, responses)
    }
}

fn clamp_weight(w: f64) -> f64 {
    w.max(0.0)
}

fn check_energy(record: &SecondaryRecord) -> Result<f64, ProviderError> {
    let e = record.probe_energy;
    if e.is_finite() && e > 0.0 {
        Ok(e)
    } else {
        Err(ProviderError::UnphysicalRecord(format!("probe energy {e}")))
    }
}

/// Flat normalization uncertainty on a selection of interactions.
#[derive(Debug, Clone)]
pub struct ModeNormalization {
    name: String,
    params: Vec<ShapeParameter>,
}

impl ResponseProvider for ModeNormalization {
    fn name(&self) -> &str {
        &self.name
    }

    fn parameter_ids(&self) -> Vec<ParamId> {
        self.params.iter().map(|p| p.id).collect()
    }

    fn can_respond(&self, record: &SecondaryRecord) -> bool {
        self.params.iter().any(|p| p.selection.matches(record))
    }

    fn responses(&self, record: &SecondaryRecord) -> Result<Vec<ResponseEntry>, ProviderError> {
        Ok(self
            .params
            .iter()
            .filter(|p| p.selection.matches(record))
            .map(|p| p.entry(|x| clamp_weight(1.0 + x * p.uncertainty)))
            .collect())
    }
}

/// Linear energy-dependent tilt around a pivot energy.
#[derive(Debug, Clone)]
pub struct EnergyTilt {
    name: String,
    params: Vec<ShapeParameter>,
}

impl ResponseProvider for EnergyTilt {
    fn name(&self) -> &str {
        &self.name
    }

    fn parameter_ids(&self) -> Vec<ParamId> {
        self.params.iter().map(|p| p.id).collect()
    }

    fn can_respond(&self, record: &SecondaryRecord) -> bool {
        self.params.iter().any(|p| p.selection.matches(record))
    }

    fn responses(&self, record: &SecondaryRecord) -> Result<Vec<ResponseEntry>, ProviderError> {
        let energy = check_energy(record)?;
        Ok(self
            .params
            .iter()
            .filter(|p| p.selection.matches(record))
            .map(|p| {
                let lever = (energy - p.pivot_energy) / p.pivot_energy;
                p.entry(|x| clamp_weight(1.0 + x * p.uncertainty * lever))
            })
            .collect())
    }
}
