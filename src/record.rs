//! Event record types.
//!
//! A [`PrimaryRecord`] is one simulated event as stored in the main tree. Each
//! of its [`InteractionSubRecord`]s points, through `foreign_index`, at the
//! detailed generator record ([`SecondaryRecord`]) it was produced from.
//! Reweighting reads the secondary record and folds the resulting responses
//! back into the interaction's weight fields; the record schema itself never
//! changes.

use serde::{Deserialize, Serialize};

use crate::provider::ResponseEntry;
use crate::registry::{MetadataTable, ParamId, ParameterHeader};

fn unit_weight() -> f64 {
    1.0
}

/// Scattering process of an interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionMode {
    /// Quasi-elastic.
    Qe,
    /// Meson-exchange current (2p2h).
    Mec,
    /// Resonant pion production.
    Res,
    /// Deep inelastic scattering.
    Dis,
    /// Coherent pion production.
    Coh,
    /// Anything else the generator produced.
    Other,
}

impl InteractionMode {
    /// Short lowercase label, as used in configuration files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Qe => "qe",
            Self::Mec => "mec",
            Self::Res => "res",
            Self::Dis => "dis",
            Self::Coh => "coh",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for InteractionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Systematic weights attached to one interaction for one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystWeights {
    /// Parameter id from the metadata table.
    pub id: ParamId,
    /// Central-value weight.
    pub cv: f64,
    /// One weight per variation, in configuration order.
    pub weights: Vec<f64>,
}

/// One true neutrino interaction inside an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionSubRecord {
    /// Position of the generator record in the secondary store.
    pub foreign_index: u64,
    /// Probe PDG code.
    pub pdg: i32,
    /// Probe energy in GeV.
    pub energy: f64,
    /// Scattering process.
    pub mode: InteractionMode,
    /// Charged-current flag.
    pub is_cc: bool,
    /// Target nucleus PDG code.
    pub target_pdg: i32,
    /// Product of all applied correction factors.
    #[serde(default = "unit_weight")]
    pub cv_weight: f64,
    /// Per-parameter systematic weights.
    #[serde(default)]
    pub syst_weights: Vec<SystWeights>,
}

impl InteractionSubRecord {
    /// Replace this interaction's weights with the accepted responses.
    ///
    /// Any `syst_weights` already present are discarded, including weights
    /// for ids that receive no response here, and even when `accepted` is
    /// empty. `syst_weights` then becomes one entry per response, in the
    /// order given. Responses for correction parameters additionally scale
    /// `cv_weight` by their single response. Nothing else is touched.
    pub fn fold_responses(&mut self, accepted: &[ResponseEntry], table: &MetadataTable) {
        self.syst_weights.clear();
        self.syst_weights.reserve(accepted.len());

        for entry in accepted {
            let is_correction = table.get(entry.id).is_some_and(|h| h.is_correction);
            if is_correction {
                if let Some(&factor) = entry.responses.first() {
                    self.cv_weight *= factor;
                }
            }
            self.syst_weights.push(SystWeights {
                id: entry.id,
                cv: entry.cv_response,
                weights: entry.responses.clone(),
            });
        }
    }

    /// Weights attached for `id`, if any.
    #[must_use]
    pub fn weights_for(&self, id: ParamId) -> Option<&SystWeights> {
        self.syst_weights.iter().find(|w| w.id == id)
    }
}

/// Monte Carlo truth branch of an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct McTruth {
    /// True interactions, in generator order.
    pub nu: Vec<InteractionSubRecord>,
}

/// One simulated event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrimaryRecord {
    /// Run number.
    pub run: u32,
    /// Subrun number.
    pub subrun: u32,
    /// Event number within the subrun.
    pub event: u32,
    /// Truth information, including the interactions to reweight.
    pub mc: McTruth,
}

impl PrimaryRecord {
    /// Number of true interactions in this event.
    #[must_use]
    pub fn interaction_count(&self) -> usize {
        self.mc.nu.len()
    }
}

/// A particle in the generator's event record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    /// PDG code.
    pub pdg: i32,
    /// Total energy in GeV.
    pub energy: f64,
    /// Momentum (px, py, pz) in GeV/c.
    pub momentum: [f64; 3],
    /// Whether the particle left the nucleus.
    pub final_state: bool,
}

/// Detailed generator record for one interaction.
///
/// Only read by response providers; never written to output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecondaryRecord {
    /// Interaction channel.
    pub mode: InteractionMode,
    /// Charged current (true) or neutral current.
    pub is_cc: bool,
    /// PDG code of the incoming neutrino.
    pub probe_pdg: i32,
    /// Probe energy in GeV.
    pub probe_energy: f64,
    /// PDG code of the struck nucleus.
    pub target_pdg: i32,
    /// Four-momentum transfer squared, GeV².
    pub q2: f64,
    /// Hadronic invariant mass, GeV.
    pub w: f64,
    /// Generator particle list; may be absent.
    #[serde(default)]
    pub particles: Vec<Particle>,
}

impl SecondaryRecord {
    /// Whether the probe is an antineutrino.
    #[must_use]
    pub const fn is_antineutrino(&self) -> bool {
        self.probe_pdg < 0
    }
}

/// The single entry of the global tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalRecord {
    /// The metadata table, in registry order.
    pub params: Vec<ParameterHeader>,
    /// Hex digest identifying the table.
    pub fingerprint: String,
}

impl GlobalRecord {
    /// Snapshot a metadata table for writing.
    #[must_use]
    pub fn from_table(table: &MetadataTable) -> Self {
        Self {
            params: table.headers().to_vec(),
            fingerprint: table.fingerprint(),
        }
    }
}
