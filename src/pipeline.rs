//! Pipeline driver.
//!
//! Streams primary records from input to output, one at a time:
//!
//! ```text
//! Init ──build──▶ RegistryBuilt ──run──▶ Streaming ──finalize──▶ Finalized
//! ```
//!
//! Per record: read, then for each interaction resolve the generator record,
//! compute responses, fold them in; then write the record. The output sink is
//! only created once every precondition holds, so a run that fails early
//! leaves nothing behind.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::assembler::OutputAssembler;
use crate::config::{ProviderConfiguration, RunOptions};
use crate::engine::ResponseEngine;
use crate::error::{ExecutionError, ReweightError, ReweightResult};
use crate::provider::ProviderSet;
use crate::record::{PrimaryRecord, SecondaryRecord};
use crate::registry::{MetadataTable, ParameterRegistry};
use crate::resolver::ForeignKeyResolver;
use crate::store::{RecordSink, RecordSource, StoreError};

/// Where a [`Pipeline`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Nothing built yet.
    Init,
    /// Registry and response engine are ready; no output exists.
    RegistryBuilt,
    /// Output created, records being written.
    Streaming,
    /// Output finalized.
    Finalized,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Init => "init",
            Self::RegistryBuilt => "registry-built",
            Self::Streaming => "streaming",
            Self::Finalized => "finalized",
        };
        f.write_str(s)
    }
}

/// Counters for a completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Records in the primary store.
    pub records_total: usize,
    /// Records inside the skip/count window.
    pub records_read: usize,
    /// Records written to the output.
    pub records_written: usize,
    /// Interactions resolved and reweighted.
    pub interactions: usize,
    /// Response entries folded into interactions.
    pub accepted_entries: usize,
    /// Response entries discarded by validation.
    pub rejected_entries: usize,
}

/// Drives one reweighting run.
#[derive(Debug)]
pub struct Pipeline {
    state: PipelineState,
    options: RunOptions,
    engine: Option<ResponseEngine>,
}

impl Pipeline {
    /// A pipeline in `Init`; call [`Self::build`] before [`Self::run`].
    pub fn new(options: RunOptions) -> Self {
        Self {
            state: PipelineState::Init,
            options,
            engine: None,
        }
    }

    /// Build directly from a configuration.
    ///
    /// # Errors
    /// Any registry or provider construction error.
    pub fn from_config(config: &ProviderConfiguration, options: RunOptions) -> ReweightResult<Self> {
        let mut pipeline = Self::new(options);
        pipeline.build(config)?;
        Ok(pipeline)
    }

    /// Build from a ready engine, skipping configuration parsing.
    pub fn with_engine(engine: ResponseEngine, options: RunOptions) -> Self {
        Self {
            state: PipelineState::RegistryBuilt,
            options,
            engine: Some(engine),
        }
    }

    /// `Init → RegistryBuilt`: build the metadata table, providers and engine.
    ///
    /// # Errors
    /// `Precondition` if called twice; configuration errors otherwise.
    pub fn build(&mut self, config: &ProviderConfiguration) -> ReweightResult<()> {
        if self.state != PipelineState::Init {
            return Err(precondition(format!("cannot build registry in state {}", self.state)));
        }
        let table = ParameterRegistry::build(config)?;
        let providers = ProviderSet::from_config(config)?;
        info!("@@ Configured {} providers, {} parameters", providers.len(), table.len());
        self.engine = Some(ResponseEngine::new(table, providers)?);
        self.state = PipelineState::RegistryBuilt;
        Ok(())
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Skip/count window this pipeline reads.
    #[must_use]
    pub fn options(&self) -> RunOptions {
        self.options
    }

    /// The metadata table, once built.
    #[must_use]
    pub fn table(&self) -> Option<&Arc<MetadataTable>> {
        self.engine.as_ref().map(ResponseEngine::table)
    }

    /// `RegistryBuilt → Streaming → Finalized`.
    ///
    /// `make_sink` is only called after the preconditions pass. If the run
    /// fails afterwards, the sink is dropped unfinalized.
    ///
    /// # Errors
    /// Any fatal error: precondition, resolution, provider failure, ordering
    /// violation, or store error.
    pub fn run<P, S, K, F>(&mut self, mut primary: P, secondary: S, make_sink: F) -> ReweightResult<RunSummary>
    where
        P: RecordSource<PrimaryRecord>,
        S: RecordSource<SecondaryRecord>,
        K: RecordSink,
        F: FnOnce() -> Result<K, StoreError>,
    {
        if self.state != PipelineState::RegistryBuilt {
            return Err(precondition(format!("cannot run in state {}", self.state)));
        }
        let engine = self
            .engine
            .as_ref()
            .ok_or_else(|| ReweightError::internal("registry built without an engine"))?;

        let total = primary.len();
        info!("@@ Number of CAF events: {total}");
        if total > 0 && secondary.is_empty() {
            return Err(precondition(format!(
                "secondary store is empty but primary store holds {total} records"
            )));
        }

        let range = self.options.range(total);
        info!("@@ Processing records [{}, {})", range.start, range.end);

        let mut resolver = ForeignKeyResolver::new(secondary);
        let mut out = OutputAssembler::new(make_sink()?);
        out.write_metadata(engine.table())?;
        self.state = PipelineState::Streaming;

        let mut summary = RunSummary {
            records_total: total,
            ..RunSummary::default()
        };

        for index in range {
            let mut record = primary.read(index)?;
            summary.records_read += 1;
            debug!(
                "@@ Record {index} (run {}, subrun {}, event {}): {} interactions",
                record.run,
                record.subrun,
                record.event,
                record.interaction_count()
            );

            for interaction in 0..record.interaction_count() {
                let generated = resolver.resolve(index, &record, interaction)?;
                let set = engine.compute_responses(&generated)?;

                for rejection in &set.rejected {
                    warn!(
                        record = index,
                        interaction,
                        param_id = rejection.error.param_id(),
                        provider = %rejection.provider,
                        "discarding response entry: {}",
                        rejection.error
                    );
                }
                summary.accepted_entries += set.accepted.len();
                summary.rejected_entries += set.rejected.len();
                summary.interactions += 1;

                if let Some(nu) = record.mc.nu.get_mut(interaction) {
                    nu.fold_responses(&set.accepted, engine.table());
                }
            }

            out.write_record(index, &record)?;
        }

        summary.records_written = out.finalize()?;
        self.state = PipelineState::Finalized;
        info!(
            "@@ Done: {} records written, {} interactions, {} entries accepted, {} rejected",
            summary.records_written, summary.interactions, summary.accepted_entries, summary.rejected_entries
        );
        Ok(summary)
    }
}

fn precondition(reason: String) -> ReweightError {
    ExecutionError::Precondition { reason }.into()
}
