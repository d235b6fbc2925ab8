//! # caf-reweight - Systematic Weights for Simulated Event Records
//!
//! Augments a store of simulated event records with per-parameter systematic
//! weights. Each event's true interactions point at detailed generator records
//! in a secondary store; configured response providers evaluate those and the
//! results are folded back into the event, next to a metadata table describing
//! every parameter.
//!
//! ## Core Concepts
//!
//! - **MetadataTable**: the parameter headers, built once from configuration
//! - **ResponseProvider**: computes weights for the parameters it declares
//! - **ResponseEngine**: runs providers and validates their output
//! - **Pipeline**: streams records from input to output in order
//!
//! ## Usage
//!
//! ```rust,ignore
//! use caf_reweight::{FileSink, Pipeline, ProviderConfiguration, RunOptions, StoreConfig, StoreLayout, TreeReader};
//!
//! let config = ProviderConfiguration::load("syst.toml", caf_reweight::DEFAULT_CONFIG_KEY)?;
//! let mut pipeline = Pipeline::from_config(&config, RunOptions::default())?;
//!
//! let layout = StoreLayout::default();
//! let store = StoreConfig::default();
//! let primary = TreeReader::open("in.caf", &layout.primary_tree, store)?;
//! let secondary = TreeReader::open("in.caf", &layout.secondary_tree, store)?;
//! let summary = pipeline.run(primary, secondary, || FileSink::create("out.caf", layout, store))?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod assembler;
pub mod config;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod provider;
pub mod record;
pub mod registry;
pub mod resolver;
pub mod store;

pub use assembler::OutputAssembler;
pub use config::{
    ParameterConfig, ProviderConfig, ProviderConfiguration, RunOptions, StoreLayout, DEFAULT_CONFIG_KEY,
};
pub use engine::{Rejection, ResponseEngine, ResponseSet};
pub use error::{ConfigError, ExecutionError, ReweightError, ReweightResult, ValidationError};
pub use pipeline::{Pipeline, PipelineState, RunSummary};
pub use provider::{ProviderError, ProviderSet, ResponseEntry, ResponseProvider};
pub use record::{
    GlobalRecord, InteractionMode, InteractionSubRecord, McTruth, Particle, PrimaryRecord, SecondaryRecord,
    SystWeights,
};
pub use registry::{MetadataTable, ParamId, ParameterHeader, ParameterRegistry};
pub use resolver::ForeignKeyResolver;
pub use store::{
    FileSink, MemorySink, MemorySource, RecordSink, RecordSource, StoreConfig, StoreError, StoreReader, StoreWriter,
    TreeReader,
};
