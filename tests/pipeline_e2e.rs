//! End-to-end reweighting runs over file-backed stores.
//!
//! Each test writes an input store with a primary and a secondary tree, runs
//! the pipeline into an output store and reads the result back.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use caf_reweight::{
    ExecutionError, FileSink, GlobalRecord, InteractionMode, InteractionSubRecord, McTruth, MetadataTable,
    ParamId, ParameterHeader, Pipeline, PrimaryRecord, ProviderConfiguration, ProviderError, ProviderSet,
    RecordSource, ResponseEngine, ResponseEntry, ResponseProvider, ReweightError, RunOptions, RunSummary,
    SecondaryRecord, StoreConfig, StoreLayout, StoreReader, StoreWriter, TreeReader, DEFAULT_CONFIG_KEY,
};
use tempfile::tempdir;
use tracing::Level;

mod helpers;
use helpers::log_capture::LogCapture;

const CONFIG: &str = r#"
[generated_systematic_provider_configuration]
syst_providers = ["qe_norm", "tilt"]

[generated_systematic_provider_configuration.qe_norm]
tool_type = "ModeNormalization"

[[generated_systematic_provider_configuration.qe_norm.parameter_headers]]
id = 3
pretty_name = "NormCCQE"
variations = [-2.0, -1.0, 1.0, 2.0]
mode = "qe"
current = "cc"
uncertainty = 0.15

[[generated_systematic_provider_configuration.qe_norm.parameter_headers]]
id = 5
pretty_name = "QECorrection"
is_correction = true
central_value = 1
variations = [-1.0, 1.0]
mode = "qe"
uncertainty = 0.2

[generated_systematic_provider_configuration.tilt]
tool_type = "EnergyTilt"

[[generated_systematic_provider_configuration.tilt.parameter_headers]]
id = 7
pretty_name = "EnergyTilt"
variations = [-1.0, 0.0, 1.0]
uncertainty = 0.1
pivot_energy = 2.0
"#;

fn store_config() -> StoreConfig {
    StoreConfig {
        sync_on_finalize: false,
        ..StoreConfig::default()
    }
}

fn generated(i: usize) -> SecondaryRecord {
    SecondaryRecord {
        mode: if i % 3 == 2 { InteractionMode::Res } else { InteractionMode::Qe },
        is_cc: true,
        probe_pdg: 14,
        probe_energy: 0.5 + i as f64 * 0.25,
        target_pdg: 1_000_180_400,
        q2: 0.4,
        w: 1.0,
        particles: Vec::new(),
    }
}

fn interaction(foreign_index: u64, energy: f64) -> InteractionSubRecord {
    InteractionSubRecord {
        foreign_index,
        pdg: 14,
        energy,
        mode: InteractionMode::Qe,
        is_cc: true,
        target_pdg: 1_000_180_400,
        cv_weight: 1.0,
        syst_weights: Vec::new(),
    }
}

/// Write `events` events with one interaction each (plus a second one on odd
/// events), pointing at `events + 1` generator records.
fn write_input(path: &Path, events: usize, dangling_at: Option<usize>) {
    let layout = StoreLayout::default();
    let mut writer = StoreWriter::create(path, store_config()).unwrap();
    writer.declare_tree(&layout.primary_tree);
    writer.declare_tree(&layout.secondary_tree);

    for i in 0..events {
        let mut nu = vec![interaction(i as u64, 1.0)];
        if i % 2 == 1 {
            nu.push(interaction(i as u64 + 1, 2.0));
        }
        if dangling_at == Some(i) {
            nu[0].foreign_index = 10_000;
        }
        let record = PrimaryRecord {
            run: 1,
            subrun: 7,
            event: i as u32,
            mc: McTruth { nu },
        };
        writer.append(&layout.primary_tree, &record).unwrap();
    }
    for i in 0..=events {
        writer.append(&layout.secondary_tree, &generated(i)).unwrap();
    }
    writer.finalize().unwrap();
}

fn run_file(
    pipeline: &mut Pipeline,
    input: &Path,
    output: &Path,
) -> Result<RunSummary, ReweightError> {
    let layout = StoreLayout::default();
    let primary: TreeReader<PrimaryRecord> = TreeReader::open(input, &layout.primary_tree, store_config())?;
    let secondary: TreeReader<SecondaryRecord> = TreeReader::open(input, &layout.secondary_tree, store_config())?;
    let output = output.to_path_buf();
    pipeline.run(primary, secondary, move || FileSink::create(output, layout, store_config()))
}

fn pipeline(options: RunOptions) -> Pipeline {
    let config = ProviderConfiguration::from_toml_str(CONFIG, DEFAULT_CONFIG_KEY).unwrap();
    Pipeline::from_config(&config, options).unwrap()
}

fn read_output(path: &Path) -> (GlobalRecord, Vec<PrimaryRecord>) {
    let layout = StoreLayout::default();
    let mut global: TreeReader<GlobalRecord> = TreeReader::open(path, &layout.global_tree, store_config()).unwrap();
    assert_eq!(global.len(), 1, "global tree must hold exactly one entry");
    let global = global.read(0).unwrap();

    let mut events: TreeReader<PrimaryRecord> = TreeReader::open(path, &layout.primary_tree, store_config()).unwrap();
    let records = (0..events.len()).map(|i| events.read(i).unwrap()).collect();
    (global, records)
}

fn dir_entries(dir: &Path) -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir).unwrap().map(|e| e.unwrap().path()).collect();
    entries.sort();
    entries
}

#[test]
fn test_skip_and_count_window() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.caf");
    let output = dir.path().join("out.caf");
    write_input(&input, 10, None);

    let mut pipeline = pipeline(RunOptions { skip: 2, max_events: 5 });
    let summary = run_file(&mut pipeline, &input, &output).unwrap();
    assert_eq!(summary.records_total, 10);
    assert_eq!(summary.records_written, 5);

    let (global, records) = read_output(&output);
    assert_eq!(global.params.len(), 3);
    let events: Vec<u32> = records.iter().map(|r| r.event).collect();
    assert_eq!(events, vec![2, 3, 4, 5, 6]);
}

#[test]
fn test_empty_windows_produce_header_only_output() {
    for options in [
        RunOptions { skip: 10, max_events: usize::MAX },
        RunOptions { skip: 25, max_events: 3 },
        RunOptions { skip: 0, max_events: 0 },
    ] {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in.caf");
        let output = dir.path().join("out.caf");
        write_input(&input, 10, None);

        let summary = run_file(&mut pipeline(options), &input, &output).unwrap();
        assert_eq!(summary.records_written, 0);

        let (global, records) = read_output(&output);
        assert_eq!(global.params.len(), 3);
        assert!(records.is_empty());
    }
}

#[test]
fn test_weights_attached_to_every_interaction() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.caf");
    let output = dir.path().join("out.caf");
    write_input(&input, 4, None);

    let summary = run_file(&mut pipeline(RunOptions::default()), &input, &output).unwrap();
    assert_eq!(summary.interactions, 6);
    assert_eq!(summary.rejected_entries, 0);

    let (global, records) = read_output(&output);
    let table: Vec<(ParamId, u32, bool)> = global
        .params
        .iter()
        .map(|p| (p.id, p.variation_count, p.is_correction))
        .collect();
    assert_eq!(table, vec![(3, 4, false), (5, 1, true), (7, 3, false)]);

    // event 0 resolves to generator record 0 (QE, 0.5 GeV)
    let nu = &records[0].mc.nu[0];
    let ids: Vec<ParamId> = nu.syst_weights.iter().map(|w| w.id).collect();
    assert_eq!(ids, vec![3, 5, 7]);
    for w in &nu.syst_weights {
        let header = global.params.iter().find(|p| p.id == w.id).unwrap();
        assert_eq!(w.weights.len(), header.variation_count as usize);
    }
    assert!((nu.cv_weight - 1.2).abs() < 1e-12);

    // event 1, second interaction resolves to generator record 2 (RES): only the tilt applies
    let nu = &records[1].mc.nu[1];
    let ids: Vec<ParamId> = nu.syst_weights.iter().map(|w| w.id).collect();
    assert_eq!(ids, vec![7]);
    assert_eq!(nu.cv_weight, 1.0);
}

#[test]
fn test_dangling_foreign_index_leaves_no_output() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.caf");
    let output = dir.path().join("out.caf");
    write_input(&input, 6, Some(3));

    let err = run_file(&mut pipeline(RunOptions::default()), &input, &output).unwrap_err();
    match err {
        ReweightError::Execution(ExecutionError::Resolution {
            record,
            interaction,
            foreign_index,
            available,
        }) => {
            assert_eq!(record, 3);
            assert_eq!(interaction, 0);
            assert_eq!(foreign_index, 10_000);
            assert_eq!(available, 7);
        }
        other => panic!("expected a resolution error, got {other:?}"),
    }
    assert!(!output.exists());
    assert_eq!(dir_entries(dir.path()), vec![input]);
}

#[test]
fn test_duplicate_parameter_id_creates_no_output() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("out.caf");

    let doc = CONFIG.replace("id = 7", "id = 3");
    let config = ProviderConfiguration::from_toml_str(&doc, DEFAULT_CONFIG_KEY).unwrap();
    let err = Pipeline::from_config(&config, RunOptions::default()).unwrap_err();
    assert!(err.is_config());
    assert!(err.to_string().contains("qe_norm"));
    assert!(err.to_string().contains("tilt"));
    assert!(!output.exists());
    assert!(dir_entries(dir.path()).is_empty());
}

#[test]
fn test_empty_secondary_tree_is_rejected() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.caf");
    let output = dir.path().join("out.caf");
    let layout = StoreLayout::default();

    let mut writer = StoreWriter::create(&input, store_config()).unwrap();
    writer.declare_tree(&layout.secondary_tree);
    writer.append(&layout.primary_tree, &PrimaryRecord::default()).unwrap();
    writer.finalize().unwrap();

    let err = run_file(&mut pipeline(RunOptions::default()), &input, &output).unwrap_err();
    assert!(matches!(err, ReweightError::Execution(ExecutionError::Precondition { .. })));
    assert_eq!(dir_entries(dir.path()), vec![input]);
}

#[test]
fn test_runs_are_idempotent() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.caf");
    let first = dir.path().join("first.caf");
    let second = dir.path().join("second.caf");
    write_input(&input, 8, None);

    run_file(&mut pipeline(RunOptions::default()), &input, &first).unwrap();
    run_file(&mut pipeline(RunOptions::default()), &input, &second).unwrap();

    let (global_a, records_a) = read_output(&first);
    let (global_b, records_b) = read_output(&second);
    assert_eq!(global_a, global_b);
    assert_eq!(
        serde_json::to_vec(&global_a.params).unwrap(),
        serde_json::to_vec(&global_b.params).unwrap()
    );
    assert_eq!(records_a, records_b);
}

#[test]
fn test_metadata_precedes_first_record() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.caf");
    let output = dir.path().join("out.caf");
    write_input(&input, 3, None);
    run_file(&mut pipeline(RunOptions::default()), &input, &output).unwrap();

    let layout = StoreLayout::default();
    let store = StoreReader::open(&output, store_config()).unwrap();
    let trees = &store.footer().trees;
    let global = &trees[&layout.global_tree].offsets;
    let events = &trees[&layout.primary_tree].offsets;
    assert_eq!(global.len(), 1);
    assert_eq!(events.len(), 3);
    assert!(global[0] < events[0]);
    assert!(!store.has_tree(&layout.secondary_tree));
}

/// Returns the wrong number of responses for id 7.
struct ShortTilt;

impl ResponseProvider for ShortTilt {
    fn name(&self) -> &str {
        "short_tilt"
    }

    fn parameter_ids(&self) -> Vec<ParamId> {
        vec![7, 8]
    }

    fn can_respond(&self, _: &SecondaryRecord) -> bool {
        true
    }

    fn responses(&self, _: &SecondaryRecord) -> Result<Vec<ResponseEntry>, ProviderError> {
        Ok(vec![
            ResponseEntry::new(7, 1.0, vec![0.9, 1.1]),
            ResponseEntry::new(8, 1.0, vec![0.95, 1.05]),
        ])
    }
}

#[test]
fn test_arity_mismatch_drops_only_that_entry() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.caf");
    let output = dir.path().join("out.caf");
    write_input(&input, 2, None);

    let header = |id, variation_count| ParameterHeader {
        id,
        name: format!("P{id}"),
        variation_count,
        is_correction: false,
    };
    let table = Arc::new(MetadataTable::new(vec![header(7, 3), header(8, 2)]).unwrap());
    let mut providers = ProviderSet::new();
    providers.push(Box::new(ShortTilt));
    let engine = ResponseEngine::new(table, providers).unwrap();

    let mut pipeline = Pipeline::with_engine(engine, RunOptions::default());
    let logs = LogCapture::new();
    let summary = logs.scoped(|| run_file(&mut pipeline, &input, &output)).unwrap();
    assert_eq!(summary.interactions, 3);
    assert_eq!(summary.accepted_entries, 3);
    assert_eq!(summary.rejected_entries, 3);

    let warnings = logs.matching(Level::WARN, "discarding response entry");
    assert_eq!(warnings.len(), 3, "one warning per rejected entry: {warnings:?}");
    for warning in &warnings {
        assert_eq!(warning.fields["param_id"], "7");
        assert_eq!(warning.fields["provider"], "short_tilt");
        assert!(warning.message.contains("expected 3"), "{}", warning.message);
    }

    let (_, records) = read_output(&output);
    for record in &records {
        for nu in &record.mc.nu {
            assert!(nu.weights_for(7).is_none());
            assert_eq!(nu.weights_for(8).unwrap().weights, vec![0.95, 1.05]);
        }
    }
}
