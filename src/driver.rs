//! Experiment Driver: the run state machine
//!
//! ```text
//! INIT → PRE_CLEANUP → SETUP → SWEEP → EXPORT → POST_CLEANUP → FINALIZE
//!   └──────────┴──────────┴───────┴───────┴────────────┴──────────┘
//!                        any failure jumps to FINALIZE
//! ```
//!
//! The driver owns the backing store and the recorder for one run. It never
//! promotes artifacts itself: it writes the run manifest into the logs stage
//! and leaves promotion to [`ArtifactCapture::finalize`], which the caller
//! (or `Drop`) runs afterwards.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, info_span, warn};

use crate::capture::ArtifactCapture;
use crate::config::HarnessConfig;
use crate::experiment::{MetricCategory, MetricsRecorder, Phase, RunRecord, RunStatus};
use crate::export::ResultExporter;
use crate::runner::TrialSummary;
use crate::sketch::{Precision, SketchRollup};
use crate::store::BenchStore;
use crate::sweep::SweepController;
use crate::throughput::{ThroughputRunner, ThroughputSummary, Workload};
use crate::{Error, Result};

/// File name of the recorder database inside the outputs stage.
pub const RECORDER_FILE: &str = "metrics.sqlite3";

/// File name of the run manifest inside the logs stage.
pub const MANIFEST_FILE: &str = "run.json";

/// Everything a run produced, successful or not.
#[derive(Debug)]
pub struct RunReport {
    /// Final run record (also written as the manifest).
    pub record: RunRecord,
    /// One summary per completed sweep cell.
    pub cells: Vec<TrialSummary>,
    /// Exported files.
    pub exported: Vec<PathBuf>,
    /// Concurrent workload results.
    pub throughput: Vec<ThroughputSummary>,
    /// The failure that ended the run early.
    pub error: Option<Error>,
}

impl RunReport {
    /// Whether every phase completed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.record.status() == RunStatus::Success
    }
}

#[derive(Default)]
struct RunState {
    store: Option<BenchStore>,
    recorder: Option<MetricsRecorder>,
    rollups: Vec<SketchRollup>,
    cells: Vec<TrialSummary>,
    exported: Vec<PathBuf>,
    throughput: Vec<ThroughputSummary>,
}

/// Runs the phases of one harness invocation.
pub struct ExperimentDriver<'a> {
    config: &'a HarnessConfig,
    capture: &'a ArtifactCapture,
}

impl<'a> ExperimentDriver<'a> {
    /// Driver writing its artifacts through `capture`.
    #[must_use]
    pub const fn new(config: &'a HarnessConfig, capture: &'a ArtifactCapture) -> Self {
        Self { config, capture }
    }

    /// Run every phase. Never fails: failures end up in the report and the
    /// manifest.
    pub fn run(&self) -> RunReport {
        let _span = info_span!("run", run_id = %self.capture.run_id()).entered();
        let config_snapshot = match serde_json::to_value(self.config) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "cannot snapshot configuration for the manifest");
                serde_json::Value::Null
            }
        };
        let mut record = RunRecord::new(self.capture.run_id()).with_config(config_snapshot);
        record.start();

        let mut state = RunState::default();
        let mut failure = None;
        for phase in [
            Phase::Init,
            Phase::PreCleanup,
            Phase::Setup,
            Phase::Sweep,
            Phase::Export,
            Phase::PostCleanup,
        ] {
            info!(phase = %phase, "entering phase");
            match self.run_phase(phase, &mut state) {
                Ok(summary) => {
                    record.phase_completed(phase);
                    self.stage_phase_log(phase, &summary);
                }
                Err(e) => {
                    error!(phase = %phase, error = %e, "phase failed");
                    self.stage_phase_log(phase, &format!("FAILED: {e}\n"));
                    record.fail(phase, e.to_string());
                    failure = Some(e);
                    break;
                }
            }
        }

        record.phase_completed(Phase::Finalize);
        if failure.is_none() {
            record.succeed();
        }
        self.write_manifest(&record);

        RunReport {
            record,
            cells: state.cells,
            exported: state.exported,
            throughput: state.throughput,
            error: failure,
        }
    }

    fn run_phase(&self, phase: Phase, state: &mut RunState) -> Result<String> {
        match phase {
            Phase::Init => self.init(),
            Phase::PreCleanup => self.pre_cleanup(state),
            Phase::Setup => self.setup(state),
            Phase::Sweep => self.sweep(state),
            Phase::Export => self.export(state),
            Phase::PostCleanup => self.post_cleanup(state),
            Phase::Finalize => Ok(String::new()),
        }
    }

    fn init(&self) -> Result<String> {
        self.config.validate()?;
        Ok(format!(
            "run {}\ndatabase {} (user {})\nscales {:?}\nprecisions {:?}\nwindows {:?}\n",
            self.capture.run_id(),
            self.config.database_path().display(),
            self.config.store.user,
            self.config.scales,
            self.config.precisions.iter().map(|p| p.bits()).collect::<Vec<_>>(),
            self.config.window_days,
        ))
    }

    fn pre_cleanup(&self, state: &mut RunState) -> Result<String> {
        let store = BenchStore::open(self.config.database_path())?;
        store.drop_scratch()?;
        state.store = Some(store);
        Ok("scratch tables dropped\n".to_string())
    }

    fn setup(&self, state: &mut RunState) -> Result<String> {
        let store = state
            .store
            .as_mut()
            .ok_or_else(|| Error::Setup("backing store not open".to_string()))?;
        store
            .create_scratch()
            .map_err(|e| Error::setup("creating scratch tables", &e))?;

        let days = self.config.union_days();
        store
            .load_events(days, self.config.events_per_day, self.config.user_pool, self.config.seed)
            .map_err(|e| Error::setup("loading event table", &e))?;

        let mut precisions = self.config.precisions.clone();
        let widest = throughput_precision(self.config);
        if self.config.throughput.is_some() && !precisions.contains(&widest) {
            precisions.push(widest);
        }
        state.rollups = precisions
            .iter()
            .map(|&p| store.build_rollup(p))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| Error::setup("building daily roll-ups", &e))?;

        let recorder_path = self.capture.outputs_stage().join(RECORDER_FILE);
        state.recorder = Some(
            MetricsRecorder::create(&recorder_path)
                .map_err(|e| Error::setup("creating recorder", &e))?,
        );
        Ok(format!(
            "event days {days}, {} events/day\nroll-ups {}\nrecorder {}\n",
            self.config.events_per_day,
            state.rollups.len(),
            recorder_path.display(),
        ))
    }

    fn sweep(&self, state: &mut RunState) -> Result<String> {
        let store = state
            .store
            .as_mut()
            .ok_or_else(|| Error::Setup("backing store not open".to_string()))?;
        let recorder = state
            .recorder
            .as_mut()
            .ok_or_else(|| Error::Setup("recorder not open".to_string()))?;

        let mut controller = SweepController::new(self.config, recorder, self.capture)?;
        state.cells.extend(controller.run_bulk(store)?);
        state.cells.extend(controller.run_hashing(store)?);
        state.cells.extend(controller.run_storage()?);
        state.cells.extend(controller.run_union(store, &state.rollups)?);

        let mut report = format!("{} configurations\n", state.cells.len());
        if let Some(throughput) = &self.config.throughput {
            let precision = throughput_precision(self.config);
            let rollup = state
                .rollups
                .iter()
                .find(|r| r.precision() == precision)
                .cloned()
                .ok_or_else(|| Error::Setup(format!("no roll-up for precision {precision}")))?;
            let runner = ThroughputRunner::new(
                throughput.clone(),
                store.path(),
                Arc::new(rollup),
                &self.config.window_days,
                self.config.seed,
            );
            for workload in Workload::ALL {
                let summary = runner.run(workload)?;
                let path = self.capture.outputs_stage().join(workload.file_name());
                std::fs::write(&path, summary.render())?;
                report.push_str(&format!("{workload}: tps {:.2}\n", summary.tps));
                state.throughput.push(summary);
            }
        }
        Ok(report)
    }

    fn export(&self, state: &mut RunState) -> Result<String> {
        let recorder = state
            .recorder
            .as_ref()
            .ok_or_else(|| Error::Setup("recorder not open".to_string()))?;
        let exporter = ResultExporter::new(self.capture.outputs_stage());
        state.exported = exporter.export_all(recorder)?;
        let mut report = String::new();
        for category in MetricCategory::ALL {
            let rows = recorder.count(category)?;
            report.push_str(&format!("{}: {rows} rows\n", category.file_name()));
        }
        Ok(report)
    }

    fn post_cleanup(&self, state: &mut RunState) -> Result<String> {
        if let Some(store) = state.store.take() {
            store.drop_scratch()?;
        }
        Ok("scratch tables dropped\n".to_string())
    }

    fn stage_phase_log(&self, phase: Phase, contents: &str) {
        if let Err(e) = self.capture.stage_log(&format!("{}.log", phase.name()), contents) {
            warn!(phase = %phase, error = %e, "cannot stage phase log");
        }
    }

    fn write_manifest(&self, record: &RunRecord) {
        let path = self.capture.logs_stage().join(MANIFEST_FILE);
        let written = serde_json::to_string_pretty(record)
            .map_err(Error::from)
            .and_then(|json| std::fs::write(&path, json).map_err(Error::from));
        if let Err(e) = written {
            warn!(path = %path.display(), error = %e, "cannot write run manifest");
        }
    }
}

/// Precision of the roll-up shared by the read-union workload.
fn throughput_precision(config: &HarnessConfig) -> Precision {
    config
        .precisions
        .iter()
        .copied()
        .max_by_key(|p| p.bits())
        .unwrap_or(Precision::P14)
}
