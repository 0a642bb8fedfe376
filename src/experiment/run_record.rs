//! Run Record - one invocation of the harness

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Harness phase. `Finalize` is the only terminal phase and always runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Configuration loaded, nothing touched yet.
    Init,
    /// Leftover scratch state dropped.
    PreCleanup,
    /// Scratch tables created and populated.
    Setup,
    /// Parameter sweeps and throughput workloads.
    Sweep,
    /// Record tables written to delimited files.
    Export,
    /// Scratch state dropped.
    PostCleanup,
    /// Staged artifacts promoted to their durable location.
    Finalize,
}

impl Phase {
    /// Lower-case phase name used in staged file names.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::PreCleanup => "pre_cleanup",
            Self::Setup => "setup",
            Self::Sweep => "sweep",
            Self::Export => "export",
            Self::PostCleanup => "post_cleanup",
            Self::Finalize => "finalize",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Run is created but not yet started.
    Pending,
    /// Run is currently executing.
    Running,
    /// Every phase completed.
    Success,
    /// A phase failed; see the failure fields.
    Failed,
}

/// Run Record represents a single execution of the harness.
///
/// Serialized as `run.json` next to the staged logs, so a crashed run still
/// says how far it got.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRecord {
    run_id: String,
    status: RunStatus,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    completed_phases: Vec<Phase>,
    failed_phase: Option<Phase>,
    error: Option<String>,
    config: Option<serde_json::Value>,
}

impl RunRecord {
    /// Create a new run record in Pending status.
    #[must_use]
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            status: RunStatus::Pending,
            started_at: None,
            ended_at: None,
            completed_phases: Vec::new(),
            failed_phase: None,
            error: None,
            config: None,
        }
    }

    /// Attach the configuration snapshot.
    #[must_use]
    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = Some(config);
        self
    }

    /// Get the run ID (the run timestamp).
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the current run status.
    #[must_use]
    pub const fn status(&self) -> RunStatus {
        self.status
    }

    /// Get the start timestamp, if the run has started.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Get the end timestamp, if the run has completed.
    #[must_use]
    pub const fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Phases that finished, in order.
    #[must_use]
    pub fn completed_phases(&self) -> &[Phase] {
        &self.completed_phases
    }

    /// Phase that failed, if any.
    #[must_use]
    pub const fn failed_phase(&self) -> Option<Phase> {
        self.failed_phase
    }

    /// Failure message, if any.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Configuration snapshot, if attached.
    #[must_use]
    pub const fn config(&self) -> Option<&serde_json::Value> {
        self.config.as_ref()
    }

    /// Start the run, transitioning from Pending to Running.
    pub fn start(&mut self) {
        self.status = RunStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Mark a phase as finished.
    pub fn phase_completed(&mut self, phase: Phase) {
        self.completed_phases.push(phase);
    }

    /// Complete the run successfully.
    pub fn succeed(&mut self) {
        self.status = RunStatus::Success;
        self.ended_at = Some(Utc::now());
    }

    /// Complete the run with a failure in `phase`.
    pub fn fail(&mut self, phase: Phase, error: impl Into<String>) {
        self.status = RunStatus::Failed;
        self.failed_phase = Some(phase);
        self.error = Some(error.into());
        self.ended_at = Some(Utc::now());
    }
}
