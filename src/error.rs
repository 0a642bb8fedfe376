//! Error types for hll-bench
//!
//! Every failure that is not explicitly guarded is fatal for the run. The
//! only local recovery is the zero-denominator guard in
//! [`crate::experiment::relative_error_pct`], which yields `None` instead of
//! an error.

use std::path::PathBuf;

use thiserror::Error;

use crate::sketch::Precision;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Where inside a configuration a trial failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialStage {
    /// The untimed warm-up invocation.
    WarmUp,
    /// A timed repetition (1-based).
    Repetition(u32),
}

impl std::fmt::Display for TrialStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WarmUp => write!(f, "warm-up"),
            Self::Repetition(n) => write!(f, "repetition {n}"),
        }
    }
}

/// hll-bench error types
#[derive(Error, Debug)]
pub enum Error {
    /// Schema or data generation failed
    #[error("Setup failed: {0}")]
    Setup(String),

    /// An operation raised inside a configuration; no record was written for it
    #[error("Trial failed for {test_name} during {stage}: {source}")]
    Trial {
        /// Configuration label
        test_name: String,
        /// Warm-up or the failing repetition
        stage: TrialStage,
        /// Underlying failure
        #[source]
        source: Box<Error>,
    },

    /// Exported table could not be written
    #[error("Export failed for {}: {reason}", path.display())]
    Export {
        /// Destination file
        path: PathBuf,
        /// Reason reported by the writer
        reason: String,
    },

    /// Attempted to merge sketches built with different precisions
    #[error("Cannot merge sketches of different precision: {left} vs {right}")]
    PrecisionMismatch {
        /// Precision of the receiving sketch
        left: Precision,
        /// Precision of the merged-in sketch
        right: Precision,
    },

    /// Invalid harness configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A throughput worker could not be joined
    #[error("Worker failed: {0}")]
    Worker(String),

    /// Backing store or recorder error
    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV writer error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Wrap an operation failure with its configuration label and stage.
    #[must_use]
    pub fn trial(test_name: impl Into<String>, stage: TrialStage, source: Self) -> Self {
        Self::Trial {
            test_name: test_name.into(),
            stage,
            source: Box::new(source),
        }
    }

    /// Convert any error into an [`Error::Setup`], keeping its message.
    #[must_use]
    pub fn setup(context: &str, source: &dyn std::fmt::Display) -> Self {
        Self::Setup(format!("{context}: {source}"))
    }
}
