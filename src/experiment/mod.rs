//! Trial records, metric categories and the Metrics Recorder
//!
//! ## Schema Overview
//!
//! ```text
//! RunRecord (1) ──< TrialRecord (N) [one per timed repetition]
//!      │                 └── MetricCategory → recorder table + export file
//!      └──< ArtifactRecord (N) [files promoted at finalization]
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use hll_bench::experiment::{
//!     Dimension, MetricCategory, MetricsRecorder, RecordSink, TrialRecord,
//! };
//!
//! let mut recorder = MetricsRecorder::in_memory()?;
//!
//! let record = TrialRecord::builder(MetricCategory::BulkApprox, "hll_p12_n10000")
//!     .dimensions(&[(Dimension::Precision, 12), (Dimension::Scale, 10_000)])
//!     .run_number(1)
//!     .measured_value(1_013)
//!     .exact_count(Some(1_000))
//!     .duration_ms(0.7)
//!     .build();
//! recorder.record(&record)?;
//!
//! assert_eq!(recorder.count(MetricCategory::BulkApprox)?, 1);
//! # Ok::<(), hll_bench::Error>(())
//! ```

mod artifact_record;
mod category;
mod recorder;
mod run_record;
mod trial_record;

pub use artifact_record::{ArtifactKind, ArtifactRecord};
pub use category::{Column, Dimension, Field, MetricCategory};
pub use recorder::{MetricsRecorder, RecordSink};
pub use run_record::{Phase, RunRecord, RunStatus};
pub use trial_record::{relative_error_pct, TrialRecord, TrialRecordBuilder};
