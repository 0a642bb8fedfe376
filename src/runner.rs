//! Trial Runner: warm-up, then K timed repetitions
//!
//! The warm-up invocation primes caches (page cache, prepared statements,
//! allocator) and is never recorded. Each repetition is timed with a
//! monotonic clock around the operation alone. The first failure aborts the
//! configuration; nothing is recorded for the failing repetition.

use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info_span};

use crate::error::TrialStage;
use crate::experiment::{Dimension, MetricCategory, RecordSink, TrialRecord};
use crate::{Error, Result};

/// Output of one operation invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Observation {
    /// Count, estimate or size produced by the operation.
    pub measured_value: u64,
    /// Structure size, for operations that report one.
    pub storage_bytes: Option<u64>,
}

impl Observation {
    /// Observation without a size.
    #[must_use]
    pub const fn value(measured_value: u64) -> Self {
        Self {
            measured_value,
            storage_bytes: None,
        }
    }

    /// Observation carrying a size.
    #[must_use]
    pub const fn with_storage(measured_value: u64, storage_bytes: u64) -> Self {
        Self {
            measured_value,
            storage_bytes: Some(storage_bytes),
        }
    }
}

/// Identity of one configuration (one sweep cell).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialSpec {
    /// Record table the trials go to.
    pub category: MetricCategory,
    /// Configuration label.
    pub test_name: String,
    /// Active sweep coordinates.
    pub dimensions: Vec<(Dimension, i64)>,
    /// Reference exact count for the relative error, if known.
    pub exact_count: Option<u64>,
}

impl TrialSpec {
    /// Create a spec without a reference count.
    #[must_use]
    pub fn new(
        category: MetricCategory,
        test_name: impl Into<String>,
        dimensions: &[(Dimension, i64)],
    ) -> Self {
        Self {
            category,
            test_name: test_name.into(),
            dimensions: dimensions.to_vec(),
            exact_count: None,
        }
    }

    /// Attach the reference exact count.
    #[must_use]
    pub const fn with_exact_count(mut self, exact: Option<u64>) -> Self {
        self.exact_count = exact;
        self
    }
}

/// What one configuration produced.
#[derive(Debug, Clone, Serialize)]
pub struct TrialSummary {
    /// Configuration that ran.
    pub spec: TrialSpec,
    /// Records written (always the configured repetition count).
    pub records: u32,
    /// Observation of the last repetition.
    pub last: Observation,
    /// Mean timed duration.
    pub mean_ms: f64,
    /// Fastest repetition.
    pub min_ms: f64,
    /// Slowest repetition.
    pub max_ms: f64,
}

/// Executes configurations with the warm-up/repeat protocol.
#[derive(Debug, Clone, Copy)]
pub struct TrialRunner {
    repetitions: u32,
}

impl TrialRunner {
    /// Create a runner with `repetitions` timed repetitions per configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `repetitions` is zero.
    pub fn new(repetitions: u32) -> Result<Self> {
        if repetitions == 0 {
            return Err(Error::Config("repetitions must be positive".to_string()));
        }
        Ok(Self { repetitions })
    }

    /// Timed repetitions per configuration.
    #[must_use]
    pub const fn repetitions(&self) -> u32 {
        self.repetitions
    }

    /// Run one configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Trial`] if the warm-up or any repetition fails, and
    /// propagates sink failures unchanged.
    #[allow(clippy::cast_precision_loss)]
    pub fn run<F, S>(
        &self,
        spec: &TrialSpec,
        mut operation: F,
        sink: &mut S,
    ) -> Result<TrialSummary>
    where
        F: FnMut() -> Result<Observation>,
        S: RecordSink + ?Sized,
    {
        let span = info_span!("trial", test_name = %spec.test_name, category = %spec.category);
        let _guard = span.enter();

        operation().map_err(|e| Error::trial(&spec.test_name, TrialStage::WarmUp, e))?;
        debug!("warm-up complete");

        let mut last = Observation::value(0);
        let mut total_ms = 0.0;
        let mut min_ms = f64::INFINITY;
        let mut max_ms = 0.0_f64;

        for run_number in 1..=self.repetitions {
            let start = Instant::now();
            let observation = operation()
                .map_err(|e| Error::trial(&spec.test_name, TrialStage::Repetition(run_number), e))?;
            let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

            let record = TrialRecord::builder(spec.category, spec.test_name.clone())
                .dimensions(&spec.dimensions)
                .run_number(run_number)
                .measured_value(observation.measured_value)
                .duration_ms(duration_ms)
                .exact_count(spec.exact_count)
                .storage_bytes(observation.storage_bytes)
                .build();
            sink.record(&record)?;

            debug!(run_number, duration_ms, measured = observation.measured_value, "repetition");
            last = observation;
            total_ms += duration_ms;
            min_ms = min_ms.min(duration_ms);
            max_ms = max_ms.max(duration_ms);
        }

        Ok(TrialSummary {
            spec: spec.clone(),
            records: self.repetitions,
            last,
            mean_ms: total_ms / f64::from(self.repetitions),
            min_ms,
            max_ms,
        })
    }
}
