//! Trial Record - one row per timed repetition

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

use super::{Dimension, Field, MetricCategory};
use crate::sketch::Precision;
use crate::{Error, Result};

/// Relative error of an estimate, in percent.
///
/// Returns `None` when `exact` is zero: the ratio is undefined and the
/// recorded cell stays empty.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn relative_error_pct(estimate: u64, exact: u64) -> Option<f64> {
    if exact == 0 {
        return None;
    }
    Some(estimate.abs_diff(exact) as f64 * 100.0 / exact as f64)
}

/// Trial Record represents a single timed repetition of one configuration.
///
/// Warm-up invocations never produce a record; `run_number` is 1-based and
/// contiguous within a configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrialRecord {
    category: MetricCategory,
    test_name: String,
    dimensions: Vec<(Dimension, i64)>,
    run_number: u32,
    measured_value: u64,
    duration_ms: f64,
    exact_count: Option<u64>,
    relative_error_pct: Option<f64>,
    storage_bytes: Option<u64>,
    recorded_at: DateTime<Utc>,
}

impl TrialRecord {
    /// Create a builder for a record of `category`.
    #[must_use]
    pub fn builder(category: MetricCategory, test_name: impl Into<String>) -> TrialRecordBuilder {
        TrialRecordBuilder::new(category, test_name)
    }

    /// Get the metric category.
    #[must_use]
    pub const fn category(&self) -> MetricCategory {
        self.category
    }

    /// Get the configuration label.
    #[must_use]
    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    /// Get the sweep coordinates.
    #[must_use]
    pub fn dimensions(&self) -> &[(Dimension, i64)] {
        &self.dimensions
    }

    /// Get one sweep coordinate.
    #[must_use]
    pub fn dimension(&self, dimension: Dimension) -> Option<i64> {
        self.dimensions
            .iter()
            .find(|(d, _)| *d == dimension)
            .map(|(_, v)| *v)
    }

    /// Get the 1-based repetition ordinal.
    #[must_use]
    pub const fn run_number(&self) -> u32 {
        self.run_number
    }

    /// Get the operation output.
    #[must_use]
    pub const fn measured_value(&self) -> u64 {
        self.measured_value
    }

    /// Get the timed duration in milliseconds.
    #[must_use]
    pub const fn duration_ms(&self) -> f64 {
        self.duration_ms
    }

    /// Get the reference exact count, if any.
    #[must_use]
    pub const fn exact_count(&self) -> Option<u64> {
        self.exact_count
    }

    /// Get the relative error, if defined.
    #[must_use]
    pub const fn relative_error_pct(&self) -> Option<f64> {
        self.relative_error_pct
    }

    /// Get the reported size in bytes, if any.
    #[must_use]
    pub const fn storage_bytes(&self) -> Option<u64> {
        self.storage_bytes
    }

    /// Get the time the record was produced.
    #[must_use]
    pub const fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }

    /// Value of a column for persistence.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Other`] if a required dimension is missing or a
    /// count does not fit a signed 64-bit integer.
    pub fn sql_value(&self, field: Field) -> Result<Value> {
        let value = match field {
            Field::TestName => Value::Text(self.test_name.clone()),
            Field::Dimension(d) => Value::Integer(self.dimension(d).ok_or_else(|| {
                Error::Other(format!(
                    "{} record {} lacks dimension {d:?}",
                    self.category, self.test_name
                ))
            })?),
            Field::SketchType => {
                let bits = self.dimension(Dimension::Precision).ok_or_else(|| {
                    Error::Other(format!(
                        "{} record {} lacks a precision",
                        self.category, self.test_name
                    ))
                })?;
                Value::Text(Precision::try_from(bits)?.type_label())
            }
            Field::RunNumber => Value::Integer(i64::from(self.run_number)),
            Field::MeasuredValue => Value::Integer(to_i64(self.measured_value)?),
            Field::ExactCount => optional_integer(self.exact_count)?,
            Field::RelativeError => self.relative_error_pct.map_or(Value::Null, Value::Real),
            Field::DurationMs => Value::Real(self.duration_ms),
            Field::StorageBytes => optional_integer(self.storage_bytes)?,
        };
        Ok(value)
    }
}

fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| Error::Other(format!("value {value} exceeds i64")))
}

fn optional_integer(value: Option<u64>) -> Result<Value> {
    Ok(match value {
        Some(v) => Value::Integer(to_i64(v)?),
        None => Value::Null,
    })
}

/// Builder for `TrialRecord`.
#[derive(Debug)]
pub struct TrialRecordBuilder {
    category: MetricCategory,
    test_name: String,
    dimensions: Vec<(Dimension, i64)>,
    run_number: u32,
    measured_value: u64,
    duration_ms: f64,
    exact_count: Option<u64>,
    storage_bytes: Option<u64>,
    recorded_at: DateTime<Utc>,
}

impl TrialRecordBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(category: MetricCategory, test_name: impl Into<String>) -> Self {
        Self {
            category,
            test_name: test_name.into(),
            dimensions: Vec::new(),
            run_number: 1,
            measured_value: 0,
            duration_ms: 0.0,
            exact_count: None,
            storage_bytes: None,
            recorded_at: Utc::now(),
        }
    }

    /// Set the sweep coordinates.
    #[must_use]
    pub fn dimensions(mut self, dimensions: &[(Dimension, i64)]) -> Self {
        self.dimensions = dimensions.to_vec();
        self
    }

    /// Set the repetition ordinal.
    #[must_use]
    pub const fn run_number(mut self, run_number: u32) -> Self {
        self.run_number = run_number;
        self
    }

    /// Set the operation output.
    #[must_use]
    pub const fn measured_value(mut self, value: u64) -> Self {
        self.measured_value = value;
        self
    }

    /// Set the timed duration; negative inputs clamp to zero.
    #[must_use]
    pub fn duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = duration_ms.max(0.0);
        self
    }

    /// Set the reference exact count.
    #[must_use]
    pub const fn exact_count(mut self, exact: Option<u64>) -> Self {
        self.exact_count = exact;
        self
    }

    /// Set the reported size.
    #[must_use]
    pub const fn storage_bytes(mut self, bytes: Option<u64>) -> Self {
        self.storage_bytes = bytes;
        self
    }

    /// Set a custom timestamp.
    #[must_use]
    pub const fn recorded_at(mut self, recorded_at: DateTime<Utc>) -> Self {
        self.recorded_at = recorded_at;
        self
    }

    /// Build the `TrialRecord`, deriving the relative error from the
    /// measured value and the exact count.
    #[must_use]
    pub fn build(self) -> TrialRecord {
        let relative_error_pct = self
            .exact_count
            .and_then(|exact| relative_error_pct(self.measured_value, exact));
        TrialRecord {
            category: self.category,
            test_name: self.test_name,
            dimensions: self.dimensions,
            run_number: self.run_number,
            measured_value: self.measured_value,
            duration_ms: self.duration_ms,
            exact_count: self.exact_count,
            relative_error_pct,
            storage_bytes: self.storage_bytes,
            recorded_at: self.recorded_at,
        }
    }
}
