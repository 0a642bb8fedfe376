//! Metric categories and their fixed column layout
//!
//! The column list of each category is the export contract consumed by the
//! plotting scripts: names and order must not change between runs.

use serde::{Deserialize, Serialize};

/// A sweep dimension. Every dimension value is an integer scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    /// Rows in the raw table.
    Scale,
    /// Sketch precision.
    Precision,
    /// Union window width in days.
    WindowDays,
    /// Distinct items added for a storage snapshot.
    ItemCount,
}

impl Dimension {
    /// Short prefix used when joining dimension values into a test name.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Scale => "n",
            Self::Precision => "p",
            Self::WindowDays => "d",
            Self::ItemCount => "items",
        }
    }
}

/// Which part of a [`super::TrialRecord`] a column carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// Configuration label.
    TestName,
    /// A sweep coordinate.
    Dimension(Dimension),
    /// Sketch configuration label derived from the precision coordinate.
    SketchType,
    /// 1-based repetition ordinal.
    RunNumber,
    /// Operation output.
    MeasuredValue,
    /// Reference exact count.
    ExactCount,
    /// Relative error in percent; empty when undefined.
    RelativeError,
    /// Timed duration in milliseconds.
    DurationMs,
    /// Reported structure size in bytes.
    StorageBytes,
}

impl Field {
    /// SQLite column type for the recorder table.
    #[must_use]
    pub const fn sql_type(self) -> &'static str {
        match self {
            Self::TestName | Self::SketchType => "TEXT NOT NULL",
            Self::Dimension(_) | Self::RunNumber | Self::MeasuredValue => "INTEGER NOT NULL",
            Self::ExactCount | Self::StorageBytes => "INTEGER",
            Self::RelativeError => "REAL",
            Self::DurationMs => "REAL NOT NULL",
        }
    }
}

/// One exported column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    /// Header name.
    pub name: &'static str,
    /// Record field it carries.
    pub field: Field,
}

const fn col(name: &'static str, field: Field) -> Column {
    Column { name, field }
}

const BULK_EXACT: &[Column] = &[
    col("test_name", Field::TestName),
    col("row_count", Field::Dimension(Dimension::Scale)),
    col("distinct_count", Field::MeasuredValue),
    col("duration_ms", Field::DurationMs),
    col("run_number", Field::RunNumber),
];

const BULK_APPROX: &[Column] = &[
    col("test_name", Field::TestName),
    col("precision", Field::Dimension(Dimension::Precision)),
    col("row_count", Field::Dimension(Dimension::Scale)),
    col("hll_estimate", Field::MeasuredValue),
    col("exact_count", Field::ExactCount),
    col("relative_error", Field::RelativeError),
    col("duration_ms", Field::DurationMs),
    col("storage_bytes", Field::StorageBytes),
    col("run_number", Field::RunNumber),
];

const STORAGE: &[Column] = &[
    col("test_name", Field::TestName),
    col("hll_type", Field::SketchType),
    col("precision", Field::Dimension(Dimension::Precision)),
    col("item_count", Field::Dimension(Dimension::ItemCount)),
    col("storage_bytes", Field::StorageBytes),
    col("run_number", Field::RunNumber),
];

const HASHING: &[Column] = &[
    col("test_name", Field::TestName),
    col("row_count", Field::Dimension(Dimension::Scale)),
    col("hashed_count", Field::MeasuredValue),
    col("duration_ms", Field::DurationMs),
    col("run_number", Field::RunNumber),
];

const UNION_APPROX: &[Column] = &[
    col("test_name", Field::TestName),
    col("precision", Field::Dimension(Dimension::Precision)),
    col("num_days", Field::Dimension(Dimension::WindowDays)),
    col("estimated_count", Field::MeasuredValue),
    col("exact_count", Field::ExactCount),
    col("relative_error", Field::RelativeError),
    col("query_time_ms", Field::DurationMs),
    col("total_sketch_size_bytes", Field::StorageBytes),
    col("run_number", Field::RunNumber),
];

const UNION_EXACT: &[Column] = &[
    col("test_name", Field::TestName),
    col("num_days", Field::Dimension(Dimension::WindowDays)),
    col("exact_count", Field::MeasuredValue),
    col("query_time_ms", Field::DurationMs),
    col("run_number", Field::RunNumber),
];

/// Logical record table. One recorder table and one exported file each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricCategory {
    /// Exact `COUNT(DISTINCT)` timings.
    BulkExact,
    /// Sketch aggregation timings and accuracy.
    BulkApprox,
    /// Sketch size snapshots.
    Storage,
    /// Hash function overhead.
    Hashing,
    /// Daily sketch union timings and accuracy.
    UnionApprox,
    /// Exact re-aggregation timings over the same windows.
    UnionExact,
}

impl MetricCategory {
    /// Every category, in export order.
    pub const ALL: [Self; 6] = [
        Self::BulkExact,
        Self::BulkApprox,
        Self::Storage,
        Self::Hashing,
        Self::UnionApprox,
        Self::UnionExact,
    ];

    /// Recorder table name.
    #[must_use]
    pub const fn table(self) -> &'static str {
        match self {
            Self::BulkExact => "results_bulk_exact",
            Self::BulkApprox => "results_bulk_hll",
            Self::Storage => "results_storage",
            Self::Hashing => "results_hashing",
            Self::UnionApprox => "results_union",
            Self::UnionExact => "results_union_exact",
        }
    }

    /// Well-known export file name.
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::BulkExact => "01_results_bulk_exact.csv",
            Self::BulkApprox => "01_results_bulk_hll.csv",
            Self::Storage => "02_results_storage.csv",
            Self::Hashing => "03_results_hashing.csv",
            Self::UnionApprox => "union_detailed.csv",
            Self::UnionExact => "exact_detailed.csv",
        }
    }

    /// Exported columns, in order.
    #[must_use]
    pub const fn columns(self) -> &'static [Column] {
        match self {
            Self::BulkExact => BULK_EXACT,
            Self::BulkApprox => BULK_APPROX,
            Self::Storage => STORAGE,
            Self::Hashing => HASHING,
            Self::UnionApprox => UNION_APPROX,
            Self::UnionExact => UNION_EXACT,
        }
    }

    /// Header row.
    #[must_use]
    pub fn header(self) -> Vec<&'static str> {
        self.columns().iter().map(|c| c.name).collect()
    }

    /// Dimensions a record of this category must carry.
    #[must_use]
    pub fn dimensions(self) -> Vec<Dimension> {
        self.columns()
            .iter()
            .filter_map(|c| match c.field {
                Field::Dimension(d) => Some(d),
                _ => None,
            })
            .collect()
    }
}

impl std::fmt::Display for MetricCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_every_category_starts_with_test_name_and_has_run_number() {
        for category in MetricCategory::ALL {
            let header = category.header();
            assert_eq!(header[0], "test_name");
            assert!(header.contains(&"run_number"), "{category}");
        }
    }

    #[test]
    fn test_column_names_unique_per_category() {
        for category in MetricCategory::ALL {
            let header = category.header();
            let unique: HashSet<_> = header.iter().collect();
            assert_eq!(unique.len(), header.len(), "{category}");
        }
    }

    #[test]
    fn test_file_names_unique() {
        let names: HashSet<_> = MetricCategory::ALL.iter().map(|c| c.file_name()).collect();
        assert_eq!(names.len(), MetricCategory::ALL.len());
    }

    #[test]
    fn test_bulk_hll_layout() {
        assert_eq!(
            MetricCategory::BulkApprox.header(),
            vec![
                "test_name",
                "precision",
                "row_count",
                "hll_estimate",
                "exact_count",
                "relative_error",
                "duration_ms",
                "storage_bytes",
                "run_number"
            ]
        );
        assert_eq!(
            MetricCategory::BulkApprox.dimensions(),
            vec![Dimension::Precision, Dimension::Scale]
        );
    }
}
