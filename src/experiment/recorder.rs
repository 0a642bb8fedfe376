//! Metrics Recorder - durable append-only storage for trial records
//!
//! One SQLite table per [`MetricCategory`]. Every `record` call is a single
//! autocommit insert, so a record is on disk before `record` returns and is
//! immediately visible to the exporter. There is no update or delete path.

use std::path::{Path, PathBuf};

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use tracing::debug;

use super::{Dimension, Field, MetricCategory, TrialRecord};
use crate::{Error, Result};

/// Destination for trial records.
pub trait RecordSink {
    /// Append one record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record could not be persisted.
    fn record(&mut self, record: &TrialRecord) -> Result<()>;
}

impl RecordSink for Vec<TrialRecord> {
    fn record(&mut self, record: &TrialRecord) -> Result<()> {
        self.push(record.clone());
        Ok(())
    }
}

/// Append-only recorder scoped to one harness run.
#[derive(Debug)]
pub struct MetricsRecorder {
    conn: Connection,
    path: Option<PathBuf>,
}

impl MetricsRecorder {
    /// Create a fresh recorder database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if a file already exists at `path`, so records of
    /// another run are never appended to, or if the database cannot be
    /// initialized.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        Self::open(path)
    }

    /// Open (or create) the recorder database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the tables
    /// cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        let recorder = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        recorder.create_tables()?;
        Ok(recorder)
    }

    /// Recorder backed by an in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the tables cannot be created.
    pub fn in_memory() -> Result<Self> {
        let recorder = Self {
            conn: Connection::open_in_memory()?,
            path: None,
        };
        recorder.create_tables()?;
        Ok(recorder)
    }

    /// Database file, if file-backed.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn create_tables(&self) -> Result<()> {
        for category in MetricCategory::ALL {
            let columns: Vec<String> = category
                .columns()
                .iter()
                .map(|c| format!("{} {}", c.name, c.field.sql_type()))
                .collect();
            let sql = format!(
                "CREATE TABLE IF NOT EXISTS {} \
                 (seq INTEGER PRIMARY KEY AUTOINCREMENT, {}, recorded_at TEXT NOT NULL)",
                category.table(),
                columns.join(", ")
            );
            self.conn.execute(&sql, [])?;
        }
        Ok(())
    }

    /// Number of records in a category.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count(&self, category: MetricCategory) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", category.table());
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        u64::try_from(count).map_err(|_| Error::Other(format!("negative count {count}")))
    }

    /// Raw column values of a category, in insertion order and column order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn rows(&self, category: MetricCategory) -> Result<Vec<Vec<Value>>> {
        let names: Vec<&str> = category.header();
        let sql = format!("SELECT {} FROM {} ORDER BY seq", names.join(", "), category.table());
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            (0..names.len())
                .map(|i| row.get::<_, Value>(i))
                .collect::<rusqlite::Result<Vec<Value>>>()
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Records of a category, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a stored row is malformed.
    pub fn records(&self, category: MetricCategory) -> Result<Vec<TrialRecord>> {
        self.rows(category)?
            .into_iter()
            .map(|row| decode(category, row))
            .collect()
    }
}

impl RecordSink for MetricsRecorder {
    fn record(&mut self, record: &TrialRecord) -> Result<()> {
        let category = record.category();
        let columns = category.columns();
        let mut values = columns
            .iter()
            .map(|c| record.sql_value(c.field))
            .collect::<Result<Vec<Value>>>()?;
        values.push(Value::Text(record.recorded_at().to_rfc3339()));

        let names: Vec<&str> = columns.iter().map(|c| c.name).collect();
        let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}, recorded_at) VALUES ({})",
            category.table(),
            names.join(", "),
            placeholders.join(", ")
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        stmt.execute(params_from_iter(values))?;
        debug!(
            category = %category,
            test_name = record.test_name(),
            run_number = record.run_number(),
            "recorded trial"
        );
        Ok(())
    }
}

fn decode(category: MetricCategory, row: Vec<Value>) -> Result<TrialRecord> {
    let malformed = |what: &str| Error::Other(format!("malformed {category} row: {what}"));
    let as_u64 = |value: &Value| match value {
        Value::Integer(i) => u64::try_from(*i).ok(),
        _ => None,
    };

    let mut test_name = String::new();
    let mut dimensions: Vec<(Dimension, i64)> = Vec::new();
    let mut builder_run = 0u32;
    let mut measured = None;
    let mut duration = 0.0;
    let mut exact = None;
    let mut storage = None;

    for (column, value) in category.columns().iter().zip(row.iter()) {
        match column.field {
            Field::TestName => match value {
                Value::Text(s) => test_name.clone_from(s),
                _ => return Err(malformed("test_name")),
            },
            Field::Dimension(d) => match value {
                Value::Integer(i) => dimensions.push((d, *i)),
                _ => return Err(malformed(column.name)),
            },
            Field::SketchType | Field::RelativeError => {}
            Field::RunNumber => {
                builder_run = as_u64(value)
                    .and_then(|v| u32::try_from(v).ok())
                    .ok_or_else(|| malformed("run_number"))?;
            }
            Field::MeasuredValue => measured = as_u64(value),
            Field::ExactCount => exact = as_u64(value),
            Field::DurationMs => match value {
                Value::Real(r) => duration = *r,
                #[allow(clippy::cast_precision_loss)]
                Value::Integer(i) => duration = *i as f64,
                _ => return Err(malformed("duration")),
            },
            Field::StorageBytes => storage = as_u64(value),
        }
    }

    // Storage snapshots report the size as both measurement and storage.
    let measured = measured.or(storage).unwrap_or(0);

    Ok(TrialRecord::builder(category, test_name)
        .dimensions(&dimensions)
        .run_number(builder_run)
        .measured_value(measured)
        .duration_ms(duration)
        .exact_count(exact)
        .storage_bytes(storage)
        .build())
}
