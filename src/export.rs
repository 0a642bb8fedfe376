//! Result Exporter: one delimited file per metric category
//!
//! Files land at well-known names (see [`MetricCategory::file_name`]) inside
//! the export directory, with a header row naming every column. Undefined
//! values (the relative-error sentinel) are written as empty cells.

use std::path::{Path, PathBuf};

use rusqlite::types::Value;
use tracing::info;

use crate::experiment::{MetricCategory, MetricsRecorder};
use crate::{Error, Result};

/// Writes recorder tables to CSV files.
#[derive(Debug, Clone)]
pub struct ResultExporter {
    dir: PathBuf,
}

impl ResultExporter {
    /// Exporter writing into `dir` (created on first export).
    #[must_use]
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Destination of a category's file.
    #[must_use]
    pub fn path_for(&self, category: MetricCategory) -> PathBuf {
        self.dir.join(category.file_name())
    }

    /// Export every record of `category`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Export`] if the destination cannot be written, or a
    /// store error if the records cannot be read.
    pub fn export(&self, recorder: &MetricsRecorder, category: MetricCategory) -> Result<PathBuf> {
        let path = self.path_for(category);
        let rows = recorder.rows(category)?;
        self.write(&path, category, &rows).map_err(|e| Error::Export {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        info!(category = %category, rows = rows.len(), path = %path.display(), "exported");
        Ok(path)
    }

    /// Export every category, in [`MetricCategory::ALL`] order.
    ///
    /// # Errors
    ///
    /// Stops at the first failing category.
    pub fn export_all(&self, recorder: &MetricsRecorder) -> Result<Vec<PathBuf>> {
        MetricCategory::ALL
            .into_iter()
            .map(|category| self.export(recorder, category))
            .collect()
    }

    fn write(&self, path: &Path, category: MetricCategory, rows: &[Vec<Value>]) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(category.header())?;
        for row in rows {
            writer.write_record(row.iter().map(cell))?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Integer(i) => i.to_string(),
        Value::Real(r) => format!("{r:.6}"),
        Value::Text(s) => s.clone(),
        Value::Blob(b) => format!("<{} bytes>", b.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::{Dimension, RecordSink, TrialRecord};

    #[test]
    fn test_export_writes_header_for_empty_category() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = MetricsRecorder::in_memory().unwrap();
        let exporter = ResultExporter::new(dir.path().join("missing").join("dir"));

        let path = exporter.export(&recorder, MetricCategory::UnionExact).unwrap();
        let contents = std::fs::read_to_string(path).unwrap();
        assert_eq!(contents, "test_name,num_days,exact_count,query_time_ms,run_number\n");
    }

    #[test]
    fn test_export_rows_and_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = MetricsRecorder::in_memory().unwrap();
        let record = TrialRecord::builder(MetricCategory::BulkApprox, "hll_p10_n0")
            .dimensions(&[(Dimension::Precision, 10), (Dimension::Scale, 0)])
            .measured_value(0)
            .exact_count(Some(0))
            .duration_ms(0.5)
            .storage_bytes(Some(8))
            .build();
        recorder.record(&record).unwrap();

        let exporter = ResultExporter::new(dir.path());
        let path = exporter.export(&recorder, MetricCategory::BulkApprox).unwrap();
        let contents = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "hll_p10_n0,10,0,0,0,,0.500000,8,1");
    }

    #[test]
    fn test_export_all_paths() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = MetricsRecorder::in_memory().unwrap();
        let paths = ResultExporter::new(dir.path()).export_all(&recorder).unwrap();
        assert_eq!(paths.len(), MetricCategory::ALL.len());
        assert!(paths.iter().all(|p| p.exists()));
    }

    #[test]
    fn test_unwritable_destination_is_export_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        let recorder = MetricsRecorder::in_memory().unwrap();

        let err = ResultExporter::new(&blocker)
            .export(&recorder, MetricCategory::Storage)
            .unwrap_err();
        assert!(matches!(err, Error::Export { .. }));
    }
}
