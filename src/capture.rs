//! Fault-tolerant log capture
//!
//! [`ArtifactCapture`] owns the two staging directories of a run (logs and
//! outputs) in scratch storage and promotes their contents to
//! `<results>/logs/<run_id>/` and `<results>/outputs/<run_id>/` exactly once:
//! either through an explicit [`ArtifactCapture::finalize`] or, if the run
//! unwinds before that, from `Drop`.
//!
//! Finalization never fails. Missing staging directories count as empty and
//! individual copy failures are logged and counted.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{info, warn};

use crate::experiment::{ArtifactKind, ArtifactRecord};
use crate::Result;

/// Run id format: one directory per invocation.
pub const RUN_ID_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Run id for a timestamp.
#[must_use]
pub fn run_id_for(at: DateTime<Local>) -> String {
    at.format(RUN_ID_FORMAT).to_string()
}

/// Result of promoting the staged artifacts.
#[derive(Debug, Clone, Serialize)]
pub struct FinalArtifacts {
    /// Durable log directory.
    pub logs_dir: PathBuf,
    /// Durable output directory.
    pub outputs_dir: PathBuf,
    /// Files copied.
    pub copied: Vec<ArtifactRecord>,
    /// Files that could not be copied.
    pub failed: Vec<PathBuf>,
}

impl FinalArtifacts {
    /// Human-readable summary printed at the end of every run.
    #[must_use]
    pub fn summary(&self) -> String {
        let logs = self.copied.iter().filter(|a| a.kind() == ArtifactKind::Log).count();
        let outputs = self.copied.len() - logs;
        let mut out = format!(
            "Logs:    {} ({logs} files)\nOutputs: {} ({outputs} files)",
            self.logs_dir.display(),
            self.outputs_dir.display(),
        );
        if !self.failed.is_empty() {
            out.push_str(&format!("\nNot copied: {} files", self.failed.len()));
        }
        out
    }
}

/// Staging directories of one run plus the exit finalizer.
#[derive(Debug)]
pub struct ArtifactCapture {
    run_id: String,
    logs_stage: PathBuf,
    outputs_stage: PathBuf,
    results_root: PathBuf,
    ordinal: AtomicU32,
    finalized: Option<FinalArtifacts>,
}

impl ArtifactCapture {
    /// Create the staging directories for `run_id` under `scratch_root`.
    ///
    /// A run id already claimed by another staging directory or by existing
    /// final directories gets a numeric suffix (`<run_id>_2`, `<run_id>_3`,
    /// ...), so two runs never share a stage. [`ArtifactCapture::run_id`]
    /// returns the id actually used.
    ///
    /// # Errors
    ///
    /// Returns an error if a staging directory cannot be created.
    pub fn open(
        scratch_root: impl AsRef<Path>,
        results_root: impl AsRef<Path>,
        run_id: impl Into<String>,
    ) -> Result<Self> {
        let requested = run_id.into();
        let results_root = results_root.as_ref();
        let staging = scratch_root.as_ref().join("staging");
        fs::create_dir_all(&staging)?;

        let mut attempt = 1u32;
        let (run_id, stage_root) = loop {
            let candidate = if attempt == 1 {
                requested.clone()
            } else {
                format!("{requested}_{attempt}")
            };
            attempt += 1;
            let promoted = results_root.join("logs").join(&candidate).exists()
                || results_root.join("outputs").join(&candidate).exists();
            if promoted {
                continue;
            }
            let stage_root = staging.join(&candidate);
            match fs::create_dir(&stage_root) {
                Ok(()) => break (candidate, stage_root),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e.into()),
            }
        };
        if run_id != requested {
            warn!(requested, run_id, "run id already in use, staging under a suffixed id");
        }

        let logs_stage = stage_root.join("logs");
        let outputs_stage = stage_root.join("outputs");
        fs::create_dir(&logs_stage)?;
        fs::create_dir(&outputs_stage)?;
        info!(run_id, stage = %stage_root.display(), "staging directories ready");
        Ok(Self {
            run_id,
            logs_stage,
            outputs_stage,
            results_root: results_root.to_path_buf(),
            ordinal: AtomicU32::new(0),
            finalized: None,
        })
    }

    /// Run id (timestamp) keying the final directories.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Staging directory for logs.
    #[must_use]
    pub fn logs_stage(&self) -> &Path {
        &self.logs_stage
    }

    /// Staging directory for outputs.
    #[must_use]
    pub fn outputs_stage(&self) -> &Path {
        &self.outputs_stage
    }

    /// Durable log directory for this run.
    #[must_use]
    pub fn final_logs_dir(&self) -> PathBuf {
        self.results_root.join("logs").join(&self.run_id)
    }

    /// Durable output directory for this run.
    #[must_use]
    pub fn final_outputs_dir(&self) -> PathBuf {
        self.results_root.join("outputs").join(&self.run_id)
    }

    /// Whether finalization already happened.
    #[must_use]
    pub const fn is_finalized(&self) -> bool {
        self.finalized.is_some()
    }

    fn next_name(&self, name: &str) -> String {
        let ordinal = self.ordinal.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{ordinal:02}_{name}")
    }

    /// Write a log file named `<ordinal>_<name>` into the logs stage.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn stage_log(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.logs_stage.join(self.next_name(name));
        fs::write(&path, contents)?;
        Ok(path)
    }

    /// Write an output file named `<ordinal>_<name>` into the outputs stage.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn stage_output(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.outputs_stage.join(self.next_name(name));
        fs::write(&path, contents)?;
        Ok(path)
    }

    /// Promote staged files to the final directories and report where they
    /// went. Runs once; later calls return the first result.
    pub fn finalize(&mut self) -> FinalArtifacts {
        if let Some(done) = &self.finalized {
            return done.clone();
        }

        let logs_dir = self.final_logs_dir();
        let outputs_dir = self.final_outputs_dir();
        let mut copied = Vec::new();
        let mut failed = Vec::new();

        for (kind, stage, dest) in [
            (ArtifactKind::Log, &self.logs_stage, &logs_dir),
            (ArtifactKind::Output, &self.outputs_stage, &outputs_dir),
        ] {
            if let Err(e) = fs::create_dir_all(dest) {
                warn!(dest = %dest.display(), error = %e, "cannot create final directory");
                failed.push(dest.clone());
                continue;
            }
            copy_tree(kind, stage, stage, dest, &mut copied, &mut failed);
        }

        let report = FinalArtifacts {
            logs_dir,
            outputs_dir,
            copied,
            failed,
        };
        info!(
            run_id = %self.run_id,
            copied = report.copied.len(),
            failed = report.failed.len(),
            "artifacts finalized"
        );
        println!("{}", report.summary());
        self.finalized = Some(report.clone());
        report
    }
}

impl Drop for ArtifactCapture {
    fn drop(&mut self) {
        if self.finalized.is_none() {
            if std::thread::panicking() {
                warn!(run_id = %self.run_id, "run unwinding, finalizing artifacts");
            }
            self.finalize();
        }
    }
}

fn copy_tree(
    kind: ArtifactKind,
    root: &Path,
    dir: &Path,
    dest: &Path,
    copied: &mut Vec<ArtifactRecord>,
    failed: &mut Vec<PathBuf>,
) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(stage = %dir.display(), "staging directory missing, nothing to copy");
            return;
        }
        Err(e) => {
            warn!(stage = %dir.display(), error = %e, "cannot list staging directory");
            failed.push(dir.to_path_buf());
            return;
        }
    };

    for entry in entries.flatten() {
        let source = entry.path();
        let target = dest.join(entry.file_name());
        if source.is_dir() {
            if let Err(e) = fs::create_dir_all(&target) {
                warn!(dir = %target.display(), error = %e, "cannot create directory");
                failed.push(source);
                continue;
            }
            copy_tree(kind, root, &source, &target, copied, failed);
            continue;
        }
        match fs::copy(&source, &target) {
            Ok(bytes) => {
                let key = source
                    .strip_prefix(root)
                    .unwrap_or(&source)
                    .to_string_lossy()
                    .into_owned();
                copied.push(ArtifactRecord::new(kind, key, target, bytes));
            }
            Err(e) => {
                warn!(file = %source.display(), error = %e, "copy failed");
                failed.push(source);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staged_names_carry_ordinals() {
        let scratch = tempfile::tempdir().unwrap();
        let results = tempfile::tempdir().unwrap();
        let mut capture =
            ArtifactCapture::open(scratch.path(), results.path(), "20250101_120000").unwrap();

        let a = capture.stage_log("pre_cleanup.log", "ok").unwrap();
        let b = capture.stage_output("exact_count_n10.json", "{}").unwrap();
        assert!(a.ends_with("01_pre_cleanup.log"));
        assert!(b.ends_with("02_exact_count_n10.json"));
        capture.finalize();
    }

    #[test]
    fn test_finalize_copies_and_is_idempotent() {
        let scratch = tempfile::tempdir().unwrap();
        let results = tempfile::tempdir().unwrap();
        let mut capture =
            ArtifactCapture::open(scratch.path(), results.path(), "20250101_120000").unwrap();
        capture.stage_log("setup.log", "setup done").unwrap();
        capture.stage_output("cell.json", "{}").unwrap();

        let first = capture.finalize();
        assert_eq!(first.copied.len(), 2);
        assert!(first.failed.is_empty());
        assert!(first.logs_dir.join("01_setup.log").exists());
        assert!(first.outputs_dir.join("02_cell.json").exists());

        let second = capture.finalize();
        assert_eq!(second.copied.len(), 2);
        assert!(capture.is_finalized());
    }

    #[test]
    fn test_missing_stage_tolerated() {
        let scratch = tempfile::tempdir().unwrap();
        let results = tempfile::tempdir().unwrap();
        let mut capture =
            ArtifactCapture::open(scratch.path(), results.path(), "20250101_120000").unwrap();
        capture.stage_log("only.log", "x").unwrap();
        fs::remove_dir_all(capture.outputs_stage()).unwrap();

        let report = capture.finalize();
        assert_eq!(report.copied.len(), 1);
        assert!(report.outputs_dir.is_dir());
    }

    #[test]
    fn test_drop_finalizes() {
        let scratch = tempfile::tempdir().unwrap();
        let results = tempfile::tempdir().unwrap();
        let logs_dir;
        {
            let capture =
                ArtifactCapture::open(scratch.path(), results.path(), "20250101_120000").unwrap();
            capture.stage_log("partial.log", "half way").unwrap();
            logs_dir = capture.final_logs_dir();
        }
        assert!(logs_dir.join("01_partial.log").exists());
    }

    #[test]
    fn test_run_id_format() {
        use chrono::TimeZone;
        let at = Local.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(run_id_for(at), "20250102_030405");
    }

    #[test]
    fn test_reused_run_id_gets_fresh_stage() {
        let scratch = tempfile::tempdir().unwrap();
        let results = tempfile::tempdir().unwrap();

        let open = || ArtifactCapture::open(scratch.path(), results.path(), "20250101_120000");
        let live = open().unwrap();
        let clash = open().unwrap();
        assert_eq!(live.run_id(), "20250101_120000");
        assert_eq!(clash.run_id(), "20250101_120000_2");
        assert_ne!(live.outputs_stage(), clash.outputs_stage());
        drop(live);
        drop(clash);

        let after = open().unwrap();
        assert_eq!(after.run_id(), "20250101_120000_3");
        assert!(fs::read_dir(after.outputs_stage()).unwrap().next().is_none());
    }
}
