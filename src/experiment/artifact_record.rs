//! Artifact Record - one file promoted from staging to its final location

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Which staging location a file came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Harness and phase logs.
    Log,
    /// Exported tables, cell summaries, throughput summaries.
    Output,
}

/// Artifact Record describes a staged file and where it was copied to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactRecord {
    kind: ArtifactKind,
    key: String,
    destination: PathBuf,
    size_bytes: u64,
}

impl ArtifactRecord {
    /// Create a new artifact record.
    ///
    /// # Arguments
    ///
    /// * `kind` - Staging location the file came from
    /// * `key` - Path relative to the staging location
    /// * `destination` - Final path
    /// * `size_bytes` - Bytes copied
    #[must_use]
    pub fn new(
        kind: ArtifactKind,
        key: impl Into<String>,
        destination: impl Into<PathBuf>,
        size_bytes: u64,
    ) -> Self {
        Self {
            kind,
            key: key.into(),
            destination: destination.into(),
            size_bytes,
        }
    }

    /// Get the staging location kind.
    #[must_use]
    pub const fn kind(&self) -> ArtifactKind {
        self.kind
    }

    /// Get the path relative to the staging location.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get the final path.
    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Get the number of bytes copied.
    #[must_use]
    pub const fn size_bytes(&self) -> u64 {
        self.size_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_record_new() {
        let artifact = ArtifactRecord::new(
            ArtifactKind::Output,
            "01_results_bulk_exact.csv",
            "/results/outputs/20250101_120000/01_results_bulk_exact.csv",
            1000,
        );
        assert_eq!(artifact.kind(), ArtifactKind::Output);
        assert_eq!(artifact.key(), "01_results_bulk_exact.csv");
        assert!(artifact.destination().ends_with("01_results_bulk_exact.csv"));
        assert_eq!(artifact.size_bytes(), 1000);
    }
}
