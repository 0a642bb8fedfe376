//! Harness configuration
//!
//! Sweep dimensions, repetition counts and concurrency knobs are fixed
//! constants. Only the backing-store identity and the artifact locations come
//! from the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::sketch::{HashFunction, Precision};
use crate::{Error, Result};

/// Timed repetitions per configuration.
pub const REPETITIONS: u32 = 5;

/// Repetitions for storage-footprint snapshots (sizes are deterministic).
pub const STORAGE_REPETITIONS: u32 = 1;

/// Workload scales (rows in the raw table).
pub const SCALES: [u64; 4] = [10_000, 100_000, 1_000_000, 10_000_000];

/// Fraction of rows that carry a distinct value.
pub const CARDINALITY_FRACTION: f64 = 0.10;

/// Precisions for bulk aggregation and union sweeps.
pub const PRECISIONS: [Precision; 3] = [Precision::P10, Precision::P12, Precision::P14];

/// Item counts for the storage-footprint sweep.
pub const STORAGE_ITEM_COUNTS: [u64; 4] = [0, 10, 500, 10_000];

/// Union window widths in days.
pub const WINDOW_DAYS: [u32; 5] = [7, 14, 30, 60, 90];

/// Events generated per day for the union dataset.
pub const EVENTS_PER_DAY: u64 = 10_000;

/// Size of the user id pool the union dataset draws from.
pub const USER_POOL: u64 = 250_000;

/// Concurrent clients in throughput mode.
pub const CLIENTS: usize = 8;

/// OS threads serving the concurrent clients.
pub const THREADS: usize = 4;

/// Wall-clock duration of each throughput workload.
pub const THROUGHPUT_DURATION: Duration = Duration::from_secs(10);

/// Distinct user ids used by the low-cardinality insert workload.
pub const LOW_CARDINALITY_POOL: u64 = 1_000;

/// Seed for generated datasets.
pub const SEED: u64 = 42;

/// Environment variable naming the backing database.
pub const ENV_DB_NAME: &str = "HLL_BENCH_DB_NAME";
/// Environment variable naming the database user.
pub const ENV_DB_USER: &str = "HLL_BENCH_DB_USER";
/// Environment variable holding the database password.
pub const ENV_DB_PASSWORD: &str = "HLL_BENCH_DB_PASSWORD";
/// Environment variable overriding the scratch (staging) root.
pub const ENV_SCRATCH_DIR: &str = "HLL_BENCH_SCRATCH_DIR";
/// Environment variable overriding the durable results root.
pub const ENV_RESULTS_DIR: &str = "HLL_BENCH_RESULTS_DIR";

/// Backing-store connection parameters.
#[derive(Debug, Clone, Serialize)]
pub struct StoreConfig {
    /// Database name; the embedded store lives at `<scratch>/<database>.sqlite3`.
    pub database: String,
    /// User the run is attributed to.
    pub user: String,
    /// Password, accepted for parity with server stores. Never serialized.
    #[serde(skip)]
    pub password: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: "hll_bench".to_string(),
            user: "bench".to_string(),
            password: None,
        }
    }
}

/// Concurrent throughput-mode parameters.
#[derive(Debug, Clone, Serialize)]
pub struct ThroughputConfig {
    /// Number of concurrent clients.
    pub clients: usize,
    /// Number of OS threads serving the clients.
    pub threads: usize,
    /// Hard wall-clock cutoff per workload.
    pub duration: Duration,
    /// Distinct ids for the low-cardinality insert workload.
    pub low_cardinality_pool: u64,
}

impl Default for ThroughputConfig {
    fn default() -> Self {
        Self {
            clients: CLIENTS,
            threads: THREADS,
            duration: THROUGHPUT_DURATION,
            low_cardinality_pool: LOW_CARDINALITY_POOL,
        }
    }
}

/// Complete configuration for one harness run.
#[derive(Debug, Clone, Serialize)]
pub struct HarnessConfig {
    /// Timed repetitions per configuration.
    pub repetitions: u32,
    /// Repetitions for storage snapshots.
    pub storage_repetitions: u32,
    /// Raw-table row counts.
    pub scales: Vec<u64>,
    /// Distinct values as a fraction of rows.
    pub cardinality_fraction: f64,
    /// Bulk and union precisions.
    pub precisions: Vec<Precision>,
    /// Storage sweep configurations.
    pub storage_precisions: Vec<Precision>,
    /// Storage sweep item counts.
    pub storage_item_counts: Vec<u64>,
    /// Hash functions for the hashing sweep.
    pub hash_functions: Vec<HashFunction>,
    /// Union window widths.
    pub window_days: Vec<u32>,
    /// Events per day in the union dataset.
    pub events_per_day: u64,
    /// User id pool of the union dataset.
    pub user_pool: u64,
    /// Throughput-mode parameters; `None` skips the concurrent workloads.
    pub throughput: Option<ThroughputConfig>,
    /// Dataset seed.
    pub seed: u64,
    /// Backing store identity.
    pub store: StoreConfig,
    /// Volatile staging root.
    pub scratch_root: PathBuf,
    /// Durable results root (`logs/<ts>` and `outputs/<ts>` live here).
    pub results_root: PathBuf,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            repetitions: REPETITIONS,
            storage_repetitions: STORAGE_REPETITIONS,
            scales: SCALES.to_vec(),
            cardinality_fraction: CARDINALITY_FRACTION,
            precisions: PRECISIONS.to_vec(),
            storage_precisions: Precision::ALL.to_vec(),
            storage_item_counts: STORAGE_ITEM_COUNTS.to_vec(),
            hash_functions: HashFunction::ALL.to_vec(),
            window_days: WINDOW_DAYS.to_vec(),
            events_per_day: EVENTS_PER_DAY,
            user_pool: USER_POOL,
            throughput: Some(ThroughputConfig::default()),
            seed: SEED,
            store: StoreConfig::default(),
            scratch_root: std::env::temp_dir().join("hll-bench"),
            results_root: PathBuf::from("."),
        }
    }
}

impl HarnessConfig {
    /// Default constants overlaid with the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env(|key| std::env::var(key).ok())
    }

    /// Overlay values from an environment lookup.
    #[must_use]
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(database) = non_empty(ENV_DB_NAME) {
            self.store.database = database;
        }
        if let Some(user) = non_empty(ENV_DB_USER) {
            self.store.user = user;
        }
        if let Some(password) = non_empty(ENV_DB_PASSWORD) {
            self.store.password = Some(password);
        }
        if let Some(scratch) = non_empty(ENV_SCRATCH_DIR) {
            self.scratch_root = PathBuf::from(scratch);
        }
        if let Some(results) = non_empty(ENV_RESULTS_DIR) {
            self.results_root = PathBuf::from(results);
        }
        self
    }

    /// Set the staging and results roots.
    #[must_use]
    pub fn with_roots(
        mut self,
        scratch_root: impl AsRef<Path>,
        results_root: impl AsRef<Path>,
    ) -> Self {
        self.scratch_root = scratch_root.as_ref().to_path_buf();
        self.results_root = results_root.as_ref().to_path_buf();
        self
    }

    /// Set the workload scales.
    #[must_use]
    pub fn with_scales(mut self, scales: &[u64]) -> Self {
        self.scales = scales.to_vec();
        self
    }

    /// Set the union dataset shape.
    #[must_use]
    pub fn with_union_dataset(
        mut self,
        window_days: &[u32],
        events_per_day: u64,
        user_pool: u64,
    ) -> Self {
        self.window_days = window_days.to_vec();
        self.events_per_day = events_per_day;
        self.user_pool = user_pool;
        self
    }

    /// Set or disable the throughput workloads.
    #[must_use]
    pub fn with_throughput(mut self, throughput: Option<ThroughputConfig>) -> Self {
        self.throughput = throughput;
        self
    }

    /// Path of the embedded backing database.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.scratch_root
            .join(format!("{}.sqlite3", self.store.database))
    }

    /// Number of distinct values generated for a scale.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn distinct_values(&self, scale: u64) -> u64 {
        ((scale as f64) * self.cardinality_fraction).round() as u64
    }

    /// Days of events in the union dataset (the widest window).
    #[must_use]
    pub fn union_days(&self) -> u32 {
        self.window_days.iter().copied().max().unwrap_or(0)
    }

    /// Check internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if self.repetitions == 0 || self.storage_repetitions == 0 {
            return Err(Error::Config("repetition counts must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.cardinality_fraction) {
            return Err(Error::Config(format!(
                "cardinality fraction {} outside [0, 1]",
                self.cardinality_fraction
            )));
        }
        if self.store.database.contains(['/', '\\']) {
            return Err(Error::Config(format!(
                "database name {:?} must not contain path separators",
                self.store.database
            )));
        }
        if let Some(throughput) = &self.throughput {
            if throughput.clients == 0 || throughput.threads == 0 {
                return Err(Error::Config("clients and threads must be positive".to_string()));
            }
            if throughput.duration.is_zero() {
                return Err(Error::Config("throughput duration must be positive".to_string()));
            }
            if throughput.low_cardinality_pool == 0 {
                return Err(Error::Config("low-cardinality pool must be positive".to_string()));
            }
        }
        if self.window_days.contains(&0) {
            return Err(Error::Config("window widths must be positive".to_string()));
        }
        if !self.window_days.is_empty() && self.user_pool == 0 {
            return Err(Error::Config("user pool must be positive".to_string()));
        }
        Ok(())
    }
}
