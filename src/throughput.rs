//! Concurrent throughput workloads
//!
//! A fixed pool of clients issues independent operations against the backing
//! store until a wall-clock deadline. Each client is a tokio task with its own
//! connection and its own latency histogram, and hands every operation to a
//! blocking pool sized to the thread count. Histograms are merged once every
//! client has joined. Results are rendered in pgbench
//! summary form so existing tooling can parse `tps` and `latency average`.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hdrhistogram::Histogram;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{info, info_span, warn};

use crate::config::ThroughputConfig;
use crate::sketch::{Precision, Sketch, SketchRollup};
use crate::store;
use crate::{Error, Result};

/// Highest latency tracked: one minute, in microseconds.
const MAX_LATENCY_US: u64 = 60_000_000;

/// One concurrent workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Workload {
    /// Inserts drawn from a small user pool.
    LowCardInsert,
    /// Inserts of effectively unique users.
    HighCardInsert,
    /// Cardinality of one random day, computed from stored rows.
    ReadCardinality,
    /// Union of a random window over the shared daily roll-up.
    ReadUnion,
}

impl Workload {
    /// Every workload, in execution order.
    pub const ALL: [Self; 4] = [
        Self::LowCardInsert,
        Self::HighCardInsert,
        Self::ReadCardinality,
        Self::ReadUnion,
    ];

    /// Short name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::LowCardInsert => "low_card_insert",
            Self::HighCardInsert => "high_card_insert",
            Self::ReadCardinality => "read_cardinality",
            Self::ReadUnion => "read_union",
        }
    }

    /// Summary file name.
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::LowCardInsert => "04_summary_low_card_insert.txt",
            Self::HighCardInsert => "05_summary_high_card_insert.txt",
            Self::ReadCardinality => "06_summary_read_cardinality.txt",
            Self::ReadUnion => "07_summary_read_union.txt",
        }
    }
}

impl std::fmt::Display for Workload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Aggregated result of one workload.
#[derive(Debug, Clone, Serialize)]
pub struct ThroughputSummary {
    /// Workload that ran.
    pub workload: Workload,
    /// Concurrent clients.
    pub clients: usize,
    /// OS threads available to the clients.
    pub threads: usize,
    /// Wall-clock time from first start to last join.
    pub elapsed: Duration,
    /// Successful transactions.
    pub transactions: u64,
    /// Transactions that returned an error.
    pub failed: u64,
    /// Transactions per second over `elapsed`.
    pub tps: f64,
    /// Mean latency (ms).
    pub latency_avg_ms: f64,
    /// Latency standard deviation (ms).
    pub latency_stddev_ms: f64,
    /// Median latency (ms).
    pub latency_p50_ms: f64,
    /// 99th percentile latency (ms).
    pub latency_p99_ms: f64,
    /// Successful transactions of each client, in client order.
    pub client_transactions: Vec<u64>,
}

impl ThroughputSummary {
    #[allow(clippy::cast_precision_loss)]
    fn from_histogram(
        workload: Workload,
        config: &ThroughputConfig,
        elapsed: Duration,
        failed: u64,
        hist: &Histogram<u64>,
        client_transactions: Vec<u64>,
    ) -> Self {
        let transactions = hist.len();
        let secs = elapsed.as_secs_f64();
        let us_to_ms = |us: f64| us / 1_000.0;
        Self {
            workload,
            clients: config.clients,
            threads: config.threads,
            elapsed,
            transactions,
            failed,
            tps: if secs > 0.0 { transactions as f64 / secs } else { 0.0 },
            latency_avg_ms: us_to_ms(hist.mean()),
            latency_stddev_ms: us_to_ms(hist.stdev()),
            latency_p50_ms: us_to_ms(hist.value_at_quantile(0.50) as f64),
            latency_p99_ms: us_to_ms(hist.value_at_quantile(0.99) as f64),
            client_transactions,
        }
    }

    /// pgbench-style text report.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "transaction type: {}", self.workload);
        let _ = writeln!(out, "number of clients: {}", self.clients);
        let _ = writeln!(out, "number of threads: {}", self.threads);
        let _ = writeln!(out, "duration: {:.3} s", self.elapsed.as_secs_f64());
        let _ = writeln!(
            out,
            "number of transactions actually processed: {}",
            self.transactions
        );
        let _ = writeln!(out, "number of failed transactions: {}", self.failed);
        let _ = writeln!(out, "latency average = {:.3} ms", self.latency_avg_ms);
        let _ = writeln!(out, "latency stddev = {:.3} ms", self.latency_stddev_ms);
        let _ = writeln!(out, "latency p50 = {:.3} ms", self.latency_p50_ms);
        let _ = writeln!(out, "latency p99 = {:.3} ms", self.latency_p99_ms);
        let _ = writeln!(out, "tps = {:.6} (excluding connections establishing)", self.tps);
        out
    }
}

/// Parameters shared by every client of a workload.
#[derive(Debug)]
struct ClientPlan {
    workload: Workload,
    db_path: PathBuf,
    rollup: Arc<SketchRollup>,
    window_days: Arc<[u32]>,
    last_day: i64,
    low_cardinality_pool: i64,
    deadline: Instant,
}

/// Per-client state handed to the blocking pool for each operation.
struct ClientSession {
    conn: Connection,
    rng: StdRng,
}

impl ClientSession {
    #[allow(clippy::cast_possible_truncation)]
    fn execute(&mut self, plan: &ClientPlan) -> Result<()> {
        let last_day = plan.last_day.max(1);
        let rng = &mut self.rng;
        match plan.workload {
            Workload::LowCardInsert => store::insert_event(
                &self.conn,
                rng.gen_range(1..=last_day),
                rng.gen_range(0..plan.low_cardinality_pool),
            ),
            Workload::HighCardInsert => store::insert_event(
                &self.conn,
                rng.gen_range(1..=last_day),
                rng.gen_range(0..i64::MAX),
            ),
            Workload::ReadCardinality => {
                store::day_users(&self.conn, rng.gen_range(1..=last_day)).map(|users| {
                    let sketch = Sketch::from_values(plan.rollup.precision(), users);
                    std::hint::black_box(sketch.estimate());
                })
            }
            Workload::ReadUnion => {
                let days = if plan.window_days.is_empty() {
                    1
                } else {
                    plan.window_days[rng.gen_range(0..plan.window_days.len())]
                };
                plan.rollup.union_last(days as usize).map(|(merged, _)| {
                    std::hint::black_box(merged.estimate());
                })
            }
        }
    }
}

struct ClientResult {
    hist: Histogram<u64>,
    failed: u64,
}

/// Runs the concurrent workloads against one backing database.
#[derive(Debug)]
pub struct ThroughputRunner {
    config: ThroughputConfig,
    db_path: PathBuf,
    rollup: Arc<SketchRollup>,
    window_days: Arc<[u32]>,
    seed: u64,
}

impl ThroughputRunner {
    /// Create a runner over the database at `db_path` and a shared roll-up.
    #[must_use]
    pub fn new(
        config: ThroughputConfig,
        db_path: impl AsRef<Path>,
        rollup: Arc<SketchRollup>,
        window_days: &[u32],
        seed: u64,
    ) -> Self {
        Self {
            config,
            db_path: db_path.as_ref().to_path_buf(),
            rollup,
            window_days: window_days.into(),
            seed,
        }
    }

    /// Precision of the shared roll-up.
    #[must_use]
    pub fn precision(&self) -> Precision {
        self.rollup.precision()
    }

    /// Run one workload to its deadline.
    ///
    /// Every client is an async task; each operation is handed to a blocking
    /// pool of `threads` OS threads, so all clients stay live even when there
    /// are more clients than threads.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Worker`] if a client panics or cannot be joined, and
    /// propagates connection failures from client start-up.
    pub fn run(&self, workload: Workload) -> Result<ThroughputSummary> {
        let _span = info_span!("throughput", workload = %workload).entered();
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config.threads)
            .max_blocking_threads(self.config.threads)
            .thread_name("hll-bench-client")
            .enable_all()
            .build()?;

        let last_day = self.rollup.last_day().unwrap_or(1);
        let low_cardinality_pool = i64::try_from(self.config.low_cardinality_pool)
            .map_err(|_| Error::Config("low-cardinality pool too large".to_string()))?;
        let started = Instant::now();
        let plan = Arc::new(ClientPlan {
            workload,
            db_path: self.db_path.clone(),
            rollup: Arc::clone(&self.rollup),
            window_days: Arc::clone(&self.window_days),
            last_day,
            low_cardinality_pool,
            deadline: started + self.config.duration,
        });

        let results = runtime.block_on(async {
            let handles: Vec<_> = (0..self.config.clients)
                .map(|client| {
                    let seed = self.seed.wrapping_add(client as u64);
                    tokio::spawn(run_client(Arc::clone(&plan), seed))
                })
                .collect();

            let mut results = Vec::with_capacity(handles.len());
            for handle in handles {
                let result = handle.await.map_err(|e| Error::Worker(e.to_string()))?;
                results.push(result?);
            }
            Ok::<_, Error>(results)
        })?;
        let elapsed = started.elapsed();

        let mut merged = new_histogram()?;
        let mut failed = 0;
        for result in &results {
            merged
                .add(&result.hist)
                .map_err(|e| Error::Worker(format!("merging latencies: {e}")))?;
            failed += result.failed;
        }
        let client_transactions = results.iter().map(|r| r.hist.len()).collect();
        let summary = ThroughputSummary::from_histogram(
            workload,
            &self.config,
            elapsed,
            failed,
            &merged,
            client_transactions,
        );
        info!(
            tps = summary.tps,
            latency_avg_ms = summary.latency_avg_ms,
            transactions = summary.transactions,
            failed,
            "workload complete"
        );
        Ok(summary)
    }
}

fn new_histogram() -> Result<Histogram<u64>> {
    Histogram::<u64>::new_with_bounds(1, MAX_LATENCY_US, 3)
        .map_err(|e| Error::Worker(format!("histogram: {e}")))
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Worker(e.to_string()))
}

#[allow(clippy::cast_possible_truncation)]
async fn run_client(plan: Arc<ClientPlan>, seed: u64) -> Result<ClientResult> {
    let db_path = plan.db_path.clone();
    let conn = blocking(move || store::connect(&db_path)).await??;
    let mut session = ClientSession {
        conn,
        rng: StdRng::seed_from_u64(seed),
    };
    let mut hist = new_histogram()?;
    let mut failed = 0;

    while Instant::now() < plan.deadline {
        let start = Instant::now();
        let shared = Arc::clone(&plan);
        let (returned, outcome) = blocking(move || {
            let outcome = session.execute(&shared);
            (session, outcome)
        })
        .await?;
        session = returned;
        match outcome {
            Ok(()) => {
                let micros = start.elapsed().as_micros() as u64;
                hist.saturating_record(micros.max(1));
            }
            Err(e) => {
                failed += 1;
                if failed == 1 {
                    warn!(workload = %plan.workload, error = %e, "transaction failed");
                }
            }
        }
    }
    Ok(ClientResult { hist, failed })
}
