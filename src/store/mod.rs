//! Backing store (embedded SQLite)
//!
//! Holds the scratch tables the sweeps measure against:
//!
//! - `bench_raw(id, val)`: bulk aggregation dataset, regenerated per scale
//! - `bench_events(day, user_id)`: daily event stream for union windows
//! - `bench_ingest(day, user_id)`: target of the insert throughput workloads
//!
//! Every sweep-derived value reaches SQL through a bound parameter. Table
//! names are fixed identifiers.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::sketch::{Precision, Sketch, SketchRollup};
use crate::{Error, Result};

/// Scratch tables owned by the harness.
pub const SCRATCH_TABLES: [&str; 3] = ["bench_raw", "bench_events", "bench_ingest"];

/// How long a connection waits on a locked database before failing.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Rows inserted per transaction while generating data.
const INSERT_BATCH: u64 = 50_000;

/// Handle to the embedded backing database.
#[derive(Debug)]
pub struct BenchStore {
    conn: Connection,
    path: PathBuf,
}

impl BenchStore {
    /// Open (or create) the database file.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or configured.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = connect(&path)?;
        info!(path = %path.display(), "opened backing store");
        Ok(Self { conn, path })
    }

    /// Database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open an additional connection to the same database (one per worker).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be opened.
    pub fn connect_worker(&self) -> Result<Connection> {
        connect(&self.path)
    }

    /// Drop every scratch table. Safe when none exist.
    ///
    /// # Errors
    ///
    /// Returns an error if a drop statement fails.
    pub fn drop_scratch(&self) -> Result<()> {
        for table in SCRATCH_TABLES {
            self.conn.execute(&format!("DROP TABLE IF EXISTS {table}"), [])?;
        }
        debug!("dropped scratch tables");
        Ok(())
    }

    /// Create every scratch table (empty).
    ///
    /// # Errors
    ///
    /// Returns an error if a create statement fails.
    pub fn create_scratch(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS bench_raw (id INTEGER PRIMARY KEY, val INTEGER NOT NULL);
             CREATE TABLE IF NOT EXISTS bench_events
                 (day INTEGER NOT NULL, user_id INTEGER NOT NULL);
             CREATE INDEX IF NOT EXISTS bench_events_day ON bench_events (day);
             CREATE TABLE IF NOT EXISTS bench_ingest
                 (id INTEGER PRIMARY KEY, day INTEGER NOT NULL, user_id INTEGER NOT NULL);",
        )?;
        Ok(())
    }

    /// Replace the raw table with `rows` rows drawn from `distinct` values.
    ///
    /// The first `distinct` rows take each value of `0..distinct` once, so
    /// the table holds exactly `min(rows, distinct)` distinct values; the
    /// remaining rows are uniform over the same range. With `distinct == 0`
    /// every row carries the same value.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be rebuilt.
    pub fn load_raw(&mut self, rows: u64, distinct: u64, seed: u64) -> Result<()> {
        self.conn.execute("DROP TABLE IF EXISTS bench_raw", [])?;
        self.conn.execute(
            "CREATE TABLE bench_raw (id INTEGER PRIMARY KEY, val INTEGER NOT NULL)",
            [],
        )?;

        let mut rng = StdRng::seed_from_u64(seed);
        let upper = i64::try_from(distinct.max(1))
            .map_err(|_| Error::Config(format!("distinct value count {distinct} too large")))?;
        let mut inserted = 0u64;
        while inserted < rows {
            let batch = INSERT_BATCH.min(rows - inserted);
            let tx = self.conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached("INSERT INTO bench_raw (val) VALUES (?1)")?;
                for row in inserted..inserted + batch {
                    let value = i64::try_from(row)
                        .ok()
                        .filter(|v| *v < upper)
                        .unwrap_or_else(|| rng.gen_range(0..upper));
                    stmt.execute(params![value])?;
                }
            }
            tx.commit()?;
            inserted += batch;
        }
        info!(rows, distinct, "loaded raw table");
        Ok(())
    }

    /// Exact distinct count over the raw table.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn exact_distinct(&self) -> Result<u64> {
        let mut stmt = self.conn.prepare_cached("SELECT COUNT(DISTINCT val) FROM bench_raw")?;
        let count: i64 = stmt.query_row([], |row| row.get(0))?;
        to_u64(count)
    }

    /// Aggregate the raw table into a sketch.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan fails.
    pub fn sketch_raw(&self, precision: Precision) -> Result<Sketch> {
        let mut stmt = self.conn.prepare_cached("SELECT val FROM bench_raw")?;
        let mut sketch = Sketch::empty(precision);
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            sketch.add(crate::sketch::hash(row.get(0)?));
        }
        Ok(sketch)
    }

    /// Every raw value, in row order.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan fails.
    pub fn raw_values(&self) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare_cached("SELECT val FROM bench_raw ORDER BY id")?;
        let values = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(values)
    }

    /// Number of rows in the raw table.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn raw_rows(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM bench_raw", [], |row| row.get(0))?;
        to_u64(count)
    }

    /// Replace the event table with `days` days of `per_day` events drawn
    /// from `user_pool` users. Days are numbered `1..=days`.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be rebuilt.
    pub fn load_events(
        &mut self,
        days: u32,
        per_day: u64,
        user_pool: u64,
        seed: u64,
    ) -> Result<()> {
        self.conn.execute("DELETE FROM bench_events", [])?;
        let upper = i64::try_from(user_pool.max(1))
            .map_err(|_| Error::Config(format!("user pool {user_pool} too large")))?;
        let mut rng = StdRng::seed_from_u64(seed);

        for day in 1..=i64::from(days) {
            let tx = self.conn.transaction()?;
            {
                let mut stmt =
                    tx.prepare_cached("INSERT INTO bench_events (day, user_id) VALUES (?1, ?2)")?;
                for _ in 0..per_day {
                    stmt.execute(params![day, rng.gen_range(0..upper)])?;
                }
            }
            tx.commit()?;
        }
        info!(days, per_day, user_pool, "loaded event table");
        Ok(())
    }

    /// Most recent event day, if any events exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn last_event_day(&self) -> Result<Option<i64>> {
        let day: Option<i64> = self
            .conn
            .query_row("SELECT MAX(day) FROM bench_events", [], |row| row.get::<_, Option<i64>>(0))
            .optional()?
            .flatten();
        Ok(day)
    }

    /// Exact distinct users over the last `num_days` days.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn exact_window_distinct(&self, num_days: u32) -> Result<u64> {
        let last = self.last_event_day()?.unwrap_or(0);
        let first = last - i64::from(num_days);
        let mut stmt = self
            .conn
            .prepare_cached("SELECT COUNT(DISTINCT user_id) FROM bench_events WHERE day > ?1")?;
        let count: i64 = stmt.query_row(params![first], |row| row.get(0))?;
        to_u64(count)
    }

    /// Build the per-day sketch roll-up of the event table.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan fails.
    pub fn build_rollup(&self, precision: Precision) -> Result<SketchRollup> {
        let mut rollup = SketchRollup::new(precision);
        let mut stmt = self
            .conn
            .prepare_cached("SELECT day, user_id FROM bench_events ORDER BY day")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            rollup.add(row.get(0)?, row.get(1)?);
        }
        debug!(precision = %precision, days = rollup.day_count(), "built daily roll-up");
        Ok(rollup)
    }
}

/// Insert one ingest event on a worker connection.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn insert_event(conn: &Connection, day: i64, user_id: i64) -> Result<()> {
    let mut stmt = conn.prepare_cached("INSERT INTO bench_ingest (day, user_id) VALUES (?1, ?2)")?;
    stmt.execute(params![day, user_id])?;
    Ok(())
}

/// Users of one event day, on a worker connection.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn day_users(conn: &Connection, day: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare_cached("SELECT user_id FROM bench_events WHERE day = ?1")?;
    let users = stmt
        .query_map(params![day], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;
    Ok(users)
}

/// Rows in the ingest table.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn ingest_rows(conn: &Connection) -> Result<u64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM bench_ingest", [], |row| row.get(0))?;
    to_u64(count)
}

/// Open a connection with the harness pragmas (WAL, busy timeout).
///
/// # Errors
///
/// Returns an error if the database cannot be opened or configured.
pub fn connect(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    let mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        debug!(mode, "WAL unavailable, using default journal");
    }
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(conn)
}

fn to_u64(count: i64) -> Result<u64> {
    u64::try_from(count).map_err(|_| Error::Other(format!("negative count {count}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, BenchStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = BenchStore::open(dir.path().join("bench.sqlite3")).unwrap();
        store.drop_scratch().unwrap();
        store.create_scratch().unwrap();
        (dir, store)
    }

    #[test]
    fn test_drop_scratch_is_idempotent() {
        let (_dir, store) = store();
        store.drop_scratch().unwrap();
        store.drop_scratch().unwrap();
        store.create_scratch().unwrap();
        assert_eq!(store.raw_rows().unwrap(), 0);
    }

    #[test]
    fn test_load_raw_replaces_previous_rows() {
        let (_dir, mut store) = store();
        store.load_raw(500, 50, 1).unwrap();
        store.load_raw(200, 20, 1).unwrap();
        assert_eq!(store.raw_rows().unwrap(), 200);
        assert_eq!(store.exact_distinct().unwrap(), 20);
    }

    #[test]
    fn test_distinct_count_is_exact_when_rows_cover_values() {
        let (_dir, mut store) = store();
        store.load_raw(10_000, 1_000, 42).unwrap();
        assert_eq!(store.exact_distinct().unwrap(), 1_000);
        store.load_raw(10, 1_000, 42).unwrap();
        assert_eq!(store.exact_distinct().unwrap(), 10);
    }

    #[test]
    fn test_exact_distinct_on_empty_table_is_zero() {
        let (_dir, mut store) = store();
        store.load_raw(0, 0, 1).unwrap();
        assert_eq!(store.exact_distinct().unwrap(), 0);
        assert_eq!(store.sketch_raw(Precision::P12).unwrap().estimate(), 0);
    }

    #[test]
    fn test_all_duplicate_dataset() {
        let (_dir, mut store) = store();
        store.load_raw(1_000, 0, 1).unwrap();
        assert_eq!(store.exact_distinct().unwrap(), 1);
    }

    #[test]
    fn test_sketch_tracks_exact_count() {
        let (_dir, mut store) = store();
        store.load_raw(10_000, 1_000, 7).unwrap();
        let exact = store.exact_distinct().unwrap();
        let estimate = store.sketch_raw(Precision::P14).unwrap().estimate();
        let error = estimate.abs_diff(exact) as f64 / exact as f64;
        assert!(error < 0.05, "exact {exact} estimate {estimate}");
        assert_eq!(store.raw_values().unwrap().len(), 10_000);
    }

    #[test]
    fn test_event_windows() {
        let (_dir, mut store) = store();
        store.load_events(10, 100, 5_000, 3).unwrap();
        assert_eq!(store.last_event_day().unwrap(), Some(10));

        let week = store.exact_window_distinct(7).unwrap();
        let all = store.exact_window_distinct(30).unwrap();
        assert!(week <= all);
        assert!(all <= 1_000);

        let rollup = store.build_rollup(Precision::P12).unwrap();
        assert_eq!(rollup.day_count(), 10);
    }

    #[test]
    fn test_worker_connection_sees_shared_tables() {
        let (_dir, mut store) = store();
        store.load_events(2, 10, 100, 3).unwrap();
        let worker = store.connect_worker().unwrap();
        insert_event(&worker, 1, 42).unwrap();
        assert_eq!(ingest_rows(&worker).unwrap(), 1);
        assert_eq!(day_users(&worker, 1).unwrap().len(), 10);
    }
}
