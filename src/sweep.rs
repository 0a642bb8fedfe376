//! Parameter Sweep Controller
//!
//! A [`Sweep`] is an ordered list of dimensions, each with its discrete
//! values. Cells are enumerated in nested order: the first declared
//! dimension is the outermost loop. The [`SweepController`] binds each cell
//! to an operation closure and hands it to the [`TrialRunner`], staging a
//! JSON summary per finished cell so partial runs leave evidence behind.

use tracing::{info, info_span};

use crate::capture::ArtifactCapture;
use crate::config::HarnessConfig;
use crate::experiment::{Dimension, MetricCategory, MetricsRecorder};
use crate::runner::{Observation, TrialRunner, TrialSpec, TrialSummary};
use crate::sketch::{HashFunction, Precision, Sketch, SketchRollup};
use crate::store::BenchStore;
use crate::{Error, Result};

/// One concrete combination of dimension values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepCell {
    index: usize,
    values: Vec<(Dimension, i64)>,
}

impl SweepCell {
    /// 0-based position in enumeration order.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Active coordinates, in declaration order.
    #[must_use]
    pub fn values(&self) -> &[(Dimension, i64)] {
        &self.values
    }

    /// Value of one dimension.
    #[must_use]
    pub fn get(&self, dimension: Dimension) -> Option<i64> {
        self.values
            .iter()
            .find(|(d, _)| *d == dimension)
            .map(|(_, v)| *v)
    }

    /// Label joining `prefix` and every active value, e.g. `hll_p12_n10000`.
    #[must_use]
    pub fn test_name(&self, prefix: &str) -> String {
        let mut parts = vec![prefix.to_string()];
        parts.extend(self.values.iter().map(|(d, v)| format!("{}{v}", d.label())));
        parts.join("_")
    }
}

/// Ordered dimensions and their values.
#[derive(Debug, Clone, Default)]
pub struct Sweep {
    dimensions: Vec<(Dimension, Vec<i64>)>,
}

impl Sweep {
    /// Empty sweep (a single cell with no coordinates).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a dimension; it becomes the innermost loop so far.
    #[must_use]
    pub fn dimension<I>(mut self, dimension: Dimension, values: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<i64>,
    {
        self.dimensions
            .push((dimension, values.into_iter().map(Into::into).collect()));
        self
    }

    /// Number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dimensions.iter().map(|(_, v)| v.len()).product()
    }

    /// Whether the sweep has no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every cell, outermost dimension first.
    #[must_use]
    pub fn cells(&self) -> Vec<SweepCell> {
        let mut cells: Vec<Vec<(Dimension, i64)>> = vec![Vec::new()];
        for (dimension, values) in &self.dimensions {
            cells = cells
                .into_iter()
                .flat_map(|prefix| {
                    values.iter().map(move |v| {
                        let mut cell = prefix.clone();
                        cell.push((*dimension, *v));
                        cell
                    })
                })
                .collect();
        }
        cells
            .into_iter()
            .enumerate()
            .map(|(index, values)| SweepCell { index, values })
            .collect()
    }
}

/// Drives the sweeps of one harness run.
pub struct SweepController<'a> {
    config: &'a HarnessConfig,
    runner: TrialRunner,
    storage_runner: TrialRunner,
    recorder: &'a mut MetricsRecorder,
    capture: &'a ArtifactCapture,
}

impl<'a> SweepController<'a> {
    /// Create a controller over one run's recorder and capture.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a repetition count is zero.
    pub fn new(
        config: &'a HarnessConfig,
        recorder: &'a mut MetricsRecorder,
        capture: &'a ArtifactCapture,
    ) -> Result<Self> {
        Ok(Self {
            config,
            runner: TrialRunner::new(config.repetitions)?,
            storage_runner: TrialRunner::new(config.storage_repetitions)?,
            recorder,
            capture,
        })
    }

    /// Recorder the controller writes to.
    #[must_use]
    pub fn recorder(&self) -> &MetricsRecorder {
        self.recorder
    }

    /// Run one configuration and stage its summary.
    ///
    /// # Errors
    ///
    /// Propagates trial, recorder and staging failures.
    pub fn run_cell<F>(&mut self, spec: &TrialSpec, operation: F) -> Result<TrialSummary>
    where
        F: FnMut() -> Result<Observation>,
    {
        let runner = if spec.category == MetricCategory::Storage {
            self.storage_runner
        } else {
            self.runner
        };
        let summary = runner.run(spec, operation, &mut *self.recorder)?;
        let json = serde_json::to_string_pretty(&summary)?;
        self.capture.stage_output(&format!("{}.json", spec.test_name), &json)?;
        info!(
            test_name = %spec.test_name,
            mean_ms = summary.mean_ms,
            measured = summary.last.measured_value,
            "cell complete"
        );
        Ok(summary)
    }

    /// Run every cell of `sweep` with operations produced by `make_operation`.
    ///
    /// # Errors
    ///
    /// Stops at the first failing cell; cells before it stay recorded and
    /// staged.
    pub fn run_cells<M, F>(
        &mut self,
        category: MetricCategory,
        prefix: &str,
        sweep: &Sweep,
        mut make_operation: M,
    ) -> Result<Vec<TrialSummary>>
    where
        M: FnMut(&SweepCell) -> Result<F>,
        F: FnMut() -> Result<Observation>,
    {
        let mut summaries = Vec::with_capacity(sweep.len());
        for cell in sweep.cells() {
            let spec = TrialSpec::new(category, cell.test_name(prefix), cell.values());
            let operation = make_operation(&cell)?;
            summaries.push(self.run_cell(&spec, operation)?);
        }
        Ok(summaries)
    }

    /// Bulk aggregation: scale → {exact, precision} → repetition.
    ///
    /// The raw table is regenerated for every scale; the exact count measured
    /// at that scale is the reference for the sketch cells.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Setup`] if the dataset cannot be generated, and
    /// propagates trial failures.
    pub fn run_bulk(&mut self, store: &mut BenchStore) -> Result<Vec<TrialSummary>> {
        let _span = info_span!("bulk_sweep").entered();
        let config = self.config;
        let mut summaries = Vec::new();
        for (i, &scale) in config.scales.iter().enumerate() {
            let distinct = config.distinct_values(scale);
            let seed = config.seed.wrapping_add(i as u64);
            store
                .load_raw(scale, distinct, seed)
                .map_err(|e| Error::setup(&format!("loading {scale} raw rows"), &e))?;
            let scale_value = to_dim(scale)?;

            let exact_spec = TrialSpec::new(
                MetricCategory::BulkExact,
                format!("exact_count_n{scale}"),
                &[(Dimension::Scale, scale_value)],
            );
            let exact =
                self.run_cell(&exact_spec, || Ok(Observation::value(store.exact_distinct()?)))?;
            let reference = exact.last.measured_value;
            summaries.push(exact);

            let sweep = Sweep::new()
                .dimension(Dimension::Precision, config.precisions.iter().map(|p| p.bits()));
            for cell in sweep.cells() {
                let precision = precision_of(&cell)?;
                let mut values = cell.values().to_vec();
                values.push((Dimension::Scale, scale_value));
                let spec = TrialSpec::new(
                    MetricCategory::BulkApprox,
                    format!("{}_n{scale}", cell.test_name("hll")),
                    &values,
                )
                .with_exact_count(Some(reference));
                let summary = self.run_cell(&spec, || {
                    let sketch = store.sketch_raw(precision)?;
                    Ok(Observation::with_storage(sketch.estimate(), sketch.serialized_size()))
                })?;
                summaries.push(summary);
            }
        }
        Ok(summaries)
    }

    /// Hashing overhead: hash function → repetition over the raw values
    /// currently loaded. Values are fetched once, before timing.
    ///
    /// # Errors
    ///
    /// Propagates store and trial failures.
    pub fn run_hashing(&mut self, store: &BenchStore) -> Result<Vec<TrialSummary>> {
        let _span = info_span!("hashing_sweep").entered();
        let values = store.raw_values()?;
        let rows = to_dim(values.len() as u64)?;
        let mut summaries = Vec::new();
        for function in self.config.hash_functions.clone() {
            let spec = TrialSpec::new(
                MetricCategory::Hashing,
                format!("hash_{}_n{rows}", function.name()),
                &[(Dimension::Scale, rows)],
            );
            let summary =
                self.run_cell(&spec, || Ok(Observation::value(hash_all(function, &values))))?;
            summaries.push(summary);
        }
        Ok(summaries)
    }

    /// Storage footprint: precision → item count, one snapshot per cell.
    ///
    /// # Errors
    ///
    /// Propagates trial failures.
    pub fn run_storage(&mut self) -> Result<Vec<TrialSummary>> {
        let _span = info_span!("storage_sweep").entered();
        let config = self.config;
        let item_counts = config
            .storage_item_counts
            .iter()
            .map(|&n| to_dim(n))
            .collect::<Result<Vec<_>>>()?;
        let sweep = Sweep::new()
            .dimension(Dimension::Precision, config.storage_precisions.iter().map(|p| p.bits()))
            .dimension(Dimension::ItemCount, item_counts);
        self.run_cells(MetricCategory::Storage, "storage", &sweep, |cell| {
            let precision = precision_of(cell)?;
            let items = cell.get(Dimension::ItemCount).unwrap_or(0);
            Ok(move || -> Result<Observation> {
                let sketch = Sketch::from_values(precision, 0..items);
                let size = sketch.serialized_size();
                Ok(Observation::with_storage(size, size))
            })
        })
    }

    /// Union: exact re-aggregation per window, then precision → window
    /// merging the daily roll-ups.
    ///
    /// `rollups` must hold one roll-up per configured precision.
    ///
    /// # Errors
    ///
    /// Propagates store, merge and trial failures.
    pub fn run_union(
        &mut self,
        store: &BenchStore,
        rollups: &[SketchRollup],
    ) -> Result<Vec<TrialSummary>> {
        let _span = info_span!("union_sweep").entered();
        let mut summaries = Vec::new();
        let mut exact_by_window = Vec::new();

        let config = self.config;
        let windows =
            Sweep::new().dimension(Dimension::WindowDays, config.window_days.iter().copied());
        for cell in windows.cells() {
            let days = window_of(&cell)?;
            let spec = TrialSpec::new(
                MetricCategory::UnionExact,
                cell.test_name("exact_union"),
                cell.values(),
            );
            let summary = self.run_cell(&spec, || {
                Ok(Observation::value(store.exact_window_distinct(days)?))
            })?;
            exact_by_window.push((days, summary.last.measured_value));
            summaries.push(summary);
        }

        let sweep = Sweep::new()
            .dimension(Dimension::Precision, config.precisions.iter().map(|p| p.bits()))
            .dimension(Dimension::WindowDays, config.window_days.iter().copied());
        for cell in sweep.cells() {
            let precision = precision_of(&cell)?;
            let days = window_of(&cell)?;
            let rollup = rollups
                .iter()
                .find(|r| r.precision() == precision)
                .ok_or_else(|| {
                    Error::Setup(format!("no daily roll-up for precision {precision}"))
                })?;
            let exact = exact_by_window
                .iter()
                .find(|(d, _)| *d == days)
                .map(|(_, count)| *count);
            let spec = TrialSpec::new(
                MetricCategory::UnionApprox,
                cell.test_name("hll_union"),
                cell.values(),
            )
            .with_exact_count(exact);
            let summary = self.run_cell(&spec, || {
                let (merged, bytes) = rollup.union_last(days as usize)?;
                Ok(Observation::with_storage(merged.estimate(), bytes))
            })?;
            summaries.push(summary);
        }
        Ok(summaries)
    }
}

fn hash_all(function: HashFunction, values: &[i64]) -> u64 {
    let mut acc = 0u64;
    for &value in values {
        acc ^= function.hash(value).value();
    }
    // keep the loop observable
    std::hint::black_box(acc);
    values.len() as u64
}

fn to_dim(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| Error::Config(format!("dimension value {value} too large")))
}

fn precision_of(cell: &SweepCell) -> Result<Precision> {
    let bits = cell
        .get(Dimension::Precision)
        .ok_or_else(|| Error::Other(format!("cell {} has no precision", cell.index())))?;
    Precision::try_from(bits)
}

fn window_of(cell: &SweepCell) -> Result<u32> {
    let days = cell
        .get(Dimension::WindowDays)
        .ok_or_else(|| Error::Other(format!("cell {} has no window", cell.index())))?;
    u32::try_from(days).map_err(|_| Error::Config(format!("invalid window {days}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cells_follow_declaration_order() {
        let sweep = Sweep::new()
            .dimension(Dimension::Scale, [10_i64, 100])
            .dimension(Dimension::Precision, [10_u8, 12, 14]);
        let names: Vec<String> = sweep.cells().iter().map(|c| c.test_name("hll")).collect();
        assert_eq!(
            names,
            vec![
                "hll_n10_p10",
                "hll_n10_p12",
                "hll_n10_p14",
                "hll_n100_p10",
                "hll_n100_p12",
                "hll_n100_p14",
            ]
        );
        assert_eq!(sweep.len(), 6);
    }

    #[test]
    fn test_cell_indices_are_sequential() {
        let sweep = Sweep::new()
            .dimension(Dimension::Precision, [10_u8, 12])
            .dimension(Dimension::ItemCount, [0_i64, 10, 500]);
        let indices: Vec<usize> = sweep.cells().iter().map(SweepCell::index).collect();
        assert_eq!(indices, (0..6).collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_dimension_yields_no_cells() {
        let sweep = Sweep::new()
            .dimension(Dimension::Scale, [10_i64])
            .dimension(Dimension::Precision, Vec::<u8>::new());
        assert!(sweep.is_empty());
        assert!(sweep.cells().is_empty());
    }

    #[test]
    fn test_no_dimensions_is_one_cell() {
        let cells = Sweep::new().cells();
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].test_name("exact_count"), "exact_count");
    }

    #[test]
    fn test_hash_all_counts_values() {
        assert_eq!(hash_all(HashFunction::SipHash, &[1, 2, 3]), 3);
        assert_eq!(hash_all(HashFunction::FxHash, &[]), 0);
    }
}
