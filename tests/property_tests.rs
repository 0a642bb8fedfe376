//! Property-based tests for hll-bench
//!
//! - Test sweep enumeration invariants
//! - Test trial protocol invariants (K records, no warm-up record)
//! - Test sketch and relative-error invariants
//! - Run with ProptestConfig::with_cases(100)

use proptest::prelude::*;

use hll_bench::experiment::{relative_error_pct, Dimension, MetricCategory, TrialRecord};
use hll_bench::runner::{Observation, TrialRunner, TrialSpec};
use hll_bench::sketch::{Precision, Sketch};
use hll_bench::sweep::Sweep;

// ============================================================================
// Property Test Generators (Strategies)
// ============================================================================

fn arb_values(max_len: usize) -> impl Strategy<Value = Vec<i64>> {
    proptest::collection::vec(-1_000_000i64..1_000_000, 0..max_len)
}

fn arb_precision() -> impl Strategy<Value = Precision> {
    prop::sample::select(Precision::ALL.to_vec())
}

fn arb_dimension_values() -> impl Strategy<Value = Vec<Vec<i64>>> {
    proptest::collection::vec(proptest::collection::vec(0i64..1_000, 0..5), 0..4)
}

const DIMENSIONS: [Dimension; 4] = [
    Dimension::Scale,
    Dimension::Precision,
    Dimension::WindowDays,
    Dimension::ItemCount,
];

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // ========================================================================
    // Sweep Properties
    // ========================================================================

    /// Property: cell count is the product of the dimension sizes
    #[test]
    fn prop_sweep_is_cross_product(values in arb_dimension_values()) {
        let mut sweep = Sweep::new();
        for (dimension, vals) in DIMENSIONS.iter().zip(&values) {
            sweep = sweep.dimension(*dimension, vals.clone());
        }
        let expected: usize = values.iter().map(Vec::len).product();
        let cells = sweep.cells();

        prop_assert_eq!(cells.len(), expected);
        prop_assert_eq!(sweep.len(), expected);
        for (i, cell) in cells.iter().enumerate() {
            prop_assert_eq!(cell.index(), i);
            prop_assert_eq!(cell.values().len(), values.len());
        }
    }

    /// Property: the last declared dimension varies fastest
    #[test]
    fn prop_sweep_innermost_varies_fastest(
        outer in proptest::collection::vec(0i64..100, 1..4),
        inner in proptest::collection::vec(0i64..100, 1..4),
    ) {
        let sweep = Sweep::new()
            .dimension(Dimension::Scale, outer.clone())
            .dimension(Dimension::Precision, inner.clone());
        let cells = sweep.cells();
        for (i, cell) in cells.iter().enumerate() {
            prop_assert_eq!(cell.get(Dimension::Scale), Some(outer[i / inner.len()]));
            prop_assert_eq!(cell.get(Dimension::Precision), Some(inner[i % inner.len()]));
        }
    }

    // ========================================================================
    // Trial Runner Properties
    // ========================================================================

    /// Property: K repetitions give K records numbered 1..=K, warm-up excluded
    #[test]
    fn prop_runner_writes_k_records(k in 1u32..20, value in 0u64..1_000_000) {
        let runner = TrialRunner::new(k).unwrap();
        let spec = TrialSpec::new(
            MetricCategory::BulkExact,
            "exact_count_n100",
            &[(Dimension::Scale, 100)],
        );
        let mut calls = 0u32;
        let mut sink: Vec<TrialRecord> = Vec::new();
        runner
            .run(
                &spec,
                || {
                    calls += 1;
                    Ok(Observation::value(value))
                },
                &mut sink,
            )
            .unwrap();

        prop_assert_eq!(calls, k + 1);
        prop_assert_eq!(sink.len(), k as usize);
        for (i, record) in sink.iter().enumerate() {
            prop_assert_eq!(record.run_number() as usize, i + 1);
            prop_assert!(record.duration_ms() >= 0.0);
        }
    }

    // ========================================================================
    // Relative Error Properties
    // ========================================================================

    /// Property: relative error is non-negative and defined iff exact > 0
    #[test]
    fn prop_relative_error_non_negative(estimate in 0u64..10_000_000, exact in 0u64..10_000_000) {
        match relative_error_pct(estimate, exact) {
            Some(err) => {
                prop_assert!(exact > 0);
                prop_assert!(err >= 0.0);
            }
            None => prop_assert_eq!(exact, 0),
        }
    }

    /// Property: an exact estimate has zero error
    #[test]
    fn prop_relative_error_zero_when_exact(exact in 1u64..10_000_000) {
        prop_assert_eq!(relative_error_pct(exact, exact), Some(0.0));
    }

    // ========================================================================
    // Sketch Properties
    // ========================================================================

    /// Property: merging is order independent
    #[test]
    fn prop_merge_commutes(
        a in arb_values(500),
        b in arb_values(500),
        precision in arb_precision(),
    ) {
        let left = Sketch::from_values(precision, a.iter().copied());
        let right = Sketch::from_values(precision, b.iter().copied());

        let mut ab = left.clone();
        ab.merge(&right).unwrap();
        let mut ba = right.clone();
        ba.merge(&left).unwrap();

        prop_assert_eq!(ab.estimate(), ba.estimate());
    }

    /// Property: merging equals building from the concatenation
    #[test]
    fn prop_merge_matches_union(
        a in arb_values(500),
        b in arb_values(500),
        precision in arb_precision(),
    ) {
        let mut merged = Sketch::from_values(precision, a.iter().copied());
        merged.merge(&Sketch::from_values(precision, b.iter().copied())).unwrap();
        let union = Sketch::from_values(precision, a.iter().chain(&b).copied());

        prop_assert_eq!(merged.estimate(), union.estimate());
    }

    /// Property: duplicates never change the estimate
    #[test]
    fn prop_duplicates_are_idempotent(values in arb_values(300), precision in arb_precision()) {
        let once = Sketch::from_values(precision, values.iter().copied());
        let twice = Sketch::from_values(precision, values.iter().chain(&values).copied());
        prop_assert_eq!(once.estimate(), twice.estimate());
    }
}
