//! Experiment Schema Tests
//!
//! Trial records, the per-category recorder tables and the run record.

use hll_bench::experiment::{
    ArtifactKind, ArtifactRecord, Dimension, MetricCategory, MetricsRecorder, Phase, RecordSink,
    RunRecord, RunStatus, TrialRecord,
};

// =============================================================================
// TrialRecord Tests
// =============================================================================

fn approx_record(run_number: u32, estimate: u64) -> TrialRecord {
    TrialRecord::builder(MetricCategory::UnionApprox, "hll_union_p12_d7")
        .dimensions(&[(Dimension::Precision, 12), (Dimension::WindowDays, 7)])
        .run_number(run_number)
        .measured_value(estimate)
        .exact_count(Some(1_000))
        .duration_ms(2.5)
        .storage_bytes(Some(21_504))
        .build()
}

#[test]
fn test_trial_record_serialization() {
    let record = approx_record(1, 990);

    let json = serde_json::to_string(&record).expect("serialization failed");
    let deserialized: TrialRecord = serde_json::from_str(&json).expect("deserialization failed");

    assert_eq!(record, deserialized);
}

#[test]
fn test_trial_record_sentinel_for_zero_exact() {
    let record = TrialRecord::builder(MetricCategory::BulkApprox, "hll_p10_n0")
        .dimensions(&[(Dimension::Precision, 10), (Dimension::Scale, 0)])
        .measured_value(0)
        .exact_count(Some(0))
        .build();
    assert_eq!(record.relative_error_pct(), None);
}

// =============================================================================
// MetricsRecorder Tests
// =============================================================================

#[test]
fn test_recorder_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run").join("metrics.sqlite3");

    {
        let mut recorder = MetricsRecorder::open(&path).unwrap();
        for run_number in 1..=3 {
            recorder.record(&approx_record(run_number, 990 + u64::from(run_number))).unwrap();
        }
    }

    let recorder = MetricsRecorder::open(&path).unwrap();
    assert_eq!(recorder.path(), Some(path.as_path()));
    assert_eq!(recorder.count(MetricCategory::UnionApprox).unwrap(), 3);
    assert_eq!(recorder.count(MetricCategory::UnionExact).unwrap(), 0);

    let records = recorder.records(MetricCategory::UnionApprox).unwrap();
    let runs: Vec<u32> = records.iter().map(TrialRecord::run_number).collect();
    assert_eq!(runs, vec![1, 2, 3]);
    assert_eq!(records[0].measured_value(), 991);
    assert_eq!(records[0].dimension(Dimension::WindowDays), Some(7));
    assert_eq!(records[0].storage_bytes(), Some(21_504));
}

#[test]
fn test_recorder_create_refuses_existing_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run").join("metrics.sqlite3");

    {
        let mut recorder = MetricsRecorder::create(&path).unwrap();
        recorder.record(&approx_record(1, 990)).unwrap();
    }

    assert!(MetricsRecorder::create(&path).is_err());
    let recorder = MetricsRecorder::open(&path).unwrap();
    assert_eq!(recorder.count(MetricCategory::UnionApprox).unwrap(), 1);
}

#[test]
fn test_recorder_separates_categories() {
    let mut recorder = MetricsRecorder::in_memory().unwrap();
    recorder.record(&approx_record(1, 1_000)).unwrap();
    recorder
        .record(
            &TrialRecord::builder(MetricCategory::UnionExact, "exact_union_d7")
                .dimensions(&[(Dimension::WindowDays, 7)])
                .measured_value(1_000)
                .build(),
        )
        .unwrap();

    assert_eq!(recorder.count(MetricCategory::UnionApprox).unwrap(), 1);
    assert_eq!(recorder.count(MetricCategory::UnionExact).unwrap(), 1);
    assert_eq!(recorder.count(MetricCategory::BulkExact).unwrap(), 0);
}

#[test]
fn test_recorder_rejects_record_missing_dimension() {
    let mut recorder = MetricsRecorder::in_memory().unwrap();
    let record = TrialRecord::builder(MetricCategory::Storage, "storage_p10")
        .dimensions(&[(Dimension::Precision, 10)])
        .build();
    assert!(recorder.record(&record).is_err());
    assert_eq!(recorder.count(MetricCategory::Storage).unwrap(), 0);
}

#[test]
fn test_category_contract() {
    assert_eq!(MetricCategory::ALL.len(), 6);
    assert_eq!(
        MetricCategory::Storage.header().join(","),
        "test_name,hll_type,precision,item_count,storage_bytes,run_number"
    );
    assert_eq!(MetricCategory::BulkApprox.file_name(), "01_results_bulk_hll.csv");
    for category in MetricCategory::ALL {
        assert_eq!(category.header().first(), Some(&"test_name"));
        assert_eq!(category.header().last(), Some(&"run_number"));
    }
}

// =============================================================================
// RunRecord Tests
// =============================================================================

#[test]
fn test_run_record_lifecycle() {
    let mut run = RunRecord::new("20250101_120000")
        .with_config(serde_json::json!({"scales": [10_000]}));
    assert_eq!(run.status(), RunStatus::Pending);

    run.start();
    assert_eq!(run.status(), RunStatus::Running);
    run.phase_completed(Phase::Init);
    run.phase_completed(Phase::PreCleanup);
    run.fail(Phase::Setup, "disk full");

    assert_eq!(run.status(), RunStatus::Failed);
    assert_eq!(run.failed_phase(), Some(Phase::Setup));
    assert_eq!(run.error(), Some("disk full"));
    assert_eq!(run.completed_phases(), &[Phase::Init, Phase::PreCleanup]);
    assert!(run.ended_at().unwrap() >= run.started_at().unwrap());
}

#[test]
fn test_run_record_serialization() {
    let mut run = RunRecord::new("20250101_120000");
    run.start();
    run.phase_completed(Phase::Finalize);
    run.succeed();

    let json = serde_json::to_string(&run).unwrap();
    assert!(json.contains("\"finalize\""));
    let back: RunRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(run, back);
}

// =============================================================================
// ArtifactRecord Tests
// =============================================================================

#[test]
fn test_artifact_record() {
    let artifact = ArtifactRecord::new(
        ArtifactKind::Output,
        "01_results_bulk_exact.csv",
        "/r/outputs/x",
        120,
    );
    assert_eq!(artifact.kind(), ArtifactKind::Output);
    assert_eq!(artifact.key(), "01_results_bulk_exact.csv");
    assert_eq!(artifact.size_bytes(), 120);
}
