//! `hll-bench` command-line entry point.
//!
//! No arguments. Store and location settings come from the environment
//! (`HLL_BENCH_*`, `RUST_LOG`). Exits 0 when every phase completed and 1
//! otherwise; artifacts are promoted to the results directory either way.

use std::fs::File;
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use hll_bench::capture::{run_id_for, ArtifactCapture};
use hll_bench::config::HarnessConfig;
use hll_bench::driver::ExperimentDriver;

const LOG_FILE: &str = "harness.log";

fn init_tracing(capture: &ArtifactCapture) -> anyhow::Result<()> {
    let log_path = capture.logs_stage().join(LOG_FILE);
    let file = File::create(&log_path)
        .with_context(|| format!("creating {}", log_path.display()))?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .try_init()
        .context("installing tracing subscriber")?;
    Ok(())
}

fn run() -> anyhow::Result<bool> {
    let config = HarnessConfig::from_env();
    config.validate().context("invalid configuration")?;

    let run_id = run_id_for(chrono::Local::now());
    let mut capture = ArtifactCapture::open(&config.scratch_root, &config.results_root, &run_id)
        .with_context(|| format!("preparing staging under {}", config.scratch_root.display()))?;
    init_tracing(&capture)?;
    info!(
        run_id,
        database = %config.database_path().display(),
        results = %config.results_root.display(),
        "starting run"
    );

    let report = ExperimentDriver::new(&config, &capture).run();
    if let Some(e) = &report.error {
        error!(error = %e, "run failed");
    } else {
        info!(
            cells = report.cells.len(),
            exported = report.exported.len(),
            workloads = report.throughput.len(),
            "run complete"
        );
    }

    capture.finalize();
    Ok(report.is_success())
}

fn main() -> ExitCode {
    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("hll-bench: {e:#}");
            ExitCode::from(1)
        }
    }
}
