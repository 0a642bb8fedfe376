//! # hll-bench: HyperLogLog Benchmark Harness
//!
//! **Version**: 0.1.0
//!
//! hll-bench measures HyperLogLog sketches against exact distinct counting on
//! an embedded SQL store: accuracy and latency across dataset scales, sketch
//! size against precision and fill level, hashing overhead, multi-day union
//! queries, and throughput under concurrent clients.
//!
//! ## Design Principles
//!
//! - **One record per timed repetition**: warm-up first, then K strictly
//!   ordered repetitions, each timed around the operation alone
//! - **Fail fast**: the first failing operation ends the run
//! - **Artifacts always land**: staged logs and outputs are promoted to
//!   `<results>/logs/<ts>/` and `<results>/outputs/<ts>/` on every exit path
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use hll_bench::capture::{run_id_for, ArtifactCapture};
//! use hll_bench::config::HarnessConfig;
//! use hll_bench::driver::ExperimentDriver;
//!
//! let config = HarnessConfig::from_env().with_scales(&[10_000]);
//! let mut capture = ArtifactCapture::open(
//!     &config.scratch_root,
//!     &config.results_root,
//!     run_id_for(chrono::Local::now()),
//! )?;
//!
//! let report = ExperimentDriver::new(&config, &capture).run();
//! let artifacts = capture.finalize();
//! println!("success: {} ({} files)", report.is_success(), artifacts.copied.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod capture;
pub mod config;
pub mod driver;
pub mod error;
pub mod experiment;
pub mod export;
pub mod runner;
pub mod sketch;
pub mod store;
pub mod sweep;
pub mod throughput;

pub use error::{Error, Result};
