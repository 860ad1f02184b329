//! EMVA1288 sensor test bench.
//!
//! Configures a simulated CMOS sensor sweep, has an external generator
//! synthesize the frames, then reduces them into the EMVA1288 measurement
//! table, plots it, and writes a report with one operation point.
//!
//! The run itself lives in [`bench::TestBench`]; the other modules are the
//! stages it drives.

pub mod bench;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod generator;
pub mod loader;
pub mod plotting;
pub mod processing;
pub mod report;

pub use bench::{Collaborators, RunOutcome, TestBench};
pub use config::BenchConfig;
pub use error::{BenchError, BenchResult};
