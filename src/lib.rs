//! wcprof - wall-clock profiler for Rust source
//!
//! The crate has two halves:
//!
//! - the runtime ([`Timer`], [`Registry`], [`report`]) linked into
//!   instrumented programs, which aggregates per-function timings across
//!   threads and prints them as a table;
//! - the source rewriter (feature `instrument`, on by default) that injects a
//!   [`Timer`] guard at the top of every function in a directory and marks
//!   each one so later runs leave it alone.
//!
//! Instrumented programs only need the runtime:
//!
//! ```toml
//! wcprof = { version = "0.3", default-features = false }
//! ```

pub mod registry;
pub mod report;
pub mod timer;

#[cfg(feature = "instrument")]
pub mod cli;
#[cfg(feature = "instrument")]
pub mod engine;
#[cfg(feature = "instrument")]
pub mod error;
#[cfg(feature = "instrument")]
pub mod injector;
#[cfg(feature = "instrument")]
pub mod marker;
#[cfg(feature = "instrument")]
pub mod scanner;
#[cfg(feature = "instrument")]
pub mod writer;

pub use registry::{global, record, snapshot, AggregateStat, Registry, Snapshot};
pub use report::{print_report, write_report, ReportRow};
pub use timer::Timer;

#[cfg(feature = "instrument")]
pub use engine::{instrument_dir, InstrumentConfig, InstrumentSummary};
#[cfg(feature = "instrument")]
pub use error::InstrumentError;
