//! CLI argument parsing for wcprof

use std::path::PathBuf;

use clap::Parser;

use crate::engine::InstrumentConfig;
use crate::injector::ProbePolicy;

#[derive(Parser, Debug)]
#[command(name = "wcprof")]
#[command(version)]
#[command(about = "Inject wall-clock timing probes into Rust source files", long_about = None)]
pub struct Cli {
    /// (mandatory) directory to be processed
    #[arg(short, long, value_name = "DIR")]
    pub path: PathBuf,

    /// Keep a timestamped copy of every file before overwriting it
    #[arg(short, long)]
    pub backup: bool,

    /// Also process subdirectories (skips target, tests, benches, examples)
    #[arg(short, long)]
    pub recursive: bool,

    /// Package name used in probe labels instead of the file's module name
    #[arg(long, value_name = "NAME")]
    pub package: Option<String>,

    /// Path of the runtime crate inside instrumented code
    #[arg(long = "runtime-path", value_name = "PATH", default_value = "::wcprof")]
    pub runtime_path: String,

    /// Enable debug logging to stderr
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    pub fn to_config(&self) -> InstrumentConfig {
        InstrumentConfig {
            backup: self.backup,
            recursive: self.recursive,
            package: self.package.clone(),
            policy: ProbePolicy {
                runtime_path: self.runtime_path.clone(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}
