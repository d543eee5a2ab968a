use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use wcprof::{cli::Cli, engine};

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing(args.debug);

    let summary = engine::instrument_dir(&args.path, &args.to_config())
        .with_context(|| format!("Failed to instrument {}", args.path.display()))?;

    for file in &summary.modified {
        match &file.backup {
            Some(backup) => println!(
                "{} ({} probes, backup {})",
                file.path.display(),
                file.probes.len(),
                backup.display()
            ),
            None => println!("{} ({} probes)", file.path.display(), file.probes.len()),
        }
    }

    println!(
        "{} probes inserted into {} of {} files ({} already instrumented, {} excluded, {} const fn skipped)",
        summary.probes_inserted(),
        summary.modified.len(),
        summary.files_scanned,
        summary.already_marked,
        summary.excluded,
        summary.skipped_const
    );

    Ok(())
}
