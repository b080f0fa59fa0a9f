mod bootstrap;

use std::io::{self, BufWriter};

use anyhow::{Context, Result};
use clap::Parser;
use txnstat_core::settings::Settings;
use txnstat_data::Collector;

fn main() -> Result<()> {
    let settings = Settings::parse();

    bootstrap::setup_logging(settings.effective_log_level())?;

    tracing::debug!("txnstat v{} starting", env!("CARGO_PKG_VERSION"));

    // A bad command object stops the run before any input is read.
    let config = match settings.command_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("command setup: {}", e);
            return Err(e).context("command setup");
        }
    };
    tracing::debug!("Command config: {:?}", config);

    let input = io::stdin().lock();
    let output = BufWriter::new(io::stdout().lock());

    let mut collector = Collector::new(config, output);
    let stats = collector.run(input).context("processing input")?;

    tracing::info!(
        "Read {} lines: {} decoded, {} ignored, {} unparseable, {} transactions completed",
        stats.lines,
        stats.decoded,
        stats.ignored,
        stats.decode_errors,
        stats.completed
    );

    Ok(())
}
