//! efdpolld - EFD latest-sample poller
//!
//! Polls the EFD for the newest force-actuator sample, timing each query,
//! and appends the results in batches to a plain-text log.

use anyhow::{Context, Result};
use clap::Parser;
use efdpolld::batch_log::BatchLog;
use efdpolld::config::Config;
use efdpolld::efd_client::HttpEfdClient;
use efdpolld::poller::{Poller, PollerSettings};
use efdpolld::shutdown::{forward_interrupts, InterruptOutcome, FORCED_EXIT_CODE};
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "efdpolld", version, about = "Poll the EFD and log the latest sample in batches")]
struct Cli {
    /// Config file (default: /etc/efdpolld/config.toml, then ./efdpolld.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Sample log path, overriding output.log_path
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Stop after this many iterations
    #[arg(long)]
    iterations: Option<u64>,

    /// Samples per flushed batch, overriding poll.batch_size
    #[arg(long)]
    batch_size: Option<usize>,

    /// Seconds between iterations, overriding poll.sleep_secs
    #[arg(long)]
    sleep_secs: Option<f64>,

    /// Print the InfluxQL query and exit
    #[arg(long)]
    print_query: bool,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(path) = &self.log_file {
            config.output.log_path = path.clone();
        }
        if let Some(n) = self.batch_size {
            config.poll.batch_size = n;
        }
        if let Some(secs) = self.sleep_secs {
            config.poll.sleep_secs = secs;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    cli.apply(&mut config);

    let mut settings = PollerSettings::from_config(&config).context("Invalid configuration")?;
    settings.max_iterations = cli.iterations;

    if cli.print_query {
        println!("{}", settings.query.to_influxql());
        return Ok(());
    }

    info!("efdpolld v{} starting", env!("CARGO_PKG_VERSION"));

    let client = HttpEfdClient::from_config(&config.efd)
        .await
        .context("Failed to set up EFD client")?;
    info!("Querying {}", client.base_url());

    let log = BatchLog::open(&config.output.log_path, config.output.write_header)?;
    info!("Appending samples to {}", log.path().display());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let outcome = forward_interrupts(tokio::signal::ctrl_c, shutdown_tx).await;
        if outcome == InterruptOutcome::Forced {
            std::process::exit(FORCED_EXIT_CODE);
        }
    });

    let poller = Poller::new(client, settings)?;
    match poller.run(log, shutdown_rx).await {
        Ok(stats) => {
            info!(
                "Stopped after {} iterations, {} samples written ({} empty results, last latency {})",
                stats.iterations,
                stats.samples_flushed,
                stats.empty_results,
                stats
                    .last_latency
                    .map(|l| format!("{:.3}s", l))
                    .unwrap_or_else(|| "n/a".to_string())
            );
            Ok(())
        }
        Err(e) => {
            error!("Poller failed: {:#}", e);
            Err(e)
        }
    }
}
