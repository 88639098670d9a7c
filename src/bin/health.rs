use std::time::Duration;

use clap::Parser;
use gridwatch::{
    config::{Config, read_config_file},
    logging,
    monitors::{
        health::{HealthSampler, SysinfoProvider},
        run_periodic,
    },
    sink::{ResilientSink, connector_from_config},
    util::{shutdown_channel, trigger_on_signal},
};
use tracing::{Instrument, trace};

/// Sample the local host's CPU, memory, disk and temperature
#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    let config = read_config_file(&args.file)?;
    let span = logging::init(
        "gridwatch-health",
        logging::parse_level(config.log_level.as_deref()),
    );

    run(args, config).instrument(span).await
}

async fn run(args: Args, config: Config) -> anyhow::Result<()> {
    trace!("started with args: {args:?}");

    let health = config.health;
    let timeout = Duration::from_secs(health.timeout);
    let sink = ResilientSink::new(
        connector_from_config(&config.sink, timeout),
        &health.database,
        timeout,
    );

    let sampler = HealthSampler::new(
        SysinfoProvider::new(&health.sensor),
        health.thresholds,
        &health.table,
    );

    let (trigger, shutdown) = shutdown_channel();
    trigger_on_signal(trigger);

    run_periodic(sampler, sink, Duration::from_secs(health.interval), shutdown).await;
    Ok(())
}
