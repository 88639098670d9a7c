use std::time::Duration;

use anyhow::bail;
use clap::Parser;
use gridwatch::{
    config::{Config, read_config_file},
    logging,
    monitors::bus::run_subscriber,
    sink::{ResilientSink, connector_from_config},
    util::{shutdown_channel, trigger_on_signal},
};
use tracing::{Instrument, trace, warn};

/// Forward sensor readings from the message bus into the store
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
        "gridwatch-mqtt",
        logging::parse_level(config.log_level.as_deref()),
    );

    run(args, config).instrument(span).await
}

async fn run(args: Args, config: Config) -> anyhow::Result<()> {
    trace!("started with args: {args:?}");

    let Some(bus) = config.mqtt else {
        bail!("no mqtt section in {}", args.file);
    };
    if bus.topics.iter().all(|topic| topic.trim().is_empty()) {
        warn!("no topics configured, nothing will be received");
    }

    let timeout = Duration::from_secs(bus.timeout);
    let sink = ResilientSink::new(
        connector_from_config(&config.sink, timeout),
        &bus.database,
        timeout,
    );

    let (trigger, shutdown) = shutdown_channel();
    trigger_on_signal(trigger);

    run_subscriber(bus, sink, shutdown).await;
    Ok(())
}
