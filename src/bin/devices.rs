use std::time::Duration;

use clap::Parser;
use gridwatch::{
    config::{Config, read_config_file},
    logging,
    monitors::{
        reachability::{HostRoster, IcmpProbe, ReachabilityPoller},
        run_periodic,
    },
    sink::{ResilientSink, connector_from_config},
    util::{shutdown_channel, trigger_on_signal},
};
use tracing::{Instrument, info, trace, warn};

/// Probe the configured hosts and record which ones answer
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
        "gridwatch-devices",
        logging::parse_level(config.log_level.as_deref()),
    );

    run(args, config).instrument(span).await
}

async fn run(args: Args, config: Config) -> anyhow::Result<()> {
    trace!("started with args: {args:?}");

    let devices = config.devices;
    let timeout = Duration::from_secs(devices.timeout);
    let sink = ResilientSink::new(
        connector_from_config(&config.sink, timeout),
        &devices.database,
        timeout,
    );

    let roster = HostRoster::new(&devices.hostnames);
    if roster.is_empty() {
        warn!("no hosts configured, nothing will be written");
    } else {
        info!("probing {} host(s)", roster.hosts().len());
    }

    let poller = ReachabilityPoller::new(IcmpProbe, roster, timeout, &devices.table);

    let (trigger, shutdown) = shutdown_channel();
    trigger_on_signal(trigger);

    run_periodic(poller, sink, Duration::from_secs(devices.interval), shutdown).await;
    Ok(())
}
