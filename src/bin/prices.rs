use std::time::Duration;

use anyhow::{Context, bail};
use chrono::NaiveDate;
use clap::Parser;
use gridwatch::{
    config::{Config, FEED_TOKEN_VAR, read_config_file},
    logging,
    monitors::{connect_or_shutdown, prices::PriceFeedFetcher},
    sink::{ResilientSink, connector_from_config},
    util::{shutdown_channel, trigger_on_signal},
};
use tracing::{Instrument, info, trace};

/// Fetch the day-ahead price indicators once and store them
#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,

    /// First day to fetch (YYYY-MM-DD), tomorrow by default
    #[arg(long)]
    start: Option<NaiveDate>,

    /// Last day to fetch (YYYY-MM-DD), same as start by default
    #[arg(long)]
    end: Option<NaiveDate>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    let config = read_config_file(&args.file)?;
    let span = logging::init(
        "gridwatch-prices",
        logging::parse_level(config.log_level.as_deref()),
    );

    run(args, config).instrument(span).await
}

async fn run(args: Args, config: Config) -> anyhow::Result<()> {
    trace!("started with args: {args:?}");

    let Some(prices) = config.prices else {
        bail!("no prices section in {}", args.file);
    };
    let token = prices
        .resolve_token()
        .with_context(|| format!("no feed token, set prices.token or {FEED_TOKEN_VAR}"))?;

    let timeout = Duration::from_secs(prices.timeout);
    let sink = ResilientSink::new(
        connector_from_config(&config.sink, timeout),
        &prices.database,
        timeout,
    );
    let fetcher = PriceFeedFetcher::new(&prices.url, token, timeout)?;

    let (trigger, mut shutdown) = shutdown_channel();
    trigger_on_signal(trigger);

    let points = fetcher
        .fetch(&prices.indicators, args.start, args.end)
        .await?;
    info!("fetched {} points", points.len());

    let Some(mut handle) = connect_or_shutdown(&sink, &mut shutdown).await else {
        bail!("interrupted before the points were written");
    };
    let written = sink.write(&mut handle, &points, false).await;
    let _ = handle.close().await;
    written?;

    Ok(())
}
