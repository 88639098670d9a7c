use anyhow::Context;
use clap::Parser;
use gridwatch::{
    config::{Config, read_config_file},
    logging,
    supervisor::{Supervisor, executable_dir},
    util::{shutdown_channel, trigger_on_signal},
};
use tracing::{Instrument, trace};

/// Launch the collectors and run the price job on its schedule
#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file, forwarded to every worker
    #[arg(short)]
    file: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    let config = read_config_file(&args.file)?;
    let span = logging::init(
        "gridwatch-supervisor",
        logging::parse_level(config.log_level.as_deref()),
    );

    run(args, config).instrument(span).await
}

async fn run(args: Args, config: Config) -> anyhow::Result<()> {
    trace!("started with args: {args:?}");

    let config_path = std::fs::canonicalize(&args.file)
        .with_context(|| format!("could not resolve {}", args.file))?;
    let search_dir = executable_dir().context("could not locate the supervisor executable")?;

    let (trigger, shutdown) = shutdown_channel();
    trigger_on_signal(trigger);

    Supervisor::new(config.supervisor, config_path, search_dir)
        .run(shutdown)
        .await
}
