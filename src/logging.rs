//! Per-process log setup
//!
//! Each binary builds its subscriber once at start and instruments its main
//! future with the returned span, so every line carries the process name.

use std::str::FromStr;

use tracing::{Span, info_span, level_filters::LevelFilter};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

pub fn parse_level(level: Option<&str>) -> LevelFilter {
    level
        .and_then(|level| LevelFilter::from_str(level).ok())
        .unwrap_or(LevelFilter::INFO)
}

/// Install the subscriber for this process and return its root span
pub fn init(process: &'static str, level: LevelFilter) -> Span {
    let target = process.replace('-', "_");
    let filter = filter::Targets::new()
        .with_target("gridwatch", level)
        .with_target(target, level);

    let installed = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false),
        )
        .with(filter)
        .try_init();

    if let Err(e) = installed {
        eprintln!("{process}: logging already initialised: {e}");
    }

    info_span!("process", name = process)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level(Some("debug")), LevelFilter::DEBUG);
        assert_eq!(parse_level(Some("WARN")), LevelFilter::WARN);
        assert_eq!(parse_level(Some("loud")), LevelFilter::INFO);
        assert_eq!(parse_level(None), LevelFilter::INFO);
    }
}
