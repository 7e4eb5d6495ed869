// src/logging.rs

//! Tracing setup for the `plmflow` binary.
//!
//! The filter comes from, in order:
//! 1. `--log-level`, applied to `plmflow` targets only (dependencies stay at
//!    `warn`);
//! 2. `PLMFLOW_LOG`, read as a full filter directive such as
//!    `plmflow::outbox=debug,plmflow=info`;
//! 3. `plmflow=info,warn`.
//!
//! An unparsable `PLMFLOW_LOG` falls back to the default with a warning once
//! the subscriber is up. Logs go to STDERR; stdout carries the printed
//! schedule.

use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::cli::LogLevel;

const ENV_VAR: &str = "PLMFLOW_LOG";
const DEFAULT_DIRECTIVES: &str = "plmflow=info,warn";

/// Install the global subscriber. Call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env = std::env::var(ENV_VAR).ok();
    let (filter, rejected) = build_filter(cli_level, env.as_deref());

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .try_init()?;

    if let Some(raw) = rejected {
        tracing::warn!(value = %raw, "ignoring invalid {ENV_VAR}; using {DEFAULT_DIRECTIVES}");
    }
    Ok(())
}

/// The filter to install, plus the env value if it had to be ignored.
fn build_filter(cli_level: Option<LogLevel>, env: Option<&str>) -> (EnvFilter, Option<String>) {
    if let Some(level) = cli_level {
        return (EnvFilter::new(cli_directives(level)), None);
    }

    match env.map(str::trim).filter(|raw| !raw.is_empty()) {
        Some(raw) => match EnvFilter::try_new(raw) {
            Ok(filter) => (filter, None),
            Err(_) => (EnvFilter::new(DEFAULT_DIRECTIVES), Some(raw.to_string())),
        },
        None => (EnvFilter::new(DEFAULT_DIRECTIVES), None),
    }
}

fn cli_directives(level: LogLevel) -> String {
    let level = match level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    };
    format!("plmflow={level},warn")
}

#[cfg(test)]
mod tests {
    use tracing_subscriber::filter::LevelFilter;

    use super::*;

    #[test]
    fn cli_level_wins_over_the_environment() {
        assert_eq!(cli_directives(LogLevel::Debug), "plmflow=debug,warn");

        let (filter, rejected) = build_filter(Some(LogLevel::Trace), Some("off"));
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::TRACE));
        assert!(rejected.is_none());
    }

    #[test]
    fn env_directives_are_parsed_as_a_filter() {
        let (filter, rejected) = build_filter(None, Some(" plmflow::outbox=debug "));
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
        assert!(rejected.is_none());
    }

    #[test]
    fn invalid_or_empty_env_falls_back_to_default() {
        let (filter, rejected) = build_filter(None, Some("plmflow=loud"));
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::INFO));
        assert_eq!(rejected.as_deref(), Some("plmflow=loud"));

        let (filter, rejected) = build_filter(None, Some("   "));
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::INFO));
        assert!(rejected.is_none());
    }
}
