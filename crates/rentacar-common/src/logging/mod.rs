//! Tracing subscriber setup for Rentacar binaries.
//!
//! The filter directive is taken from `-v/-q` when given, otherwise from
//! `RUST_LOG`, otherwise from the binary's default. Output is either compact
//! text for terminals or one JSON object per event for log shippers.

use anyhow::{bail, Result};
use clap_verbosity_flag::{LogLevel, Verbosity};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Compact => write!(f, "compact"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" | "text" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Pick the directive to parse. A blank `RUST_LOG` counts as unset.
fn filter_directive(cli_level: Option<String>, env_filter: Option<String>, default_filter: &str) -> String {
    cli_level
        .or(env_filter.filter(|directive| !directive.trim().is_empty()))
        .unwrap_or_else(|| default_filter.to_string())
}

/// Build the filter that [`init_logging`] installs.
pub fn resolve_filter<L: LogLevel>(verbosity: &Verbosity<L>, default_filter: &str) -> Result<EnvFilter> {
    let cli_level = verbosity.log_level().map(|level| level.to_string());
    let from_env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let directive = filter_directive(cli_level, from_env, default_filter);

    match EnvFilter::try_new(&directive) {
        Ok(filter) => Ok(filter),
        Err(_) if directive != default_filter => {
            eprintln!("Ignoring invalid log filter {directive:?}, using {default_filter:?}");
            Ok(EnvFilter::try_new(default_filter)?)
        }
        Err(e) => bail!("invalid default log filter {default_filter:?}: {e}"),
    }
}

/// Install the global subscriber. Fails if one is already set.
pub fn init_logging<L: LogLevel>(verbosity: &Verbosity<L>, default_filter: &str, format: LogFormat) -> Result<()> {
    let filter = resolve_filter(verbosity, default_filter)?;

    let (compact, json) = match format {
        LogFormat::Compact => (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_line_number(true)
                    .compact(),
            ),
            None,
        ),
        LogFormat::Json => (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(false),
            ),
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(compact)
        .with(json)
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_level_wins_over_env() {
        let directive = filter_directive(
            Some("DEBUG".to_string()),
            Some("warn".to_string()),
            "rentacar_booking=info",
        );
        assert_eq!(directive, "DEBUG");
    }

    #[test]
    fn test_env_then_default() {
        assert_eq!(
            filter_directive(None, Some("sqlx=warn".to_string()), "rentacar_booking=info"),
            "sqlx=warn"
        );
        assert_eq!(
            filter_directive(None, Some("  ".to_string()), "rentacar_booking=info"),
            "rentacar_booking=info"
        );
        assert_eq!(filter_directive(None, None, "info"), "info");
    }

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert!("yaml".parse::<LogFormat>().is_err());
        assert_eq!(LogFormat::default().to_string(), "compact");
    }
}
