//! Structured logging for the porter.
//!
//! The porter is a library subsystem, so logging setup is driven by the
//! embedding process through [`PorterSettings`]: `log_level` seeds the
//! filter (still overridable via `RUST_LOG`) and `log_format` selects
//! line or JSON output. Initialisation is fallible rather than panicking
//! so an embedder that already installed a subscriber gets a config
//! error it can ignore.

use crate::config::PorterSettings;
use crate::error::PorterError;
use std::str::FromStr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output format for structured logs, parsed from the settings'
/// `log_format` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines for development.
    Human,
    /// Newline-delimited JSON for log aggregation pipelines.
    Json,
}

impl FromStr for LogFormat {
    type Err = PorterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "human" => Ok(LogFormat::Human),
            "json" => Ok(LogFormat::Json),
            other => Err(PorterError::Config(format!(
                "unknown log format {other:?}, expected \"human\" or \"json\""
            ))),
        }
    }
}

/// Install the global tracing subscriber according to the porter's
/// settings.
///
/// Fails with [`PorterError::Config`] when the format string is unknown
/// or a subscriber is already installed in this process.
pub fn init_logging(settings: &PorterSettings) -> Result<(), PorterError> {
    let format: LogFormat = settings.log_format.parse()?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_level));

    let registry = tracing_subscriber::registry().with(filter);
    let layer = fmt::layer().with_target(true);
    match format {
        LogFormat::Human => registry.with(layer).try_init(),
        LogFormat::Json => registry.with(layer.json()).try_init(),
    }
    .map_err(|e| PorterError::Config(format!("logging init failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_strings_parse() {
        assert_eq!("human".parse::<LogFormat>().unwrap(), LogFormat::Human);
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!(matches!(
            "xml".parse::<LogFormat>(),
            Err(PorterError::Config(_))
        ));
    }
}
