//! Support for structured logging.

use std::{fmt, io, str::FromStr};
use tracing_subscriber::EnvFilter;

use crate::common::*;

/// The filter we use when `RUST_LOG` is not set.
const DEFAULT_FILTER: &str = "warn";

/// What log format we should use.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LogFormat {
    /// Pretty, indented logs.
    Indented,
    /// Single-line log entries with all keys on each line.
    Flat,
    /// JSON records.
    Json,
}

impl LogFormat {
    /// Install a global `tracing` subscriber writing this format to `stderr`.
    ///
    /// Filtering is controlled by `RUST_LOG`, and defaults to warnings only.
    pub fn init(self) -> Result<()> {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr);
        let result = match self {
            LogFormat::Indented => builder.pretty().try_init(),
            LogFormat::Flat => builder.try_init(),
            LogFormat::Json => builder.json().try_init(),
        };
        result.map_err(|err| format_err!("could not initialize logging: {}", err))
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Indented => "indented".fmt(f),
            LogFormat::Flat => "flat".fmt(f),
            LogFormat::Json => "json".fmt(f),
        }
    }
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "indented" => Ok(LogFormat::Indented),
            "flat" => Ok(LogFormat::Flat),
            "json" => Ok(LogFormat::Json),
            _ => Err(format_err!("unknown log format: {}", s)),
        }
    }
}

#[test]
fn log_formats_round_trip_through_strings() {
    for format in [LogFormat::Indented, LogFormat::Flat, LogFormat::Json] {
        assert_eq!(format.to_string().parse::<LogFormat>().unwrap(), format);
    }
    assert!("xml".parse::<LogFormat>().is_err());
}
