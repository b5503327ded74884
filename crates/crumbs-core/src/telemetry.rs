//! Tracing setup for programs embedding the engine.
//!
//! The engine only emits events; installing a subscriber is left to the
//! host program. [`init_tracing`] is a ready-made choice.

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// Newline-delimited JSON.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" | "plain" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Filter used when `RUST_LOG` is unset: crumbs crates at `level`,
/// dependencies at `warn`.
pub fn default_directives(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    format!("warn,crumbs_core={level},crumbs_openrouter={level}")
}

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
///
/// Only the first call in a process takes effect.
pub fn init_tracing(format: LogFormat, level: Level) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));
    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = match format {
        LogFormat::Json => registry
            .with(fmt::layer().with_target(true).json())
            .try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().with_target(true)).try_init(),
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("text".parse::<LogFormat>(), Ok(LogFormat::Pretty));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_default_directives_scope_crumbs_crates() {
        assert_eq!(
            default_directives(Level::DEBUG),
            "warn,crumbs_core=debug,crumbs_openrouter=debug"
        );
    }

    #[test]
    fn test_init_tracing_twice() {
        init_tracing(LogFormat::Pretty, Level::WARN);
        init_tracing(LogFormat::Json, Level::DEBUG);
    }
}
