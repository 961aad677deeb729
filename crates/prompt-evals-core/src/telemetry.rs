//! Log setup for the `prompt-evals` binary.
//!
//! Reports and prompts are printed on stdout, so every log line goes to
//! stderr. `RUST_LOG` overrides the verbosity picked from CLI flags.

use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

fn filter_for(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

/// Install the process-wide subscriber writing to stderr. Later calls are no-ops.
pub fn init_tracing(json: bool, level: Level) {
    init_tracing_with_writer(json, level, std::io::stderr);
}

/// Same as [`init_tracing`] with a caller-chosen writer.
pub fn init_tracing_with_writer<W>(json: bool, level: Level, writer: W)
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let registry = tracing_subscriber::registry().with(filter_for(level));
    let layer = fmt::layer().with_target(false).with_writer(writer);
    // A subscriber may already be set (tests, embedding callers).
    let _ = if json {
        registry.with(layer.json()).try_init()
    } else {
        registry.with(layer).try_init()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_does_not_panic() {
        init_tracing(false, Level::WARN);
        init_tracing_with_writer(true, Level::DEBUG, std::io::sink);
    }

    #[test]
    fn test_filter_uses_level_without_rust_log() {
        if std::env::var_os("RUST_LOG").is_none() {
            assert_eq!(filter_for(Level::DEBUG).to_string(), "debug");
        }
    }
}
