//! Logging setup — `tracing-subscriber` with an `EnvFilter`.
//!
//! `RUST_LOG` wins when set; otherwise the verbosity flag picks the level.

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

fn filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("tokenflow_kernel=debug,tokenflow_runtime=debug,info")
        } else {
            EnvFilter::new("tokenflow_kernel=info,tokenflow_runtime=info")
        }
    })
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logger(verbose: bool, format: LogFormat) -> Result<(), TryInitError> {
    let registry = tracing_subscriber::registry().with(filter(verbose));
    let layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        LogFormat::Compact => registry.with(layer.compact()).try_init(),
        LogFormat::Json => registry.with(layer.json()).try_init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_rejected() {
        let first = init_logger(true, LogFormat::Compact);
        let second = init_logger(false, LogFormat::Json);
        // Another test may have installed a subscriber first; either way
        // at most one of these calls succeeds.
        assert!(!(first.is_ok() && second.is_ok()));
        assert!(second.is_err());
    }
}
