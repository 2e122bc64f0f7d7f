//! Tracing subscriber setup for the job runner.

use tracing::warn;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::LogFormat;

const DEFAULT_FILTER: &str = "info";

/// Filter from `RUST_LOG`, or `info` when unset or invalid.
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber.
///
/// A subscriber already installed (by a test harness, for instance) is
/// kept and the failure is logged.
pub fn init_tracing(format: LogFormat) {
    let builder = fmt().with_env_filter(env_filter()).with_target(true);
    let result = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
    if let Err(e) = result {
        warn!(error = %e, "tracing init failed");
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(LogFormat::Json)]
    #[case(LogFormat::Pretty)]
    fn repeated_initialisation_is_harmless(#[case] format: LogFormat) {
        init_tracing(format);
        init_tracing(format);
    }
}
