//! Subscriber installation for prepdb's log output.
//!
//! Targets worth filtering on:
//! - `prepdb_core`: permit acquisition (trace), step application (trace)
//! - `prepdb_engine`: engine launches and retries, database provisioning
//! - `prepdb_provider`: template creation, prefetch scheduling, registry builds

use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Variable holding the filter directives.
pub const LOG_ENV: &str = "PREPDB_LOG";
/// Directives used when `PREPDB_LOG` is unset or unparsable.
pub const DEFAULT_DIRECTIVES: &str = "prepdb=info";

static INIT: Once = Once::new();

/// Install a global subscriber filtered by `PREPDB_LOG`, for example
/// `PREPDB_LOG=prepdb_provider=debug,prepdb_engine=info`.
///
/// Only the first call in a process has an effect, and nothing is installed
/// if the host test harness already set a global subscriber.
pub fn init_tracing() {
    init_tracing_with(DEFAULT_DIRECTIVES);
}

/// Like [`init_tracing`], falling back to `default_directives` instead of
/// `prepdb=info`. Useful for suites that want prefetch traces by default.
pub fn init_tracing_with(default_directives: &str) {
    INIT.call_once(|| {
        let filter = filter_from_env(default_directives);
        let _ = tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_line_number(true),
            )
            .with(filter)
            .try_init();
    });
}

fn filter_from_env(default_directives: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_directives))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_initialization_is_harmless() {
        init_tracing_with("prepdb_provider=trace");
        init_tracing();
        tracing::info!(target: "prepdb_core", "subscriber ready");
    }
}
