//! Log subscriber setup.
//!
//! The library crate logs through the `log` facade; the `tracing-log`
//! bridge forwards those records into the same subscriber.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directives, e.g. `auth_totp=debug`. Falls back to `RUST_LOG`.
pub const LOG_ENV: &str = "AUTH_LOG";
/// Set to `true` for JSON formatted logs.
pub const LOG_JSON_ENV: &str = "AUTH_LOG_JSON";

const DEFAULT_FILTER: &str = "warn";

/// Install the global subscriber. Safe to call more than once; only the
/// first call has any effect. Returns whether this call installed it.
pub fn init_logging() -> bool {
    let json = std::env::var(LOG_JSON_ENV)
        .map(|v| v.parse::<bool>().unwrap_or(false))
        .unwrap_or(false);

    let installed = if json {
        tracing_subscriber::registry()
            .with(env_filter())
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .is_ok()
    } else {
        tracing_subscriber::registry()
            .with(env_filter())
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .is_ok()
    };

    if installed {
        tracing::debug!("logging initialised");
    }
    installed
}

fn env_filter() -> EnvFilter {
    [LOG_ENV, "RUST_LOG"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|v| !v.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}
