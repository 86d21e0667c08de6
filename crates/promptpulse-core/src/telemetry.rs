//! Structured logging setup
//!
//! `RUST_LOG` controls the filter; `PROMPTPULSE_LOG_JSON=1` switches to
//! JSON lines for log shipping. Safe to call more than once - later calls
//! are no-ops.

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json = std::env::var("PROMPTPULSE_LOG_JSON")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if result.is_err() {
        tracing::debug!("Tracing subscriber was already installed");
    }
}
