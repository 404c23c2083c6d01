//! Tracing/logging initialization.
//!
//! JSON output for deployed builds, human-readable output for development,
//! switched by `FIELDSERVE_LOG_FORMAT` (`json` | `pretty`, default `pretty`).

use tracing_subscriber::EnvFilter;

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops). The filter is
/// configurable via `RUST_LOG` and defaults to `info`.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let format = std::env::var("FIELDSERVE_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false);

    let _ = match format.as_str() {
        "json" => builder.json().try_init(),
        _ => builder.try_init(),
    };
}
