/// Tracing subscriber initialization.
///
/// Called once by the binary; the library never installs a subscriber.
use std::env;

use tracing_subscriber::EnvFilter;

/// Initialize the global subscriber. `RUST_LOG` controls filtering
/// (default `info`); `LOG_FORMAT=json` switches to JSON output.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let use_json = env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    if use_json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(false)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
