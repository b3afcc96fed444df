//! Tracing bootstrap shared by binaries and tests.

use std::sync::Once;

use tracing_subscriber::{fmt, EnvFilter};

/// Initialise the global tracing subscriber.
///
/// The filter is taken from `LOG_LEVEL` (env-filter syntax, e.g.
/// `info,astrolabe=debug`); `DEBUG=1` forces the `debug` level when no
/// explicit filter is set. Safe to call more than once.
pub fn init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        dotenvy::dotenv().ok();
        let filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| {
            let default = if debug_enabled() { "debug" } else { "info" };
            EnvFilter::new(default)
        });
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_level(true)
            .init();
    });
}

fn debug_enabled() -> bool {
    matches!(
        std::env::var("DEBUG").as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}
