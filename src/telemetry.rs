//! Tracing subscriber setup for binaries and tests.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

/// Environment variable consulted before `RUST_LOG`.
pub const LOG_ENV_VAR: &str = "PENUMBRA_LOG";

/// Installs a stderr fmt subscriber once per process.
///
/// Directives come from `PENUMBRA_LOG`, then `RUST_LOG`, then
/// `default_directive`. Later calls are no-ops.
pub fn init_tracing(default_directive: &str) {
    static INSTALLED: Once = Once::new();
    INSTALLED.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new(default_directive));
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_ansi(false);
        if subscriber.try_init().is_err() {
            tracing::debug!("tracing subscriber already installed");
        }
    });
}
