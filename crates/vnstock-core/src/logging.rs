//! Subscriber setup for binaries and tests that want log output.

use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "vnstock_core=info";

/// Install a `fmt` subscriber. The filter comes from `filter`, then
/// `VNSTOCK_LOG`, then `RUST_LOG`, then `vnstock_core=info`.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_tracing(filter: Option<&str>) -> bool {
    let directive = filter
        .map(str::to_owned)
        .or_else(|| std::env::var("VNSTOCK_LOG").ok())
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| String::from(DEFAULT_FILTER));

    let env_filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
