//! Tracing setup. Failures that are never returned to a caller (audit appends,
//! profile resolution, sign-out without identity, remote sign-out) are logged
//! on the `fleetwatch::operator` target.

use tracing_subscriber::{fmt, EnvFilter};

/// `RUST_LOG` wins over `fallback`; an unparsable fallback becomes `info`.
pub fn env_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global fmt subscriber. A second call is a no-op.
pub fn init(fallback: &str) {
    let _ = fmt().with_env_filter(env_filter(fallback)).with_target(true).try_init();
}
