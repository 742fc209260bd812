// src/observability.rs
//! Logging setup
//!
//! The library only emits `tracing` events and `metrics` counters; binaries
//! decide where they go. `init_tracing` installs the subscriber used by the
//! `sshaudit` tool.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install a global tracing subscriber
///
/// The filter is read from `RUST_LOG` and defaults to `info`. With `json`
/// set, every line is a JSON object suitable for log shipping.
pub fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()?;
    }
    Ok(())
}
