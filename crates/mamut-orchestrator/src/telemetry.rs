//! Tracing setup.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initializes structured tracing with environment override support.
///
/// `RUST_LOG` takes precedence over `default_level`. With `json` set, every
/// record is emitted as one JSON object per line.
pub fn init_tracing(
    default_level: &str,
    json: bool,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry.with(fmt::layer().json()).try_init()?;
    } else {
        registry.with(fmt::layer().compact()).try_init()?;
    }
    Ok(())
}
