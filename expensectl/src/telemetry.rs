//! Tracing initialisation.
//!
//! Installs a `tracing-subscriber` registry with an [`EnvFilter`] and a console `fmt` layer.
//! The filter comes from `RUST_LOG` when set, otherwise from the configured `log_level`:
//!
//! ```bash
//! RUST_LOG="expensectl=debug,tower_http=info" expensectl -f config.yaml
//! ```

use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize tracing for the process.
///
/// Fails if a global subscriber has already been installed.
pub fn init_telemetry(default_level: &str) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    info!("Telemetry initialized");
    Ok(())
}
