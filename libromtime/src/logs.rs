use eyre::Result;
use std::io::stderr;
use tracing::subscriber::set_global_default;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, layer::SubscriberExt};

/// Starts the logging. Diagnostics go to stderr so reports on stdout stay machine readable.
///
/// `RUST_LOG` takes precedence over `default_level`.
pub fn start_logging(default_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into());
    let subscriber = Registry::default().with(
        fmt::layer()
            .without_time()
            .with_target(false)
            .with_writer(stderr)
            .with_filter(filter),
    );

    set_global_default(subscriber)?;

    Ok(())
}
