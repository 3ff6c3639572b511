use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize logging with tracing
///
/// This function sets up the tracing subscriber with the following configuration:
/// - Reads filter from RUST_LOG environment variable if available
/// - Falls back to "duplex_audio=debug,warn" if RUST_LOG is not set
/// - Uses a formatted output layer
///
/// Calling it again after a global subscriber is installed does nothing.
///
/// # Example
///
/// ```no_run
/// use duplex_audio::utils::logging::init_logging;
///
/// init_logging();
/// ```
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("duplex_audio=debug,warn"));

    let installed = tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("duplex-audio logging initialized");
    }
}
