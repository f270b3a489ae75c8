//! Logging setup
//!
//! All modules log through `tracing` macros; this installs the subscriber.

/// Initialize the tracing subscriber for console output
///
/// `RUST_LOG` takes precedence; otherwise `-v` selects debug, default is info.
pub fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_names(true)
                .compact(),
        )
        .with(filter)
        .try_init();
}
