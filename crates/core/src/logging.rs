//! Logging initialization.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Default filter used when `RUST_LOG` is not set.
///
/// The frame crate logs slot turnover at debug level, which is what you
/// usually want to see while working on pacing problems.
const DEFAULT_FILTER: &str = "info,pacer_frame=debug";

/// Initialize the logging system with tracing.
///
/// Filtering honours `RUST_LOG`; output carries targets and thread ids so
/// the render thread is easy to pick out.
///
/// # Example
/// ```
/// pacer_core::init_logging();
/// tracing::info!("Frame pacer started");
/// ```
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    // Repeated calls (tests, doc tests) keep the first subscriber.
    if let Err(e) = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init()
    {
        tracing::debug!("Tracing subscriber already installed, keeping it: {}", e);
    }
}
