//! Logging initialization using tracing.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "info,vkframe=debug,vkframe_rhi=debug,vkframe_renderer=debug";

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` overrides the default filter. Calling this twice is harmless:
/// the second registration is ignored.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init();
}
