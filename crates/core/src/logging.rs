//! `tracing` subscriber setup.
//!
//! `RUST_LOG` always wins. Otherwise the directives come from the config
//! file, and failing that from [`DEFAULT_LOG_FILTER`].

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub const DEFAULT_LOG_FILTER: &str = "info,toybox=debug,toybox_renderer=debug,toybox_rhi=info";

/// ```
/// toybox_core::init_logging();
/// tracing::info!("Renderer initialized");
/// ```
pub fn init_logging() {
    init_logging_with(DEFAULT_LOG_FILTER);
}

/// Installs the subscriber with `directives` unless `RUST_LOG` is set.
/// Unparseable directives fall back to the default filter.
pub fn init_logging_with(directives: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directives))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    // Later calls (tests, embedding) leave the first subscriber in place.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
    }

    #[test]
    fn test_repeated_init_is_harmless() {
        init_logging();
        init_logging_with("warn");
        init_logging_with("not a [valid filter");
    }
}
