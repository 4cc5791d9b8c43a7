//! Logging and tracing infrastructure for vestige.
//!
//! Structured logging via the tracing crate, with env-filter based
//! verbosity control and an optional JSON output mode for machine
//! consumption of analysis diagnostics.

use std::sync::Once;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

static INIT: Once = Once::new();

/// Output format for the global subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable line output.
    #[default]
    Text,
    /// JSON output for structured log consumers.
    Json,
}

/// Initialize the global tracing subscriber.
///
/// Verbosity comes from `RUST_LOG` when set, defaulting to `info`.
/// Safe to call more than once; subsequent calls are ignored.
pub fn init(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Text => {
                let fmt_layer = fmt::layer().with_target(true);
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt_layer)
                    .init();
            }
            LogFormat::Json => {
                let fmt_layer = fmt::layer().json().with_target(true).with_current_span(true);
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt_layer)
                    .init();
            }
        }

        tracing::debug!(?format, "vestige tracing initialized");
    });
}
