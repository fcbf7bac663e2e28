//! Tracing subscriber setup for applications embedding the kernels.
//!
//! The library itself only emits `tracing` events; nothing is printed unless
//! the host installs a subscriber, e.g. through [`init_tracing`].
//!
//! - `RUST_LOG`: log level filter (default: `transition_kernel=info`)
//! - `LOG_FORMAT`: `json` for structured logs, `pretty` for development (default: pretty)

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "transition_kernel=info";

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable output.
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Read `LOG_FORMAT`; anything but `json` means pretty.
    pub fn from_env() -> Self {
        match std::env::var("LOG_FORMAT") {
            Ok(v) if v.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Install a global subscriber.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_tracing(format: LogFormat) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_span_events(FmtSpan::CLOSE))
            .try_init()
            .is_ok(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .flatten_event(true),
            )
            .try_init()
            .is_ok(),
    }
}
