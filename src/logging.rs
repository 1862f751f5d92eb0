// src/logging.rs
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LogFormat;

/// Event targets used across the crate; all at `info` unless `RUST_LOG` says otherwise.
const DEFAULT_FILTER: &str = concat!(
    "warn,fin_pulse=info,api=info,chat=info,collect=info,",
    "ingest=info,news=info,scheduler=info,store=info",
);

/// Global subscriber: `RUST_LOG` filter, compact or JSON lines.
/// Safe to call twice; the second call is a no-op.
pub fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let res = match format {
        LogFormat::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_current_span(false))
            .try_init(),
    };
    if let Err(e) = res {
        tracing::debug!(error = %e, "tracing already initialised");
    }
}
