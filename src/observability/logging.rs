//! Structured logging.
//!
//! # Design Decisions
//! - Uses the tracing crate for structured events
//! - `RUST_LOG` wins over the configured level when set
//! - Initialization is idempotent; a second call is ignored

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when neither `RUST_LOG` nor config provide one.
pub const DEFAULT_FILTER: &str = "routerkit=info,tower_http=info";

/// Install the global subscriber with `level` as the fallback filter.
pub fn init(level: &str) {
    let fallback = if level.trim().is_empty() {
        DEFAULT_FILTER.to_string()
    } else {
        level.to_string()
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&fallback))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let result = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
