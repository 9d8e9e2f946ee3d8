//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once at startup
//! - JSON format for production, pretty format for development
//! - Log level configurable via config and `RUST_LOG`
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the config file level, so an operator can
//!   crank verbosity without editing config
//! - Initialization is idempotent; later calls keep the first
//!   subscriber (matters for in-process test harnesses)

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

pub fn init_logging(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("sse_relay={},tower_http=info", config.log_level))
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.log_json {
        let _ = registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init();
    } else {
        let _ = registry.with(tracing_subscriber::fmt::layer()).try_init();
    }
}
