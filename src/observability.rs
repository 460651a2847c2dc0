//! Observability utilities.

use std::sync::OnceLock;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::types::ObservabilityConfig;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Environment variable selecting the log format (`json` or anything else).
pub const LOG_FORMAT_ENV: &str = "CONTEXT_BRIDGE_LOG_FORMAT";

/// Initialize tracing subscriber once for the process.
///
/// Log format defaults to plain text and can be switched to JSON via
/// `CONTEXT_BRIDGE_LOG_FORMAT=json`. Filter defaults to `info` if `RUST_LOG` is unset.
pub fn init_tracing() {
    init_tracing_with(&ObservabilityConfig::default());
}

/// Like [`init_tracing`], falling back to `config` where the environment is
/// silent. `RUST_LOG` and `CONTEXT_BRIDGE_LOG_FORMAT` still win.
pub fn init_tracing_with(config: &ObservabilityConfig) {
    TRACING_INIT.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
        let json = std::env::var(LOG_FORMAT_ENV)
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(config.json_logs);

        let result = if json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().compact())
                .try_init()
        };

        if let Err(err) = result {
            eprintln!("tracing init skipped: {err}");
        }
    });
}
