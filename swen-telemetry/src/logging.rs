//! ## swen-telemetry::logging
//! **Structured logging with tracing**

use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the global tracing subscriber with `RUST_LOG`-style
/// filtering. Call once at startup; a second call is a no-op so test
/// binaries can initialize lazily.
pub fn init() {
    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_thread_names(true)
        .try_init();
}
