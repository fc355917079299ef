//! # swen-telemetry
//!
//! Observability for the SWEN stack: tracing-based structured logging and a
//! small Prometheus metrics recorder shared by the protocol layers.

pub mod logging;
pub mod metrics;

pub use logging::init as init_logging;
pub use metrics::MetricsRecorder;
