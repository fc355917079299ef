use thiserror::Error;

use swen_core::error::CoreError;
use swen_link::LinkError;

/// Application-facing association errors.
///
/// Pool exhaustion is recoverable: the caller parks on write readiness and
/// retries when the event layer re-arms it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum L3Error {
    #[error("no association bound for peer")]
    NotBound,
    #[error("peer already bound")]
    AlreadyBound,
    #[error("association not connected")]
    NotConnected,
    #[error("operation invalid in current association state")]
    BadState,
    #[error("packet pool exhausted")]
    PoolExhausted,
    #[error("payload too large for a single packet")]
    PayloadTooLarge,
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Core(#[from] CoreError),
}
