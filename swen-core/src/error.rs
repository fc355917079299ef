use thiserror::Error;

/// Error conditions surfaced by the runtime substrate.
///
/// Resource exhaustion (`PoolExhausted`, `RingFull`) is a normal, expected
/// condition that callers handle by deferring work and retrying later.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("packet pool exhausted")]
    PoolExhausted,

    #[error("ring queue full")]
    RingFull,

    #[error("invalid capacity (must be a power of two)")]
    InvalidCapacity,

    #[error("packet window out of bounds")]
    WindowOutOfBounds,

    #[error("unknown packet slot")]
    BadSlot,
}
