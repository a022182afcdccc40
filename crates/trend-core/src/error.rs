use thiserror::Error;

/// Flat error taxonomy shared across the engine's crate boundaries.
/// Every variant is local in scope: a bar error degrades that bar only,
/// an instrument error that instrument only, a key error that key only.
/// Nothing here is process-fatal.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("bar out of order: {0}")]
    OutOfOrder(String),

    #[error("duplicate bar: {0}")]
    Duplicate(String),

    #[error("gap too large: {0}")]
    GapTooLarge(String),

    #[error("state undefined (warmup): {0}")]
    Undefined(String),

    #[error("flapping predicate, prior state retained: {0}")]
    Flapping(String),

    #[error("per-key lock contention: {0}")]
    PerKeyLockContention(String),

    #[error("aggregator degraded for key: {0}")]
    AggregatorDegraded(String),

    #[error("learning bounds violation (defect): {0}")]
    BoundsViolation(String),

    #[error("position already open for (instrument, tf): {0}")]
    PositionAlreadyOpen(String),

    #[error("no open position for (instrument, tf): {0}")]
    NoOpenPosition(String),

    #[error("per-bar compute budget exceeded: {0}")]
    BudgetExceeded(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
