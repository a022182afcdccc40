use async_trait::async_trait;

use crate::error::EngineResult;
use crate::types::{
    BarEvent, CloseEvent, ContextSnapshot, FillEvent, InstrumentId, Override, ScopeKey,
};

/// External collaborator: supplies closed bars. Out of scope per this
/// engine's purpose; the engine only depends on this contract.
#[async_trait]
pub trait BarIngestion: Send + Sync {
    async fn next_bar(&self) -> EngineResult<Option<BarEvent>>;
}

/// External collaborator: supplies regime/context tags, refreshed at
/// least hourly. Implementations must fall back to `Unknown` fields when
/// stale rather than block.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn context(&self, instrument: &InstrumentId) -> EngineResult<ContextSnapshot>;
}

/// External collaborator: receives order intents. The executor owns
/// venue semantics; the engine never blocks on it.
#[async_trait]
pub trait OrderIntentSink: Send + Sync {
    async fn submit(&self, intent: crate::types::OrderIntent) -> EngineResult<()>;
}

/// External collaborator: reports fills and closes back into the ledger.
#[async_trait]
pub trait ExecutionOutcomeSource: Send + Sync {
    async fn next_fill(&self) -> EngineResult<Option<FillEvent>>;
    async fn next_close(&self) -> EngineResult<Option<CloseEvent>>;
}

/// Read-side of the learning loop: returns a time-decayed Override
/// snapshot for a scope key. Reads are lock-free once published.
#[async_trait]
pub trait LearningReader: Send + Sync {
    async fn get_override(&self, scope_key: &ScopeKey) -> EngineResult<Override>;
}

/// Strictly advisory input. Hypotheses or semantic tags may annotate
/// strands but can never change a multiplier or threshold directly; they
/// must pass through the Pattern Aggregator's statistical validator.
#[async_trait]
pub trait AdvisorySink: Send + Sync {
    async fn annotate(&self, scope_key: &ScopeKey, note: String) -> EngineResult<()>;
}
