//! In-memory demo implementations of the external-collaborator traits.
//! Ingestion, regime context, venue execution and advisory annotation are
//! all out of scope for the engine itself (§1); these stand in for a
//! real adapter so the binary can be exercised end to end.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use trend_core::{
    AdvisorySink, BarEvent, CloseEvent, ContextProvider, ContextSnapshot, EngineResult,
    ExecutionOutcomeSource, FillEvent, InstrumentId, OrderIntent, OrderIntentSink, Override,
    ScopeKey,
};
use trend_core::{AppetiteMode, Family, LearningReader, McapBucket, Phase, Timeframe};

pub struct QueueBarIngestion {
    queue: Mutex<std::collections::VecDeque<BarEvent>>,
}

impl QueueBarIngestion {
    pub fn new(events: Vec<BarEvent>) -> Self {
        QueueBarIngestion {
            queue: Mutex::new(events.into()),
        }
    }
}

#[async_trait]
impl trend_core::BarIngestion for QueueBarIngestion {
    async fn next_bar(&self) -> EngineResult<Option<BarEvent>> {
        Ok(self.queue.lock().await.pop_front())
    }
}

pub struct StaticContextProvider;

#[async_trait]
impl ContextProvider for StaticContextProvider {
    async fn context(&self, _instrument: &InstrumentId) -> EngineResult<ContextSnapshot> {
        Ok(ContextSnapshot {
            macro_phase: Phase::Expansion,
            meso_phase: Phase::Expansion,
            micro_phase: Phase::Expansion,
            bucket: McapBucket::Mid,
            family: Family::Lowcaps,
            a_mode: AppetiteMode::Neutral,
            e_mode: AppetiteMode::Neutral,
            bucket_leader: false,
            bucket_rank: 10,
            timeframe: Timeframe::Hour1,
            refreshed_at: Utc::now(),
        })
    }
}

pub struct LoggingOrderIntentSink;

#[async_trait]
impl OrderIntentSink for LoggingOrderIntentSink {
    async fn submit(&self, intent: OrderIntent) -> EngineResult<()> {
        tracing::info!(?intent, "order intent emitted");
        Ok(())
    }
}

#[derive(Default)]
pub struct NullExecutionOutcomeSource;

#[async_trait]
impl ExecutionOutcomeSource for NullExecutionOutcomeSource {
    async fn next_fill(&self) -> EngineResult<Option<FillEvent>> {
        Ok(None)
    }

    async fn next_close(&self) -> EngineResult<Option<CloseEvent>> {
        Ok(None)
    }
}

pub struct NeutralLearningReader;

#[async_trait]
impl LearningReader for NeutralLearningReader {
    async fn get_override(&self, scope_key: &ScopeKey) -> EngineResult<Override> {
        Ok(Override::neutral(scope_key.clone(), Utc::now()))
    }
}

pub struct LoggingAdvisorySink;

#[async_trait]
impl AdvisorySink for LoggingAdvisorySink {
    async fn annotate(&self, scope_key: &ScopeKey, note: String) -> EngineResult<()> {
        tracing::debug!(?scope_key, %note, "advisory annotation (not fed into multipliers)");
        Ok(())
    }
}
