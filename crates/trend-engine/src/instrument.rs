//! Per-instrument actor: owns the four `TimeframeStream`s and the position
//! ledger for one instrument, processed single-threaded and cooperatively
//! so invariant I1 (one State per stream) and I2 (one Position per
//! (instrument, tf)) hold by construction rather than by locking.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use appetite_calculator::{AppetiteCalculator, AppetiteInputs};
use chrono::Utc;
use feature_builder::{BarRingBuffer, FeatureBuilder};
use lesson_builder::LessonBuilder;
use outcome_classifier::OutcomeClassifier;
use pattern_aggregator::PatternAggregator;
use position_ledger::{PositionLedger, TrimFractions};
use signature_engine::SignatureEngine;
use state_machine::TrendStateMachine;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use trend_core::{
    AdvisorySink, BarEvent, CloseEvent, ContextProvider, ContextSnapshot, EngineResult,
    FillEvent, InstrumentId, LearningReader, OrderIntent, OrderIntentSink, Override, ScopeKey,
    StateValue, Timeframe,
};

use crate::config::EngineConfig;

struct TimeframeStream {
    ring: BarRingBuffer,
    machine: TrendStateMachine,
}

/// Collaborators the actor mesh shares across every instrument; cheap to
/// clone (all `Arc`s), owned once by `main` and handed to each actor.
pub struct SharedComponents {
    pub feature_builder: FeatureBuilder,
    pub signature_engine: SignatureEngine,
    pub appetite_calculator: AppetiteCalculator,
    pub outcome_classifier: OutcomeClassifier,
    pub pattern_aggregator: Arc<PatternAggregator>,
    pub lesson_builder: Arc<LessonBuilder>,
    pub context_provider: Arc<dyn ContextProvider>,
    pub order_sink: Arc<dyn OrderIntentSink>,
    pub learning_reader: Arc<dyn LearningReader>,
    pub advisory_sink: Arc<dyn AdvisorySink>,
    pub store: Arc<crate::store::PersistenceStore>,
}

pub struct InstrumentActor {
    instrument: InstrumentId,
    streams: HashMap<Timeframe, TimeframeStream>,
    ledger: PositionLedger,
    trim_fractions: TrimFractions,
    config: Arc<EngineConfig>,
    shared: Arc<SharedComponents>,
    override_tx: watch::Sender<HashMap<ScopeKey, Override>>,
}

impl InstrumentActor {
    pub fn new(
        instrument: InstrumentId,
        config: Arc<EngineConfig>,
        shared: Arc<SharedComponents>,
        override_tx: watch::Sender<HashMap<ScopeKey, Override>>,
    ) -> Self {
        let now = Utc::now();
        let mut streams = HashMap::new();
        for tf in Timeframe::ALL {
            streams.insert(
                tf,
                TimeframeStream {
                    ring: BarRingBuffer::new(
                        config.ring_buffer_capacity,
                        chrono::Duration::hours(config.max_gap_hours),
                    ),
                    machine: TrendStateMachine::new(
                        tf,
                        state_machine::StateMachineConfig {
                            alignment_predicate: config.alignment_predicate(),
                            debounce_bars: 2,
                        },
                        now,
                    ),
                },
            );
        }

        InstrumentActor {
            instrument,
            streams,
            ledger: PositionLedger::new(),
            trim_fractions: TrimFractions::default(),
            config,
            shared,
            override_tx,
        }
    }

    /// Drains the instrument's bar queue and outcome-feedback queues until
    /// both channels close. One instrument, one task, one cooperative loop
    /// across its four streams -- never parallel within an instrument.
    pub async fn run(
        mut self,
        mut bars: mpsc::Receiver<BarEvent>,
        mut fills: mpsc::Receiver<FillEvent>,
        mut closes: mpsc::Receiver<CloseEvent>,
    ) {
        loop {
            tokio::select! {
                bar = bars.recv() => {
                    match bar {
                        Some(event) => self.handle_bar(event).await,
                        None => break,
                    }
                }
                fill = fills.recv() => {
                    if let Some(event) = fill {
                        self.handle_fill(event);
                    }
                }
                close = closes.recv() => {
                    match close {
                        Some(event) => self.handle_close(event).await,
                        None => continue,
                    }
                }
            }
        }
        info!(instrument = %self.instrument, "instrument actor shut down");
    }

    async fn handle_bar(&mut self, event: BarEvent) {
        let budget = StdDuration::from_millis(self.config.per_bar_budget_ms);
        match tokio::time::timeout(budget, self.process_bar(event.clone())).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => debug!(instrument = %self.instrument, tf = %event.tf, %err, "bar skipped"),
            Err(_) => warn!(instrument = %self.instrument, tf = %event.tf, "per-bar compute budget exceeded"),
        }
    }

    async fn process_bar(&mut self, event: BarEvent) -> EngineResult<()> {
        let tf = event.tf;
        let stream = self
            .streams
            .get_mut(&tf)
            .expect("every Timeframe variant is pre-populated");

        stream.ring.push(event.bar)?;

        let features = self
            .shared
            .feature_builder
            .build(tf, &stream.ring, event.bar.ts, None)?;

        let update = stream.machine.on_features(&features);

        let context = self.shared.context_provider.context(&self.instrument).await?;

        if update.transition.map(|t| t.reason) == Some(trend_core::TransitionReason::GlobalExit) {
            if let Some(closed) = self
                .ledger
                .liquidate(&self.instrument, tf, event.bar.ts, features.price)?
            {
                self.shared
                    .order_sink
                    .submit(OrderIntent {
                        instrument: self.instrument.clone(),
                        tf,
                        side: trend_core::OrderSide::Exit,
                        size: closed.qty_open(),
                        reason: "global_exit".to_string(),
                        state: StateValue::S0,
                        signature: trend_core::Signature::neutral(),
                    })
                    .await?;
            }
            return Ok(());
        }

        let bars = stream.ring.as_contiguous();
        let signature = self
            .shared
            .signature_engine
            .compute(update.state.value, &bars, &features);

        let motif = if update.reclaimed_ema333 {
            "dx_reclaim"
        } else {
            "ts_momentum"
        };
        let scope_key = self.scope_key(update.state.value, motif, &context);
        let override_snapshot = self.shared.learning_reader.get_override(&scope_key).await?;

        let is_open = self.ledger.is_open(&self.instrument, tf);
        let position_age_bars = self
            .ledger
            .get(&self.instrument, tf)
            .map(|p| p.entries.len() as u32)
            .unwrap_or(0);

        let appetite = self.shared.appetite_calculator.evaluate(&AppetiteInputs {
            signature,
            context: &context,
            override_snapshot: &override_snapshot,
            position_age_bars,
            bucket_leader: context.bucket_leader,
            bucket_rank: context.bucket_rank,
        });

        let tau_dx = self.shared.signature_engine.tau_dx();
        let tau_trim = self.shared.signature_engine.tau_trim();

        if update.state.value == StateValue::S3 && signature.dx >= tau_dx {
            if !is_open {
                self.ledger.open(&self.instrument, tf, event.bar.ts, features.price, appetite.a)?;
            } else {
                self.ledger.add_entry(&self.instrument, tf, event.bar.ts, features.price, appetite.a)?;
            }
            self.shared
                .order_sink
                .submit(OrderIntent {
                    instrument: self.instrument.clone(),
                    tf,
                    side: trend_core::OrderSide::Add,
                    size: appetite.a,
                    reason: motif.to_string(),
                    state: update.state.value,
                    signature,
                })
                .await?;
        } else if is_open && signature.ox >= tau_trim {
            let fraction = match update.state.value {
                StateValue::S1 => self.trim_fractions.s1,
                StateValue::S2 => self.trim_fractions.s2,
                StateValue::S3 => self.trim_fractions.s3,
                StateValue::S0 => self.trim_fractions.s1,
            };
            self.ledger.trim(&self.instrument, tf, event.bar.ts, features.price, fraction)?;
            self.shared
                .order_sink
                .submit(OrderIntent {
                    instrument: self.instrument.clone(),
                    tf,
                    side: trend_core::OrderSide::Trim,
                    size: fraction * appetite.e,
                    reason: "overextension_trim".to_string(),
                    state: update.state.value,
                    signature,
                })
                .await?;
        }

        self.override_tx.send_modify(|overrides| {
            overrides.insert(scope_key, override_snapshot);
        });

        Ok(())
    }

    fn handle_fill(&mut self, event: FillEvent) {
        debug!(instrument = %self.instrument, position = event.position_id, "fill applied");
    }

    async fn handle_close(&mut self, event: CloseEvent) {
        let Some(tf) = Timeframe::ALL
            .into_iter()
            .find(|tf| self.ledger.get(&self.instrument, *tf).map(|p| p.id) == Some(event.position_id))
        else {
            return;
        };

        let Some(position) = self.ledger.get(&self.instrument, tf).cloned() else {
            return;
        };
        if position.status != trend_core::PositionStatus::Closed {
            if let Err(err) = self.ledger.close(
                &self.instrument,
                tf,
                Utc::now(),
                event.close_price,
                event.reason,
            ) {
                warn!(instrument = %self.instrument, %err, "failed to close position on outcome event");
                return;
            }
        }

        let Some(stream) = self.streams.get(&tf) else {
            return;
        };
        let bar_tape = stream.ring.as_contiguous();
        let context = match self.shared.context_provider.context(&self.instrument).await {
            Ok(c) => c,
            Err(err) => {
                warn!(instrument = %self.instrument, %err, "context unavailable for close event");
                return;
            }
        };
        let scope_key = self.scope_key(stream.machine.state().value, "dx_reclaim", &context);

        let Some(position) = self.ledger.get(&self.instrument, tf) else {
            return;
        };
        let Some(summary) = self
            .shared
            .outcome_classifier
            .classify(position, &bar_tape, scope_key.clone(), context)
        else {
            return;
        };

        if let Err(err) = self.shared.store.save_trade_summary(&summary).await {
            warn!(instrument = %self.instrument, %err, "failed to persist trade summary");
        }

        match self.shared.pattern_aggregator.ingest(&summary) {
            Ok(stats) => {
                if let Err(err) = self.shared.store.save_pattern_stats(&stats).await {
                    warn!(instrument = %self.instrument, %err, "failed to persist pattern stats");
                }

                if let Some(braid) = self.shared.pattern_aggregator.try_promote_braid(&scope_key) {
                    if self.shared.pattern_aggregator.incremental_edge(&stats, &braid.merged_stats) > 0.0 {
                        if let Err(err) = self.shared.store.save_pattern_stats(&braid.merged_stats).await {
                            warn!(instrument = %self.instrument, %err, "failed to persist braid stats");
                        }
                        self.shared
                            .advisory_sink
                            .annotate(
                                &braid.parent,
                                format!("braid promoted: {} children", braid.child_count),
                            )
                            .await
                            .ok();
                    }
                }

                if self.shared.pattern_aggregator.is_actionable(&stats) {
                    let prior = match self.shared.store.load_lesson(&scope_key).await {
                        Ok(prior) => prior,
                        Err(err) => {
                            warn!(instrument = %self.instrument, %err, "failed to load prior lesson");
                            None
                        }
                    };

                    if let Some(lesson) =
                        self.shared.lesson_builder.build(&stats, prior.as_ref(), Utc::now())
                    {
                        if let Err(err) = self.shared.store.save_lesson(&lesson).await {
                            warn!(instrument = %self.instrument, %err, "failed to persist lesson");
                        }
                        let half_life = self.shared.lesson_builder.half_life_hours();
                        let materialized = lesson_builder::materialize(&lesson, Utc::now(), half_life);
                        self.override_tx.send_modify(|overrides| {
                            overrides.insert(scope_key.clone(), materialized);
                        });
                        self.shared
                            .advisory_sink
                            .annotate(&scope_key, format!("lesson updated: strength={}", lesson.strength))
                            .await
                            .ok();
                    }
                }
            }
            Err(err) => warn!(instrument = %self.instrument, %err, "pattern ingest failed"),
        }
    }

    fn scope_key(&self, state: StateValue, motif: &str, context: &ContextSnapshot) -> ScopeKey {
        ScopeKey {
            module: "trend_engine".to_string(),
            family: context.family,
            state,
            motif: motif.to_string(),
            macro_phase: context.macro_phase,
            meso_phase: context.meso_phase,
            micro_phase: context.micro_phase,
            bucket_leader: context.bucket_leader,
            bucket_rank: context.bucket_rank,
            market_family: context.family,
            bucket: context.bucket,
            timeframe: context.timeframe,
            a_mode: context.a_mode,
            e_mode: context.e_mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use trend_core::{ExitReason, PositionStatus};

    fn bar_event(instrument: &str, tf: Timeframe, ts: chrono::DateTime<Utc>, price: f64) -> BarEvent {
        BarEvent {
            instrument: instrument.to_string(),
            tf,
            bar: trend_core::Bar {
                ts,
                open: price,
                high: price + 0.1,
                low: price - 0.1,
                close: price,
                volume: 1000.0,
            },
        }
    }

    fn test_config() -> Arc<EngineConfig> {
        Arc::new(EngineConfig {
            ring_buffer_capacity: 400,
            max_gap_hours: 6,
            per_bar_budget_ms: 250,
            alignment_predicate_ascending: false,
            halo_atr_mult: 0.5,
            lesson_half_life_hours: 72.0,
            edge_min: 0.5,
            n_min: 10,
            log_format_json: false,
            database_url: "sqlite::memory:".to_string(),
        })
    }

    async fn test_shared() -> Arc<SharedComponents> {
        let store = crate::store::PersistenceStore::connect("sqlite::memory:")
            .await
            .unwrap();
        Arc::new(SharedComponents {
            feature_builder: FeatureBuilder::new(feature_builder::FeatureBuilderConfig::default()),
            signature_engine: SignatureEngine::new(signature_engine::SignatureEngineConfig::with_defaults()),
            appetite_calculator: AppetiteCalculator::new(
                appetite_calculator::AppetiteCalculatorConfig::default(),
            ),
            outcome_classifier: OutcomeClassifier::new(outcome_classifier::OutcomeClassifierConfig::default()),
            pattern_aggregator: Arc::new(PatternAggregator::new(
                pattern_aggregator::PatternAggregatorConfig::default(),
            )),
            lesson_builder: Arc::new(LessonBuilder::new(lesson_builder::LessonBuilderConfig::default())),
            context_provider: Arc::new(crate::demo::StaticContextProvider),
            order_sink: Arc::new(crate::demo::LoggingOrderIntentSink),
            learning_reader: Arc::new(crate::demo::NeutralLearningReader),
            advisory_sink: Arc::new(crate::demo::LoggingAdvisorySink),
            store: Arc::new(store),
        })
    }

    async fn test_actor(instrument: &str) -> InstrumentActor {
        let (override_tx, _rx) = watch::channel(HashMap::new());
        InstrumentActor::new(instrument.to_string(), test_config(), test_shared().await, override_tx)
    }

    #[tokio::test]
    async fn warmup_boundary_ring_fills_without_signal_on_flat_price() {
        let mut actor = test_actor("BTC").await;
        let t0 = Utc::now();
        for i in 0..349 {
            actor
                .handle_bar(bar_event("BTC", Timeframe::Hour1, t0 + Duration::hours(i), 100.0))
                .await;
        }
        assert_eq!(actor.streams.get(&Timeframe::Hour1).unwrap().ring.len(), 349);
        assert!(!actor.ledger.is_open(&"BTC".to_string(), Timeframe::Hour1));

        actor
            .handle_bar(bar_event("BTC", Timeframe::Hour1, t0 + Duration::hours(349), 100.0))
            .await;
        assert_eq!(actor.streams.get(&Timeframe::Hour1).unwrap().ring.len(), 350);
        assert!(!actor.ledger.is_open(&"BTC".to_string(), Timeframe::Hour1));
        assert_eq!(
            actor.streams.get(&Timeframe::Hour1).unwrap().machine.state().value,
            StateValue::S0
        );
    }

    #[tokio::test]
    async fn multi_timeframe_streams_are_independent() {
        let mut actor = test_actor("ETH").await;
        let t0 = Utc::now();
        for i in 0..5 {
            actor
                .handle_bar(bar_event("ETH", Timeframe::Min1, t0 + Duration::minutes(i), 100.0))
                .await;
        }
        assert_eq!(actor.streams.get(&Timeframe::Min1).unwrap().ring.len(), 5);
        for tf in [Timeframe::Min15, Timeframe::Hour1, Timeframe::Hour4] {
            assert_eq!(actor.streams.get(&tf).unwrap().ring.len(), 0);
        }
    }

    #[tokio::test]
    async fn close_event_closes_position_and_feeds_pattern_aggregator() {
        let mut actor = test_actor("SOL").await;
        let instrument = "SOL".to_string();
        let t0 = Utc::now();

        for i in 0..360 {
            actor
                .handle_bar(bar_event(
                    "SOL",
                    Timeframe::Hour1,
                    t0 + Duration::hours(i),
                    100.0 + i as f64 * 0.01,
                ))
                .await;
        }

        let position_id = actor
            .ledger
            .open(&instrument, Timeframe::Hour1, t0, 100.0, 1.0)
            .unwrap();

        actor
            .handle_close(CloseEvent {
                position_id,
                close_price: 110.0,
                reason: ExitReason::SignalExit,
            })
            .await;

        let position = actor.ledger.get(&instrument, Timeframe::Hour1).unwrap();
        assert_eq!(position.status, PositionStatus::Closed);
        assert_eq!(position.exit.unwrap().reason, ExitReason::SignalExit);
    }

    #[tokio::test]
    async fn close_event_is_noop_if_position_already_closed() {
        let mut actor = test_actor("AVAX").await;
        let instrument = "AVAX".to_string();
        let t0 = Utc::now();

        for i in 0..360 {
            actor
                .handle_bar(bar_event("AVAX", Timeframe::Hour1, t0 + Duration::hours(i), 100.0))
                .await;
        }

        let position_id = actor
            .ledger
            .open(&instrument, Timeframe::Hour1, t0, 100.0, 1.0)
            .unwrap();
        actor
            .ledger
            .close(
                &instrument,
                Timeframe::Hour1,
                t0 + Duration::hours(1),
                105.0,
                ExitReason::SignalExit,
            )
            .unwrap();

        actor
            .handle_close(CloseEvent {
                position_id,
                close_price: 999.0,
                reason: ExitReason::Operator,
            })
            .await;

        let position = actor.ledger.get(&instrument, Timeframe::Hour1).unwrap();
        assert_eq!(position.exit.unwrap().reason, ExitReason::SignalExit);
        assert_eq!(position.exit.unwrap().price, 105.0);
    }
}
