use chrono::{DateTime, Utc};
use trend_core::{FeatureSet, State, StateTransition, StateValue, Timeframe, TransitionReason};

use crate::predicates::{self, AlignmentPredicate};

const DEBOUNCE_BARS: u32 = 2;
const TRANSITION_LOG_CAP: usize = 500;

#[derive(Debug, Clone, Copy)]
pub struct StateMachineConfig {
    pub alignment_predicate: AlignmentPredicate,
    pub debounce_bars: u32,
}

impl Default for StateMachineConfig {
    fn default() -> Self {
        StateMachineConfig {
            alignment_predicate: AlignmentPredicate::Strict,
            debounce_bars: DEBOUNCE_BARS,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingTransition {
    candidate: StateValue,
    reason: TransitionReason,
    consecutive_bars: u32,
}

/// Outcome of feeding one bar's features into the state machine: the
/// (possibly unchanged) current state, any committed transition, and an
/// independent reclaim signal (does not change state).
#[derive(Debug, Clone, Copy)]
pub struct StateUpdate {
    pub state: State,
    pub transition: Option<StateTransition>,
    pub reclaimed_ema333: bool,
}

/// Per-TimeframeStream trend lifecycle classifier. Holds the debounce
/// bookkeeping and the bounded transition log for one stream; the caller
/// owns one instance per (instrument, tf).
pub struct TrendStateMachine {
    config: StateMachineConfig,
    tf: Timeframe,
    state: State,
    pending: Option<PendingTransition>,
    prev_price: Option<f64>,
    prev_ema333: Option<f64>,
    log: Vec<StateTransition>,
}

impl TrendStateMachine {
    pub fn new(tf: Timeframe, config: StateMachineConfig, now: DateTime<Utc>) -> Self {
        TrendStateMachine {
            config,
            tf,
            state: State {
                value: StateValue::S0,
                entered_at: now,
                bars_in_state: 0,
            },
            pending: None,
            prev_price: None,
            prev_ema333: None,
            log: Vec::new(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn transitions(&self) -> &[StateTransition] {
        &self.log
    }

    /// Feed one bar's features. Invariant I1: only one State is active at
    /// any time and transitions are applied in non-decreasing timestamp
    /// order by construction (caller drives this per closed bar).
    pub fn on_features(&mut self, features: &FeatureSet) -> StateUpdate {
        let ema = &features.ema;
        let price = features.price;

        let reclaimed = self.state.value == StateValue::S3
            && self
                .prev_price
                .zip(self.prev_ema333)
                .map(|(pp, pe)| predicates::reclaimed_ema333(pp, pe, price, ema.ema333))
                .unwrap_or(false);

        // Global exit takes priority over every other transition.
        if matches!(self.state.value, StateValue::S2 | StateValue::S3) && predicates::is_global_exit(ema) {
            let transition = self.commit(StateValue::S0, TransitionReason::GlobalExit, features.ts);
            self.pending = None;
            self.prev_price = Some(price);
            self.prev_ema333 = Some(ema.ema333);
            return StateUpdate {
                state: self.state,
                transition: Some(transition),
                reclaimed_ema333: reclaimed,
            };
        }

        let candidate = match self.state.value {
            StateValue::S0 if predicates::is_s1(ema, price) => {
                Some((StateValue::S1, TransitionReason::S0ToS1Primer))
            }
            StateValue::S1 if predicates::is_s2(ema, price) => {
                Some((StateValue::S2, TransitionReason::S1ToS2Defensive))
            }
            StateValue::S2 if self.config.alignment_predicate.evaluate(ema, price) => {
                Some((StateValue::S3, TransitionReason::S2ToS3Trending))
            }
            _ => None,
        };

        let transition = self.advance_debounce(candidate, features.ts);

        self.prev_price = Some(price);
        self.prev_ema333 = Some(ema.ema333);
        self.state.bars_in_state += 1;

        StateUpdate {
            state: self.state,
            transition,
            reclaimed_ema333: reclaimed,
        }
    }

    fn advance_debounce(
        &mut self,
        candidate: Option<(StateValue, TransitionReason)>,
        ts: DateTime<Utc>,
    ) -> Option<StateTransition> {
        match (candidate, self.pending) {
            (Some((to, reason)), Some(pending)) if pending.candidate == to => {
                if pending.consecutive_bars + 1 >= self.config.debounce_bars {
                    self.pending = None;
                    Some(self.commit(to, reason, ts))
                } else {
                    self.pending = Some(PendingTransition {
                        candidate: to,
                        reason,
                        consecutive_bars: pending.consecutive_bars + 1,
                    });
                    None
                }
            }
            (Some((to, reason)), _) => {
                if self.config.debounce_bars <= 1 {
                    Some(self.commit(to, reason, ts))
                } else {
                    self.pending = Some(PendingTransition {
                        candidate: to,
                        reason,
                        consecutive_bars: 1,
                    });
                    None
                }
            }
            (None, _) => {
                // Predicate oscillated away before debounce completed;
                // the older state is retained (flapping is absorbed, not
                // surfaced as an error at this layer).
                self.pending = None;
                None
            }
        }
    }

    fn commit(&mut self, to: StateValue, reason: TransitionReason, ts: DateTime<Utc>) -> StateTransition {
        let from = self.state.value;
        self.state = State {
            value: to,
            entered_at: ts,
            bars_in_state: 0,
        };
        let transition = StateTransition {
            tf: self.tf,
            ts,
            from,
            to,
            reason,
        };
        self.log.push(transition);
        if self.log.len() > TRANSITION_LOG_CAP {
            self.log.remove(0);
        }
        transition
    }
}
