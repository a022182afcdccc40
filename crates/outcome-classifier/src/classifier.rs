use trend_core::{Bar, ContextSnapshot, Counterfactuals, Position, ScopeKey, TradeSummary};

#[derive(Debug, Clone, Copy)]
pub struct OutcomeClassifierConfig {
    pub epsilon: f64,
    pub counterfactual_window_bars: usize,
}

impl Default for OutcomeClassifierConfig {
    fn default() -> Self {
        OutcomeClassifierConfig {
            epsilon: 0.01,
            counterfactual_window_bars: 20,
        }
    }
}

/// Computes a TradeSummary from a closed Position and the bar tape
/// spanning its lifetime. A deterministic, pure function of its inputs
/// (per the counterfactual-purity design note): no side effects, no
/// learning feedback performed here.
pub struct OutcomeClassifier {
    config: OutcomeClassifierConfig,
}

impl OutcomeClassifier {
    pub fn new(config: OutcomeClassifierConfig) -> Self {
        OutcomeClassifier { config }
    }

    pub fn classify(
        &self,
        position: &Position,
        bar_tape: &[Bar],
        scope_key: ScopeKey,
        context: ContextSnapshot,
    ) -> Option<TradeSummary> {
        let exit = position.exit?;
        let entry_price = position.avg_entry_price();
        if entry_price <= 0.0 {
            return None;
        }

        let lifetime_bars: Vec<Bar> = bar_tape
            .iter()
            .copied()
            .filter(|b| b.ts >= position.opened_at && b.ts <= exit.ts)
            .collect();

        let min_price = lifetime_bars
            .iter()
            .map(|b| b.low)
            .fold(entry_price, f64::min);

        let max_dd = ((entry_price - min_price) / entry_price).clamp(0.0, 1.0);
        let return_pct = (exit.price - entry_price) / entry_price;
        let rr = (return_pct / max_dd.max(self.config.epsilon)).clamp(-10.0, 10.0);

        let time_to_payback_days = self.time_to_payback_days(&lifetime_bars, entry_price, max_dd);

        let counterfactuals = self.counterfactuals(bar_tape, position, entry_price, exit.price, max_dd);

        Some(TradeSummary {
            position_id: position.id,
            rr,
            max_dd,
            time_to_payback_days,
            counterfactuals,
            scope_key,
            context,
            closed_at: exit.ts,
        })
    }

    /// Days from the first entry to the first bar whose high touches
    /// entry_price * (1 + max_dd), i.e. the +1R level implied by max_dd as
    /// the risk unit. `None` if never reached within the trade's lifetime.
    fn time_to_payback_days(&self, lifetime_bars: &[Bar], entry_price: f64, max_dd: f64) -> Option<f64> {
        if lifetime_bars.is_empty() {
            return None;
        }
        let target = entry_price * (1.0 + max_dd.max(self.config.epsilon));
        let start_ts = lifetime_bars[0].ts;
        lifetime_bars
            .iter()
            .find(|b| b.high >= target)
            .map(|b| (b.ts - start_ts).num_seconds() as f64 / 86_400.0)
    }

    /// Best executable entry/exit within a fixed look-around window,
    /// compared against what was actually achieved.
    fn counterfactuals(
        &self,
        bar_tape: &[Bar],
        position: &Position,
        entry_price: f64,
        exit_price: f64,
        max_dd: f64,
    ) -> Counterfactuals {
        let window = self.config.counterfactual_window_bars;

        let entry_window: Vec<Bar> = bar_tape
            .iter()
            .copied()
            .filter(|b| b.ts <= position.opened_at)
            .rev()
            .take(window)
            .collect();
        let best_entry = entry_window
            .iter()
            .map(|b| b.low)
            .fold(entry_price, f64::min);

        let actual_rr = ((exit_price - entry_price) / entry_price / max_dd.max(self.config.epsilon))
            .clamp(-10.0, 10.0);
        let best_entry_rr = ((exit_price - best_entry) / best_entry / max_dd.max(self.config.epsilon))
            .clamp(-10.0, 10.0);
        let missed_entry_rr = (best_entry_rr - actual_rr).max(0.0);

        let exit_ts = position.exit.map(|e| e.ts);
        let exit_window: Vec<Bar> = bar_tape
            .iter()
            .copied()
            .filter(|b| exit_ts.map(|ts| b.ts >= ts).unwrap_or(false))
            .take(window)
            .collect();
        let best_exit = exit_window
            .iter()
            .map(|b| b.high)
            .fold(exit_price, f64::max);
        let best_exit_rr = ((best_exit - entry_price) / entry_price / max_dd.max(self.config.epsilon))
            .clamp(-10.0, 10.0);
        let missed_exit_rr = (best_exit_rr - actual_rr).max(0.0);

        Counterfactuals {
            missed_entry_rr,
            missed_exit_rr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use trend_core::{
        AppetiteMode, Entry, Exit, ExitReason, Family, McapBucket, Phase, PositionStatus,
        StateValue, Timeframe,
    };

    fn bar(ts: chrono::DateTime<Utc>, low: f64, high: f64) -> Bar {
        Bar {
            ts,
            open: (low + high) / 2.0,
            high,
            low,
            close: (low + high) / 2.0,
            volume: 100.0,
        }
    }

    fn sample_scope_key() -> ScopeKey {
        ScopeKey {
            module: "signature".into(),
            family: Family::Lowcaps,
            state: StateValue::S3,
            motif: "dx_reclaim".into(),
            macro_phase: Phase::Expansion,
            meso_phase: Phase::Expansion,
            micro_phase: Phase::Expansion,
            bucket_leader: true,
            bucket_rank: 1,
            market_family: Family::Lowcaps,
            bucket: McapBucket::Mid,
            timeframe: Timeframe::Hour1,
            a_mode: AppetiteMode::Aggressive,
            e_mode: AppetiteMode::Neutral,
        }
    }

    fn sample_context() -> ContextSnapshot {
        ContextSnapshot {
            macro_phase: Phase::Expansion,
            meso_phase: Phase::Expansion,
            micro_phase: Phase::Expansion,
            bucket: McapBucket::Mid,
            family: Family::Lowcaps,
            a_mode: AppetiteMode::Aggressive,
            e_mode: AppetiteMode::Neutral,
            bucket_leader: true,
            bucket_rank: 1,
            timeframe: Timeframe::Hour1,
            refreshed_at: Utc::now(),
        }
    }

    #[test]
    fn rr_is_clipped_to_documented_bounds() {
        let t0 = Utc::now();
        let position = Position {
            id: 1,
            instrument: "BTC".into(),
            tf: Timeframe::Hour1,
            opened_at: t0,
            entries: vec![Entry {
                ts: t0,
                price: 100.0,
                qty: 1.0,
            }],
            trims: vec![],
            exit: Some(Exit {
                ts: t0 + Duration::hours(5),
                price: 1000.0,
                reason: ExitReason::SignalExit,
            }),
            status: PositionStatus::Closed,
            realized_rr: 0.0,
            max_dd: 0.0,
        };
        let bars = vec![bar(t0, 99.0, 101.0), bar(t0 + Duration::hours(5), 99.0, 1000.0)];

        let classifier = OutcomeClassifier::new(OutcomeClassifierConfig::default());
        let summary = classifier
            .classify(&position, &bars, sample_scope_key(), sample_context())
            .unwrap();
        assert!((-10.0..=10.0).contains(&summary.rr));
        assert_eq!(summary.rr, 10.0);
    }

    #[test]
    fn time_to_payback_is_none_when_never_reached() {
        let t0 = Utc::now();
        let position = Position {
            id: 1,
            instrument: "BTC".into(),
            tf: Timeframe::Hour1,
            opened_at: t0,
            entries: vec![Entry {
                ts: t0,
                price: 100.0,
                qty: 1.0,
            }],
            trims: vec![],
            exit: Some(Exit {
                ts: t0 + Duration::hours(5),
                price: 90.0,
                reason: ExitReason::SignalExit,
            }),
            status: PositionStatus::Closed,
            realized_rr: 0.0,
            max_dd: 0.0,
        };
        let bars = vec![bar(t0, 90.0, 100.0), bar(t0 + Duration::hours(5), 89.0, 91.0)];

        let classifier = OutcomeClassifier::new(OutcomeClassifierConfig::default());
        let summary = classifier
            .classify(&position, &bars, sample_scope_key(), sample_context())
            .unwrap();
        assert_eq!(summary.time_to_payback_days, None);
    }
}
