use std::collections::HashMap;

use chrono::{DateTime, Utc};
use trend_core::{
    Entry, EngineError, EngineResult, Exit, ExitReason, InstrumentId, Position, PositionId,
    PositionStatus, Timeframe, Trim,
};

/// Per-state default trim fractions, applied when the Signature Engine's
/// OX gate fires. S3's larger fraction reflects the higher overextension
/// ceiling reachable only once full bullish alignment holds.
#[derive(Debug, Clone, Copy)]
pub struct TrimFractions {
    pub s1: f64,
    pub s2: f64,
    pub s3: f64,
}

impl Default for TrimFractions {
    fn default() -> Self {
        TrimFractions {
            s1: 0.15,
            s2: 0.25,
            s3: 0.35,
        }
    }
}

/// Owns every (instrument, tf) Position. A position exists per pair
/// exclusively (I2): opening a second while one is open is refused.
/// Cross-timeframe influence happens only via the Learning Core, never by
/// merging positions here.
#[derive(Default)]
pub struct PositionLedger {
    positions: HashMap<(InstrumentId, Timeframe), Position>,
    next_id: PositionId,
}

impl PositionLedger {
    pub fn new() -> Self {
        PositionLedger {
            positions: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn get(&self, instrument: &InstrumentId, tf: Timeframe) -> Option<&Position> {
        self.positions.get(&(instrument.clone(), tf))
    }

    pub fn is_open(&self, instrument: &InstrumentId, tf: Timeframe) -> bool {
        self.get(instrument, tf)
            .map(|p| p.status == PositionStatus::Open)
            .unwrap_or(false)
    }

    pub fn open(
        &mut self,
        instrument: &InstrumentId,
        tf: Timeframe,
        ts: DateTime<Utc>,
        price: f64,
        qty: f64,
    ) -> EngineResult<PositionId> {
        if self.is_open(instrument, tf) {
            return Err(EngineError::PositionAlreadyOpen(format!(
                "{instrument}/{tf}"
            )));
        }

        let id = self.next_id;
        self.next_id += 1;

        let position = Position {
            id,
            instrument: instrument.clone(),
            tf,
            opened_at: ts,
            entries: vec![Entry { ts, price, qty }],
            trims: vec![],
            exit: None,
            status: PositionStatus::Open,
            realized_rr: 0.0,
            max_dd: 0.0,
        };
        self.positions.insert((instrument.clone(), tf), position);
        Ok(id)
    }

    /// Adds to an open position (an "add" intent at a DX buy signal).
    /// At most one entry per (state transition, tf) is a policy enforced
    /// by the caller (the engine tracks the last transition it entered
    /// against); the ledger itself only enforces I2.
    pub fn add_entry(
        &mut self,
        instrument: &InstrumentId,
        tf: Timeframe,
        ts: DateTime<Utc>,
        price: f64,
        qty: f64,
    ) -> EngineResult<()> {
        let position = self
            .positions
            .get_mut(&(instrument.clone(), tf))
            .ok_or_else(|| EngineError::NoOpenPosition(format!("{instrument}/{tf}")))?;
        if position.status != PositionStatus::Open {
            return Err(EngineError::NoOpenPosition(format!("{instrument}/{tf}")));
        }
        position.entries.push(Entry { ts, price, qty });
        Ok(())
    }

    pub fn trim(
        &mut self,
        instrument: &InstrumentId,
        tf: Timeframe,
        ts: DateTime<Utc>,
        price: f64,
        fraction: f64,
    ) -> EngineResult<()> {
        let position = self
            .positions
            .get_mut(&(instrument.clone(), tf))
            .ok_or_else(|| EngineError::NoOpenPosition(format!("{instrument}/{tf}")))?;
        if position.status != PositionStatus::Open {
            return Err(EngineError::NoOpenPosition(format!("{instrument}/{tf}")));
        }
        position.trims.push(Trim {
            ts,
            price,
            fraction: fraction.clamp(0.0, 1.0),
        });
        Ok(())
    }

    pub fn close(
        &mut self,
        instrument: &InstrumentId,
        tf: Timeframe,
        ts: DateTime<Utc>,
        price: f64,
        reason: ExitReason,
    ) -> EngineResult<Position> {
        let position = self
            .positions
            .get_mut(&(instrument.clone(), tf))
            .ok_or_else(|| EngineError::NoOpenPosition(format!("{instrument}/{tf}")))?;
        if position.status != PositionStatus::Open {
            return Err(EngineError::NoOpenPosition(format!("{instrument}/{tf}")));
        }

        let avg_entry = position.avg_entry_price();
        position.exit = Some(Exit { ts, price, reason });
        position.status = PositionStatus::Closed;
        if avg_entry > 0.0 {
            position.realized_rr = ((price - avg_entry) / avg_entry).clamp(-10.0, 10.0);
        }

        Ok(position.clone())
    }

    /// Global-exit liquidation: closes every open position for this
    /// instrument immediately, across all four timeframes. A global exit
    /// on one tf's state does not, by itself, force exits on other tfs'
    /// ledgers -- only the state machine stream that actually fired the
    /// global-exit transition is liquidated.
    pub fn liquidate(
        &mut self,
        instrument: &InstrumentId,
        tf: Timeframe,
        ts: DateTime<Utc>,
        price: f64,
    ) -> EngineResult<Option<Position>> {
        if !self.is_open(instrument, tf) {
            return Ok(None);
        }
        self.close(instrument, tf, ts, price, ExitReason::GlobalExit)
            .map(Some)
    }

    pub fn open_positions_for(&self, instrument: &InstrumentId) -> Vec<&Position> {
        Timeframe::ALL
            .iter()
            .filter_map(|tf| self.get(instrument, *tf))
            .filter(|p| p.status == PositionStatus::Open)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn opening_twice_on_same_tf_is_refused() {
        let mut ledger = PositionLedger::new();
        let id = "BTC".to_string();
        ledger.open(&id, Timeframe::Hour1, Utc::now(), 100.0, 1.0).unwrap();
        let err = ledger
            .open(&id, Timeframe::Hour1, Utc::now(), 100.0, 1.0)
            .unwrap_err();
        assert!(matches!(err, EngineError::PositionAlreadyOpen(_)));
    }

    #[test]
    fn independent_tfs_do_not_interfere() {
        let mut ledger = PositionLedger::new();
        let id = "BTC".to_string();
        ledger.open(&id, Timeframe::Min1, Utc::now(), 100.0, 1.0).unwrap();
        ledger.open(&id, Timeframe::Hour4, Utc::now(), 100.0, 1.0).unwrap();
        assert!(ledger.is_open(&id, Timeframe::Min1));
        assert!(ledger.is_open(&id, Timeframe::Hour4));
        assert!(!ledger.is_open(&id, Timeframe::Hour1));
    }

    #[test]
    fn rr_is_clipped_to_bounds() {
        let mut ledger = PositionLedger::new();
        let id = "BTC".to_string();
        ledger.open(&id, Timeframe::Hour1, Utc::now(), 1.0, 1.0).unwrap();
        let position = ledger
            .close(&id, Timeframe::Hour1, Utc::now(), 1000.0, ExitReason::SignalExit)
            .unwrap();
        assert_eq!(position.realized_rr, 10.0);
    }

    #[test]
    fn liquidate_closes_with_global_exit_reason() {
        let mut ledger = PositionLedger::new();
        let id = "BTC".to_string();
        ledger.open(&id, Timeframe::Hour1, Utc::now(), 100.0, 1.0).unwrap();
        let closed = ledger
            .liquidate(&id, Timeframe::Hour1, Utc::now(), 95.0)
            .unwrap()
            .unwrap();
        assert_eq!(closed.exit.unwrap().reason, ExitReason::GlobalExit);
    }
}
