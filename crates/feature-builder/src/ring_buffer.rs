use std::collections::VecDeque;
use trend_core::{Bar, EngineError, EngineResult};

/// Fixed-capacity ring buffer of closed bars for one TimeframeStream.
/// Rejects duplicates and out-of-order bars; gaps are tolerated (never
/// forward-filled in price, only in the sense that a gap does not block
/// acceptance of the next bar).
#[derive(Debug, Clone)]
pub struct BarRingBuffer {
    bars: VecDeque<Bar>,
    capacity: usize,
    max_gap_bars_equivalent: chrono::Duration,
}

impl BarRingBuffer {
    pub fn new(capacity: usize, max_gap: chrono::Duration) -> Self {
        BarRingBuffer {
            bars: VecDeque::with_capacity(capacity),
            capacity,
            max_gap_bars_equivalent: max_gap,
        }
    }

    pub fn push(&mut self, bar: Bar) -> EngineResult<()> {
        if let Some(last) = self.bars.back() {
            if bar.ts == last.ts {
                return Err(EngineError::Duplicate(format!("ts={}", bar.ts)));
            }
            if bar.ts < last.ts {
                return Err(EngineError::OutOfOrder(format!(
                    "bar ts={} before last ts={}",
                    bar.ts, last.ts
                )));
            }
            if bar.ts - last.ts > self.max_gap_bars_equivalent {
                return Err(EngineError::GapTooLarge(format!(
                    "gap of {} between {} and {}",
                    bar.ts - last.ts,
                    last.ts,
                    bar.ts
                )));
            }
        }

        if self.bars.len() == self.capacity {
            self.bars.pop_front();
        }
        self.bars.push_back(bar);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Contiguous slice view of the buffered bars, oldest first.
    pub fn as_contiguous(&self) -> Vec<Bar> {
        self.bars.iter().copied().collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.volume).collect()
    }

    pub fn last(&self) -> Option<Bar> {
        self.bars.back().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn bar_at(ts: chrono::DateTime<Utc>, price: f64) -> Bar {
        Bar {
            ts,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 10.0,
        }
    }

    #[test]
    fn rejects_duplicate_timestamp() {
        let mut buf = BarRingBuffer::new(10, Duration::hours(2));
        let t0 = Utc::now();
        buf.push(bar_at(t0, 1.0)).unwrap();
        let err = buf.push(bar_at(t0, 1.0)).unwrap_err();
        assert!(matches!(err, EngineError::Duplicate(_)));
    }

    #[test]
    fn rejects_out_of_order() {
        let mut buf = BarRingBuffer::new(10, Duration::hours(2));
        let t0 = Utc::now();
        buf.push(bar_at(t0, 1.0)).unwrap();
        let err = buf.push(bar_at(t0 - Duration::hours(1), 1.0)).unwrap_err();
        assert!(matches!(err, EngineError::OutOfOrder(_)));
    }

    #[test]
    fn evicts_oldest_beyond_capacity() {
        let mut buf = BarRingBuffer::new(3, Duration::hours(2));
        let t0 = Utc::now();
        for i in 0..5 {
            buf.push(bar_at(t0 + Duration::hours(i), i as f64)).unwrap();
        }
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.last().unwrap().close, 4.0);
    }
}
