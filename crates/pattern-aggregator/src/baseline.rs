use std::collections::VecDeque;

use dashmap::DashMap;
use trend_core::{McapBucket, Timeframe};

/// Global baselines per (mcap_bucket, timeframe), computed over a
/// rolling window of the most recent trades in that bucket. Resolves the
/// open question on window/minimum-sample requirements: a 200-trade
/// rolling window, with at least 20 samples required before the baseline
/// is considered valid (otherwise `baseline_rr` reports neutral, 0.0, so
/// that edge_raw degrades gracefully rather than diverging on thin data).
const BASELINE_WINDOW: usize = 200;
const BASELINE_MIN_SAMPLES: usize = 20;

pub struct BaselineTracker {
    windows: DashMap<(McapBucket, Timeframe), VecDeque<f64>>,
}

impl Default for BaselineTracker {
    fn default() -> Self {
        BaselineTracker {
            windows: DashMap::new(),
        }
    }
}

impl BaselineTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, bucket: McapBucket, tf: Timeframe, rr: f64) {
        let mut entry = self.windows.entry((bucket, tf)).or_default();
        if entry.len() == BASELINE_WINDOW {
            entry.pop_front();
        }
        entry.push_back(rr);
    }

    pub fn baseline_rr(&self, bucket: McapBucket, tf: Timeframe) -> f64 {
        match self.windows.get(&(bucket, tf)) {
            Some(window) if window.len() >= BASELINE_MIN_SAMPLES => {
                window.iter().sum::<f64>() / window.len() as f64
            }
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_is_neutral_below_min_samples() {
        let tracker = BaselineTracker::new();
        tracker.record(McapBucket::Mid, Timeframe::Hour1, 5.0);
        assert_eq!(tracker.baseline_rr(McapBucket::Mid, Timeframe::Hour1), 0.0);
    }

    #[test]
    fn baseline_activates_at_min_samples() {
        let tracker = BaselineTracker::new();
        for _ in 0..BASELINE_MIN_SAMPLES {
            tracker.record(McapBucket::Mid, Timeframe::Hour1, 2.0);
        }
        assert_eq!(tracker.baseline_rr(McapBucket::Mid, Timeframe::Hour1), 2.0);
    }
}
