use feature_builder::indicators::{atr as atr_series_fn, ema};
use trend_core::{Bar, FeatureSet, Signature, StateValue};

use crate::math::{clamp01, returns, sigmoid, variance};
use crate::weights::{EdxWeights, OxWeights, TsWeights};

#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureEngineConfig {
    pub ts_weights: TsWeights,
    pub ox_weights: OxWeights,
    pub edx_weights: EdxWeights,
    pub tau_trim: f64,
    pub tau_dx: f64,
    pub ts_entry_gate: f64,
}

impl SignatureEngineConfig {
    pub fn with_defaults() -> Self {
        SignatureEngineConfig {
            ts_weights: TsWeights::default(),
            ox_weights: OxWeights::default(),
            edx_weights: EdxWeights::default(),
            tau_trim: 0.65,
            tau_dx: 0.55,
            ts_entry_gate: 0.58,
        }
    }
}

pub struct SignatureEngine {
    config: SignatureEngineConfig,
}

impl SignatureEngine {
    pub fn new(config: SignatureEngineConfig) -> Self {
        SignatureEngine { config }
    }

    pub fn ts_entry_gate(&self) -> f64 {
        self.config.ts_entry_gate
    }

    pub fn tau_trim(&self) -> f64 {
        self.config.tau_trim
    }

    pub fn tau_dx(&self) -> f64 {
        self.config.tau_dx
    }

    /// Computes the four bounded behavioural signals for one bar, given
    /// the current FeatureSet and a recent bar window (used for the
    /// series-derived OX/DX/EDX components that a single FeatureSet
    /// cannot carry: band-width history, return variance, EMA curvature).
    pub fn compute(&self, state: StateValue, bars: &[Bar], features: &FeatureSet) -> Signature {
        let ts = self.compute_ts(features);
        let dx = self.compute_dx(bars, features);
        let edx = if state == StateValue::S3 {
            self.compute_edx(bars, features)
        } else {
            0.0
        };
        let ox = self.compute_ox(state, bars, features, edx);

        Signature { ts, ox, dx, edx }
    }

    fn compute_ts(&self, features: &FeatureSet) -> f64 {
        let w = &self.config.ts_weights;
        if features.adx < w.adx_gate {
            return 0.0;
        }
        let raw = w.rsi_slope * sigmoid(features.rsi_slope_10, w.rsi_slope_k)
            + w.adx_slope * sigmoid(features.adx_slope_10, w.adx_slope_k);
        clamp01(raw)
    }

    fn rail_score(&self, features: &FeatureSet) -> f64 {
        if features.atr <= 0.0 {
            return 0.0;
        }
        let ema = &features.ema;
        let rails = [ema.ema144, ema.ema250, ema.ema333];
        let avg = rails
            .iter()
            .map(|e| ((features.price - e) / features.atr).max(0.0))
            .sum::<f64>()
            / rails.len() as f64;
        clamp01(avg / 5.0)
    }

    fn band_expansion(&self, features: &FeatureSet) -> f64 {
        if features.atr <= 0.0 {
            return 0.0;
        }
        let ema = &features.ema;
        let width = (ema.ema144.max(ema.ema250).max(ema.ema333) - ema.ema144.min(ema.ema250).min(ema.ema333)).abs();
        clamp01(width / (features.atr * 10.0))
    }

    fn atr_surge(&self, bars: &[Bar]) -> f64 {
        let series = atr_series_fn(bars, 14);
        if series.len() < 20 {
            return 0.0;
        }
        let recent_avg = series[series.len() - 20..].iter().sum::<f64>() / 20.0;
        let current = *series.last().unwrap();
        if recent_avg <= 0.0 {
            return 0.0;
        }
        clamp01((current / recent_avg - 1.0).max(0.0))
    }

    fn fragility(&self, bars: &[Bar]) -> f64 {
        if bars.len() < 21 {
            return 0.0;
        }
        let closes: Vec<f64> = bars[bars.len() - 21..].iter().map(|b| b.close).collect();
        let rets = returns(&closes);
        clamp01(variance(&rets) * 400.0)
    }

    fn compute_ox(&self, state: StateValue, bars: &[Bar], features: &FeatureSet, edx: f64) -> f64 {
        let w = &self.config.ox_weights;
        let raw = w.rail_score * self.rail_score(features)
            + w.band_expansion * self.band_expansion(features)
            + w.atr_surge * self.atr_surge(bars)
            + w.fragility * self.fragility(bars)
            + if state == StateValue::S3 { w.edx_boost * edx } else { 0.0 };
        clamp01(raw)
    }

    /// relief = clamp(pullback_depth / ATR, 0, 1).
    fn relief(&self, features: &FeatureSet) -> f64 {
        if features.atr <= 0.0 {
            return 0.0;
        }
        let pullback_depth = (features.zigzag.last_swing_high - features.price).max(0.0);
        clamp01(pullback_depth / features.atr)
    }

    /// curl = clamp(d^2(EMA60)/dt^2 normalised by ATR, 0, 1).
    fn curl(&self, bars: &[Bar], features: &FeatureSet) -> f64 {
        if bars.len() < 3 || features.atr <= 0.0 {
            return 0.0;
        }
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let ema60 = ema(&closes, 60);
        if ema60.len() < 3 {
            return 0.0;
        }
        let n = ema60.len();
        let second_derivative = ema60[n - 1] - 2.0 * ema60[n - 2] + ema60[n - 3];
        clamp01(second_derivative.abs() / features.atr)
    }

    fn compression_mult(&self, bars: &[Bar], features: &FeatureSet) -> f64 {
        if bars.len() < 30 || features.atr <= 0.0 {
            return 1.0;
        }
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let ema144 = ema(&closes, 144.min(closes.len()).max(1));
        let ema333 = ema(&closes, 333.min(closes.len()).max(1));
        if ema144.is_empty() || ema333.is_empty() {
            return 1.0;
        }
        let width_now = (ema144.last().unwrap() - ema333.last().unwrap()).abs();
        let lookback = 20.min(ema144.len()).min(ema333.len());
        let width_avg = (0..lookback)
            .map(|i| {
                let idx144 = ema144.len() - 1 - i;
                let idx333 = ema333.len() - 1 - i;
                (ema144[idx144] - ema333[idx333]).abs()
            })
            .sum::<f64>()
            / lookback as f64;
        if width_avg <= 0.0 {
            return 1.0;
        }
        clamp01(1.0 - (width_now / width_avg)).max(0.3)
    }

    /// DX = exp(-3x) * compression_mult * exhaustion * relief * curl,
    /// x = (price - EMA333) / (EMA144 - EMA333) clipped to [0, inf).
    fn compute_dx(&self, bars: &[Bar], features: &FeatureSet) -> f64 {
        let ema = &features.ema;
        let denom = ema.ema144 - ema.ema333;
        let x = if denom.abs() > 1e-9 {
            ((features.price - ema.ema333) / denom).max(0.0)
        } else {
            0.0
        };
        let decay = (-3.0 * x).exp();
        let compression = self.compression_mult(bars, features);
        let exhaustion = sigmoid(-features.vol_z, 1.0);
        let relief = self.relief(features);
        let curl_term = self.curl(bars, features);
        clamp01(decay * compression * exhaustion * relief * curl_term)
    }

    fn compute_edx(&self, bars: &[Bar], features: &FeatureSet) -> f64 {
        let w = &self.config.edx_weights;

        let slow_field_momentum = clamp01(features.ema.ema144.signum().max(0.0) * sigmoid(features.adx_slope_10, 0.3));
        let structure_failure = clamp01(1.0 - self.relief(features));
        let participation_decay = clamp01((-features.vol_z).max(0.0) / 3.0);
        let ema_compression = clamp01(1.0 - self.compression_mult(bars, features));
        let other = clamp01(self.curl(bars, features));

        let raw = w.slow_field_momentum * slow_field_momentum
            + w.structure_failure * structure_failure
            + w.participation_decay * participation_decay
            + w.ema_compression * ema_compression
            + w.other * other;
        clamp01(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use trend_core::{EmaSet, Timeframe, ZigZagMeta};

    fn synth_bars(n: usize) -> Vec<Bar> {
        let t0 = Utc::now();
        (0..n)
            .map(|i| {
                let price = 100.0 + i as f64 * 0.1;
                Bar {
                    ts: t0 + Duration::hours(i as i64),
                    open: price,
                    high: price + 0.2,
                    low: price - 0.2,
                    close: price,
                    volume: 1000.0,
                }
            })
            .collect()
    }

    fn features(price: f64, ema333: f64, ema144: f64, vol_z: f64, adx: f64) -> FeatureSet {
        FeatureSet {
            tf: Timeframe::Hour1,
            ts: Utc::now(),
            ema: EmaSet {
                ema20: price,
                ema30: price,
                ema60: price,
                ema144,
                ema250: (ema144 + ema333) / 2.0,
                ema333,
            },
            atr: 1.0,
            rsi: 50.0,
            rsi_slope_10: 0.0,
            adx,
            adx_slope_10: 0.0,
            vol_z,
            zigzag: ZigZagMeta {
                last_swing_high: price,
                last_swing_low: price,
                bars_since_swing: 0,
            },
            avwap_slope: 0.0,
            price,
        }
    }

    #[test]
    fn ts_gated_to_zero_below_adx_threshold() {
        let engine = SignatureEngine::new(SignatureEngineConfig::with_defaults());
        let f = features(100.0, 90.0, 95.0, 0.0, 17.9);
        assert_eq!(engine.compute_ts(&f), 0.0);
    }

    #[test]
    fn ts_not_gated_at_adx_exactly_18() {
        let engine = SignatureEngine::new(SignatureEngineConfig::with_defaults());
        let mut f = features(100.0, 90.0, 95.0, 0.0, 18.0);
        f.rsi_slope_10 = 5.0;
        f.adx_slope_10 = 2.0;
        assert!(engine.compute_ts(&f) > 0.0);
    }

    #[test]
    fn dx_decreases_as_x_moves_away_from_discount_zone() {
        let engine = SignatureEngine::new(SignatureEngineConfig::with_defaults());
        let bars = synth_bars(400);

        let mut near = features(100.0, 100.0, 150.0, -5.0, 25.0);
        near.zigzag.last_swing_high = 103.0;
        near.atr = 1.0;

        let mut far = features(130.0, 100.0, 150.0, -5.0, 25.0);
        far.zigzag.last_swing_high = 133.0;
        far.atr = 1.0;

        let dx_near = engine.compute_dx(&bars, &near);
        let dx_far = engine.compute_dx(&bars, &far);
        assert!(dx_near > dx_far, "near={dx_near} far={dx_far}");
        assert!((0.0..=1.0).contains(&dx_near));
        assert!((0.0..=1.0).contains(&dx_far));
    }

    #[test]
    fn all_signals_bounded_zero_one() {
        let engine = SignatureEngine::new(SignatureEngineConfig::with_defaults());
        let bars = synth_bars(400);
        let f = features(120.0, 90.0, 100.0, 1.2, 22.0);
        let sig = engine.compute(StateValue::S3, &bars, &f);
        for v in [sig.ts, sig.ox, sig.dx, sig.edx] {
            assert!((0.0..=1.0).contains(&v), "signal out of bounds: {v}");
        }
    }

    #[test]
    fn edx_is_zero_outside_s3() {
        let engine = SignatureEngine::new(SignatureEngineConfig::with_defaults());
        let bars = synth_bars(400);
        let f = features(120.0, 90.0, 100.0, 1.2, 22.0);
        let sig = engine.compute(StateValue::S1, &bars, &f);
        assert_eq!(sig.edx, 0.0);
    }
}
