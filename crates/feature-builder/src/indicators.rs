//! Pure indicator functions over bar/price slices. Conventions mirror the
//! teacher's technical-analysis crate: EMA is SMA-seeded so output length
//! matches input length, ATR/RSI/ADX use Wilder smoothing.

use trend_core::Bar;

#[inline]
pub fn finite_or(val: f64, default: f64) -> f64 {
    if val.is_finite() {
        val
    } else {
        default
    }
}

/// Simple moving average, output shorter than input by `period - 1`.
pub fn sma(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period {
        return vec![];
    }
    let mut result = Vec::with_capacity(data.len() - period + 1);
    for i in period - 1..data.len() {
        let sum: f64 = data[i + 1 - period..=i].iter().sum();
        result.push(finite_or(sum / period as f64, 0.0));
    }
    result
}

/// Exponential moving average. Seeds with the SMA over the first `period`
/// elements, pads the first `period` output slots with that seed so the
/// result length matches the input length, then smooths from there.
pub fn ema(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.is_empty() {
        return vec![];
    }

    let multiplier = 2.0 / (period as f64 + 1.0);

    if data.len() < period {
        let avg = data.iter().sum::<f64>() / data.len() as f64;
        return vec![finite_or(avg, 0.0); data.len()];
    }

    let sma_seed = finite_or(data[..period].iter().sum::<f64>() / period as f64, 0.0);

    let mut result = Vec::with_capacity(data.len());
    for _ in 0..period {
        result.push(sma_seed);
    }

    for i in period..data.len() {
        let prev_ema = result[i - 1];
        let ema_val = (data[i] - prev_ema) * multiplier + prev_ema;
        result.push(finite_or(ema_val, prev_ema));
    }

    result
}

/// Last value of an EMA series, or the seed if not enough data to smooth.
pub fn ema_last(data: &[f64], period: usize) -> f64 {
    ema(data, period).last().copied().unwrap_or(0.0)
}

/// Wilder RSI(period). Output length = input length - period - 1.
pub fn rsi(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period + 1 {
        return vec![];
    }

    let mut gains = Vec::with_capacity(data.len() - 1);
    let mut losses = Vec::with_capacity(data.len() - 1);
    for i in 1..data.len() {
        let change = data[i] - data[i - 1];
        if change > 0.0 {
            gains.push(change);
            losses.push(0.0);
        } else {
            gains.push(0.0);
            losses.push(change.abs());
        }
    }

    let mut avg_gain = gains[..period].iter().sum::<f64>() / period as f64;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / period as f64;

    let mut rsi_values = Vec::with_capacity(gains.len() - period);
    for i in period..gains.len() {
        avg_gain = (avg_gain * (period - 1) as f64 + gains[i]) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + losses[i]) / period as f64;

        let rs = if avg_loss == 0.0 {
            100.0
        } else {
            avg_gain / avg_loss
        };
        let value = 100.0 - (100.0 / (1.0 + rs));
        rsi_values.push(finite_or(value, 50.0));
    }

    rsi_values
}

/// Linear slope over the last `lookback` values of a series (simple
/// endpoint-to-endpoint average-rate slope, consistent with the teacher's
/// trend-strength helper).
pub fn slope(data: &[f64], lookback: usize) -> f64 {
    if data.len() < lookback + 1 || lookback == 0 {
        return 0.0;
    }
    let recent = &data[data.len() - lookback - 1..];
    let first = recent[0];
    let last = *recent.last().unwrap();
    finite_or((last - first) / lookback as f64, 0.0)
}

/// Wilder ATR(period).
pub fn atr(bars: &[Bar], period: usize) -> Vec<f64> {
    if period == 0 || bars.len() < period + 1 {
        return vec![];
    }

    let mut true_ranges = Vec::with_capacity(bars.len() - 1);
    for i in 1..bars.len() {
        let high_low = bars[i].high - bars[i].low;
        let high_close = (bars[i].high - bars[i - 1].close).abs();
        let low_close = (bars[i].low - bars[i - 1].close).abs();
        true_ranges.push(high_low.max(high_close).max(low_close));
    }

    let mut atr_values = Vec::with_capacity(true_ranges.len() - period + 1);
    let mut current = finite_or(true_ranges[..period].iter().sum::<f64>() / period as f64, 0.0);
    atr_values.push(current);

    for tr in &true_ranges[period..] {
        current = (current * (period - 1) as f64 + tr) / period as f64;
        atr_values.push(finite_or(current, 0.0));
    }

    atr_values
}

pub struct AdxResult {
    pub adx: Vec<f64>,
    pub plus_di: Vec<f64>,
    pub minus_di: Vec<f64>,
}

/// Wilder ADX/DI+/DI-(period): DM and TR are Wilder-smoothed sums, DX is
/// computed per bar from the smoothed DI+/DI-, then DX itself is
/// Wilder-smoothed into ADX.
pub fn adx(bars: &[Bar], period: usize) -> AdxResult {
    if period == 0 || bars.len() < period * 2 + 1 {
        return AdxResult {
            adx: vec![],
            plus_di: vec![],
            minus_di: vec![],
        };
    }

    let mut plus_dm = Vec::with_capacity(bars.len() - 1);
    let mut minus_dm = Vec::with_capacity(bars.len() - 1);
    let mut true_range = Vec::with_capacity(bars.len() - 1);

    for i in 1..bars.len() {
        let up_move = bars[i].high - bars[i - 1].high;
        let down_move = bars[i - 1].low - bars[i].low;

        plus_dm.push(if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        });
        minus_dm.push(if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        });

        let hl = bars[i].high - bars[i].low;
        let hc = (bars[i].high - bars[i - 1].close).abs();
        let lc = (bars[i].low - bars[i - 1].close).abs();
        true_range.push(hl.max(hc).max(lc));
    }

    let mut smoothed_plus_dm = plus_dm[..period].iter().sum::<f64>();
    let mut smoothed_minus_dm = minus_dm[..period].iter().sum::<f64>();
    let mut smoothed_tr = true_range[..period].iter().sum::<f64>();

    let mut plus_di_values = Vec::new();
    let mut minus_di_values = Vec::new();
    let mut dx_values = Vec::new();

    let seed_plus_di = if smoothed_tr != 0.0 {
        100.0 * smoothed_plus_dm / smoothed_tr
    } else {
        0.0
    };
    let seed_minus_di = if smoothed_tr != 0.0 {
        100.0 * smoothed_minus_dm / smoothed_tr
    } else {
        0.0
    };
    plus_di_values.push(finite_or(seed_plus_di, 0.0));
    minus_di_values.push(finite_or(seed_minus_di, 0.0));
    dx_values.push(dx_from_di(seed_plus_di, seed_minus_di));

    for i in period..plus_dm.len() {
        smoothed_plus_dm = smoothed_plus_dm - (smoothed_plus_dm / period as f64) + plus_dm[i];
        smoothed_minus_dm = smoothed_minus_dm - (smoothed_minus_dm / period as f64) + minus_dm[i];
        smoothed_tr = smoothed_tr - (smoothed_tr / period as f64) + true_range[i];

        let plus_di = if smoothed_tr != 0.0 {
            100.0 * smoothed_plus_dm / smoothed_tr
        } else {
            0.0
        };
        let minus_di = if smoothed_tr != 0.0 {
            100.0 * smoothed_minus_dm / smoothed_tr
        } else {
            0.0
        };

        plus_di_values.push(finite_or(plus_di, 0.0));
        minus_di_values.push(finite_or(minus_di, 0.0));
        dx_values.push(dx_from_di(plus_di, minus_di));
    }

    if dx_values.len() < period {
        return AdxResult {
            adx: vec![],
            plus_di: plus_di_values,
            minus_di: minus_di_values,
        };
    }

    let mut adx_values = Vec::with_capacity(dx_values.len() - period + 1);
    let mut adx_current = finite_or(dx_values[..period].iter().sum::<f64>() / period as f64, 0.0);
    adx_values.push(adx_current);

    for dx in &dx_values[period..] {
        adx_current = (adx_current * (period - 1) as f64 + dx) / period as f64;
        adx_values.push(finite_or(adx_current, 0.0));
    }

    AdxResult {
        adx: adx_values,
        plus_di: plus_di_values,
        minus_di: minus_di_values,
    }
}

fn dx_from_di(plus_di: f64, minus_di: f64) -> f64 {
    let sum = plus_di + minus_di;
    if sum == 0.0 {
        return 0.0;
    }
    finite_or(100.0 * (plus_di - minus_di).abs() / sum, 0.0)
}

/// Anchored VWAP over the given bar slice (typically anchored at the most
/// recent S3 entry timestamp).
pub fn avwap(bars: &[Bar]) -> Vec<f64> {
    if bars.is_empty() {
        return vec![];
    }

    let mut values = Vec::with_capacity(bars.len());
    let mut cumulative_tpv = 0.0;
    let mut cumulative_volume = 0.0;

    for bar in bars {
        let typical_price = (bar.high + bar.low + bar.close) / 3.0;
        cumulative_tpv += typical_price * bar.volume;
        cumulative_volume += bar.volume;

        let value = if cumulative_volume > 0.0 {
            cumulative_tpv / cumulative_volume
        } else {
            typical_price
        };
        values.push(finite_or(value, typical_price));
    }

    values
}

/// Volume z-score over a trailing window: (current - mean) / stddev.
pub fn volume_z_score(volumes: &[f64], window: usize) -> f64 {
    if volumes.len() < window || window < 2 {
        return 0.0;
    }
    let recent = &volumes[volumes.len() - window..];
    let mean = recent.iter().sum::<f64>() / window as f64;
    let variance = recent.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / window as f64;
    let std_dev = variance.sqrt();
    if std_dev <= 0.0 {
        return 0.0;
    }
    let current = *volumes.last().unwrap();
    finite_or((current - mean) / std_dev, 0.0)
}

/// Zig-zag swing state, threshold adaptive to ATR (percentage of price
/// equal to `atr_mult * atr / price`).
#[derive(Debug, Clone, Copy, Default)]
pub struct ZigZagState {
    pub last_swing_high: f64,
    pub last_swing_low: f64,
    pub bars_since_swing: u32,
}

pub fn zigzag_update(bars: &[Bar], current_atr: f64, atr_mult: f64) -> ZigZagState {
    if bars.is_empty() {
        return ZigZagState::default();
    }

    let threshold_price = bars.last().unwrap().close;
    let threshold = if threshold_price > 0.0 {
        (atr_mult * current_atr / threshold_price).max(0.001)
    } else {
        0.02
    };

    let mut swing_high = bars[0].high;
    let mut swing_low = bars[0].low;
    let mut trend_up = true;
    let mut bars_since = 0u32;

    for bar in &bars[1..] {
        bars_since += 1;
        if trend_up {
            if bar.high > swing_high {
                swing_high = bar.high;
                bars_since = 0;
            } else if (swing_high - bar.low) / swing_high >= threshold {
                swing_low = bar.low;
                trend_up = false;
                bars_since = 0;
            }
        } else if bar.low < swing_low {
            swing_low = bar.low;
            bars_since = 0;
        } else if (bar.high - swing_low) / swing_low >= threshold {
            swing_high = bar.high;
            trend_up = true;
            bars_since = 0;
        }
    }

    ZigZagState {
        last_swing_high: swing_high,
        last_swing_low: swing_low,
        bars_since_swing: bars_since,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn flat_bars(n: usize, price: f64) -> Vec<Bar> {
        (0..n)
            .map(|i| Bar {
                ts: chrono::Utc::now() + chrono::Duration::hours(i as i64),
                open: price,
                high: price,
                low: price,
                close: price,
                volume: 100.0,
            })
            .collect()
    }

    #[test]
    fn ema_output_length_matches_input() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let result = ema(&data, 3);
        assert_eq!(result.len(), data.len());
    }

    #[test]
    fn ema_flat_series_converges_to_price() {
        let data = vec![10.0; 50];
        let result = ema(&data, 20);
        assert_relative_eq!(*result.last().unwrap(), 10.0, epsilon = 1e-9);
    }

    #[test]
    fn rsi_flat_series_is_50() {
        let data = vec![10.0; 30];
        let result = rsi(&data, 14);
        for v in result {
            assert_relative_eq!(v, 50.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn atr_flat_bars_is_zero() {
        let bars = flat_bars(30, 100.0);
        let result = atr(&bars, 14);
        for v in result {
            assert_relative_eq!(v, 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn adx_insufficient_data_returns_empty() {
        let bars = flat_bars(10, 100.0);
        let result = adx(&bars, 14);
        assert!(result.adx.is_empty());
    }

    #[test]
    fn volume_z_score_empty_window_is_zero() {
        assert_eq!(volume_z_score(&[1.0, 2.0], 96), 0.0);
    }
}
