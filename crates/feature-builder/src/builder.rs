use chrono::{DateTime, Utc};
use trend_core::{EmaSet, EngineError, EngineResult, FeatureSet, Timeframe, ZigZagMeta};

use crate::indicators::{adx, atr, avwap, ema_last, rsi, slope, volume_z_score, zigzag_update};
use crate::ring_buffer::BarRingBuffer;

pub const MIN_WARMUP_BARS: usize = 350;
const ATR_PERIOD: usize = 14;
const RSI_PERIOD: usize = 14;
const ADX_PERIOD: usize = 14;
const SLOPE_LOOKBACK: usize = 10;
const VOLUME_Z_WINDOW: usize = 96;
const ZIGZAG_ATR_MULT: f64 = 2.0;

#[derive(Debug, Clone, Copy)]
pub struct FeatureBuilderConfig {
    pub min_warmup_bars: usize,
    pub atr_period: usize,
    pub rsi_period: usize,
    pub adx_period: usize,
    pub slope_lookback: usize,
    pub volume_z_window: usize,
    pub zigzag_atr_mult: f64,
}

impl Default for FeatureBuilderConfig {
    fn default() -> Self {
        FeatureBuilderConfig {
            min_warmup_bars: MIN_WARMUP_BARS,
            atr_period: ATR_PERIOD,
            rsi_period: RSI_PERIOD,
            adx_period: ADX_PERIOD,
            slope_lookback: SLOPE_LOOKBACK,
            volume_z_window: VOLUME_Z_WINDOW,
            zigzag_atr_mult: ZIGZAG_ATR_MULT,
        }
    }
}

pub struct FeatureBuilder {
    config: FeatureBuilderConfig,
}

impl FeatureBuilder {
    pub fn new(config: FeatureBuilderConfig) -> Self {
        FeatureBuilder { config }
    }

    /// Produces a FeatureSet from the ring buffer's current contents.
    /// `avwap_anchor_index` selects how many of the most recent bars to
    /// anchor the AVWAP computation over (the caller supplies the index of
    /// the most recent S3 entry bar; `None` anchors over the whole buffer).
    pub fn build(
        &self,
        tf: Timeframe,
        ring: &BarRingBuffer,
        now: DateTime<Utc>,
        avwap_anchor_index: Option<usize>,
    ) -> EngineResult<FeatureSet> {
        if ring.len() < self.config.min_warmup_bars {
            return Err(EngineError::InsufficientData(format!(
                "{} bars buffered, {} required",
                ring.len(),
                self.config.min_warmup_bars
            )));
        }

        let bars = ring.as_contiguous();
        let closes = ring.closes();
        let volumes = ring.volumes();

        let ema = EmaSet {
            ema20: ema_last(&closes, 20),
            ema30: ema_last(&closes, 30),
            ema60: ema_last(&closes, 60),
            ema144: ema_last(&closes, 144),
            ema250: ema_last(&closes, 250),
            ema333: ema_last(&closes, 333),
        };

        let atr_series = atr(&bars, self.config.atr_period);
        let current_atr = atr_series.last().copied().unwrap_or(0.0);

        let rsi_series = rsi(&closes, self.config.rsi_period);
        let current_rsi = rsi_series.last().copied().unwrap_or(50.0);
        let rsi_slope_10 = slope(&rsi_series, self.config.slope_lookback);

        let adx_result = adx(&bars, self.config.adx_period);
        let current_adx = adx_result.adx.last().copied().unwrap_or(0.0);
        let adx_slope_10 = slope(&adx_result.adx, self.config.slope_lookback);

        let vol_z = volume_z_score(&volumes, self.config.volume_z_window);

        let zigzag = zigzag_update(&bars, current_atr, self.config.zigzag_atr_mult);

        let anchor_slice: &[trend_core::Bar] = match avwap_anchor_index {
            Some(idx) if idx < bars.len() => &bars[idx..],
            _ => &bars,
        };
        let avwap_series = avwap(anchor_slice);
        let avwap_slope_10 = slope(&avwap_series, self.config.slope_lookback.min(avwap_series.len().saturating_sub(1)));

        Ok(FeatureSet {
            tf,
            ts: now,
            ema,
            atr: current_atr,
            rsi: current_rsi,
            rsi_slope_10,
            adx: current_adx,
            adx_slope_10,
            vol_z,
            zigzag: ZigZagMeta {
                last_swing_high: zigzag.last_swing_high,
                last_swing_low: zigzag.last_swing_low,
                bars_since_swing: zigzag.bars_since_swing,
            },
            avwap_slope: avwap_slope_10,
            price: bars.last().unwrap().close,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn bar_at(ts: DateTime<Utc>, price: f64) -> trend_core::Bar {
        trend_core::Bar {
            ts,
            open: price,
            high: price + 0.1,
            low: price - 0.1,
            close: price,
            volume: 1000.0,
        }
    }

    #[test]
    fn warmup_boundary_349_is_insufficient_350_is_defined() {
        let config = FeatureBuilderConfig::default();
        let builder = FeatureBuilder::new(config);
        let t0 = Utc::now();

        let mut ring = BarRingBuffer::new(400, Duration::hours(2));
        for i in 0..349 {
            ring.push(bar_at(t0 + Duration::hours(i), 100.0)).unwrap();
        }
        let result = builder.build(Timeframe::Hour1, &ring, t0, None);
        assert!(matches!(result, Err(EngineError::InsufficientData(_))));

        ring.push(bar_at(t0 + Duration::hours(349), 101.0)).unwrap();
        let result = builder.build(Timeframe::Hour1, &ring, t0, None);
        assert!(result.is_ok());
    }
}
