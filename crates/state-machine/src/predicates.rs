use trend_core::EmaSet;

/// S1 (Primer): fast band entirely above EMA60 and price above EMA60.
pub fn is_s1(ema: &EmaSet, price: f64) -> bool {
    ema.fast_band_min() > ema.ema60 && price > ema.ema60
}

/// S2 (Defensive): price above EMA333.
pub fn is_s2(ema: &EmaSet, price: f64) -> bool {
    price > ema.ema333
}

/// S3 (Trending), "full bullish alignment": every EMA above EMA333, with
/// the slow band in strict order EMA144 > EMA60 > EMA333 (the ordering
/// chosen as authoritative per the documented EMA-ordering configuration
/// option; see `AlignmentPredicate`).
pub fn is_s3_strict_alignment(ema: &EmaSet, price: f64) -> bool {
    price > ema.ema333
        && ema.ema20 > ema.ema333
        && ema.ema30 > ema.ema333
        && ema.ema60 > ema.ema333
        && ema.ema144 > ema.ema333
        && ema.ema250 > ema.ema333
        && ema.ema144 > ema.ema60
        && ema.ema60 > ema.ema333
}

/// Alternate S3 predicate: full ascending order across the slow band
/// (EMA144 < EMA250 < EMA333 is explicitly NOT required by the strict
/// variant; this is the ascending-order alternative named in the open
/// question). Selectable via configuration; the strict variant is the
/// documented default.
pub fn is_s3_ascending_slow_band(ema: &EmaSet, price: f64) -> bool {
    price > ema.ema333
        && ema.ema20 > ema.ema333
        && ema.ema30 > ema.ema333
        && ema.ema60 > ema.ema333
        && ema.ema144 < ema.ema250
        && ema.ema250 < ema.ema333
}

/// Global exit: fast band below EMA60 while in S2/S3. Overrides all and
/// forces the state back to S0.
pub fn is_global_exit(ema: &EmaSet) -> bool {
    ema.fast_band_max() < ema.ema60
}

/// Reclaim event: price crossed from below EMA333 to at-or-above EMA333
/// on the current closed bar, while in S3.
pub fn reclaimed_ema333(prev_price: f64, prev_ema333: f64, price: f64, ema333: f64) -> bool {
    prev_price < prev_ema333 && price >= ema333
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignmentPredicate {
    Strict,
    AscendingSlowBand,
}

impl AlignmentPredicate {
    pub fn evaluate(&self, ema: &EmaSet, price: f64) -> bool {
        match self {
            AlignmentPredicate::Strict => is_s3_strict_alignment(ema, price),
            AlignmentPredicate::AscendingSlowBand => is_s3_ascending_slow_band(ema, price),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ema(e20: f64, e30: f64, e60: f64, e144: f64, e250: f64, e333: f64) -> EmaSet {
        EmaSet {
            ema20: e20,
            ema30: e30,
            ema60: e60,
            ema144: e144,
            ema250: e250,
            ema333: e333,
        }
    }

    #[test]
    fn equality_does_not_satisfy_strict_predicates() {
        let set = ema(100.0, 100.0, 100.0, 120.0, 130.0, 140.0);
        assert!(!is_s1(&set, 100.0));
    }

    #[test]
    fn global_exit_overrides_on_fast_band_breakdown() {
        let set = ema(90.0, 91.0, 95.0, 140.0, 150.0, 160.0);
        assert!(is_global_exit(&set));
    }
}
