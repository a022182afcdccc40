/// Weight table for OX (overextension). Exposed as configuration per the
/// documented Appendix A defaults; implementers may override via
/// `SignatureEngineConfig`.
#[derive(Debug, Clone, Copy)]
pub struct OxWeights {
    pub rail_score: f64,
    pub band_expansion: f64,
    pub atr_surge: f64,
    pub fragility: f64,
    pub edx_boost: f64,
}

impl Default for OxWeights {
    fn default() -> Self {
        OxWeights {
            rail_score: 0.35,
            band_expansion: 0.25,
            atr_surge: 0.20,
            fragility: 0.20,
            edx_boost: 0.15,
        }
    }
}

/// Weight table for EDX (expansion decay), only evaluated in S3.
#[derive(Debug, Clone, Copy)]
pub struct EdxWeights {
    pub slow_field_momentum: f64,
    pub structure_failure: f64,
    pub participation_decay: f64,
    pub ema_compression: f64,
    pub other: f64,
}

impl Default for EdxWeights {
    fn default() -> Self {
        EdxWeights {
            slow_field_momentum: 0.30,
            structure_failure: 0.25,
            participation_decay: 0.20,
            ema_compression: 0.10,
            other: 0.15,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TsWeights {
    pub rsi_slope: f64,
    pub adx_slope: f64,
    pub rsi_slope_k: f64,
    pub adx_slope_k: f64,
    pub adx_gate: f64,
}

impl Default for TsWeights {
    fn default() -> Self {
        TsWeights {
            rsi_slope: 0.6,
            adx_slope: 0.4,
            rsi_slope_k: 0.5,
            adx_slope_k: 0.3,
            adx_gate: 18.0,
        }
    }
}
