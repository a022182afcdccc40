use trend_core::{AppetiteMode, ContextSnapshot, Override, Phase, Signature};
use trend_core::{Appetite, AppetiteBreakdown};

/// Bounds the calculator enforces on every output, mirroring the bounded
/// position-size clamps the teacher's sizer applies before returning.
#[derive(Debug, Clone, Copy)]
pub struct AppetiteCalculatorConfig {
    pub bucket_multiplier_cap: f64,
    pub age_boost_half_life_bars: f64,
}

impl Default for AppetiteCalculatorConfig {
    fn default() -> Self {
        AppetiteCalculatorConfig {
            bucket_multiplier_cap: 1.25,
            age_boost_half_life_bars: 20.0,
        }
    }
}

/// Everything the calculator needs to evaluate one bar's Appetite. A pure
/// read of context + overrides + the current Signature; the calculator
/// never mutates state and never touches PatternStats directly.
#[derive(Debug, Clone, Copy)]
pub struct AppetiteInputs<'a> {
    pub signature: Signature,
    pub context: &'a ContextSnapshot,
    pub override_snapshot: &'a Override,
    pub position_age_bars: u32,
    pub bucket_leader: bool,
    pub bucket_rank: u32,
}

pub struct AppetiteCalculator {
    config: AppetiteCalculatorConfig,
}

impl AppetiteCalculator {
    pub fn new(config: AppetiteCalculatorConfig) -> Self {
        AppetiteCalculator { config }
    }

    pub fn evaluate(&self, inputs: &AppetiteInputs) -> Appetite {
        let phase_policy = self.phase_policy_score(inputs.context);
        let macro_adjustment = self.macro_adjustment_score(inputs.context);
        let cut_pressure = self.cut_pressure_score(inputs.signature);
        let intent_delta = self.intent_delta_score(inputs.signature);
        let age_boost = self.age_boost(inputs.position_age_bars);
        let mcap_boost = self.mcap_boost(inputs.bucket_leader, inputs.bucket_rank);

        let a_base = (0.25 * phase_policy
            + 0.2 * macro_adjustment
            + 0.2 * (1.0 - cut_pressure)
            + 0.15 * intent_delta
            + 0.1 * age_boost
            + 0.1 * mcap_boost)
            .clamp(0.0, 1.0);

        let a_boost = inputs.override_snapshot.entry_aggression_mult;
        let bucket_multiplier = self.bucket_multiplier(inputs.context);

        let a_final = (a_base * a_boost * bucket_multiplier).clamp(0.0, 1.0);

        let e_base = (0.25 * (1.0 - phase_policy)
            + 0.2 * (1.0 - macro_adjustment)
            + 0.2 * cut_pressure
            + 0.15 * (1.0 - intent_delta)
            + 0.1 * (1.0 - age_boost)
            + 0.1 * (1.0 - mcap_boost))
            .clamp(0.0, 1.0);

        let e_boost = inputs.override_snapshot.exit_aggression_mult;
        let e_final = (e_base * e_boost).clamp(0.0, 1.0);

        Appetite {
            a: a_final,
            e: e_final,
            components: AppetiteBreakdown {
                phase_policy,
                macro_adjustment,
                cut_pressure,
                intent_delta,
                age_boost,
                mcap_boost,
            },
        }
    }

    fn phase_policy_score(&self, context: &ContextSnapshot) -> f64 {
        match context.macro_phase {
            Phase::Expansion => 0.9,
            Phase::Accumulation => 0.6,
            Phase::Distribution => 0.3,
            Phase::Contraction => 0.1,
            Phase::Unknown => 0.5,
        }
    }

    fn macro_adjustment_score(&self, context: &ContextSnapshot) -> f64 {
        match context.a_mode {
            AppetiteMode::Aggressive => 0.9,
            AppetiteMode::Neutral => 0.5,
            AppetiteMode::Conservative => 0.2,
            AppetiteMode::Unknown => 0.5,
        }
    }

    fn cut_pressure_score(&self, signature: Signature) -> f64 {
        signature.ox.clamp(0.0, 1.0)
    }

    fn intent_delta_score(&self, signature: Signature) -> f64 {
        signature.dx.clamp(0.0, 1.0)
    }

    fn age_boost(&self, position_age_bars: u32) -> f64 {
        let hl = self.config.age_boost_half_life_bars.max(1.0);
        (1.0 - 0.5f64.powf(position_age_bars as f64 / hl)).clamp(0.0, 1.0)
    }

    fn mcap_boost(&self, bucket_leader: bool, bucket_rank: u32) -> f64 {
        if bucket_leader {
            1.0
        } else {
            (1.0 / (1.0 + bucket_rank as f64 * 0.1)).clamp(0.0, 1.0)
        }
    }

    fn bucket_multiplier(&self, context: &ContextSnapshot) -> f64 {
        let base = if context.bucket_leader { 1.1 } else { 1.0 };
        base.min(self.config.bucket_multiplier_cap)
    }
}
