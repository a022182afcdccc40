use chrono::{DateTime, Utc};
use trend_core::{EngineError, EngineResult, ExecutionLevers, Lesson, PatternStats};

use crate::update::{apply_epoch_update, UpdateRuleConfig};

pub const SIZE_MULT_BOUNDS: (f64, f64) = (0.5, 1.5);
pub const AGGRESSION_MULT_BOUNDS: (f64, f64) = (0.7, 1.3);

#[derive(Debug, Clone, Copy)]
pub struct LessonBuilderConfig {
    pub update_rule: UpdateRuleConfig,
    pub n_min: u64,
    pub edge_min: f64,
    pub half_life_hours: f64,
}

impl Default for LessonBuilderConfig {
    fn default() -> Self {
        LessonBuilderConfig {
            update_rule: UpdateRuleConfig::default(),
            n_min: 10,
            edge_min: 0.5,
            half_life_hours: 72.0,
        }
    }
}

pub struct LessonBuilder {
    config: LessonBuilderConfig,
}

impl LessonBuilder {
    pub fn new(config: LessonBuilderConfig) -> Self {
        LessonBuilder { config }
    }

    pub fn half_life_hours(&self) -> f64 {
        self.config.half_life_hours
    }

    /// Produces an updated Lesson for a qualifying PatternStats, or `None`
    /// if the pattern does not yet clear n_min/edge_min.
    pub fn build(&self, stats: &PatternStats, prior: Option<&Lesson>, now: DateTime<Utc>) -> Option<Lesson> {
        if stats.n < self.config.n_min || stats.edge_raw < self.config.edge_min {
            return None;
        }

        let prior_size = prior.map(|l| l.size_mult).unwrap_or(1.0);
        let prior_entry = prior.map(|l| l.entry_aggression_mult).unwrap_or(1.0);
        let prior_exit = prior.map(|l| l.exit_aggression_mult).unwrap_or(1.0);
        let prior_levers = prior
            .map(|l| l.execution_levers)
            .unwrap_or_else(ExecutionLevers::neutral);

        let rule = &self.config.update_rule;
        let size_mult = apply_epoch_update(prior_size, stats.edge_raw, rule, SIZE_MULT_BOUNDS);
        let entry_aggression_mult = apply_epoch_update(prior_entry, stats.edge_raw, rule, AGGRESSION_MULT_BOUNDS);
        let exit_aggression_mult = apply_epoch_update(prior_exit, -stats.edge_raw, rule, AGGRESSION_MULT_BOUNDS);

        let execution_levers = ExecutionLevers {
            entry_delay_bars: apply_epoch_update(prior_levers.entry_delay_bars, -stats.edge_raw, rule, (0.0, 5.0)),
            phase1_frac_mult: apply_epoch_update(prior_levers.phase1_frac_mult, stats.edge_raw, rule, (0.5, 1.5)),
            trim_delay_mult: apply_epoch_update(prior_levers.trim_delay_mult, stats.edge_raw, rule, (0.5, 1.5)),
            trail_mult: apply_epoch_update(prior_levers.trail_mult, stats.edge_raw, rule, (0.5, 1.5)),
            signal_threshold_mult: apply_epoch_update(
                prior_levers.signal_threshold_mult,
                stats.edge_raw,
                rule,
                (0.5, 1.5),
            ),
        };

        Some(Lesson {
            scope_key: stats.scope_key.clone(),
            size_mult,
            entry_aggression_mult,
            exit_aggression_mult,
            execution_levers,
            strength: stats.field_coherence,
            issued_at: now,
        })
    }

    /// Defensive check that a Lesson respects its bounds; should be
    /// unreachable by construction (`build` clamps every field). Exists so
    /// tests can deliberately feed out-of-range input and assert the
    /// defect is caught rather than silently propagated.
    pub fn check_bounds(&self, lesson: &Lesson) -> EngineResult<()> {
        let in_bounds = |v: f64, bounds: (f64, f64)| v >= bounds.0 && v <= bounds.1;
        if !in_bounds(lesson.size_mult, SIZE_MULT_BOUNDS)
            || !in_bounds(lesson.entry_aggression_mult, AGGRESSION_MULT_BOUNDS)
            || !in_bounds(lesson.exit_aggression_mult, AGGRESSION_MULT_BOUNDS)
        {
            return Err(EngineError::BoundsViolation(format!(
                "{:?}",
                lesson.scope_key
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trend_core::{AppetiteMode, Family, McapBucket, PatternHealth, Phase, ScopeKey, StateValue, Timeframe};

    fn scope_key() -> ScopeKey {
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

    fn stats(n: u64, edge_raw: f64) -> PatternStats {
        PatternStats {
            scope_key: scope_key(),
            n,
            avg_rr: 1.0,
            var_rr: 0.1,
            edge_raw,
            recurrence_score: 0.8,
            field_coherence: 0.7,
            last_update_ts: Utc::now(),
            health: PatternHealth::Active,
        }
    }

    #[test]
    fn below_n_min_or_edge_min_does_not_qualify() {
        let builder = LessonBuilder::new(LessonBuilderConfig::default());
        assert!(builder.build(&stats(3, 1.0), None, Utc::now()).is_none());
        assert!(builder.build(&stats(20, 0.1), None, Utc::now()).is_none());
    }

    #[test]
    fn qualifying_pattern_produces_lesson_within_bounds() {
        let builder = LessonBuilder::new(LessonBuilderConfig::default());
        let lesson = builder.build(&stats(20, 1.0), None, Utc::now()).unwrap();
        assert!(builder.check_bounds(&lesson).is_ok());
    }

    #[test]
    fn check_bounds_catches_deliberately_broken_lesson() {
        let builder = LessonBuilder::new(LessonBuilderConfig::default());
        let mut lesson = builder.build(&stats(20, 1.0), None, Utc::now()).unwrap();
        lesson.size_mult = 99.0;
        assert!(matches!(
            builder.check_bounds(&lesson),
            Err(EngineError::BoundsViolation(_))
        ));
    }
}
