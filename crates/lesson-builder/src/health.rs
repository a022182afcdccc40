use trend_core::Override;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Decaying,
    Neutral,
}

#[derive(Debug, Clone)]
pub struct LessonHealthReport {
    pub active_lessons: usize,
    pub mean_abs_deviation: f64,
    pub decayed_to_neutral_count: usize,
    pub status: HealthStatus,
}

/// Builds a summary of how much signal the currently materialized
/// overrides still carry, mirroring the teacher's strategy-decay health
/// report shape for this system's decaying-lesson domain.
pub struct HealthReportBuilder {
    neutral_epsilon: f64,
}

impl Default for HealthReportBuilder {
    fn default() -> Self {
        HealthReportBuilder {
            neutral_epsilon: 0.01,
        }
    }
}

impl HealthReportBuilder {
    pub fn new(neutral_epsilon: f64) -> Self {
        HealthReportBuilder { neutral_epsilon }
    }

    pub fn build(&self, overrides: &[Override]) -> LessonHealthReport {
        if overrides.is_empty() {
            return LessonHealthReport {
                active_lessons: 0,
                mean_abs_deviation: 0.0,
                decayed_to_neutral_count: 0,
                status: HealthStatus::Neutral,
            };
        }

        let deviations: Vec<f64> = overrides
            .iter()
            .map(|o| (o.size_mult - 1.0).abs())
            .collect();
        let mean_abs_deviation = deviations.iter().sum::<f64>() / deviations.len() as f64;
        let decayed_to_neutral_count = deviations
            .iter()
            .filter(|d| **d <= self.neutral_epsilon)
            .count();

        let status = if decayed_to_neutral_count == overrides.len() {
            HealthStatus::Neutral
        } else if mean_abs_deviation < self.neutral_epsilon * 3.0 {
            HealthStatus::Decaying
        } else {
            HealthStatus::Healthy
        };

        LessonHealthReport {
            active_lessons: overrides.len(),
            mean_abs_deviation,
            decayed_to_neutral_count,
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use trend_core::{AppetiteMode, ExecutionLevers, Family, McapBucket, Phase, ScopeKey, StateValue, Timeframe};

    fn override_with(size_mult: f64) -> Override {
        Override {
            scope_key: ScopeKey {
                module: "lesson".into(),
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
            },
            size_mult,
            entry_aggression_mult: 1.0,
            exit_aggression_mult: 1.0,
            execution_levers: ExecutionLevers::neutral(),
            computed_at: Utc::now(),
        }
    }

    #[test]
    fn all_neutral_overrides_report_neutral_status() {
        let builder = HealthReportBuilder::default();
        let report = builder.build(&[override_with(1.0), override_with(1.0)]);
        assert_eq!(report.status, HealthStatus::Neutral);
        assert_eq!(report.decayed_to_neutral_count, 2);
    }

    #[test]
    fn strong_overrides_report_healthy_status() {
        let builder = HealthReportBuilder::default();
        let report = builder.build(&[override_with(1.4), override_with(1.35)]);
        assert_eq!(report.status, HealthStatus::Healthy);
    }
}
