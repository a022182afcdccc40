use std::env;

use anyhow::Result;
use state_machine::AlignmentPredicate;

/// Top-level engine configuration, loaded from the environment the same
/// way the rest of this stack loads its config: one `env::var(...)`
/// parse per field, falling back to a documented default.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub ring_buffer_capacity: usize,
    pub max_gap_hours: i64,
    pub per_bar_budget_ms: u64,

    pub alignment_predicate_ascending: bool,
    pub halo_atr_mult: f64,

    pub lesson_half_life_hours: f64,
    pub edge_min: f64,
    pub n_min: u64,

    pub log_format_json: bool,
    pub database_url: String,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        let ring_buffer_capacity = env::var("TREND_ENGINE_RING_BUFFER_CAPACITY")
            .unwrap_or_else(|_| "500".to_string())
            .parse()?;
        let max_gap_hours = env::var("TREND_ENGINE_MAX_GAP_HOURS")
            .unwrap_or_else(|_| "6".to_string())
            .parse()?;
        let per_bar_budget_ms = env::var("TREND_ENGINE_PER_BAR_BUDGET_MS")
            .unwrap_or_else(|_| "250".to_string())
            .parse()?;

        let alignment_predicate_ascending = env::var("TREND_ENGINE_S3_ASCENDING_SLOW_BAND")
            .unwrap_or_else(|_| "false".to_string())
            .parse()?;
        let halo_atr_mult = env::var("TREND_ENGINE_HALO_ATR_MULT")
            .unwrap_or_else(|_| "0.5".to_string())
            .parse()?;

        let lesson_half_life_hours = env::var("TREND_ENGINE_LESSON_HALF_LIFE_HOURS")
            .unwrap_or_else(|_| "72".to_string())
            .parse()?;
        let edge_min = env::var("TREND_ENGINE_EDGE_MIN")
            .unwrap_or_else(|_| "0.5".to_string())
            .parse()?;
        let n_min = env::var("TREND_ENGINE_N_MIN")
            .unwrap_or_else(|_| "10".to_string())
            .parse()?;

        let log_format_json = env::var("RUST_LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite::memory:".to_string());

        if ring_buffer_capacity < feature_builder::MIN_WARMUP_BARS {
            anyhow::bail!(
                "ring_buffer_capacity ({ring_buffer_capacity}) must be >= the warmup requirement ({})",
                feature_builder::MIN_WARMUP_BARS
            );
        }
        if halo_atr_mult <= 0.0 {
            anyhow::bail!("halo_atr_mult must be positive");
        }
        if edge_min < 0.0 {
            anyhow::bail!("edge_min must be non-negative");
        }

        Ok(EngineConfig {
            ring_buffer_capacity,
            max_gap_hours,
            per_bar_budget_ms,
            alignment_predicate_ascending,
            halo_atr_mult,
            lesson_half_life_hours,
            edge_min,
            n_min,
            log_format_json,
            database_url,
        })
    }

    pub fn alignment_predicate(&self) -> AlignmentPredicate {
        if self.alignment_predicate_ascending {
            AlignmentPredicate::AscendingSlowBand
        } else {
            AlignmentPredicate::Strict
        }
    }
}
