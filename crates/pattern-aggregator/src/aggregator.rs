use std::collections::HashSet;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use trend_core::{EngineError, EngineResult, PatternHealth, PatternStats, ScopeKey, TradeSummary};

use crate::baseline::BaselineTracker;

#[derive(Debug, Clone, Copy)]
pub struct PatternAggregatorConfig {
    pub recurrence_tau_days: f64,
    pub n_min: u64,
    pub edge_min: f64,
    pub braid_min_children: usize,
}

impl Default for PatternAggregatorConfig {
    fn default() -> Self {
        PatternAggregatorConfig {
            recurrence_tau_days: 30.0,
            n_min: 10,
            edge_min: 0.5,
            braid_min_children: 3,
        }
    }
}

/// Welford's online mean/variance plus the recurrence and coherence
/// bookkeeping a shard needs between ingests. Kept private: the public
/// `PatternStats` type is derived from this on read.
struct ShardState {
    n: u64,
    mean: f64,
    m2: f64,
    positive_edge_count: u64,
    recurrence_score: f64,
    last_update_ts: DateTime<Utc>,
    health: PatternHealth,
}

impl ShardState {
    fn variance(&self) -> f64 {
        if self.n < 2 {
            0.0
        } else {
            self.m2 / self.n as f64
        }
    }

    fn field_coherence(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.positive_edge_count as f64 / self.n as f64
        }
    }
}

/// Buckets TradeSummaries by scope key and maintains per-key running
/// statistics, partitioned via `DashMap` (one shard per key, sharded
/// writes) so the aggregator is a multi-writer/many-reader component:
/// writes are serialized per scope key, reads are lock-free snapshots
/// taken at `stats()`-call time.
pub struct PatternAggregator {
    shards: DashMap<ScopeKey, ShardState>,
    baselines: BaselineTracker,
    braid_children: DashMap<ScopeKey, HashSet<String>>,
    config: PatternAggregatorConfig,
}

/// A braid-level record: a parent scope key whose ≥N child strands have
/// accumulated enough trades to merge into one actionable statistic.
#[derive(Debug, Clone)]
pub struct BraidRecord {
    pub parent: ScopeKey,
    pub child_count: usize,
    pub merged_stats: PatternStats,
}

impl PatternAggregator {
    pub fn new(config: PatternAggregatorConfig) -> Self {
        PatternAggregator {
            shards: DashMap::new(),
            baselines: BaselineTracker::new(),
            braid_children: DashMap::new(),
            config,
        }
    }

    /// Ingests one TradeSummary, updating the owning scope key's running
    /// statistics. Returns the fresh PatternStats snapshot for that key,
    /// or `PerKeyLockContention`/`AggregatorDegraded` if the shard cannot
    /// be safely updated right now.
    pub fn ingest(&self, summary: &TradeSummary) -> EngineResult<PatternStats> {
        self.baselines.record(
            summary.scope_key.bucket,
            summary.scope_key.timeframe,
            summary.rr,
        );
        let baseline_rr = self
            .baselines
            .baseline_rr(summary.scope_key.bucket, summary.scope_key.timeframe);

        let mut shard = self
            .shards
            .entry(summary.scope_key.clone())
            .or_insert_with(|| ShardState {
                n: 0,
                mean: 0.0,
                m2: 0.0,
                positive_edge_count: 0,
                recurrence_score: 0.0,
                last_update_ts: summary.closed_at,
                health: PatternHealth::Active,
            });

        if shard.health == PatternHealth::Degraded {
            return Err(EngineError::AggregatorDegraded(format!(
                "{:?}",
                summary.scope_key
            )));
        }

        let elapsed_days = (summary.closed_at - shard.last_update_ts)
            .num_seconds()
            .max(0) as f64
            / 86_400.0;
        let alpha = 1.0 - (-elapsed_days / self.config.recurrence_tau_days).exp();
        shard.recurrence_score = shard.recurrence_score * (1.0 - alpha) + alpha;
        shard.last_update_ts = summary.closed_at;

        shard.n += 1;
        let delta = summary.rr - shard.mean;
        shard.mean += delta / shard.n as f64;
        let delta2 = summary.rr - shard.mean;
        shard.m2 += delta * delta2;

        if summary.rr > baseline_rr {
            shard.positive_edge_count += 1;
        }

        let support_mult = (shard.n as f64 / self.config.n_min as f64).min(1.0);
        let edge_raw = (shard.mean - baseline_rr) * shard.field_coherence() * support_mult;

        self.record_child(&summary.scope_key);

        Ok(PatternStats {
            scope_key: summary.scope_key.clone(),
            n: shard.n,
            avg_rr: shard.mean,
            var_rr: shard.variance(),
            edge_raw,
            recurrence_score: shard.recurrence_score,
            field_coherence: shard.field_coherence(),
            last_update_ts: shard.last_update_ts,
            health: shard.health,
        })
    }

    pub fn stats(&self, scope_key: &ScopeKey) -> Option<PatternStats> {
        self.shards.get(scope_key).map(|shard| {
            let baseline_rr = self.baselines.baseline_rr(scope_key.bucket, scope_key.timeframe);
            let support_mult = (shard.n as f64 / self.config.n_min as f64).min(1.0);
            PatternStats {
                scope_key: scope_key.clone(),
                n: shard.n,
                avg_rr: shard.mean,
                var_rr: shard.variance(),
                edge_raw: (shard.mean - baseline_rr) * shard.field_coherence() * support_mult,
                recurrence_score: shard.recurrence_score,
                field_coherence: shard.field_coherence(),
                last_update_ts: shard.last_update_ts,
                health: shard.health,
            }
        })
    }

    /// A pattern is actionable once it has enough samples and clears the
    /// edge threshold; both bucketed per the Lesson Builder module's
    /// authoritative defaults.
    pub fn is_actionable(&self, stats: &PatternStats) -> bool {
        stats.n >= self.config.n_min && stats.edge_raw >= self.config.edge_min
    }

    /// Marks a key degraded: its statistics are excluded from override
    /// materialization until recomputed. Never fatal to the process.
    pub fn degrade(&self, scope_key: &ScopeKey) {
        if let Some(mut shard) = self.shards.get_mut(scope_key) {
            shard.health = PatternHealth::Degraded;
        }
    }

    pub fn recompute(&self, scope_key: &ScopeKey) {
        if let Some(mut shard) = self.shards.get_mut(scope_key) {
            shard.health = PatternHealth::Active;
        }
    }

    fn parent_key(scope_key: &ScopeKey) -> ScopeKey {
        let mut parent = scope_key.clone();
        parent.motif = "*".to_string();
        parent
    }

    fn record_child(&self, scope_key: &ScopeKey) {
        let parent = Self::parent_key(scope_key);
        self.braid_children
            .entry(parent)
            .or_default()
            .insert(scope_key.motif.clone());
    }

    /// Promotes a parent scope to a braid once ≥3 child strands have
    /// accumulated, merging their running statistics by sample-weighted
    /// average. Patterns that fail to add incremental edge over their
    /// parent are left un-promoted (the caller checks `incremental_edge`
    /// before treating the braid as actionable).
    pub fn try_promote_braid(&self, parent_scope_key: &ScopeKey) -> Option<BraidRecord> {
        let parent = Self::parent_key(parent_scope_key);
        let children = self.braid_children.get(&parent)?;
        if children.len() < self.config.braid_min_children {
            return None;
        }

        let mut total_n = 0u64;
        let mut weighted_rr_sum = 0.0;
        let mut weighted_edge_sum = 0.0;
        let mut weighted_coherence_sum = 0.0;
        let mut latest_ts = parent_scope_key_placeholder_ts();

        for motif in children.iter() {
            let mut key = parent.clone();
            key.motif = motif.clone();
            if let Some(stats) = self.stats(&key) {
                total_n += stats.n;
                weighted_rr_sum += stats.avg_rr * stats.n as f64;
                weighted_edge_sum += stats.edge_raw * stats.n as f64;
                weighted_coherence_sum += stats.field_coherence * stats.n as f64;
                if stats.last_update_ts > latest_ts {
                    latest_ts = stats.last_update_ts;
                }
            }
        }

        if total_n == 0 {
            return None;
        }

        let merged = PatternStats {
            scope_key: parent.clone(),
            n: total_n,
            avg_rr: weighted_rr_sum / total_n as f64,
            var_rr: 0.0,
            edge_raw: weighted_edge_sum / total_n as f64,
            recurrence_score: 0.0,
            field_coherence: weighted_coherence_sum / total_n as f64,
            last_update_ts: latest_ts,
            health: PatternHealth::Active,
        };

        Some(BraidRecord {
            parent,
            child_count: children.len(),
            merged_stats: merged,
        })
    }

    /// Incremental edge of a child strand vs its parent braid; patterns
    /// that do not add edge over their parent are dropped by the caller.
    pub fn incremental_edge(&self, child: &PatternStats, parent: &PatternStats) -> f64 {
        child.edge_raw - parent.edge_raw
    }
}

fn parent_scope_key_placeholder_ts() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

#[cfg(test)]
mod tests {
    use super::*;
    use trend_core::{AppetiteMode, ContextSnapshot, Counterfactuals, Family, McapBucket, Phase, StateValue, Timeframe};

    fn scope_key(motif: &str) -> ScopeKey {
        ScopeKey {
            module: "signature".into(),
            family: Family::Lowcaps,
            state: StateValue::S3,
            motif: motif.into(),
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

    fn context() -> ContextSnapshot {
        ContextSnapshot {
            macro_phase: Phase::Expansion,
            meso_phase: Phase::Expansion,
            micro_phase: Phase::Expansion,
            bucket: McapBucket::Mid,
            family: Family::Lowcaps,
            a_mode: AppetiteMode::Aggressive,
            e_mode: AppetiteMode::Neutral,
            bucket_leader: true,
            bucket_rank: 1,
            timeframe: Timeframe::Hour1,
            refreshed_at: Utc::now(),
        }
    }

    fn summary(motif: &str, rr: f64, ts: DateTime<Utc>) -> TradeSummary {
        TradeSummary {
            position_id: 1,
            rr,
            max_dd: 0.1,
            time_to_payback_days: Some(1.0),
            counterfactuals: Counterfactuals {
                missed_entry_rr: 0.0,
                missed_exit_rr: 0.0,
            },
            scope_key: scope_key(motif),
            context: context(),
            closed_at: ts,
        }
    }

    #[test]
    fn ingest_accumulates_running_stats() {
        let aggregator = PatternAggregator::new(PatternAggregatorConfig::default());
        let t0 = Utc::now();
        aggregator.ingest(&summary("dx_reclaim", 1.0, t0)).unwrap();
        let stats = aggregator
            .ingest(&summary("dx_reclaim", 3.0, t0 + chrono::Duration::days(1)))
            .unwrap();
        assert_eq!(stats.n, 2);
        assert!((stats.avg_rr - 2.0).abs() < 1e-9);
    }

    #[test]
    fn degraded_key_is_excluded_until_recomputed() {
        let aggregator = PatternAggregator::new(PatternAggregatorConfig::default());
        let t0 = Utc::now();
        let key = scope_key("dx_reclaim");
        aggregator.ingest(&summary("dx_reclaim", 1.0, t0)).unwrap();
        aggregator.degrade(&key);
        let err = aggregator
            .ingest(&summary("dx_reclaim", 1.0, t0 + chrono::Duration::days(1)))
            .unwrap_err();
        assert!(matches!(err, EngineError::AggregatorDegraded(_)));
        aggregator.recompute(&key);
        assert!(aggregator
            .ingest(&summary("dx_reclaim", 1.0, t0 + chrono::Duration::days(2)))
            .is_ok());
    }

    #[test]
    fn braid_promotes_once_three_children_present() {
        let aggregator = PatternAggregator::new(PatternAggregatorConfig::default());
        let t0 = Utc::now();
        aggregator.ingest(&summary("motif_a", 1.0, t0)).unwrap();
        assert!(aggregator.try_promote_braid(&scope_key("motif_a")).is_none());

        aggregator.ingest(&summary("motif_b", 1.0, t0)).unwrap();
        aggregator.ingest(&summary("motif_c", 1.0, t0)).unwrap();

        let braid = aggregator.try_promote_braid(&scope_key("motif_a")).unwrap();
        assert_eq!(braid.child_count, 3);
        assert_eq!(braid.merged_stats.n, 3);
    }
}
