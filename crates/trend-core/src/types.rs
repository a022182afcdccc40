use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single closed OHLCV bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub ts: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Timeframes tracked per instrument. Each instrument owns exactly one
/// `TimeframeStream` per variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    Min1,
    Min15,
    Hour1,
    Hour4,
}

impl Timeframe {
    pub const ALL: [Timeframe; 4] = [
        Timeframe::Min1,
        Timeframe::Min15,
        Timeframe::Hour1,
        Timeframe::Hour4,
    ];

    pub fn to_minutes(&self) -> i64 {
        match self {
            Timeframe::Min1 => 1,
            Timeframe::Min15 => 15,
            Timeframe::Hour1 => 60,
            Timeframe::Hour4 => 240,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Timeframe::Min1 => "1m",
            Timeframe::Min15 => "15m",
            Timeframe::Hour1 => "1h",
            Timeframe::Hour4 => "4h",
        };
        write!(f, "{s}")
    }
}

/// Instrument family, used for context and scope-key partitioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Family {
    Lowcaps,
    Perps,
    Majors,
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Family::Lowcaps => "lowcaps",
            Family::Perps => "perps",
            Family::Majors => "majors",
        };
        write!(f, "{s}")
    }
}

/// Market-cap bucket, used for global baselines and lesson scoping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum McapBucket {
    Nano,
    Micro,
    Mid,
    Big,
    Large,
    Xl,
}

impl fmt::Display for McapBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            McapBucket::Nano => "nano",
            McapBucket::Micro => "micro",
            McapBucket::Mid => "mid",
            McapBucket::Big => "big",
            McapBucket::Large => "large",
            McapBucket::Xl => "xl",
        };
        write!(f, "{s}")
    }
}

pub type InstrumentId = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub id: InstrumentId,
    pub family: Family,
    pub mcap_bucket: McapBucket,
    pub creation_time: DateTime<Utc>,
}

/// The EMA set computed by the Feature Builder, periods fixed by the
/// trend lifecycle design: {20,30,60,144,250,333}.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmaSet {
    pub ema20: f64,
    pub ema30: f64,
    pub ema60: f64,
    pub ema144: f64,
    pub ema250: f64,
    pub ema333: f64,
}

impl EmaSet {
    pub fn fast_band(&self) -> [f64; 2] {
        [self.ema20, self.ema30]
    }

    pub fn slow_band(&self) -> [f64; 3] {
        [self.ema144, self.ema250, self.ema333]
    }

    pub fn fast_band_max(&self) -> f64 {
        self.ema20.max(self.ema30)
    }

    pub fn fast_band_min(&self) -> f64 {
        self.ema20.min(self.ema30)
    }
}

/// Zig-zag swing metadata, derived from an ATR-adaptive percentage threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZigZagMeta {
    pub last_swing_high: f64,
    pub last_swing_low: f64,
    pub bars_since_swing: u32,
}

/// Derived per-bar feature bundle. Ephemeral: not persisted, recomputed
/// from the ring buffer on demand.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    pub tf: Timeframe,
    pub ts: DateTime<Utc>,
    pub ema: EmaSet,
    pub atr: f64,
    pub rsi: f64,
    pub rsi_slope_10: f64,
    pub adx: f64,
    pub adx_slope_10: f64,
    pub vol_z: f64,
    pub zigzag: ZigZagMeta,
    pub avwap_slope: f64,
    pub price: f64,
}

/// Trend lifecycle classification. `GlobalExit` is a sentinel emitted on
/// the transition event stream; the persisted `State.value` always settles
/// back to `S0` once the global-exit transition has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateValue {
    S0,
    S1,
    S2,
    S3,
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StateValue::S0 => "S0",
            StateValue::S1 => "S1",
            StateValue::S2 => "S2",
            StateValue::S3 => "S3",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub value: StateValue,
    pub entered_at: DateTime<Utc>,
    pub bars_in_state: u32,
}

/// Reason code attached to a state transition event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionReason {
    S0ToS1Primer,
    S1ToS2Defensive,
    S2ToS3Trending,
    GlobalExit,
    ReclaimEma333,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub tf: Timeframe,
    pub ts: DateTime<Utc>,
    pub from: StateValue,
    pub to: StateValue,
    pub reason: TransitionReason,
}

/// Bounded continuous behavioural signals, each clipped to [0,1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    pub ts: f64,
    pub ox: f64,
    pub dx: f64,
    pub edx: f64,
}

impl Signature {
    pub fn neutral() -> Self {
        Signature {
            ts: 0.0,
            ox: 0.0,
            dx: 0.0,
            edx: 0.0,
        }
    }
}

/// Macro/meso/micro phase tags and add/exit policy modes, refreshed at
/// least hourly by an external regime provider. Falls back to `Unknown`
/// when stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Unknown,
    Accumulation,
    Expansion,
    Distribution,
    Contraction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppetiteMode {
    Unknown,
    Aggressive,
    Neutral,
    Conservative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub macro_phase: Phase,
    pub meso_phase: Phase,
    pub micro_phase: Phase,
    pub bucket: McapBucket,
    pub family: Family,
    pub a_mode: AppetiteMode,
    pub e_mode: AppetiteMode,
    pub bucket_leader: bool,
    pub bucket_rank: u32,
    pub timeframe: Timeframe,
    pub refreshed_at: DateTime<Utc>,
}

impl ContextSnapshot {
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        (now - self.refreshed_at) > chrono::Duration::hours(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AppetiteBreakdown {
    pub phase_policy: f64,
    pub macro_adjustment: f64,
    pub cut_pressure: f64,
    pub intent_delta: f64,
    pub age_boost: f64,
    pub mcap_boost: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Appetite {
    pub a: f64,
    pub e: f64,
    pub components: AppetiteBreakdown,
}

/// One partial fill against an open position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub ts: DateTime<Utc>,
    pub price: f64,
    pub qty: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trim {
    pub ts: DateTime<Utc>,
    pub price: f64,
    pub fraction: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    GlobalExit,
    SignalExit,
    Operator,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Exit {
    pub ts: DateTime<Utc>,
    pub price: f64,
    pub reason: ExitReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    Closed,
}

pub type PositionId = u64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub instrument: InstrumentId,
    pub tf: Timeframe,
    pub opened_at: DateTime<Utc>,
    pub entries: Vec<Entry>,
    pub trims: Vec<Trim>,
    pub exit: Option<Exit>,
    pub status: PositionStatus,
    pub realized_rr: f64,
    pub max_dd: f64,
}

impl Position {
    pub fn qty_open(&self) -> f64 {
        let entered: f64 = self.entries.iter().map(|e| e.qty).sum();
        let trimmed: f64 = self
            .trims
            .iter()
            .map(|t| entered * t.fraction)
            .sum::<f64>()
            .min(entered);
        (entered - trimmed).max(0.0)
    }

    pub fn avg_entry_price(&self) -> f64 {
        let total_qty: f64 = self.entries.iter().map(|e| e.qty).sum();
        if total_qty <= 0.0 {
            return 0.0;
        }
        self.entries.iter().map(|e| e.price * e.qty).sum::<f64>() / total_qty
    }
}

/// The keyspace for pattern statistics: `module.family.state.motif`
/// cross-joined with ten context dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeKey {
    pub module: String,
    pub family: Family,
    pub state: StateValue,
    pub motif: String,
    pub macro_phase: Phase,
    pub meso_phase: Phase,
    pub micro_phase: Phase,
    pub bucket_leader: bool,
    pub bucket_rank: u32,
    pub market_family: Family,
    pub bucket: McapBucket,
    pub timeframe: Timeframe,
    pub a_mode: AppetiteMode,
    pub e_mode: AppetiteMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Counterfactuals {
    pub missed_entry_rr: f64,
    pub missed_exit_rr: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSummary {
    pub position_id: PositionId,
    pub rr: f64,
    pub max_dd: f64,
    pub time_to_payback_days: Option<f64>,
    pub counterfactuals: Counterfactuals,
    pub scope_key: ScopeKey,
    pub context: ContextSnapshot,
    pub closed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatternHealth {
    Active,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternStats {
    pub scope_key: ScopeKey,
    pub n: u64,
    pub avg_rr: f64,
    pub var_rr: f64,
    pub edge_raw: f64,
    pub recurrence_score: f64,
    pub field_coherence: f64,
    pub last_update_ts: DateTime<Utc>,
    pub health: PatternHealth,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLevers {
    pub entry_delay_bars: f64,
    pub phase1_frac_mult: f64,
    pub trim_delay_mult: f64,
    pub trail_mult: f64,
    pub signal_threshold_mult: f64,
}

impl ExecutionLevers {
    pub fn neutral() -> Self {
        ExecutionLevers {
            entry_delay_bars: 0.0,
            phase1_frac_mult: 1.0,
            trim_delay_mult: 1.0,
            trail_mult: 1.0,
            signal_threshold_mult: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    pub scope_key: ScopeKey,
    pub size_mult: f64,
    pub entry_aggression_mult: f64,
    pub exit_aggression_mult: f64,
    pub execution_levers: ExecutionLevers,
    pub strength: f64,
    pub issued_at: DateTime<Utc>,
}

/// A materialized, time-decayed snapshot of a Lesson's multipliers, as
/// read by the Appetite Calculator and Position Ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Override {
    pub scope_key: ScopeKey,
    pub size_mult: f64,
    pub entry_aggression_mult: f64,
    pub exit_aggression_mult: f64,
    pub execution_levers: ExecutionLevers,
    pub computed_at: DateTime<Utc>,
}

impl Override {
    pub fn neutral(scope_key: ScopeKey, computed_at: DateTime<Utc>) -> Self {
        Override {
            scope_key,
            size_mult: 1.0,
            entry_aggression_mult: 1.0,
            exit_aggression_mult: 1.0,
            execution_levers: ExecutionLevers::neutral(),
            computed_at,
        }
    }
}

/// Tagged event variants exchanged across the actor mesh and persistence
/// boundary, replacing dynamic dispatch / duck-typed pipelines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarEvent {
    pub instrument: InstrumentId,
    pub tf: Timeframe,
    pub bar: Bar,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureEvent {
    pub instrument: InstrumentId,
    pub features: FeatureSet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureEvent {
    pub instrument: InstrumentId,
    pub tf: Timeframe,
    pub ts: DateTime<Utc>,
    pub signature: Signature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Add,
    Trim,
    Exit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub instrument: InstrumentId,
    pub tf: Timeframe,
    pub side: OrderSide,
    pub size: f64,
    pub reason: String,
    pub state: StateValue,
    pub signature: Signature,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FillEvent {
    pub position_id: PositionId,
    pub ts: DateTime<Utc>,
    pub price: f64,
    pub qty: f64,
    pub fees: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CloseEvent {
    pub position_id: PositionId,
    pub close_price: f64,
    pub reason: ExitReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonUpdate {
    pub scope_key: ScopeKey,
    pub lesson: Lesson,
}
