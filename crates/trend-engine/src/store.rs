//! Durable store for trade summaries, pattern statistics and lessons: a
//! thin pool-holding struct with `query`/`query_as`-shaped methods
//! returning `anyhow::Result`, the same shape the rest of this stack's
//! persistence layer uses. Scope keys are stored as their canonical JSON
//! encoding (they already derive `Serialize`/`Deserialize`) so the schema
//! doesn't need to track every `ScopeKey` field as its own column.

use anyhow::Result;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use trend_core::{Lesson, PatternStats, ScopeKey, TradeSummary};

pub struct PersistenceStore {
    pool: SqlitePool,
}

impl PersistenceStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(PersistenceStore { pool })
    }

    pub async fn save_trade_summary(&self, summary: &TradeSummary) -> Result<()> {
        let scope_key = serde_json::to_string(&summary.scope_key)?;
        let payload = serde_json::to_string(summary)?;
        sqlx::query("INSERT INTO trade_summaries (scope_key, closed_at, payload) VALUES (?, ?, ?)")
            .bind(scope_key)
            .bind(summary.closed_at.to_rfc3339())
            .bind(payload)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn save_pattern_stats(&self, stats: &PatternStats) -> Result<()> {
        let scope_key = serde_json::to_string(&stats.scope_key)?;
        let payload = serde_json::to_string(stats)?;
        sqlx::query(
            "INSERT INTO pattern_stats (scope_key, payload) VALUES (?, ?)
             ON CONFLICT(scope_key) DO UPDATE SET payload = excluded.payload",
        )
        .bind(scope_key)
        .bind(payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_lesson(&self, scope_key: &ScopeKey) -> Result<Option<Lesson>> {
        let key = serde_json::to_string(scope_key)?;
        let row = sqlx::query("SELECT payload FROM lessons WHERE scope_key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| {
            let payload: String = row.try_get("payload")?;
            Ok(serde_json::from_str(&payload)?)
        })
        .transpose()
    }

    pub async fn save_lesson(&self, lesson: &Lesson) -> Result<()> {
        let key = serde_json::to_string(&lesson.scope_key)?;
        let payload = serde_json::to_string(lesson)?;
        sqlx::query(
            "INSERT INTO lessons (scope_key, payload) VALUES (?, ?)
             ON CONFLICT(scope_key) DO UPDATE SET payload = excluded.payload",
        )
        .bind(key)
        .bind(payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
