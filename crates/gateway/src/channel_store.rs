use std::time::{SystemTime, UNIX_EPOCH};

use {
    async_trait::async_trait,
    beachat_engine::{ChannelStore, Error, HistoryEntry, Result},
    sqlx::SqlitePool,
};

/// SQLite-backed channel store.
pub struct SqliteChannelStore {
    pool: SqlitePool,
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

impl SqliteChannelStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the channels and messages table schema.
    pub async fn init(pool: &SqlitePool) -> anyhow::Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS channels (
                name       TEXT    PRIMARY KEY,
                created_at INTEGER NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                channel    TEXT    NOT NULL,
                created_at INTEGER NOT NULL,
                body       TEXT    NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_channel_created
             ON messages (channel, created_at DESC)",
        )
        .execute(pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ChannelStore for SqliteChannelStore {
    async fn channel_exists(&self, name: &str) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM channels WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::persistence("check channel existence", e))?;
        Ok(row.is_some())
    }

    async fn create_channel_if_absent(&self, name: &str) -> Result<()> {
        // Insert-if-absent in one statement: concurrent creators race inside
        // SQLite, not in the engine.
        sqlx::query("INSERT INTO channels (name, created_at) VALUES (?, ?) ON CONFLICT(name) DO NOTHING")
            .bind(name)
            .bind(now_ms())
            .execute(&self.pool)
            .await
            .map_err(|e| Error::persistence("create channel", e))?;
        Ok(())
    }

    async fn list_channels(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT name FROM channels ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::persistence("list channels", e))?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn append_message(&self, channel: &str, created_at: i64, body: &str) -> Result<i64> {
        let result =
            sqlx::query("INSERT INTO messages (channel, created_at, body) VALUES (?, ?, ?)")
                .bind(channel)
                .bind(created_at)
                .bind(body)
                .execute(&self.pool)
                .await
                .map_err(|e| Error::persistence("append message", e))?;
        Ok(result.last_insert_rowid())
    }

    async fn fetch_history(&self, channel: &str, limit: u32) -> Result<Vec<HistoryEntry>> {
        let mut rows: Vec<(i64, String)> = sqlx::query_as(
            "SELECT created_at, body FROM messages
             WHERE channel = ?
             ORDER BY created_at DESC, id DESC
             LIMIT ?",
        )
        .bind(channel)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::persistence("fetch history", e))?;

        // Most-recent `limit` rows, flipped to oldest-first for replay.
        rows.reverse();
        Ok(rows
            .into_iter()
            .map(|(created_at, body)| HistoryEntry { created_at, body })
            .collect())
    }
}
