use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::types::Json;

use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::model::{LogRecord, NewLogRecord, StatsBucket};

/// 追加式日志存储。持有唯一的连接池句柄，按需显式传递，无全局状态。
#[derive(Clone)]
pub struct LogStore {
    pool: SqlitePool,
}

/// Append-only table plus the three retrieval indexes the query tools rely
/// on: descending-timestamp scans, level filtering, request-id lookup.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        source TEXT NOT NULL,
        level TEXT NOT NULL,
        message TEXT NOT NULL DEFAULT '',
        request_id TEXT,
        project_id TEXT,
        deployment_id TEXT,
        metadata TEXT NOT NULL DEFAULT '{}'
    )",
    "CREATE INDEX IF NOT EXISTS idx_logs_timestamp ON logs (timestamp DESC)",
    "CREATE INDEX IF NOT EXISTS idx_logs_level_timestamp ON logs (level, timestamp DESC)",
    "CREATE INDEX IF NOT EXISTS idx_logs_request_id ON logs (request_id)",
];

impl LogStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options: SqliteConnectOptions = config.url.parse::<SqliteConnectOptions>()?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// In-memory store. A single pooled connection, since every new SQLite
    /// `:memory:` connection would otherwise see a fresh database.
    pub async fn connect_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub async fn insert(&self, record: &NewLogRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO logs (timestamp, source, level, message, request_id, \
             project_id, deployment_id, metadata) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(record.timestamp)
        .bind(record.source)
        .bind(record.level)
        .bind(&record.message)
        .bind(record.request_id.as_deref())
        .bind(record.project_id.as_deref())
        .bind(record.deployment_id.as_deref())
        .bind(Json(&record.metadata))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recent records, newest first.
    pub async fn recent(&self, limit: i64) -> Result<Vec<LogRecord>> {
        let rows = sqlx::query_as::<_, LogRecord>(
            "SELECT id, timestamp, source, level, message, request_id, \
             project_id, deployment_id, metadata \
             FROM logs ORDER BY timestamp DESC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Inclusive time range, newest first.
    pub async fn time_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<LogRecord>> {
        let rows = sqlx::query_as::<_, LogRecord>(
            "SELECT id, timestamp, source, level, message, request_id, \
             project_id, deployment_id, metadata \
             FROM logs WHERE timestamp >= ?1 AND timestamp <= ?2 \
             ORDER BY timestamp DESC",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn errors_only(&self, limit: i64) -> Result<Vec<LogRecord>> {
        let rows = sqlx::query_as::<_, LogRecord>(
            "SELECT id, timestamp, source, level, message, request_id, \
             project_id, deployment_id, metadata \
             FROM logs WHERE level = 'error' ORDER BY timestamp DESC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Case-insensitive substring match on `message`. The user term is
    /// escaped so `%` and `_` never act as wildcards.
    pub async fn search(&self, term: &str, limit: i64) -> Result<Vec<LogRecord>> {
        let pattern = format!("%{}%", escape_like(term));
        let rows = sqlx::query_as::<_, LogRecord>(
            "SELECT id, timestamp, source, level, message, request_id, \
             project_id, deployment_id, metadata \
             FROM logs WHERE message LIKE ?1 ESCAPE '\\' \
             ORDER BY timestamp DESC LIMIT ?2",
        )
        .bind(pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// All records sharing a correlation id, oldest first, reconstructing
    /// the request's lifecycle chronologically.
    pub async fn by_request(&self, request_id: &str) -> Result<Vec<LogRecord>> {
        let rows = sqlx::query_as::<_, LogRecord>(
            "SELECT id, timestamp, source, level, message, request_id, \
             project_id, deployment_id, metadata \
             FROM logs WHERE request_id = ?1 ORDER BY timestamp ASC",
        )
        .bind(request_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Counts grouped by (source, level, hour bucket) over the trailing
    /// window. The cutoff is bound as a typed timestamp; `hours` must
    /// already be validated positive by the caller.
    pub async fn stats(&self, hours: i64) -> Result<Vec<StatsBucket>> {
        let cutoff = Utc::now() - Duration::hours(hours);
        let rows = sqlx::query_as::<_, StatsBucket>(
            "SELECT source, level, \
             strftime('%Y-%m-%dT%H:00:00Z', timestamp) AS hour, \
             COUNT(*) AS count \
             FROM logs WHERE timestamp > ?1 \
             GROUP BY source, level, hour ORDER BY hour DESC",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::escape_like;

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("100%_done"), "100\\%\\_done");
        assert_eq!(escape_like(r"back\slash"), r"back\\slash");
        assert_eq!(escape_like("plain"), "plain");
    }
}
