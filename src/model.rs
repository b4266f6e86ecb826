use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;

/// 规范化日志记录。写入后不再变更，重复投递产生重复行（设计使然）。
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LogRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub source: LogSource,
    pub level: LogLevel,
    pub message: String,
    pub request_id: Option<String>,
    pub project_id: Option<String>,
    pub deployment_id: Option<String>,
    pub metadata: Json<Value>,
}

/// Candidate record produced by a source parser, not yet persisted.
#[derive(Debug, Clone, Serialize)]
pub struct NewLogRecord {
    pub timestamp: DateTime<Utc>,
    pub source: LogSource,
    pub level: LogLevel,
    pub message: String,
    pub request_id: Option<String>,
    pub project_id: Option<String>,
    pub deployment_id: Option<String>,
    pub metadata: Value,
}

/// Ingesting pipeline that produced a record; assigned by the pipeline,
/// never taken from the upstream payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum LogSource {
    Frontend,
    Backend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// Batch acknowledgement returned to the upstream platform.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IngestReceipt {
    pub received: usize,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub verification: bool,
}

impl IngestReceipt {
    pub fn persisted(received: usize) -> Self {
        Self {
            received,
            verification: false,
        }
    }

    /// Acknowledgement for a verification probe; nothing was parsed or stored.
    pub fn probe() -> Self {
        Self {
            received: 0,
            verification: true,
        }
    }
}

/// One (source, level, hour bucket) row from `logs.stats`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StatsBucket {
    pub source: LogSource,
    pub level: LogLevel,
    pub hour: String,
    pub count: i64,
}
