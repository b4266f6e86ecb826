use std::sync::OnceLock;

use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;
use serde_json::{Map, Value};

use crate::model::{LogLevel, LogSource, NewLogRecord};

/// 来源解析器：按上游格式把原始载荷转换为候选日志记录。
/// 新增上游平台时在此补充变体，管线编排保持单一路径。
#[derive(Debug, Clone)]
pub enum SourcePayload {
    /// JSON webhook batch: a single object or an array of objects.
    Webhook(Value),
    /// Newline-delimited syslog-transport frames.
    Syslog(String),
}

/// Result of parsing one raw payload. `skipped` counts entries rejected by
/// per-record validation on the webhook path; syslog lines that do not match
/// the frame grammar are dropped without counting anywhere.
#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub records: Vec<NewLogRecord>,
    pub skipped: usize,
}

impl SourcePayload {
    pub fn source(&self) -> LogSource {
        match self {
            SourcePayload::Webhook(_) => LogSource::Frontend,
            SourcePayload::Syslog(_) => LogSource::Backend,
        }
    }

    pub fn parse(&self) -> ParseOutcome {
        match self {
            SourcePayload::Webhook(body) => parse_webhook(body),
            SourcePayload::Syslog(text) => parse_syslog(text),
        }
    }
}

fn parse_webhook(body: &Value) -> ParseOutcome {
    let entries: Vec<&Value> = match body {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };

    let mut outcome = ParseOutcome::default();
    for entry in entries {
        match webhook_record(entry) {
            Some(record) => outcome.records.push(record),
            None => outcome.skipped += 1,
        }
    }
    outcome
}

/// Envelope fields promoted into `metadata` instead of first-class columns.
const WEBHOOK_ENVELOPE_FIELDS: &[&str] = &["host", "path", "statusCode", "buildId"];

fn webhook_record(entry: &Value) -> Option<NewLogRecord> {
    let timestamp = parse_timestamp(entry.get("timestamp")?)?;

    let level = match entry.get("type").and_then(Value::as_str) {
        Some("stderr") => LogLevel::Error,
        _ => LogLevel::Info,
    };

    let mut metadata = Map::new();
    for key in WEBHOOK_ENVELOPE_FIELDS {
        if let Some(value) = entry.get(*key) {
            if !value.is_null() {
                metadata.insert((*key).to_string(), value.clone());
            }
        }
    }

    Some(NewLogRecord {
        timestamp,
        source: LogSource::Frontend,
        level,
        message: entry
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        request_id: string_field(entry, "requestId"),
        project_id: string_field(entry, "projectId"),
        deployment_id: string_field(entry, "deploymentId"),
        metadata: Value::Object(metadata),
    })
}

fn string_field(entry: &Value, key: &str) -> Option<String> {
    entry.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Frame grammar: priority tag + version, timestamp, host, app, procid,
/// msgid, then the free-text message.
fn syslog_frame_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^<\d+>1 (\S+) (\S+) (\S+) (\S+) (\S+) (.*)$").unwrap())
}

/// Bracketed correlation-id convention carried inside the message body.
fn request_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[request_id: ([\w-]+)\]").unwrap())
}

fn parse_syslog(text: &str) -> ParseOutcome {
    let mut outcome = ParseOutcome::default();
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let Some(caps) = syslog_frame_re().captures(line) else {
            continue;
        };
        // An unparseable timestamp disqualifies the frame the same way a
        // grammar mismatch does.
        let Some(timestamp) = parse_timestamp_str(&caps[1]) else {
            continue;
        };

        let message = caps[6].to_string();
        let request_id = request_id_re()
            .captures(&message)
            .map(|c| c[1].to_string());

        let mut metadata = Map::new();
        metadata.insert("hostname".to_string(), Value::String(caps[2].to_string()));
        metadata.insert("appname".to_string(), Value::String(caps[3].to_string()));
        metadata.insert("procid".to_string(), Value::String(caps[4].to_string()));
        metadata.insert("msgid".to_string(), Value::String(caps[5].to_string()));

        outcome.records.push(NewLogRecord {
            timestamp,
            source: LogSource::Backend,
            level: infer_level(&message),
            message,
            request_id,
            project_id: None,
            deployment_id: None,
            metadata: Value::Object(metadata),
        });
    }
    outcome
}

/// `error` wins over `warn` when both substrings appear.
fn infer_level(message: &str) -> LogLevel {
    let lower = message.to_lowercase();
    if lower.contains("error") {
        LogLevel::Error
    } else if lower.contains("warn") {
        LogLevel::Warn
    } else {
        LogLevel::Info
    }
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        // Epoch milliseconds, the webhook platform's native representation.
        Value::Number(n) => Utc.timestamp_millis_opt(n.as_i64()?).single(),
        Value::String(s) => parse_timestamp_str(s),
        _ => None,
    }
}

pub(crate) fn parse_timestamp_str(input: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn webhook_batch_skips_invalid_timestamps() {
        let body = json!([
            { "timestamp": 1714521600000i64, "message": "ok" },
            { "timestamp": "not-a-date", "message": "bad" },
            { "message": "missing" },
            { "timestamp": "2024-05-01T00:00:00Z", "type": "stderr", "message": "boom" }
        ]);

        let outcome = SourcePayload::Webhook(body).parse();
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.skipped, 2);
        assert_eq!(outcome.records[0].level, LogLevel::Info);
        assert_eq!(outcome.records[1].level, LogLevel::Error);
        assert_eq!(outcome.records[1].message, "boom");
    }

    #[test]
    fn webhook_single_object_and_envelope_metadata() {
        let body = json!({
            "timestamp": "2024-05-01T12:00:00Z",
            "message": "GET /health",
            "requestId": "req-1",
            "projectId": "prj-1",
            "deploymentId": "dpl-1",
            "host": "app.example.com",
            "path": "/health",
            "statusCode": 200
        });

        let outcome = SourcePayload::Webhook(body).parse();
        assert_eq!(outcome.records.len(), 1);
        let rec = &outcome.records[0];
        assert_eq!(rec.source, LogSource::Frontend);
        assert_eq!(rec.request_id.as_deref(), Some("req-1"));
        assert_eq!(rec.project_id.as_deref(), Some("prj-1"));
        assert_eq!(rec.deployment_id.as_deref(), Some("dpl-1"));
        assert_eq!(rec.metadata["host"], "app.example.com");
        assert_eq!(rec.metadata["statusCode"], 200);
        // buildId absent upstream, absent in metadata
        assert!(rec.metadata.get("buildId").is_none());
    }

    #[test]
    fn syslog_unmatched_lines_drop_silently() {
        let text = "garbage line\n\
                    <40>1 2024-05-01T12:00:00Z host app proc msg hello world\n\
                    <40>1 bad-timestamp host app proc msg oops\n";

        let outcome = SourcePayload::Syslog(text.to_string()).parse();
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.skipped, 0);
        assert_eq!(outcome.records[0].message, "hello world");
        assert_eq!(outcome.records[0].source, LogSource::Backend);
        assert_eq!(outcome.records[0].metadata["hostname"], "host");
        assert_eq!(outcome.records[0].metadata["msgid"], "msg");
    }

    #[test]
    fn syslog_extracts_bracketed_request_id() {
        let text = "<40>1 2024-05-01T12:00:00Z host app proc msg \
                    handling [request_id: abc-123] done";
        let outcome = SourcePayload::Syslog(text.to_string()).parse();
        assert_eq!(outcome.records[0].request_id.as_deref(), Some("abc-123"));
    }

    #[test]
    fn syslog_level_inference_error_wins() {
        let cases = [
            ("all good", LogLevel::Info),
            ("WARNING: low disk", LogLevel::Warn),
            ("Error: it broke", LogLevel::Error),
            ("warn then ERROR", LogLevel::Error),
        ];
        for (msg, expected) in cases {
            assert_eq!(infer_level(msg), expected, "message: {msg}");
        }
    }

    #[test]
    fn timestamp_formats() {
        assert!(parse_timestamp(&json!(1714521600000i64)).is_some());
        assert!(parse_timestamp_str("2024-05-01T00:00:00+02:00").is_some());
        assert!(parse_timestamp_str("2024-05-01 00:00:00.123").is_some());
        assert!(parse_timestamp_str("yesterday").is_none());
    }
}
