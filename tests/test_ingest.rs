use serde_json::json;

use log_drain_mcp::error::LogDrainError;
use log_drain_mcp::ingest::IngestPipeline;
use log_drain_mcp::model::{LogLevel, LogSource};
use log_drain_mcp::store::LogStore;
use log_drain_mcp::verify;

async fn pipeline(secret: Option<&str>) -> (IngestPipeline, LogStore) {
    let store = LogStore::connect_in_memory().await.unwrap();
    let pipeline = IngestPipeline::new(store.clone(), secret.map(str::to_string));
    (pipeline, store)
}

#[tokio::test]
async fn received_equals_persisted_count() {
    let (pipeline, store) = pipeline(None).await;

    let body = json!([
        { "timestamp": "2024-05-01T10:00:00Z", "message": "one" },
        { "timestamp": "not a date", "message": "skipped" },
        { "timestamp": 1714558800000i64, "message": "two" },
        { "message": "no timestamp" }
    ])
    .to_string();

    let receipt = pipeline.ingest_webhook(body.as_bytes(), None).await.unwrap();
    assert_eq!(receipt.received, 2);
    assert!(!receipt.verification);

    let rows = store.recent(10).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.source == LogSource::Frontend));
    // The invalid entries never appear in the store.
    assert!(rows.iter().all(|r| r.message == "one" || r.message == "two"));
}

#[tokio::test]
async fn probe_never_reaches_store() {
    let (pipeline, store) = pipeline(Some("hush")).await;

    for body in [&b"{}"[..], &b"[]"[..], &b"  "[..]] {
        let receipt = pipeline.ingest_webhook(body, None).await.unwrap();
        assert_eq!(receipt.received, 0);
        assert!(receipt.verification);
    }
    assert!(store.recent(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn signature_gate_accepts_and_rejects() {
    let (pipeline, store) = pipeline(Some("hush")).await;
    let body = br#"[{"timestamp":"2024-05-01T10:00:00Z","message":"signed"}]"#;

    let bad = verify::sign("other-secret", body);
    let err = pipeline
        .ingest_webhook(body, Some(&bad))
        .await
        .expect_err("mismatched signature must reject the batch");
    assert!(matches!(err, LogDrainError::InvalidSignature));
    assert!(store.recent(10).await.unwrap().is_empty());

    let good = verify::sign("hush", body);
    let receipt = pipeline.ingest_webhook(body, Some(&good)).await.unwrap();
    assert_eq!(receipt.received, 1);
    assert_eq!(store.recent(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn syslog_frames_persist_with_correlation_ids() {
    let (pipeline, store) = pipeline(None).await;

    let body = "<40>1 2024-05-01T10:00:00Z web.1 phoenix 123 - \
                request started [request_id: abc-123]\n\
                totally not syslog\n\
                <40>1 2024-05-01T10:00:01Z web.1 phoenix 123 - \
                ERROR request failed [request_id: abc-123]\n";

    let receipt = pipeline.ingest_syslog(body.to_string()).await.unwrap();
    assert_eq!(receipt.received, 2);

    let rows = store.by_request("abc-123").await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].source, LogSource::Backend);
    assert_eq!(rows[0].level, LogLevel::Info);
    assert_eq!(rows[1].level, LogLevel::Error);
    // Chronological reconstruction of the request lifecycle.
    assert!(rows[0].timestamp < rows[1].timestamp);
    assert_eq!(rows[0].metadata.0["appname"], "phoenix");
}

#[tokio::test]
async fn duplicate_delivery_double_counts_by_design() {
    let (pipeline, store) = pipeline(None).await;
    let body = json!([{ "timestamp": "2024-05-01T10:00:00Z", "message": "retry me" }]).to_string();

    pipeline.ingest_webhook(body.as_bytes(), None).await.unwrap();
    pipeline.ingest_webhook(body.as_bytes(), None).await.unwrap();

    assert_eq!(store.recent(10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn undecodable_body_is_invalid_payload() {
    let (pipeline, store) = pipeline(None).await;
    let err = pipeline
        .ingest_webhook(b"{\"unterminated", None)
        .await
        .expect_err("bad json must be rejected");
    assert!(matches!(err, LogDrainError::InvalidPayload(_)));
    assert!(store.recent(10).await.unwrap().is_empty());
}
