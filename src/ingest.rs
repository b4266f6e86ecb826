use serde_json::Value;
use tracing::debug;

use crate::error::{LogDrainError, Result};
use crate::model::IngestReceipt;
use crate::parser::SourcePayload;
use crate::store::LogStore;
use crate::verify;

/// Ingestion pipeline: gate → parse → persist → acknowledge. One
/// orchestration path for every source; only the webhook path carries the
/// verification gate in front of it.
pub struct IngestPipeline {
    store: LogStore,
    drain_secret: Option<String>,
}

impl IngestPipeline {
    pub fn new(store: LogStore, drain_secret: Option<String>) -> Self {
        Self {
            store,
            drain_secret,
        }
    }

    /// Webhook path. Probe detection and the signature gate both run before
    /// any parsing side effect; a signature mismatch rejects the whole batch
    /// with nothing persisted.
    pub async fn ingest_webhook(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<IngestReceipt> {
        if body.iter().all(u8::is_ascii_whitespace) {
            debug!("empty webhook body acknowledged as verification probe");
            return Ok(IngestReceipt::probe());
        }

        let decoded: Value = serde_json::from_slice(body)
            .map_err(|e| LogDrainError::InvalidPayload(e.to_string()))?;
        if verify::is_verification_probe(&decoded) {
            debug!("verification probe acknowledged");
            return Ok(IngestReceipt::probe());
        }

        verify::verify_signature(self.drain_secret.as_deref(), signature, body)?;
        self.ingest(SourcePayload::Webhook(decoded)).await
    }

    /// Syslog-transport path. No gate; unmatched frames were already dropped
    /// by the parser.
    pub async fn ingest_syslog(&self, body: String) -> Result<IngestReceipt> {
        self.ingest(SourcePayload::Syslog(body)).await
    }

    /// Persist candidate records in arrival order. `received` reports the
    /// records actually persisted; a store failure propagates, while parser
    /// skips only reduce the count.
    pub async fn ingest(&self, payload: SourcePayload) -> Result<IngestReceipt> {
        let source = payload.source();
        let outcome = payload.parse();
        if outcome.skipped > 0 {
            debug!(?source, skipped = outcome.skipped, "entries failed validation");
        }

        let mut received = 0usize;
        for record in &outcome.records {
            self.store.insert(record).await?;
            received += 1;
        }
        Ok(IngestReceipt::persisted(received))
    }
}
