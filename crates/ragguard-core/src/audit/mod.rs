//! Privacy-preserving audit trail
//!
//! The request path only enqueues records; a background worker drains the
//! queue into an [`AuditSink`]. Questions and client ids are digested here,
//! before a record leaves the logger, and answer text is never recorded.

mod digest;
mod sink;

pub use digest::AuditDigest;
pub use sink::{AuditSink, AuditSinkError, JsonLinesAuditSink, MemoryAuditSink, TracingAuditSink};

use crate::config::{AuditConfig, AuditSinkKind};
use crate::error::{QueryError, RagGuardError, Result};
use crate::types::{AnswerMode, AnswerResponse, ConfidenceLabel, FallbackReason};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Audit record for a served answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub request_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub client_id_hash: String,
    pub question_hash: String,
    pub sources: Vec<String>,
    pub confidence_label: ConfidenceLabel,
    pub confidence_score: f64,
    pub mode: AnswerMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<FallbackReason>,
}

/// Audit record for a request that ended without an answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectionEvent {
    pub request_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub client_id_hash: String,
    /// Absent when the question never passed validation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_hash: Option<String>,
    /// Machine-readable kind, see [`QueryError::kind`]
    pub reason: String,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditRecord {
    Answer(AuditEvent),
    Rejection(RejectionEvent),
}

impl AuditRecord {
    pub fn request_id(&self) -> Uuid {
        match self {
            Self::Answer(e) => e.request_id,
            Self::Rejection(e) => e.request_id,
        }
    }
}

enum AuditCommand {
    Record(Box<AuditRecord>),
    Flush(oneshot::Sender<()>),
}

/// Cheap-to-clone handle onto the audit queue
#[derive(Clone)]
pub struct AuditLogger {
    tx: mpsc::Sender<AuditCommand>,
    digest: AuditDigest,
    dropped: Arc<AtomicU64>,
}

impl AuditLogger {
    /// Start the background writer on the current tokio runtime
    pub fn spawn(sink: Arc<dyn AuditSink>, capacity: usize, digest: AuditDigest) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        tracing::debug!(sink = sink.name(), capacity, "starting audit writer");
        tokio::spawn(run_writer(sink, rx));
        Self {
            tx,
            digest,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Build the configured sink and start the writer
    pub async fn from_config(config: &AuditConfig) -> Result<Self> {
        let sink: Arc<dyn AuditSink> = match config.sink {
            AuditSinkKind::Tracing => Arc::new(TracingAuditSink),
            AuditSinkKind::Memory => Arc::new(MemoryAuditSink::new()),
            AuditSinkKind::Jsonl => {
                let path = config.path.as_ref().ok_or_else(|| {
                    RagGuardError::Config("audit.path is required for the jsonl sink".into())
                })?;
                let sink = JsonLinesAuditSink::open(path).await.map_err(|e| {
                    RagGuardError::Config(format!(
                        "cannot open audit log {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                Arc::new(sink)
            }
        };
        Ok(Self::spawn(
            sink,
            config.channel_capacity,
            AuditDigest::new(config.hash_key.as_deref()),
        ))
    }

    /// Enqueue a record without waiting. A full or closed queue drops the
    /// record and bumps [`dropped`](Self::dropped); the caller never fails.
    pub fn record(&self, record: AuditRecord) {
        let request_id = record.request_id();
        if let Err(e) = self.tx.try_send(AuditCommand::Record(Box::new(record))) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => "queue full",
                mpsc::error::TrySendError::Closed(_) => "writer stopped",
            };
            tracing::warn!(%request_id, reason, "audit record dropped");
        }
    }

    /// Record a served answer. Returns the event that was enqueued.
    pub fn record_answer(
        &self,
        client_id: &str,
        question: &str,
        response: &AnswerResponse,
    ) -> AuditEvent {
        let event = AuditEvent {
            request_id: response.request_id,
            timestamp: response.timestamp,
            client_id_hash: self.digest.digest(client_id),
            question_hash: self.digest.digest(question),
            sources: response.sources.clone(),
            confidence_label: response.confidence_label,
            confidence_score: response.confidence_score,
            mode: response.mode,
            degraded_reason: response.degraded_reason,
        };
        self.record(AuditRecord::Answer(event.clone()));
        event
    }

    /// Record a request that ended in `error`
    pub fn record_rejection(
        &self,
        request_id: Uuid,
        client_id: &str,
        question: Option<&str>,
        error: &QueryError,
    ) {
        self.record_rejected_request(
            request_id,
            client_id,
            question,
            error.kind(),
            &error.to_string(),
        );
    }

    /// Record a request refused before reaching the orchestrator, such as a
    /// body that is not valid JSON
    pub fn record_rejected_request(
        &self,
        request_id: Uuid,
        client_id: &str,
        question: Option<&str>,
        reason: &str,
        detail: &str,
    ) {
        self.record(AuditRecord::Rejection(RejectionEvent {
            request_id,
            timestamp: Utc::now(),
            client_id_hash: self.digest.digest(client_id),
            question_hash: question.map(|q| self.digest.digest(q)),
            reason: reason.to_string(),
            detail: detail.to_string(),
        }));
    }

    /// Wait until every record enqueued before this call has reached the sink
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(AuditCommand::Flush(ack_tx)).await.is_err() {
            return;
        }
        let _ = ack_rx.await;
    }

    /// Records lost to back-pressure since start
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn digest(&self) -> &AuditDigest {
        &self.digest
    }
}

async fn run_writer(sink: Arc<dyn AuditSink>, mut rx: mpsc::Receiver<AuditCommand>) {
    while let Some(command) = rx.recv().await {
        match command {
            AuditCommand::Record(record) => {
                if let Err(e) = sink.append(&record).await {
                    tracing::warn!(
                        sink = sink.name(),
                        request_id = %record.request_id(),
                        error = %e,
                        "audit sink write failed"
                    );
                }
            }
            AuditCommand::Flush(ack) => {
                if let Err(e) = sink.flush().await {
                    tracing::warn!(sink = sink.name(), error = %e, "audit sink flush failed");
                }
                let _ = ack.send(());
            }
        }
    }
    let _ = sink.flush().await;
    tracing::debug!(sink = sink.name(), "audit writer stopped");
}
