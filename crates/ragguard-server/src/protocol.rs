//! HTTP wire types

use chrono::{DateTime, Utc};
use ragguard_core::{
    AnswerMode, AnswerResponse, BreakerSnapshot, CircuitState, ConfidenceLabel, FallbackReason,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `POST /ask_compliance` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    /// Missing is treated as empty and rejected by validation
    #[serde(default)]
    pub question: String,
}

/// Successful answer, in generated and degraded modes alike
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskResponse {
    pub answer: String,
    pub sources: Vec<String>,
    pub confidence: ConfidenceLabel,
    pub confidence_score: f64,
    pub mode: AnswerMode,
    pub documents_used: usize,
    pub metadata: ResponseMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub compliance_level: String,
    pub rate_limit_remaining: u32,
    pub request_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<FallbackReason>,
}

impl AskResponse {
    pub fn from_answer(answer: AnswerResponse, compliance_level: &str) -> Self {
        Self {
            answer: answer.answer_text,
            sources: answer.sources,
            confidence: answer.confidence_label,
            confidence_score: answer.confidence_score,
            mode: answer.mode,
            documents_used: answer.documents_used,
            metadata: ResponseMetadata {
                timestamp: answer.timestamp,
                model: answer.model,
                compliance_level: compliance_level.to_string(),
                rate_limit_remaining: answer.rate_limit_remaining,
                request_id: answer.request_id,
                degraded_reason: answer.degraded_reason,
            },
        }
    }
}

/// Error body for every non-2xx response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable kind (`validation`, `rate_limited`, ...)
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_remaining: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            rate_limit_remaining: None,
            retry_after_seconds: None,
        }
    }
}

/// `GET /health` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `healthy` while the breaker is closed, `degraded` otherwise
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub breaker: BreakerHealth,
    pub retriever: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerHealth {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure_secs_ago: Option<u64>,
}

impl From<BreakerSnapshot> for BreakerHealth {
    fn from(snapshot: BreakerSnapshot) -> Self {
        Self {
            state: snapshot.state,
            consecutive_failures: snapshot.consecutive_failures,
            last_failure_secs_ago: snapshot.last_failure_secs_ago,
        }
    }
}
