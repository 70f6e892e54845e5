//! RagGuard Core Library
//!
//! Resilient orchestration of retrieval-augmented compliance questions.
//!
//! # Features
//! - Per-client fixed-window rate limiting
//! - Confidence gating on retrieval scores
//! - Circuit breaking around the generation service
//! - Deterministic degraded answers quoted from approved documents
//! - Non-blocking, privacy-preserving audit trail

pub mod audit;
pub mod breaker;
pub mod confidence;
pub mod config;
pub mod error;
pub mod fallback;
pub mod limiter;
pub mod llm;
pub mod orchestrator;
pub mod search;
pub mod types;
pub mod validation;

pub use audit::{
    AuditDigest, AuditEvent, AuditLogger, AuditRecord, AuditSink, JsonLinesAuditSink,
    MemoryAuditSink, RejectionEvent, TracingAuditSink,
};
pub use breaker::{BreakerError, BreakerSnapshot, CircuitBreaker, CircuitState};
pub use confidence::{ConfidenceAggregation, ConfidenceAssessment, ConfidenceGate};
pub use config::{
    AuditConfig, AuditSinkKind, Config, LLMServiceConfig, OrchestratorConfig, SearchServiceConfig,
    ServerConfig,
};
pub use error::{
    Error, GenerationError, QueryError, RagGuardError, Result, RetrievalError, ValidationError,
};
pub use fallback::{FallbackComposer, NoContext};
pub use limiter::{Admission, RateLimiter};
pub use llm::{ChatMessage, Generator, LLMClient, LlmGenerator, OpenAiCompatClient};
pub use orchestrator::QueryOrchestrator;
pub use search::{HttpSearchRetriever, Retriever};
pub use types::{
    AnswerMode, AnswerResponse, ConfidenceLabel, FallbackReason, RetrievalResult, RetrievedPassage,
};
pub use validation::validate_question;

/// Default config directory name
pub const CONFIG_DIR_NAME: &str = "ragguard";
