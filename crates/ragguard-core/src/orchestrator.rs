//! Query orchestration
//!
//! One question flows through validation, admission, retrieval, confidence
//! gating, and then either generation (through the circuit breaker) or a
//! degraded answer composed from the retrieved passages. Every outcome,
//! answer or rejection, is handed to the audit logger before returning.

use crate::audit::AuditLogger;
use crate::breaker::{BreakerError, CircuitBreaker};
use crate::config::{Config, OrchestratorConfig};
use crate::confidence::{ConfidenceAssessment, ConfidenceGate};
use crate::error::{GenerationError, QueryError, Result, RetrievalError};
use crate::fallback::FallbackComposer;
use crate::limiter::{Admission, RateLimiter};
use crate::llm::{Generator, LlmGenerator, OpenAiCompatClient};
use crate::search::{HttpSearchRetriever, Retriever};
use crate::types::{AnswerMode, AnswerResponse, FallbackReason, RetrievalResult};
use crate::validation::validate_question;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Model name reported for answers not produced by the generator
pub const FALLBACK_MODEL: &str = "fallback";

const PREVIEW_CHARS: usize = 40;

pub struct QueryOrchestrator {
    limiter: Arc<RateLimiter>,
    breaker: Arc<CircuitBreaker>,
    gate: ConfidenceGate,
    composer: FallbackComposer,
    retriever: Arc<dyn Retriever>,
    generator: Arc<dyn Generator>,
    audit: AuditLogger,
    top_k: usize,
    retrieval_timeout: Duration,
    generation_timeout: Duration,
    compliance_level: String,
}

impl QueryOrchestrator {
    pub fn new(
        config: &OrchestratorConfig,
        retriever: Arc<dyn Retriever>,
        generator: Arc<dyn Generator>,
        audit: AuditLogger,
    ) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::new(
                config.rate_limit_per_window,
                config.rate_limit_window(),
            )),
            breaker: Arc::new(CircuitBreaker::new(
                config.breaker_failure_threshold,
                config.breaker_cooldown(),
            )),
            gate: ConfidenceGate::new(
                config.confidence_high_threshold,
                config.confidence_low_threshold,
                config.confidence_aggregation,
            ),
            composer: FallbackComposer::new(config.fallback_excerpt_chars),
            retriever,
            generator,
            audit,
            top_k: config.top_k.max(1),
            retrieval_timeout: config.retrieval_timeout(),
            generation_timeout: config.generation_timeout(),
            compliance_level: config.compliance_level.clone(),
        }
    }

    /// Wire HTTP collaborators and the audit sink from a full configuration
    pub async fn from_config(config: &Config) -> Result<Self> {
        let llm = Arc::new(OpenAiCompatClient::new(config.llm_service.clone())?);
        let retriever = HttpSearchRetriever::new(config.search_service.clone(), llm.clone())?;
        let generator = LlmGenerator::new(llm);
        let audit = AuditLogger::from_config(&config.audit).await?;

        Ok(Self::new(
            &config.orchestrator,
            Arc::new(retriever),
            Arc::new(generator),
            audit,
        ))
    }

    /// Share a limiter with other orchestrators
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    /// Share a breaker with other orchestrators
    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    pub fn retriever_name(&self) -> &str {
        self.retriever.name()
    }

    pub fn model_name(&self) -> &str {
        self.generator.model_name()
    }

    pub fn compliance_level(&self) -> &str {
        &self.compliance_level
    }

    /// Answer one question for `client_id`.
    ///
    /// Generation failures never surface here; they degrade the answer to
    /// `CONTINGENCY` mode. Only validation, admission, retrieval and an empty
    /// corpus end the request with an error.
    pub async fn ask(
        &self,
        client_id: &str,
        question: &str,
    ) -> std::result::Result<AnswerResponse, QueryError> {
        let request_id = Uuid::new_v4();

        let question = match validate_question(question) {
            Ok(q) => q,
            Err(e) => return Err(self.reject(request_id, client_id, None, e.into())),
        };
        tracing::debug!(
            %request_id,
            preview = %preview(&question),
            "question accepted"
        );

        let remaining = match self.limiter.admit(client_id) {
            Admission::Allowed { remaining } => remaining,
            Admission::Denied { retry_after } => {
                return Err(self.reject(
                    request_id,
                    client_id,
                    Some(&question),
                    QueryError::RateLimited { retry_after },
                ));
            }
        };

        let result = match self.retrieve(&question).await {
            Ok(result) => result,
            Err(e) => return Err(self.reject(request_id, client_id, Some(&question), e.into())),
        };
        if result.is_empty() {
            return Err(self.reject(request_id, client_id, Some(&question), QueryError::NoContext));
        }

        let assessment = self.gate.evaluate(&result);

        let outcome = if assessment.label.allows_generation() {
            self.generate(&question, &result).await
        } else {
            Err(FallbackReason::LowConfidence)
        };

        let (answer_text, mode, model, degraded_reason) = match outcome {
            Ok(text) => (
                text,
                AnswerMode::Llm,
                self.generator.model_name().to_string(),
                None,
            ),
            Err(reason) => match self.composer.compose(&result, reason) {
                Ok(text) => (text, reason.mode(), FALLBACK_MODEL.to_string(), Some(reason)),
                Err(_) => {
                    return Err(self.reject(
                        request_id,
                        client_id,
                        Some(&question),
                        QueryError::NoContext,
                    ))
                }
            },
        };

        let response = self.build_response(
            request_id,
            answer_text,
            mode,
            model,
            degraded_reason,
            &result,
            assessment,
            remaining,
        );
        self.audit.record_answer(client_id, &question, &response);

        tracing::info!(
            %request_id,
            mode = %response.mode,
            confidence = %response.confidence_label,
            confidence_score = response.confidence_score,
            documents_used = response.documents_used,
            degraded_reason = ?response.degraded_reason,
            "question answered"
        );
        Ok(response)
    }

    async fn retrieve(&self, question: &str) -> std::result::Result<RetrievalResult, RetrievalError> {
        match tokio::time::timeout(self.retrieval_timeout, self.retriever.search(question, self.top_k))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(RetrievalError::Timeout(self.retrieval_timeout)),
        }
    }

    /// Generate through the breaker. The timeout sits inside the breaker call
    /// so an elapsed deadline counts as a failure.
    async fn generate(
        &self,
        question: &str,
        result: &RetrievalResult,
    ) -> std::result::Result<String, FallbackReason> {
        let outcome = self
            .breaker
            .call(|| async {
                match tokio::time::timeout(
                    self.generation_timeout,
                    self.generator.generate(question, result.passages()),
                )
                .await
                {
                    Ok(generated) => generated,
                    Err(_) => Err(GenerationError::Timeout(self.generation_timeout)),
                }
            })
            .await;

        match outcome {
            Ok(text) => Ok(text),
            Err(BreakerError::Open { retry_after }) => {
                tracing::debug!(
                    retry_after_secs = retry_after.as_secs(),
                    "circuit open, skipping generation"
                );
                Err(FallbackReason::BreakerOpen)
            }
            Err(BreakerError::Failed(e)) => {
                tracing::warn!(
                    error = %e,
                    state = %self.breaker.state(),
                    "generation failed, composing contingency answer"
                );
                Err(match e {
                    GenerationError::Timeout(_) => FallbackReason::Timeout,
                    GenerationError::QuotaExceeded(_) => FallbackReason::QuotaExceeded,
                    GenerationError::Failed(_) => FallbackReason::GenerationFailed,
                })
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn build_response(
        &self,
        request_id: Uuid,
        answer_text: String,
        mode: AnswerMode,
        model: String,
        degraded_reason: Option<FallbackReason>,
        result: &RetrievalResult,
        assessment: ConfidenceAssessment,
        rate_limit_remaining: u32,
    ) -> AnswerResponse {
        AnswerResponse {
            request_id,
            answer_text,
            mode,
            sources: result.source_ids(),
            confidence_label: assessment.label,
            confidence_score: assessment.score,
            timestamp: Utc::now(),
            rate_limit_remaining,
            model,
            documents_used: result.len(),
            degraded_reason,
        }
    }

    fn reject(
        &self,
        request_id: Uuid,
        client_id: &str,
        question: Option<&str>,
        error: QueryError,
    ) -> QueryError {
        self.audit
            .record_rejection(request_id, client_id, question, &error);
        match error {
            QueryError::Retrieval(ref e) => {
                tracing::error!(%request_id, error = %e, "retrieval failed")
            }
            ref other => tracing::info!(%request_id, kind = other.kind(), "request rejected"),
        }
        error
    }
}

fn preview(question: &str) -> String {
    match question.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &question[..idx]),
        None => question.to_string(),
    }
}
