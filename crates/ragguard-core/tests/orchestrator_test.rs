//! Integration tests for query orchestration
//!
//! Drives `QueryOrchestrator::ask` end to end with in-process retriever and
//! generator doubles and an in-memory audit sink.

use async_trait::async_trait;
use ragguard_core::{
    AnswerMode, AuditDigest, AuditLogger, AuditRecord, CircuitState, ConfidenceLabel,
    FallbackReason, GenerationError, Generator, MemoryAuditSink, OrchestratorConfig, QueryError,
    QueryOrchestrator, RetrievalError, RetrievalResult, RetrievedPassage, Retriever,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const QUESTION: &str = "Quais são os requisitos de criptografia para dados em repouso?";
const CLIENT: &str = "203.0.113.7";

struct MockRetriever {
    outcome: Result<Vec<RetrievedPassage>, RetrievalError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockRetriever {
    fn with_scores(scores: &[f64]) -> Self {
        let passages = scores
            .iter()
            .enumerate()
            .map(|(i, s)| {
                RetrievedPassage::new(
                    format!("politica_{}.pdf (p. {})", i + 1, i + 3),
                    format!("Passage {} text about encryption at rest.", i + 1),
                    *s,
                )
            })
            .collect();
        Self {
            outcome: Ok(passages),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    fn failing(error: RetrievalError) -> Self {
        Self {
            outcome: Err(error),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Retriever for MockRetriever {
    async fn search(&self, _question: &str, k: usize) -> Result<RetrievalResult, RetrievalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.outcome.clone().map(|mut passages| {
            passages.truncate(k);
            RetrievalResult::new(passages)
        })
    }

    fn name(&self) -> &str {
        "mock-index"
    }
}

enum Behavior {
    Answer(&'static str),
    Fail(GenerationError),
    Hang,
}

struct MockGenerator {
    behavior: Behavior,
    calls: AtomicUsize,
}

impl MockGenerator {
    fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn generate(
        &self,
        _question: &str,
        passages: &[RetrievedPassage],
    ) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(!passages.is_empty());
        match &self.behavior {
            Behavior::Answer(text) => Ok(text.to_string()),
            Behavior::Fail(e) => Err(e.clone()),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok("too late".to_string())
            }
        }
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}

struct Harness {
    orchestrator: QueryOrchestrator,
    retriever: Arc<MockRetriever>,
    generator: Arc<MockGenerator>,
    sink: Arc<MemoryAuditSink>,
}

impl Harness {
    fn new(retriever: MockRetriever, generator: MockGenerator) -> Self {
        Self::with_config(&OrchestratorConfig::default(), retriever, generator)
    }

    fn with_config(
        config: &OrchestratorConfig,
        retriever: MockRetriever,
        generator: MockGenerator,
    ) -> Self {
        let retriever = Arc::new(retriever);
        let generator = Arc::new(generator);
        let sink = Arc::new(MemoryAuditSink::new());
        let audit = AuditLogger::spawn(sink.clone(), 64, AuditDigest::default());
        let orchestrator =
            QueryOrchestrator::new(config, retriever.clone(), generator.clone(), audit);
        Self {
            orchestrator,
            retriever,
            generator,
            sink,
        }
    }

    async fn records(&self) -> Vec<AuditRecord> {
        self.orchestrator.audit().flush().await;
        self.sink.records()
    }
}

#[tokio::test]
async fn test_high_confidence_answer_is_generated() {
    let h = Harness::new(
        MockRetriever::with_scores(&[0.85, 0.6]),
        MockGenerator::new(Behavior::Answer("Dados devem usar AES-256 [politica_1.pdf].")),
    );

    let response = h.orchestrator.ask(CLIENT, QUESTION).await.unwrap();

    assert_eq!(response.mode, AnswerMode::Llm);
    assert_eq!(response.confidence_label, ConfidenceLabel::Alta);
    assert_eq!(response.confidence_score, 0.85);
    assert_eq!(response.sources.len(), 2);
    assert_eq!(response.documents_used, 2);
    assert_eq!(response.model, "mock-model");
    assert_eq!(response.rate_limit_remaining, 9);
    assert_eq!(response.degraded_reason, None);
    assert_eq!(response.answer_text, "Dados devem usar AES-256 [politica_1.pdf].");
    assert_eq!(h.orchestrator.circuit_breaker().consecutive_failures(), 0);
}

#[tokio::test]
async fn test_every_answer_has_matching_audit_event() {
    let h = Harness::new(
        MockRetriever::with_scores(&[0.85, 0.6]),
        MockGenerator::new(Behavior::Answer("answer")),
    );

    let response = h.orchestrator.ask(CLIENT, QUESTION).await.unwrap();
    let records = h.records().await;

    assert_eq!(records.len(), 1);
    let AuditRecord::Answer(event) = &records[0] else {
        panic!("expected answer record, got {:?}", records[0]);
    };
    assert_eq!(event.request_id, response.request_id);
    assert_eq!(event.sources, response.sources);
    assert_eq!(event.confidence_label, response.confidence_label);
    assert_eq!(event.confidence_score, response.confidence_score);
    assert_eq!(event.mode, response.mode);
    assert_eq!(event.question_hash, AuditDigest::default().digest(QUESTION));
    assert_eq!(event.client_id_hash, AuditDigest::default().digest(CLIENT));
}

#[tokio::test]
async fn test_quota_exceeded_degrades_to_contingency() {
    let h = Harness::new(
        MockRetriever::with_scores(&[0.85, 0.6]),
        MockGenerator::new(Behavior::Fail(GenerationError::QuotaExceeded(
            "429 Too Many Requests".to_string(),
        ))),
    );

    let response = h.orchestrator.ask(CLIENT, QUESTION).await.unwrap();

    assert_eq!(response.mode, AnswerMode::Contingency);
    assert_eq!(response.degraded_reason, Some(FallbackReason::QuotaExceeded));
    assert_eq!(response.model, "fallback");
    assert_eq!(response.confidence_label, ConfidenceLabel::Alta);
    assert!(response.answer_text.contains("Passage 1 text about encryption at rest."));
    assert!(response.answer_text.contains("Passage 2 text about encryption at rest."));
    assert!(response.answer_text.contains("politica_1.pdf (p. 3)"));
    assert_eq!(h.orchestrator.circuit_breaker().consecutive_failures(), 1);
    assert_eq!(h.generator.calls(), 1);

    let records = h.records().await;
    let AuditRecord::Answer(event) = &records[0] else {
        panic!("expected answer record");
    };
    assert_eq!(event.mode, AnswerMode::Contingency);
    assert_eq!(event.degraded_reason, Some(FallbackReason::QuotaExceeded));
}

#[tokio::test]
async fn test_low_confidence_never_calls_generator() {
    let h = Harness::new(
        MockRetriever::with_scores(&[0.3, 0.2]),
        MockGenerator::new(Behavior::Answer("should not be used")),
    );

    let response = h.orchestrator.ask(CLIENT, QUESTION).await.unwrap();

    assert_eq!(response.mode, AnswerMode::Fallback);
    assert_eq!(response.confidence_label, ConfidenceLabel::Baixa);
    assert_eq!(response.degraded_reason, Some(FallbackReason::LowConfidence));
    assert!(!response.answer_text.contains("should not be used"));
    assert_eq!(h.generator.calls(), 0);
}

#[tokio::test]
async fn test_low_confidence_falls_back_even_with_open_breaker() {
    let h = Harness::new(
        MockRetriever::with_scores(&[0.1]),
        MockGenerator::new(Behavior::Answer("unused")),
    );
    for _ in 0..3 {
        let permit = h.orchestrator.circuit_breaker().acquire().unwrap();
        permit.fail();
    }
    assert_eq!(h.orchestrator.circuit_breaker().state(), CircuitState::Open);

    let response = h.orchestrator.ask(CLIENT, QUESTION).await.unwrap();
    assert_eq!(response.mode, AnswerMode::Fallback);
    assert_eq!(response.degraded_reason, Some(FallbackReason::LowConfidence));
}

#[tokio::test]
async fn test_medium_confidence_attempts_generation() {
    let h = Harness::new(
        MockRetriever::with_scores(&[0.6]),
        MockGenerator::new(Behavior::Answer("generated")),
    );

    let response = h.orchestrator.ask(CLIENT, QUESTION).await.unwrap();
    assert_eq!(response.confidence_label, ConfidenceLabel::Media);
    assert_eq!(response.mode, AnswerMode::Llm);
    assert_eq!(h.generator.calls(), 1);
}

#[tokio::test]
async fn test_breaker_opens_after_three_failures() {
    let h = Harness::new(
        MockRetriever::with_scores(&[0.9]),
        MockGenerator::new(Behavior::Fail(GenerationError::Failed("500".to_string()))),
    );

    for _ in 0..3 {
        let response = h.orchestrator.ask(CLIENT, QUESTION).await.unwrap();
        assert_eq!(response.degraded_reason, Some(FallbackReason::GenerationFailed));
    }
    assert_eq!(h.orchestrator.circuit_breaker().state(), CircuitState::Open);

    let response = h.orchestrator.ask(CLIENT, QUESTION).await.unwrap();
    assert_eq!(response.mode, AnswerMode::Contingency);
    assert_eq!(response.degraded_reason, Some(FallbackReason::BreakerOpen));
    assert_eq!(h.generator.calls(), 3, "open breaker must not invoke the generator");
}

#[tokio::test(start_paused = true)]
async fn test_generation_timeout_counts_as_breaker_failure() {
    let h = Harness::new(
        MockRetriever::with_scores(&[0.9, 0.8]),
        MockGenerator::new(Behavior::Hang),
    );

    let response = h.orchestrator.ask(CLIENT, QUESTION).await.unwrap();

    assert_eq!(response.mode, AnswerMode::Contingency);
    assert_eq!(response.degraded_reason, Some(FallbackReason::Timeout));
    assert_eq!(h.orchestrator.circuit_breaker().consecutive_failures(), 1);
}

#[tokio::test]
async fn test_eleventh_request_is_rate_limited() {
    let h = Harness::new(
        MockRetriever::with_scores(&[0.85]),
        MockGenerator::new(Behavior::Answer("ok")),
    );

    for expected_remaining in (0..10).rev() {
        let response = h.orchestrator.ask(CLIENT, QUESTION).await.unwrap();
        assert_eq!(response.rate_limit_remaining, expected_remaining);
    }

    let err = h.orchestrator.ask(CLIENT, QUESTION).await.unwrap_err();
    match err {
        QueryError::RateLimited { retry_after } => {
            assert!(retry_after <= Duration::from_secs(60));
        }
        other => panic!("expected rate limit, got {:?}", other),
    }
    assert_eq!(h.retriever.calls(), 10, "denied request must not reach retrieval");

    // Other clients keep their own budget
    assert!(h.orchestrator.ask("198.51.100.1", QUESTION).await.is_ok());

    let records = h.records().await;
    let rejections = records
        .iter()
        .filter(|r| matches!(r, AuditRecord::Rejection(e) if e.reason == "rate_limited"))
        .count();
    assert_eq!(rejections, 1);
}

#[tokio::test]
async fn test_invalid_question_consumes_no_quota() {
    let h = Harness::new(
        MockRetriever::with_scores(&[0.85]),
        MockGenerator::new(Behavior::Answer("ok")),
    );

    let err = h
        .orchestrator
        .ask(CLIENT, "<script>alert(1)</script> what?")
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::Validation(_)));
    assert_eq!(h.orchestrator.rate_limiter().remaining(CLIENT), 10);
    assert_eq!(h.retriever.calls(), 0);

    let records = h.records().await;
    let AuditRecord::Rejection(event) = &records[0] else {
        panic!("expected rejection record");
    };
    assert_eq!(event.reason, "validation");
    assert!(event.question_hash.is_none());
}

#[tokio::test]
async fn test_retrieval_failure_is_surfaced() {
    let h = Harness::new(
        MockRetriever::failing(RetrievalError::Unavailable("connection refused".to_string())),
        MockGenerator::new(Behavior::Answer("ok")),
    );

    let err = h.orchestrator.ask(CLIENT, QUESTION).await.unwrap_err();
    assert!(matches!(err, QueryError::Retrieval(RetrievalError::Unavailable(_))));
    assert_eq!(h.generator.calls(), 0);

    let records = h.records().await;
    let AuditRecord::Rejection(event) = &records[0] else {
        panic!("expected rejection record");
    };
    assert_eq!(event.reason, "retrieval_failed");
    assert_eq!(
        event.question_hash.as_deref(),
        Some(AuditDigest::default().digest(QUESTION).as_str())
    );
}

#[tokio::test(start_paused = true)]
async fn test_slow_retrieval_times_out() {
    let mut retriever = MockRetriever::with_scores(&[0.9]);
    retriever.delay = Some(Duration::from_secs(600));
    let h = Harness::new(retriever, MockGenerator::new(Behavior::Answer("ok")));

    let err = h.orchestrator.ask(CLIENT, QUESTION).await.unwrap_err();
    assert!(matches!(err, QueryError::Retrieval(RetrievalError::Timeout(_))));
}

#[tokio::test]
async fn test_empty_retrieval_is_no_context() {
    let h = Harness::new(
        MockRetriever::with_scores(&[]),
        MockGenerator::new(Behavior::Answer("ok")),
    );

    let err = h.orchestrator.ask(CLIENT, QUESTION).await.unwrap_err();
    assert!(matches!(err, QueryError::NoContext));
    assert_eq!(h.generator.calls(), 0);
}

#[tokio::test]
async fn test_mean_aggregation_and_top_k() {
    let config = OrchestratorConfig {
        confidence_aggregation: ragguard_core::ConfidenceAggregation::Mean,
        top_k: 2,
        ..OrchestratorConfig::default()
    };
    let h = Harness::with_config(
        &config,
        MockRetriever::with_scores(&[0.9, 0.5, 0.1]),
        MockGenerator::new(Behavior::Answer("ok")),
    );

    let response = h.orchestrator.ask(CLIENT, QUESTION).await.unwrap();
    assert_eq!(response.documents_used, 2);
    assert!((response.confidence_score - 0.7).abs() < 1e-9);
    assert_eq!(response.confidence_label, ConfidenceLabel::Media);
}

#[tokio::test]
async fn test_concurrent_requests_respect_limit() {
    let h = Arc::new(Harness::new(
        MockRetriever::with_scores(&[0.85]),
        MockGenerator::new(Behavior::Answer("ok")),
    ));

    let tasks: Vec<_> = (0..25)
        .map(|_| {
            let h = h.clone();
            tokio::spawn(async move { h.orchestrator.ask(CLIENT, QUESTION).await })
        })
        .collect();

    let mut allowed = 0;
    for task in tasks {
        if task.await.unwrap().is_ok() {
            allowed += 1;
        }
    }
    assert_eq!(allowed, 10);
}
