//! Request-scoped data model shared by the orchestrator and its services

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// One passage returned by the retriever
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    /// Document name plus page, e.g. `policy.pdf (p. 3)`
    pub source_id: String,
    pub text: String,
    /// Similarity in [0, 1]
    pub similarity_score: f64,
}

impl RetrievedPassage {
    pub fn new(source_id: impl Into<String>, text: impl Into<String>, score: f64) -> Self {
        Self {
            source_id: source_id.into(),
            text: text.into(),
            similarity_score: clamp_score(score),
        }
    }
}

/// Ranked passages for one question, best first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalResult {
    passages: Vec<RetrievedPassage>,
}

impl RetrievalResult {
    /// Build from passages in any order; scores are clamped and sorted descending
    pub fn new(mut passages: Vec<RetrievedPassage>) -> Self {
        for passage in &mut passages {
            passage.similarity_score = clamp_score(passage.similarity_score);
        }
        passages.sort_by(|a, b| {
            b.similarity_score
                .partial_cmp(&a.similarity_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Self { passages }
    }

    pub fn passages(&self) -> &[RetrievedPassage] {
        &self.passages
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    /// Score of the best passage, 0 when empty
    pub fn top_score(&self) -> f64 {
        self.passages
            .first()
            .map(|p| p.similarity_score)
            .unwrap_or(0.0)
    }

    /// Source ids in rank order with duplicates removed
    pub fn source_ids(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.passages
            .iter()
            .filter(|p| seen.insert(p.source_id.as_str()))
            .map(|p| p.source_id.clone())
            .collect()
    }
}

fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

/// Which path produced an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnswerMode {
    /// Generated by the model
    Llm,
    /// Generation skipped because retrieval confidence was low
    Fallback,
    /// Generation attempted or wanted but the dependency was unavailable
    Contingency,
}

impl fmt::Display for AnswerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Llm => "LLM",
            Self::Fallback => "FALLBACK",
            Self::Contingency => "CONTINGENCY",
        })
    }
}

/// Bucketed retrieval confidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceLabel {
    Alta,
    Media,
    Baixa,
}

impl ConfidenceLabel {
    /// Whether this level of confidence justifies calling the generator
    pub fn allows_generation(self) -> bool {
        !matches!(self, Self::Baixa)
    }
}

impl fmt::Display for ConfidenceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Alta => "ALTA",
            Self::Media => "MEDIA",
            Self::Baixa => "BAIXA",
        })
    }
}

/// Why a response was composed from passages instead of generated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    LowConfidence,
    QuotaExceeded,
    Timeout,
    BreakerOpen,
    GenerationFailed,
}

impl FallbackReason {
    /// Mode reported for answers degraded for this reason
    pub fn mode(self) -> AnswerMode {
        match self {
            Self::LowConfidence => AnswerMode::Fallback,
            _ => AnswerMode::Contingency,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Self::LowConfidence => "retrieved context has low relevance to the question",
            Self::QuotaExceeded => "the generation service quota was exceeded",
            Self::Timeout => "the generation service did not answer in time",
            Self::BreakerOpen => "the generation service is temporarily disabled after repeated failures",
            Self::GenerationFailed => "the generation service returned an error",
        }
    }
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LowConfidence => "low_confidence",
            Self::QuotaExceeded => "quota_exceeded",
            Self::Timeout => "timeout",
            Self::BreakerOpen => "breaker_open",
            Self::GenerationFailed => "generation_failed",
        })
    }
}

/// Final answer for one question. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub request_id: Uuid,
    pub answer_text: String,
    pub mode: AnswerMode,
    pub sources: Vec<String>,
    pub confidence_label: ConfidenceLabel,
    pub confidence_score: f64,
    pub timestamp: DateTime<Utc>,
    pub rate_limit_remaining: u32,
    /// Model that produced the text, `fallback` when composed from passages
    pub model: String,
    /// Number of passages the answer was built from
    pub documents_used: usize,
    pub degraded_reason: Option<FallbackReason>,
}
