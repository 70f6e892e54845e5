//! Degraded-mode answers composed straight from retrieved passages

use crate::types::{FallbackReason, RetrievalResult};
use thiserror::Error;

/// Nothing was retrieved, so there is nothing to compose from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no context available")]
pub struct NoContext;

/// Builds deterministic answers from passage text and source ids.
/// Never calls the generator.
#[derive(Debug, Clone)]
pub struct FallbackComposer {
    max_excerpt_chars: usize,
}

impl FallbackComposer {
    pub fn new(max_excerpt_chars: usize) -> Self {
        Self {
            max_excerpt_chars: max_excerpt_chars.max(1),
        }
    }

    pub fn compose(
        &self,
        result: &RetrievalResult,
        reason: FallbackReason,
    ) -> Result<String, NoContext> {
        if result.is_empty() {
            return Err(NoContext);
        }

        let mut answer = format!(
            "[Degraded mode: {}] Automatic answer generation was not used because {}. \
             The excerpts below are quoted verbatim from the approved documents that best \
             match your question.\n",
            reason.mode(),
            reason.describe()
        );

        for (idx, passage) in result.passages().iter().enumerate() {
            answer.push_str(&format!(
                "\n[{}] {} (relevance {:.0}%)\n{}\n",
                idx + 1,
                passage.source_id,
                passage.similarity_score * 100.0,
                excerpt(&passage.text, self.max_excerpt_chars)
            ));
        }

        answer.push_str(&format!("\nSources: {}", result.source_ids().join("; ")));
        Ok(answer)
    }
}

impl Default for FallbackComposer {
    fn default() -> Self {
        Self::new(600)
    }
}

/// Collapse whitespace and cut to at most `max_chars` characters, preferring a
/// word boundary, with a trailing ellipsis when shortened
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");

    let cut = match normalized.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => byte_idx,
        None => return normalized,
    };

    let head = &normalized[..cut];
    // Only back off to a space if it keeps most of the budget
    let end = match head.rfind(' ') {
        Some(space) if space >= cut / 2 => space,
        _ => cut,
    };

    format!("{}...", head[..end].trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RetrievedPassage;

    fn two_passages() -> RetrievalResult {
        RetrievalResult::new(vec![
            RetrievedPassage::new(
                "politica_seguranca.pdf (p. 4)",
                "Dados em repouso devem ser criptografados com AES-256.",
                0.85,
            ),
            RetrievedPassage::new(
                "norma_interna.pdf (p. 12)",
                "Chaves são rotacionadas a cada 90 dias.",
                0.6,
            ),
        ])
    }

    #[test]
    fn test_compose_contains_notice_passages_and_sources() {
        let answer = FallbackComposer::default()
            .compose(&two_passages(), FallbackReason::QuotaExceeded)
            .unwrap();

        assert!(answer.starts_with("[Degraded mode: CONTINGENCY]"));
        assert!(answer.contains("quota was exceeded"));
        assert!(answer.contains("[1] politica_seguranca.pdf (p. 4) (relevance 85%)"));
        assert!(answer.contains("Dados em repouso devem ser criptografados com AES-256."));
        assert!(answer.contains("[2] norma_interna.pdf (p. 12) (relevance 60%)"));
        assert!(answer.ends_with("Sources: politica_seguranca.pdf (p. 4); norma_interna.pdf (p. 12)"));
    }

    #[test]
    fn test_low_confidence_is_fallback_mode() {
        let answer = FallbackComposer::default()
            .compose(&two_passages(), FallbackReason::LowConfidence)
            .unwrap();
        assert!(answer.starts_with("[Degraded mode: FALLBACK]"));
        assert!(answer.contains("low relevance"));
    }

    #[test]
    fn test_compose_is_deterministic() {
        let composer = FallbackComposer::default();
        let a = composer.compose(&two_passages(), FallbackReason::Timeout).unwrap();
        let b = composer.compose(&two_passages(), FallbackReason::Timeout).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_result_is_no_context() {
        let composer = FallbackComposer::default();
        assert_eq!(
            composer.compose(&RetrievalResult::default(), FallbackReason::BreakerOpen),
            Err(NoContext)
        );
    }

    #[test]
    fn test_excerpt_short_text_untouched() {
        assert_eq!(excerpt("Hello   world\n", 100), "Hello world");
    }

    #[test]
    fn test_excerpt_cuts_on_word_boundary() {
        let text = "alpha beta gamma delta epsilon";
        assert_eq!(excerpt(text, 13), "alpha beta...");
    }

    #[test]
    fn test_excerpt_multibyte_safe() {
        let text = "ção".repeat(100);
        let out = excerpt(&text, 10);
        assert_eq!(out.chars().count(), 13);
        assert!(out.ends_with("..."));
    }
}
