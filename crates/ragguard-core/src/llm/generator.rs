//! Compliance answer generation over an LLM service

use super::{ChatMessage, Generator, LLMClient};
use crate::error::GenerationError;
use crate::types::RetrievedPassage;
use async_trait::async_trait;
use std::sync::Arc;

const SYSTEM_PROMPT: &str = "You are a technical audit assistant specialised in compliance.\n\
\n\
Rules:\n\
1. Answer ONLY from the approved document context provided by the user.\n\
2. If the context does not contain the information, say explicitly that it was not found in the documents.\n\
3. Never invent or speculate.\n\
4. Cite the document that supports each statement.\n\
5. Use precise technical language.\n\
6. Keep the answer objective, at most three paragraphs.\n\
7. Answer in the language of the question.";

/// Generator backed by a chat-completion client
pub struct LlmGenerator {
    client: Arc<dyn LLMClient>,
}

impl LlmGenerator {
    /// Create from LLM client
    pub fn new(client: Arc<dyn LLMClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Generator for LlmGenerator {
    async fn generate(
        &self,
        question: &str,
        passages: &[RetrievedPassage],
    ) -> Result<String, GenerationError> {
        if passages.is_empty() {
            return Err(GenerationError::Failed("no context passages".to_string()));
        }

        let messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(build_user_prompt(question, passages)),
        ];

        let answer = self.client.chat_completion(messages).await?;
        Ok(answer.trim().to_string())
    }

    fn model_name(&self) -> &str {
        self.client.model_name()
    }
}

fn build_user_prompt(question: &str, passages: &[RetrievedPassage]) -> String {
    let context = passages
        .iter()
        .map(|p| format!("Document: {}\n{}", p.source_id, p.text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");

    format!(
        "APPROVED DOCUMENT CONTEXT:\n{}\n\nQUESTION: {}\n\nANSWER (based ONLY on the context above):",
        context, question
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use std::sync::Mutex;

    struct ScriptedClient {
        reply: std::result::Result<String, LlmError>,
        seen: Mutex<Vec<ChatMessage>>,
    }

    #[async_trait]
    impl LLMClient for ScriptedClient {
        async fn chat_completion(
            &self,
            messages: Vec<ChatMessage>,
        ) -> std::result::Result<String, LlmError> {
            self.seen.lock().unwrap().extend(messages);
            self.reply.clone()
        }

        async fn embed(&self, _text: &str) -> std::result::Result<Vec<f32>, LlmError> {
            Ok(vec![0.0; 4])
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn passages() -> Vec<RetrievedPassage> {
        vec![
            RetrievedPassage::new("politica.pdf (p. 4)", "Use AES-256 at rest.", 0.85),
            RetrievedPassage::new("norma.pdf (p. 2)", "Rotate keys every 90 days.", 0.6),
        ]
    }

    #[test]
    fn test_prompt_includes_sources_and_question() {
        let prompt = build_user_prompt("How is data encrypted?", &passages());
        assert!(prompt.contains("Document: politica.pdf (p. 4)\nUse AES-256 at rest."));
        assert!(prompt.contains("---"));
        assert!(prompt.contains("QUESTION: How is data encrypted?"));
    }

    #[tokio::test]
    async fn test_generate_sends_system_and_user_messages() {
        let client = Arc::new(ScriptedClient {
            reply: Ok("  Data is encrypted with AES-256 [politica.pdf].  ".to_string()),
            seen: Mutex::new(Vec::new()),
        });
        let generator = LlmGenerator::new(client.clone());

        let answer = generator
            .generate("How is data encrypted?", &passages())
            .await
            .unwrap();
        assert_eq!(answer, "Data is encrypted with AES-256 [politica.pdf].");
        assert_eq!(generator.model_name(), "scripted");

        let seen = client.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].role, "system");
        assert!(seen[1].content.contains("norma.pdf (p. 2)"));
    }

    #[tokio::test]
    async fn test_rate_limit_maps_to_quota_exceeded() {
        let generator = LlmGenerator::new(Arc::new(ScriptedClient {
            reply: Err(LlmError::RateLimited("429 Too Many Requests".to_string())),
            seen: Mutex::new(Vec::new()),
        }));

        let err = generator.generate("question?", &passages()).await.unwrap_err();
        assert!(matches!(err, GenerationError::QuotaExceeded(_)));
    }
}
