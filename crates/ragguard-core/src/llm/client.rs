//! HTTP client for OpenAI-compatible inference services

use crate::config::LLMServiceConfig;
use crate::error::{GenerationError, RagGuardError, Result, RetrievalError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Transport-level failure talking to the inference service
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("service error (HTTP {status}): {body}")]
    Status { status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl From<LlmError> for GenerationError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Timeout(d) => GenerationError::Timeout(d),
            LlmError::RateLimited(msg) => GenerationError::QuotaExceeded(msg),
            other => GenerationError::Failed(other.to_string()),
        }
    }
}

impl From<LlmError> for RetrievalError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Timeout(d) => RetrievalError::Timeout(d),
            LlmError::InvalidResponse(msg) => RetrievalError::InvalidResponse(msg),
            other => RetrievalError::Unavailable(format!("embedding service: {}", other)),
        }
    }
}

/// Trait for LLM service clients
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Generate chat completion
    async fn chat_completion(&self, messages: Vec<ChatMessage>) -> std::result::Result<String, LlmError>;

    /// Generate embedding for text
    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, LlmError>;

    /// Get model name
    fn model_name(&self) -> &str;
}

/// Chat message for completion requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// OpenAI-compatible client (vLLM, Azure OpenAI behind a compatible gateway, ...)
pub struct OpenAiCompatClient {
    http_client: reqwest::Client,
    config: LLMServiceConfig,
}

impl OpenAiCompatClient {
    /// Create new client from configuration
    pub fn new(config: LLMServiceConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(RagGuardError::Http)?;

        Ok(Self {
            http_client,
            config,
        })
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let req = self.http_client.post(url);
        match self.config.api_key {
            Some(ref api_key) => req.header("Authorization", format!("Bearer {}", api_key)),
            None => req,
        }
    }

    async fn send_json<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        body: &B,
    ) -> std::result::Result<R, LlmError> {
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let response = self
            .request(url)
            .json(body)
            .send()
            .await
            .map_err(|e| classify_transport_error(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), body, timeout));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl LLMClient for OpenAiCompatClient {
    async fn chat_completion(&self, messages: Vec<ChatMessage>) -> std::result::Result<String, LlmError> {
        #[derive(Serialize)]
        struct ChatRequest<'a> {
            model: &'a str,
            messages: Vec<ChatMessage>,
            temperature: f32,
            max_tokens: u32,
        }

        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<ChatChoice>,
        }

        #[derive(Deserialize)]
        struct ChatChoice {
            message: ChatMessage,
        }

        // Deterministic output for compliance answers
        let request = ChatRequest {
            model: &self.config.model,
            messages,
            temperature: 0.0,
            max_tokens: self.config.max_tokens,
        };

        let url = format!("{}/v1/chat/completions", self.config.url.trim_end_matches('/'));
        let start = std::time::Instant::now();
        let response: ChatResponse = self.send_json(&url, &request).await?;
        tracing::debug!(
            model = %self.config.model,
            latency_ms = start.elapsed().as_millis() as u64,
            "chat completion finished"
        );

        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| LlmError::InvalidResponse("no completion returned".to_string()))
    }

    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, LlmError> {
        #[derive(Serialize)]
        struct EmbedRequest<'a> {
            model: &'a str,
            input: Vec<&'a str>,
        }

        #[derive(Deserialize)]
        struct EmbedResponse {
            data: Vec<EmbedData>,
        }

        #[derive(Deserialize)]
        struct EmbedData {
            embedding: Vec<f32>,
        }

        let request = EmbedRequest {
            model: &self.config.embedding_model,
            input: vec![text],
        };

        let url = format!(
            "{}/v1/embeddings",
            self.config.embeddings_url().trim_end_matches('/')
        );
        let response: EmbedResponse = self.send_json(&url, &request).await?;

        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| LlmError::InvalidResponse("no embedding returned".to_string()))
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

fn classify_transport_error(e: reqwest::Error, timeout: Duration) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout(timeout)
    } else {
        LlmError::Transport(e.to_string())
    }
}

fn classify_status(status: u16, body: String, timeout: Duration) -> LlmError {
    match status {
        429 => LlmError::RateLimited(body),
        408 | 504 => LlmError::Timeout(timeout),
        _ => LlmError::Status { status, body },
    }
}
