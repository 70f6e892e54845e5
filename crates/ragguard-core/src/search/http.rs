//! Hybrid search against an Azure AI Search-compatible REST endpoint

use super::Retriever;
use crate::config::SearchServiceConfig;
use crate::error::{RagGuardError, Result, RetrievalError};
use crate::llm::LLMClient;
use crate::types::{RetrievalResult, RetrievedPassage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Retriever that embeds the question and runs a text + vector query
pub struct HttpSearchRetriever {
    http_client: reqwest::Client,
    config: SearchServiceConfig,
    embedder: Arc<dyn LLMClient>,
}

impl HttpSearchRetriever {
    /// Create with an existing embedding client
    pub fn new(config: SearchServiceConfig, embedder: Arc<dyn LLMClient>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(RagGuardError::Http)?;

        Ok(Self {
            http_client,
            config,
            embedder,
        })
    }

    fn search_url(&self) -> String {
        format!(
            "{}/indexes/{}/docs/search?api-version={}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.index_name,
            self.config.api_version
        )
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    search: &'a str,
    vector_queries: Vec<VectorQuery<'a>>,
    select: &'static str,
    top: usize,
}

#[derive(Debug, Serialize)]
struct VectorQuery<'a> {
    kind: &'static str,
    vector: Vec<f32>,
    k: usize,
    fields: &'a str,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    value: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(rename = "@search.score", default)]
    score: f64,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    source_file: Option<String>,
    #[serde(default)]
    page_number: Option<serde_json::Value>,
}

#[async_trait]
impl Retriever for HttpSearchRetriever {
    async fn search(
        &self,
        question: &str,
        k: usize,
    ) -> std::result::Result<RetrievalResult, RetrievalError> {
        let vector = self.embedder.embed(question).await?;

        let request = SearchRequest {
            search: question,
            vector_queries: vec![VectorQuery {
                kind: "vector",
                vector,
                k,
                fields: &self.config.vector_field,
            }],
            select: "content,source_file,page_number",
            top: k,
        };

        let mut req = self.http_client.post(self.search_url()).json(&request);
        if let Some(ref key) = self.config.api_key {
            req = req.header("api-key", key);
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                RetrievalError::Timeout(Duration::from_secs(self.config.timeout_secs))
            } else {
                RetrievalError::Unavailable(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RetrievalError::Unavailable(format!(
                "search service error (HTTP {}): {}",
                status, body
            )));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| RetrievalError::InvalidResponse(e.to_string()))?;

        let result = into_result(parsed, k);
        tracing::debug!(
            index = %self.config.index_name,
            passages = result.len(),
            top_score = result.top_score(),
            "search finished"
        );
        Ok(result)
    }

    fn name(&self) -> &str {
        &self.config.index_name
    }
}

fn into_result(response: SearchResponse, k: usize) -> RetrievalResult {
    let passages: Vec<RetrievedPassage> = response
        .value
        .into_iter()
        .filter_map(|hit| {
            let text = hit.content.filter(|c| !c.trim().is_empty())?;
            let source_id = format_source_id(hit.source_file.as_deref(), hit.page_number.as_ref());
            Some(RetrievedPassage::new(source_id, text, hit.score))
        })
        .collect();

    // Rank before capping; the backend does not guarantee order
    let ranked = RetrievalResult::new(passages);
    if ranked.len() <= k {
        return ranked;
    }
    RetrievalResult::new(ranked.passages()[..k].to_vec())
}

/// `"{source_file} (p. {page_number})"`, with placeholders for missing fields
fn format_source_id(source_file: Option<&str>, page: Option<&serde_json::Value>) -> String {
    let file = source_file
        .filter(|f| !f.is_empty())
        .unwrap_or("Unknown");
    let page = match page {
        Some(serde_json::Value::Number(n)) => n.to_string(),
        Some(serde_json::Value::String(s)) if !s.is_empty() => s.clone(),
        _ => "0".to_string(),
    };
    format!("{} (p. {})", file, page)
}
