//! Retrieval boundary
//!
//! Provides:
//! - The [`Retriever`] trait the orchestrator searches through
//! - A hybrid (text + vector) retriever for Azure AI Search-compatible indexes

mod http;

pub use http::HttpSearchRetriever;

use crate::error::RetrievalError;
use crate::types::RetrievalResult;
use async_trait::async_trait;

/// Similarity search over the approved document corpus
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Return at most `k` passages ranked by descending similarity
    async fn search(&self, question: &str, k: usize) -> Result<RetrievalResult, RetrievalError>;

    /// Backend name for health reporting
    fn name(&self) -> &str;
}
