//! Generation boundary

use crate::error::GenerationError;
use crate::types::RetrievedPassage;
use async_trait::async_trait;

/// Produces a natural-language answer grounded in retrieved passages
#[async_trait]
pub trait Generator: Send + Sync {
    /// Answer `question` using only `passages` as context
    async fn generate(
        &self,
        question: &str,
        passages: &[RetrievedPassage],
    ) -> Result<String, GenerationError>;

    /// Get model name
    fn model_name(&self) -> &str;
}
