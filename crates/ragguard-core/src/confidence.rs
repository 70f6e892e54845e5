//! Confidence gating from retrieval scores

use crate::types::{ConfidenceLabel, RetrievalResult};
use serde::{Deserialize, Serialize};

/// How passage scores collapse into one confidence score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceAggregation {
    /// Score of the best passage
    #[default]
    Top,
    /// Mean over all returned passages
    Mean,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceAssessment {
    pub score: f64,
    pub label: ConfidenceLabel,
}

#[derive(Debug, Clone)]
pub struct ConfidenceGate {
    high_threshold: f64,
    low_threshold: f64,
    aggregation: ConfidenceAggregation,
}

impl ConfidenceGate {
    pub fn new(high_threshold: f64, low_threshold: f64, aggregation: ConfidenceAggregation) -> Self {
        Self {
            high_threshold,
            low_threshold,
            aggregation,
        }
    }

    pub fn evaluate(&self, result: &RetrievalResult) -> ConfidenceAssessment {
        let score = match self.aggregation {
            ConfidenceAggregation::Top => result.top_score(),
            ConfidenceAggregation::Mean if result.is_empty() => 0.0,
            ConfidenceAggregation::Mean => {
                result
                    .passages()
                    .iter()
                    .map(|p| p.similarity_score)
                    .sum::<f64>()
                    / result.len() as f64
            }
        };

        ConfidenceAssessment {
            score,
            label: self.label_for(score),
        }
    }

    pub fn label_for(&self, score: f64) -> ConfidenceLabel {
        if score >= self.high_threshold {
            ConfidenceLabel::Alta
        } else if score >= self.low_threshold {
            ConfidenceLabel::Media
        } else {
            ConfidenceLabel::Baixa
        }
    }
}

impl Default for ConfidenceGate {
    fn default() -> Self {
        Self::new(0.75, 0.4, ConfidenceAggregation::Top)
    }
}
