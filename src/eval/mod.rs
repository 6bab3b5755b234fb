//! Evaluation of retrieval-augmented answers.
//!
//! This module provides:
//! - [`EvaluationSample`], the single-turn (query, response, contexts) triple
//! - two LLM-backed metrics: context precision without reference and
//!   response relevancy
//! - score functions that wrap any metric failure into one error type

pub mod context_precision;
pub mod response_relevancy;

pub use context_precision::{ContextPrecision, average_precision};
pub use response_relevancy::ResponseRelevancy;

use crate::config::{EmbeddingConfig, LlmConfig};
use crate::embeddings::EmbeddingClient;
use crate::error::{AssistantError, Result};
use crate::llm::LlmClient;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One question, the answer given to it, and the contexts it was built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSample {
    pub user_input: String,
    pub response: String,
    pub retrieved_contexts: Vec<String>,
}

impl EvaluationSample {
    pub fn new(user_input: &str, response: &str, retrieved_contexts: &[String]) -> Self {
        Self {
            user_input: user_input.to_string(),
            response: response.to_string(),
            retrieved_contexts: retrieved_contexts.to_vec(),
        }
    }

    /// Reject samples no metric can score.
    pub fn validate(&self) -> Result<()> {
        if self.user_input.trim().is_empty() {
            return Err(AssistantError::InvalidSample(
                "evaluation sample has an empty user_input".to_string(),
            ));
        }
        if self.response.trim().is_empty() {
            return Err(AssistantError::InvalidSample(
                "evaluation sample has an empty response".to_string(),
            ));
        }
        Ok(())
    }
}

/// A metric scoring one sample at a time.
///
/// Scores are whatever the metric defines; the built-in metrics stay in
/// [0, 1] but callers should not rely on it.
#[async_trait]
pub trait SingleTurnMetric: Send + Sync {
    async fn single_turn_score(&self, sample: &EvaluationSample) -> Result<f64>;
}

async fn score_with<M: SingleTurnMetric + ?Sized>(
    metric: &M,
    label: &'static str,
    query: &str,
    response: &str,
    contexts: &[String],
) -> Result<f64> {
    let sample = EvaluationSample::new(query, response, contexts);

    let outcome = match sample.validate() {
        Ok(()) => metric.single_turn_score(&sample).await,
        Err(e) => Err(e),
    };

    outcome.map_err(|e| {
        log::error!("Error evaluating {}: {}", label, e);
        AssistantError::evaluation(label, e)
    })
}

/// Score how much of the retrieved context was useful for the response.
pub async fn score_context_precision<M: SingleTurnMetric + ?Sized>(
    metric: &M,
    query: &str,
    response: &str,
    contexts: &[String],
) -> Result<f64> {
    score_with(metric, "context precision", query, response, contexts).await
}

/// Score how well the response addresses the query.
pub async fn score_response_relevancy<M: SingleTurnMetric + ?Sized>(
    metric: &M,
    query: &str,
    response: &str,
    contexts: &[String],
) -> Result<f64> {
    score_with(metric, "response relevancy", query, response, contexts).await
}

/// Both scores for one sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationScores {
    pub context_precision: f64,
    pub response_relevancy: f64,
}

/// The two built-in metrics wired to the configured LLM and embedding model.
pub struct RagEvaluator {
    context_precision: ContextPrecision,
    response_relevancy: ResponseRelevancy,
}

impl RagEvaluator {
    pub fn new(llm: LlmConfig, embedding: EmbeddingConfig) -> Self {
        let llm = Arc::new(LlmClient::new(llm));
        let embedder = Arc::new(EmbeddingClient::new(embedding));
        Self {
            context_precision: ContextPrecision::new(llm.clone()),
            response_relevancy: ResponseRelevancy::new(llm, embedder),
        }
    }

    /// Run both metrics, one after the other.
    pub async fn evaluate(
        &self,
        query: &str,
        response: &str,
        contexts: &[String],
    ) -> Result<EvaluationScores> {
        let context_precision =
            score_context_precision(&self.context_precision, query, response, contexts).await?;
        let response_relevancy =
            score_response_relevancy(&self.response_relevancy, query, response, contexts).await?;

        Ok(EvaluationScores {
            context_precision,
            response_relevancy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedMetric(f64);

    #[async_trait]
    impl SingleTurnMetric for FixedMetric {
        async fn single_turn_score(&self, _sample: &EvaluationSample) -> Result<f64> {
            Ok(self.0)
        }
    }

    struct BrokenMetric;

    #[async_trait]
    impl SingleTurnMetric for BrokenMetric {
        async fn single_turn_score(&self, _sample: &EvaluationSample) -> Result<f64> {
            Err(AssistantError::LlmApi("quota exceeded".to_string()))
        }
    }

    fn contexts() -> Vec<String> {
        vec!["Title: Phone X\nReviews:\nGreat camera".to_string()]
    }

    #[tokio::test]
    async fn test_scores_pass_through() {
        let precision =
            score_context_precision(&FixedMetric(0.42), "phone?", "Phone X", &contexts())
                .await
                .unwrap();
        assert_eq!(precision, 0.42);

        // Out-of-range values are not clamped
        let relevancy =
            score_response_relevancy(&FixedMetric(1.7), "phone?", "Phone X", &contexts())
                .await
                .unwrap();
        assert_eq!(relevancy, 1.7);
    }

    #[tokio::test]
    async fn test_scorer_failure_is_wrapped() {
        let err = score_context_precision(&BrokenMetric, "phone?", "Phone X", &contexts())
            .await
            .unwrap_err();

        match err {
            AssistantError::Evaluation { metric, source } => {
                assert_eq!(metric, "context precision");
                assert!(matches!(*source, AssistantError::LlmApi(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_sample_is_wrapped() {
        let err = score_response_relevancy(&FixedMetric(1.0), "  ", "Phone X", &contexts())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AssistantError::Evaluation { metric: "response relevancy", .. }
        ));
    }

    #[test]
    fn test_sample_construction() {
        let sample = EvaluationSample::new("q", "r", &contexts());
        assert_eq!(sample.user_input, "q");
        assert_eq!(sample.retrieved_contexts.len(), 1);
        assert!(sample.validate().is_ok());
    }
}
