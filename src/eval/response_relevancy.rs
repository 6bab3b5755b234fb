//! Response relevancy.
//!
//! The LLM reverse-engineers questions the response would answer; the
//! score is how close those questions sit to the real user input in
//! embedding space. Evasive responses score zero.

use super::{EvaluationSample, SingleTurnMetric};
use crate::embeddings::{Embedder, cosine_similarity};
use crate::error::{AssistantError, Result};
use crate::llm::{ChatModel, Prompts, extract_json};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

/// One generated question and whether the response dodged the question.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedQuestion {
    pub question: String,
    pub noncommittal: bool,
}

/// Embedding-based response relevancy.
pub struct ResponseRelevancy {
    model: Arc<dyn ChatModel>,
    embedder: Arc<dyn Embedder>,
    strictness: usize,
}

impl ResponseRelevancy {
    pub fn new(model: Arc<dyn ChatModel>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            model,
            embedder,
            strictness: 3,
        }
    }

    /// Number of questions generated per sample.
    pub fn with_strictness(mut self, strictness: usize) -> Self {
        self.strictness = strictness.max(1);
        self
    }

    async fn generate_question(&self, sample: &EvaluationSample) -> Result<GeneratedQuestion> {
        let prompt = Prompts::render(
            Prompts::response_relevancy(),
            &[("answer", sample.response.as_str())],
        );

        let response = self
            .model
            .complete(Some(Prompts::system_evaluator()), &prompt)
            .await?;
        Self::parse_generation(&response)
    }

    fn parse_generation(response: &str) -> Result<GeneratedQuestion> {
        let json_str = extract_json(response);

        #[derive(Deserialize)]
        struct RawGeneration {
            #[serde(default)]
            question: String,
            #[serde(default)]
            noncommittal: Value,
        }

        let raw: RawGeneration = serde_json::from_str(&json_str).map_err(|e| {
            AssistantError::LlmParse(format!(
                "Failed to parse generated question: {}. Response: {}",
                e, response
            ))
        })?;

        let noncommittal = match raw.noncommittal {
            Value::Number(n) => n.as_f64().unwrap_or(0.0) >= 1.0,
            Value::Bool(b) => b,
            Value::String(s) => s.trim() == "1",
            _ => false,
        };

        Ok(GeneratedQuestion {
            question: raw.question.trim().to_string(),
            noncommittal,
        })
    }
}

#[async_trait]
impl SingleTurnMetric for ResponseRelevancy {
    async fn single_turn_score(&self, sample: &EvaluationSample) -> Result<f64> {
        let mut generations = Vec::with_capacity(self.strictness);
        for _ in 0..self.strictness {
            generations.push(self.generate_question(sample).await?);
        }

        if generations.iter().all(|g| g.question.is_empty()) {
            return Err(AssistantError::LlmParse(
                "No questions could be generated from the response".to_string(),
            ));
        }

        let all_noncommittal = generations.iter().all(|g| g.noncommittal);

        let mut texts: Vec<&str> = vec![sample.user_input.as_str()];
        texts.extend(generations.iter().map(|g| g.question.as_str()));
        let vectors = self.embedder.embed_batch(&texts).await?;

        let (query_vector, question_vectors) = vectors
            .split_first()
            .ok_or_else(|| AssistantError::Embedding("Empty embedding response".to_string()))?;

        let mean = question_vectors
            .iter()
            .map(|v| cosine_similarity(query_vector, v) as f64)
            .sum::<f64>()
            / question_vectors.len().max(1) as f64;

        Ok(if all_noncommittal { 0.0 } else { mean })
    }
}
