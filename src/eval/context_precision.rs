//! Context precision without a reference answer.
//!
//! Each retrieved context gets a useful / not-useful verdict from the LLM
//! with respect to the response; the score is the average precision of
//! those verdicts, so useful contexts ranked early count for more.

use super::{EvaluationSample, SingleTurnMetric};
use crate::error::{AssistantError, Result};
use crate::llm::{ChatModel, Prompts, extract_json};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

/// LLM-judged context precision.
pub struct ContextPrecision {
    model: Arc<dyn ChatModel>,
}

impl ContextPrecision {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    async fn verdict(&self, sample: &EvaluationSample, context: &str) -> Result<bool> {
        let prompt = Prompts::render(
            Prompts::context_precision(),
            &[
                ("question", sample.user_input.as_str()),
                ("answer", sample.response.as_str()),
                ("context", context),
            ],
        );

        let response = self
            .model
            .complete(Some(Prompts::system_evaluator()), &prompt)
            .await?;
        Self::parse_verdict(&response)
    }

    fn parse_verdict(response: &str) -> Result<bool> {
        let json_str = extract_json(response);

        #[derive(Deserialize)]
        struct RawVerdict {
            #[serde(default)]
            #[allow(dead_code)]
            reason: Option<String>,
            verdict: Value,
        }

        let raw: RawVerdict = serde_json::from_str(&json_str).map_err(|e| {
            AssistantError::LlmParse(format!(
                "Failed to parse verdict: {}. Response: {}",
                e, response
            ))
        })?;

        match &raw.verdict {
            Value::Number(n) => Ok(n.as_f64().unwrap_or(0.0) >= 1.0),
            Value::Bool(b) => Ok(*b),
            Value::String(s) => Ok(s.trim() == "1"),
            other => Err(AssistantError::LlmParse(format!(
                "Unexpected verdict value: {}",
                other
            ))),
        }
    }
}

#[async_trait]
impl SingleTurnMetric for ContextPrecision {
    async fn single_turn_score(&self, sample: &EvaluationSample) -> Result<f64> {
        let mut verdicts = Vec::with_capacity(sample.retrieved_contexts.len());
        for context in &sample.retrieved_contexts {
            verdicts.push(self.verdict(sample, context).await?);
        }
        Ok(average_precision(&verdicts))
    }
}

/// Average precision over ranked useful/not-useful verdicts.
pub fn average_precision(verdicts: &[bool]) -> f64 {
    let mut useful_so_far = 0usize;
    let mut numerator = 0.0;

    for (i, &useful) in verdicts.iter().enumerate() {
        if useful {
            useful_so_far += 1;
            numerator += useful_so_far as f64 / (i + 1) as f64;
        }
    }

    numerator / (useful_so_far as f64 + 1e-10)
}
