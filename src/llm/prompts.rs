//! LLM prompts for retrieval filtering and evaluation.

use regex::{Captures, Regex};
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([a-z_]+)\}").expect("placeholder regex is valid"));

/// Collection of prompts used by the relevance filter and the metrics.
pub struct Prompts;

impl Prompts {
    /// Fill `{name}` placeholders in one pass.
    ///
    /// Substituted values are never scanned again, so user text that
    /// happens to contain `{context}` stays literal. Unknown placeholders
    /// are left as they are.
    pub fn render(template: &str, values: &[(&str, &str)]) -> String {
        PLACEHOLDER
            .replace_all(template, |caps: &Captures| {
                values
                    .iter()
                    .find(|(name, _)| *name == &caps[1])
                    .map_or_else(|| caps[0].to_string(), |(_, value)| value.to_string())
            })
            .into_owned()
    }

    /// Prompt asking whether a retrieved document is relevant to a question.
    pub fn relevance_filter() -> &'static str {
        r#"Given the following question and context, return YES if the context is relevant to the question and NO if it isn't.

> Question: {question}
> Context:
>>>
{context}
>>>
> Relevant (YES / NO):"#
    }

    /// Prompt asking whether one context was useful for the given answer.
    pub fn context_precision() -> &'static str {
        r#"Given question, answer and context verify if the context was useful in arriving at the given answer. Give verdict as "1" if useful and "0" if not with json output.

Question: {question}

Answer: {answer}

Context:
{context}

Respond in JSON format:
{
    "reason": "<why the context was or was not useful>",
    "verdict": <1 or 0>
}

Respond with only the JSON, no other text."#
    }

    /// Prompt generating a question from a response and flagging evasive answers.
    pub fn response_relevancy() -> &'static str {
        r#"Generate a question for the given answer and identify if the answer is noncommittal. Give noncommittal as 1 if the answer is noncommittal and 0 if the answer is committal. A noncommittal answer is one that is evasive, vague, or ambiguous. For example, "I don't know" or "I'm not sure" are noncommittal answers.

Answer: {answer}

Respond in JSON format:
{
    "question": "<the question this answer responds to>",
    "noncommittal": <1 or 0>
}

Respond with only the JSON, no other text."#
    }

    /// System prompt for evaluation calls.
    pub fn system_evaluator() -> &'static str {
        "You are a careful evaluator of retrieval-augmented answers for an e-commerce product assistant. Always respond with valid JSON when requested."
    }
}
