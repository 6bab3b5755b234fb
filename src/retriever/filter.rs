//! LLM-driven relevance filter over retrieved documents.

use crate::error::{AssistantError, Result};
use crate::llm::{ChatModel, Prompts};
use crate::vector_store::RetrievedDocument;
use regex::Regex;
use std::sync::{Arc, LazyLock};

static VERDICT_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(YES|NO)\b").expect("verdict regex is valid"));

/// Asks the model, one document at a time, whether it answers the query.
#[derive(Clone)]
pub struct LlmRelevanceFilter {
    model: Arc<dyn ChatModel>,
}

impl LlmRelevanceFilter {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// Keep the documents judged relevant, preserving their order.
    pub async fn compress(
        &self,
        documents: Vec<RetrievedDocument>,
        query: &str,
    ) -> Result<Vec<RetrievedDocument>> {
        let mut kept = Vec::with_capacity(documents.len());

        for document in documents {
            let prompt = Prompts::render(
                Prompts::relevance_filter(),
                &[("question", query), ("context", document.content.as_str())],
            );

            let reply = self.model.complete(None, &prompt).await?;
            let relevant = parse_verdict(&reply)?;
            log::debug!(
                "Relevance verdict {} for '{}'",
                relevant,
                document.metadata_text("product_title")
            );

            if relevant {
                kept.push(document);
            }
        }

        Ok(kept)
    }
}

/// Read a YES/NO answer; mixed or missing verdicts are an error.
pub fn parse_verdict(reply: &str) -> Result<bool> {
    let mut saw_yes = false;
    let mut saw_no = false;

    for capture in VERDICT_WORD.captures_iter(reply) {
        if capture[1].eq_ignore_ascii_case("yes") {
            saw_yes = true;
        } else {
            saw_no = true;
        }
    }

    match (saw_yes, saw_no) {
        (true, false) => Ok(true),
        (false, true) => Ok(false),
        (true, true) => Err(AssistantError::LlmParse(format!(
            "Ambiguous relevance verdict: {}",
            reply
        ))),
        (false, false) => Err(AssistantError::LlmParse(format!(
            "Expected YES or NO, got: {}",
            reply
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct KeywordModel;

    #[async_trait]
    impl ChatModel for KeywordModel {
        async fn complete(&self, _system: Option<&str>, user: &str) -> Result<String> {
            Ok(if user.contains("laptop") && user.contains("battery") {
                "YES".to_string()
            } else {
                "NO".to_string()
            })
        }
    }

    #[test]
    fn test_parse_verdict() {
        assert!(parse_verdict("YES").unwrap());
        assert!(parse_verdict(" yes.").unwrap());
        assert!(!parse_verdict("No").unwrap());
        assert!(parse_verdict("Yes and no").is_err());
        assert!(parse_verdict("maybe").is_err());
        // "NOT" and "YESTERDAY" are not verdict words
        assert!(parse_verdict("NOTHING YESTERDAY").is_err());
    }

    /// Records every prompt it is sent.
    #[derive(Default)]
    struct RecordingModel {
        prompts: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatModel for RecordingModel {
        async fn complete(&self, _system: Option<&str>, user: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(user.to_string());
            Ok("YES".to_string())
        }
    }

    #[tokio::test]
    async fn test_query_placeholders_stay_literal() {
        let model = Arc::new(RecordingModel::default());
        let filter = LlmRelevanceFilter::new(model.clone());

        filter
            .compress(vec![RetrievedDocument::new("DOCBODY")], "what is {context} here")
            .await
            .unwrap();

        let prompts = model.prompts.lock().unwrap();
        assert!(prompts[0].contains("> Question: what is {context} here"));
        assert_eq!(prompts[0].matches("DOCBODY").count(), 1);
    }

    #[tokio::test]
    async fn test_compress_keeps_relevant_in_order() {
        let filter = LlmRelevanceFilter::new(Arc::new(KeywordModel));
        let docs = vec![
            RetrievedDocument::new("battery lasts all day"),
            RetrievedDocument::new("the blender is loud"),
            RetrievedDocument::new("great battery, screen is dim"),
        ];

        let kept = filter.compress(docs, "laptop").await.unwrap();
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].content, "battery lasts all day");
        assert_eq!(kept[1].content, "great battery, screen is dim");
    }
}
