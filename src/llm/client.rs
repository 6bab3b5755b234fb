//! OpenAI-compatible LLM client.
//!
//! Works with any endpoint that serves `/v1/chat/completions`.

use crate::config::LlmConfig;
use crate::error::{AssistantError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI API error response.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiError {
    pub(crate) error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorDetail {
    pub(crate) message: String,
}

/// Anything that can answer a single prompt.
///
/// The relevance filter and the evaluation metrics only need this much,
/// which keeps them testable without a live endpoint.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, system: Option<&str>, user: &str) -> Result<String>;
}

/// OpenAI-compatible LLM client.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Model name requests are sent to.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        format!("{}/v1/chat/completions", base)
    }

    fn request<'a>(&'a self, system: Option<&'a str>, user: &'a str) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: user,
        });

        ChatRequest {
            model: &self.config.model,
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        }
    }

    /// Content of the first choice; a null content reads as empty.
    fn parse_reply(body: &str) -> Result<String> {
        let reply: ChatReply = serde_json::from_str(body)?;
        reply
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or_else(|| AssistantError::LlmApi("No choices in response".to_string()))
    }

    /// Test connectivity to the API.
    pub async fn test_connection(&self) -> Result<()> {
        let reply = self
            .complete(None, "Say 'hello' and nothing else.")
            .await?;

        if reply.to_lowercase().contains("hello") {
            Ok(())
        } else {
            Err(AssistantError::LlmApi(format!(
                "Unexpected response: {}",
                reply
            )))
        }
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn complete(&self, system: Option<&str>, user: &str) -> Result<String> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&self.request(system, user))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let detail = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(AssistantError::LlmApi(format!(
                "Request failed ({}): {}",
                status, detail
            )));
        }

        Self::parse_reply(&body)
    }
}

/// Pull the JSON payload out of a model reply that may be fenced or chatty.
pub fn extract_json(response: &str) -> String {
    let response = response.trim();

    if let Some(fenced) = response.strip_prefix("```") {
        // Skip the language tag line, if any
        let body = fenced.split_once('\n').map_or(fenced, |(_, rest)| rest);
        if let Some(end) = body.rfind("```") {
            return body[..end].trim().to_string();
        }
    }

    match (response.find('{'), response.rfind('}')) {
        (Some(start), Some(end)) if end > start => response[start..=end].to_string(),
        _ => response.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> LlmClient {
        LlmClient::new(LlmConfig {
            api_base: "https://api.example.com/".to_string(),
            api_key: "test".to_string(),
            model: "gpt-4o-mini".to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_endpoint_construction() {
        let client = client();
        assert_eq!(client.endpoint(), "https://api.example.com/v1/chat/completions");
        assert_eq!(client.model(), "gpt-4o-mini");
    }

    #[test]
    fn test_request_body() {
        let client = client();
        let body = serde_json::to_value(client.request(Some("be terse"), "hi")).unwrap();

        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "hi");

        let body = serde_json::to_value(client.request(None, "hi")).unwrap();
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_parse_reply() {
        let body = r#"{"choices": [{"message": {"content": "YES"}, "finish_reason": "stop"}]}"#;
        assert_eq!(LlmClient::parse_reply(body).unwrap(), "YES");

        let body = r#"{"choices": [{"message": {"content": null}}]}"#;
        assert_eq!(LlmClient::parse_reply(body).unwrap(), "");

        assert!(LlmClient::parse_reply(r#"{"choices": []}"#).is_err());
    }

    #[test]
    fn test_extract_json_from_fence() {
        assert_eq!(extract_json("```json\n{\"verdict\": 1}\n```"), "{\"verdict\": 1}");
        assert_eq!(extract_json("```\n{\"verdict\": 0}\n```"), "{\"verdict\": 0}");
    }

    #[test]
    fn test_extract_json_from_chatty_reply() {
        let response = "Sure! Here it is: {\"verdict\": 0} Hope this helps.";
        assert_eq!(extract_json(response), "{\"verdict\": 0}");
    }
}
