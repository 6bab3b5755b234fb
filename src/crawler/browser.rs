//! Browser automation over the W3C WebDriver protocol.
//!
//! A [`Browser`] hands out sessions; every session is one browser process
//! and must be quit by whoever opened it.

use crate::config::ScraperConfig;
use crate::error::{AssistantError, Result};
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::time::Instant;

/// W3C key under which element references are returned.
const ELEMENT_KEY: &str = "element-6066-11e4-a6c6-4aa0d7b3b2a1";

/// Starts browser sessions.
#[async_trait]
pub trait Browser: Send + Sync {
    async fn open_session(&self) -> Result<Box<dyn BrowserSession>>;
}

/// One live browser.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn goto(&self, url: &str) -> Result<()>;

    /// Click the first element matching `css`; `Ok(false)` when none does.
    async fn click(&self, css: &str) -> Result<bool>;

    async fn is_present(&self, css: &str) -> Result<bool>;

    /// Scroll down by one viewport height.
    async fn scroll_viewport(&self) -> Result<()>;

    async fn page_source(&self) -> Result<String>;

    async fn quit(&self) -> Result<()>;
}

/// Poll until an element matching `css` shows up or `timeout` elapses.
///
/// Returns whether the element was found. The page is always checked at
/// least once, even with a zero timeout.
pub async fn wait_for(
    session: &dyn BrowserSession,
    css: &str,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<bool> {
    let deadline = Instant::now() + timeout;

    loop {
        if session.is_present(css).await? {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// Error object in a WebDriver reply.
#[derive(Debug, Deserialize)]
struct WireError {
    error: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(default)]
    value: Value,
}

/// Failure of one WebDriver command.
#[derive(Debug)]
enum CommandError {
    NoSuchElement,
    Other(AssistantError),
}

impl From<AssistantError> for CommandError {
    fn from(err: AssistantError) -> Self {
        CommandError::Other(err)
    }
}

impl From<reqwest::Error> for CommandError {
    fn from(err: reqwest::Error) -> Self {
        CommandError::Other(err.into())
    }
}

impl From<CommandError> for AssistantError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::NoSuchElement => AssistantError::WebDriver("no such element".to_string()),
            CommandError::Other(e) => e,
        }
    }
}

/// Split a WebDriver reply into its `value` or a protocol error.
fn parse_reply(success: bool, body: &str) -> std::result::Result<Value, CommandError> {
    let reply: Reply = serde_json::from_str(body).map_err(|e| {
        AssistantError::WebDriver(format!("Malformed reply: {}. Body: {}", e, body))
    })?;

    if success {
        return Ok(reply.value);
    }

    match serde_json::from_value::<WireError>(reply.value) {
        Ok(wire) if wire.error == "no such element" => Err(CommandError::NoSuchElement),
        Ok(wire) => Err(CommandError::Other(AssistantError::WebDriver(format!(
            "{}: {}",
            wire.error, wire.message
        )))),
        Err(_) => Err(CommandError::Other(AssistantError::WebDriver(format!(
            "Command failed: {}",
            body
        )))),
    }
}

async fn send(
    client: &Client,
    method: Method,
    url: String,
    body: Option<Value>,
) -> std::result::Result<Value, CommandError> {
    let mut request = client.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }

    let response = request.send().await?;
    let success = response.status().is_success();
    let text = response.text().await?;
    parse_reply(success, &text)
}

/// Chrome driven through a WebDriver server such as chromedriver.
pub struct WebDriver {
    client: Client,
    endpoint: String,
    args: Vec<String>,
}

impl WebDriver {
    pub fn new(config: &ScraperConfig) -> Self {
        let mut args = vec![
            "--no-sandbox".to_string(),
            "--disable-blink-features=AutomationControlled".to_string(),
        ];
        if config.headless {
            args.push("--headless=new".to_string());
        }

        Self {
            client: Client::new(),
            endpoint: config.webdriver_url.trim_end_matches('/').to_string(),
            args,
        }
    }

    fn capabilities(&self) -> Value {
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": self.args }
                }
            }
        })
    }
}

#[async_trait]
impl Browser for WebDriver {
    async fn open_session(&self) -> Result<Box<dyn BrowserSession>> {
        let value = send(
            &self.client,
            Method::POST,
            format!("{}/session", self.endpoint),
            Some(self.capabilities()),
        )
        .await?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| AssistantError::WebDriver("No sessionId in reply".to_string()))?;

        Ok(Box::new(WebDriverSession {
            client: self.client.clone(),
            base: format!("{}/session/{}", self.endpoint, session_id),
        }))
    }
}

/// An open WebDriver session.
pub struct WebDriverSession {
    client: Client,
    base: String,
}

impl WebDriverSession {
    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> std::result::Result<Value, CommandError> {
        send(&self.client, method, format!("{}{}", self.base, path), body).await
    }

    async fn find_element(&self, css: &str) -> std::result::Result<String, CommandError> {
        let value = self
            .command(
                Method::POST,
                "/element",
                Some(json!({ "using": "css selector", "value": css })),
            )
            .await?;

        value
            .get(ELEMENT_KEY)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                CommandError::Other(AssistantError::WebDriver(
                    "Element reference missing from reply".to_string(),
                ))
            })
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn goto(&self, url: &str) -> Result<()> {
        self.command(Method::POST, "/url", Some(json!({ "url": url })))
            .await?;
        Ok(())
    }

    async fn click(&self, css: &str) -> Result<bool> {
        let element = match self.find_element(css).await {
            Ok(id) => id,
            Err(CommandError::NoSuchElement) => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        self.command(
            Method::POST,
            &format!("/element/{}/click", element),
            Some(json!({})),
        )
        .await?;
        Ok(true)
    }

    async fn is_present(&self, css: &str) -> Result<bool> {
        match self.find_element(css).await {
            Ok(_) => Ok(true),
            Err(CommandError::NoSuchElement) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn scroll_viewport(&self) -> Result<()> {
        self.command(
            Method::POST,
            "/execute/sync",
            Some(json!({ "script": "window.scrollBy(0, window.innerHeight);", "args": [] })),
        )
        .await?;
        Ok(())
    }

    async fn page_source(&self) -> Result<String> {
        let value = self.command(Method::GET, "/source", None).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AssistantError::WebDriver("Page source is not a string".to_string()))
    }

    async fn quit(&self) -> Result<()> {
        self.command(Method::DELETE, "", None).await?;
        Ok(())
    }
}
