//! Error types for the product assistant.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our custom error.
pub type Result<T> = std::result::Result<T, AssistantError>;

/// Errors that can occur in the product assistant.
#[derive(Error, Debug)]
pub enum AssistantError {
    /// Error reading or writing files.
    #[error("I/O error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },


    /// CSV reading or writing error.
    #[error("CSV error: {0}")]
    Csv(String),

    /// One or more required environment variables are unset.
    #[error("Missing environment variables: {0:?}")]
    MissingEnvironment(Vec<String>),

    /// Configuration file error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// LLM API error.
    #[error("LLM API error: {0}")]
    LlmApi(String),

    /// LLM response parsing error.
    #[error("Failed to parse LLM response: {0}")]
    LlmParse(String),

    /// Embedding API error.
    #[error("Embedding API error: {0}")]
    Embedding(String),

    /// Vector store API error.
    #[error("Vector store error: {0}")]
    VectorStore(String),

    /// A page could not be scraped (e.g. an unresolvable product link).
    #[error("Scrape error: {0}")]
    Scrape(String),

    /// WebDriver protocol or browser error.
    #[error("WebDriver error: {0}")]
    WebDriver(String),

    /// HTTP request error.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// An evaluation sample is missing required fields.
    #[error("Invalid evaluation sample: {0}")]
    InvalidSample(String),

    /// An evaluation metric failed; carries the underlying cause.
    #[error("Failed to evaluate {metric}: {source}")]
    Evaluation {
        metric: &'static str,
        #[source]
        source: Box<AssistantError>,
    },
}

impl AssistantError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap a metric failure.
    pub fn evaluation(metric: &'static str, source: AssistantError) -> Self {
        Self::Evaluation {
            metric,
            source: Box::new(source),
        }
    }

    /// Whether this error stems from missing or invalid configuration.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MissingEnvironment(_) | Self::Config(_) | Self::InvalidConfig(_)
        )
    }
}

impl From<reqwest::Error> for AssistantError {
    fn from(err: reqwest::Error) -> Self {
        AssistantError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for AssistantError {
    fn from(err: serde_json::Error) -> Self {
        AssistantError::LlmParse(err.to_string())
    }
}

impl From<csv::Error> for AssistantError {
    fn from(err: csv::Error) -> Self {
        AssistantError::Csv(err.to_string())
    }
}
