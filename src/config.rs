//! Configuration for the product assistant.
//!
//! Static settings come from a YAML document, secrets only from the
//! environment (a `.env` file is honoured). Environment variables take
//! precedence over config file values.

use crate::error::{AssistantError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// Environment variables that must be set before the retriever can be built.
pub const REQUIRED_ENV_VARS: [&str; 4] = [
    "OPENAI_API_KEY",
    "ASTRA_DB_API_ENDPOINT",
    "ASTRA_DB_APPLICATION_TOKEN",
    "ASTRA_DB_KEYSPACE",
];

/// LLM configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL for the LLM API (e.g., "https://api.openai.com")
    pub api_base: String,

    /// API key for authentication
    #[serde(skip_serializing)]
    pub api_key: String,

    /// Model name (e.g., "gpt-4o-mini")
    #[serde(alias = "model_name")]
    pub model: String,

    /// Maximum tokens for response
    pub max_tokens: u32,

    /// Temperature for generation
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 2048,
            temperature: 0.0,
        }
    }
}

/// Embedding model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub api_base: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    #[serde(alias = "model_name")]
    pub model: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com".to_string(),
            api_key: String::new(),
            model: "text-embedding-3-large".to_string(),
        }
    }
}

/// Vector collection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AstraDbConfig {
    pub collection_name: String,
}

/// MMR retrieval parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrieverConfig {
    /// Documents returned by the MMR selection.
    pub top_k: usize,
    /// Nearest neighbours fetched before MMR selection.
    pub fetch_k: usize,
    /// Candidates below this similarity are dropped.
    pub score_threshold: f32,
    /// 1.0 favours relevance only, 0.0 diversity only.
    pub lambda_mult: f32,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            fetch_k: 20,
            score_threshold: 0.3,
            lambda_mult: 0.7,
        }
    }
}

/// CSS selectors and text markers used to read the shopping site.
///
/// The site changes its markup without notice, so all of these are
/// overridable from the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub close_button: String,
    pub review_card: String,
    pub review_text: String,
    pub product_card: String,
    pub product_link: String,
    pub rating: String,
    pub price_marker: String,
    pub reviews_marker: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            close_button: "button[aria-label='Close']".to_string(),
            review_card: "div.xgU6qg div.mlW33x".to_string(),
            review_text: "div.G4PxIA div div".to_string(),
            product_card: "div[data-id]".to_string(),
            product_link: "a[href]".to_string(),
            rating: "div.XQDdHH".to_string(),
            price_marker: "₹".to_string(),
            reviews_marker: "Reviews".to_string(),
        }
    }
}

/// Browser scraping settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// Site root; search URLs and relative product links are built from it.
    pub base_url: String,
    /// W3C WebDriver endpoint (e.g. a local chromedriver).
    pub webdriver_url: String,
    /// Directory that receives the CSV output by default.
    pub output_dir: PathBuf,
    pub headless: bool,
    pub scroll_steps: usize,
    pub scroll_pause_ms: u64,
    /// How long to look for the optional login overlay.
    pub overlay_wait_ms: u64,
    /// Upper bound for waiting on lazily rendered content.
    pub wait_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub selectors: SelectorConfig,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.flipkart.com".to_string(),
            webdriver_url: "http://localhost:9515".to_string(),
            output_dir: PathBuf::from("data"),
            headless: true,
            scroll_steps: 6,
            scroll_pause_ms: 1200,
            overlay_wait_ms: 2000,
            wait_timeout_ms: 10_000,
            poll_interval_ms: 250,
            selectors: SelectorConfig::default(),
        }
    }
}

impl ScraperConfig {
    /// Default CSV destination inside `output_dir`.
    pub fn default_output_path(&self) -> PathBuf {
        self.output_dir.join("product_reviews.csv")
    }
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub astra_db: AstraDbConfig,
    pub retriever: RetrieverConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub scraper: ScraperConfig,
}

/// Configuration file structure (YAML format).
#[derive(Debug, Deserialize)]
struct ConfigFile {
    astra_db: Option<AstraDbConfig>,
    retriever: Option<RetrieverConfig>,
    #[serde(alias = "embedding_model")]
    embedding: Option<EmbeddingConfig>,
    llm: Option<LlmConfig>,
    scraper: Option<ScraperConfig>,
}

impl Config {
    /// Load configuration from the config file and environment variables.
    ///
    /// File lookup order:
    /// 1. `explicit` path (CLI flag)
    /// 2. `CONFIG_PATH` environment variable
    /// 3. `./config/config.yaml`
    /// 4. Platform config dir (`product-assistant/config.yaml`)
    ///
    /// Missing files at steps 3 and 4 fall back to defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match Self::resolve_path(explicit)? {
            Some(path) => Self::load_from_file(&path)?,
            None => Config::default(),
        };

        // Override with environment variables
        if let Ok(api_base) = env::var("LLM_API_BASE") {
            config.llm.api_base = api_base;
        }

        if let Ok(model) = env::var("LLM_MODEL") {
            config.llm.model = model;
        }

        if let Ok(model) = env::var("EMBEDDING_MODEL") {
            config.embedding.model = model;
        }

        if let Ok(url) = env::var("WEBDRIVER_URL") {
            config.scraper.webdriver_url = url;
        }

        if let Ok(api_key) = env::var("OPENAI_API_KEY") {
            config.llm.api_key = api_key.clone();
            config.embedding.api_key = api_key;
        }

        Ok(config)
    }

    fn resolve_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            return Self::require_existing(path.to_path_buf()).map(Some);
        }

        if let Ok(path) = env::var("CONFIG_PATH") {
            return Self::require_existing(PathBuf::from(path)).map(Some);
        }

        let local = PathBuf::from("config").join("config.yaml");
        if local.exists() {
            return Ok(Some(local));
        }

        Ok(Self::config_file_path().filter(|p| p.exists()))
    }

    fn require_existing(path: PathBuf) -> Result<PathBuf> {
        if path.exists() {
            Ok(path)
        } else {
            Err(AssistantError::Config(format!(
                "Config file not found at '{}'",
                path.display()
            )))
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| AssistantError::io(path, e))?;
        Self::from_yaml(&content)
    }

    /// Parse a YAML config document, filling absent sections with defaults.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let file_config: ConfigFile = serde_yaml::from_str(content)
            .map_err(|e| AssistantError::Config(format!("Failed to parse config file: {}", e)))?;

        Ok(Config {
            astra_db: file_config.astra_db.unwrap_or_default(),
            retriever: file_config.retriever.unwrap_or_default(),
            embedding: file_config.embedding.unwrap_or_default(),
            llm: file_config.llm.unwrap_or_default(),
            scraper: file_config.scraper.unwrap_or_default(),
        })
    }

    /// Get the default config file path.
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "product-assistant")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Validate that required configuration is present and sane.
    pub fn validate(&self) -> Result<()> {
        if self.astra_db.collection_name.trim().is_empty() {
            return Err(AssistantError::Config(
                "astra_db.collection_name is required in the config file.".to_string(),
            ));
        }

        let retriever = &self.retriever;
        if retriever.top_k == 0 {
            return Err(AssistantError::InvalidConfig(
                "retriever.top_k must be at least 1".to_string(),
            ));
        }
        if retriever.fetch_k < retriever.top_k {
            return Err(AssistantError::InvalidConfig(format!(
                "retriever.fetch_k ({}) must not be smaller than top_k ({})",
                retriever.fetch_k, retriever.top_k
            )));
        }
        if !(0.0..=1.0).contains(&retriever.lambda_mult) {
            return Err(AssistantError::InvalidConfig(format!(
                "retriever.lambda_mult must be within [0, 1], got {}",
                retriever.lambda_mult
            )));
        }

        if self.llm.model.is_empty() {
            return Err(AssistantError::Config(
                "LLM model is required. Set LLM_MODEL environment variable or add to config file."
                    .to_string(),
            ));
        }

        Ok(())
    }
}

/// Secrets needed to reach the LLM provider and the vector database.
#[derive(Clone)]
pub struct Credentials {
    pub openai_api_key: String,
    pub astra_db_api_endpoint: String,
    pub astra_db_application_token: String,
    pub astra_db_keyspace: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("astra_db_api_endpoint", &self.astra_db_api_endpoint)
            .field("astra_db_keyspace", &self.astra_db_keyspace)
            .finish_non_exhaustive()
    }
}

impl Credentials {
    /// Read credentials from the process environment, loading `.env` first.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| {
            env::var_os(name).map(|value| value.to_string_lossy().into_owned())
        })
    }

    /// Read credentials through `lookup`, failing with every unset name.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let values: Vec<Option<String>> =
            REQUIRED_ENV_VARS.iter().map(|&name| lookup(name)).collect();

        let missing: Vec<String> = REQUIRED_ENV_VARS
            .iter()
            .zip(&values)
            .filter(|(_, value)| value.is_none())
            .map(|(name, _)| name.to_string())
            .collect();

        if !missing.is_empty() {
            return Err(AssistantError::MissingEnvironment(missing));
        }

        let mut values = values.into_iter().flatten();
        let mut next = || values.next().unwrap_or_default();

        Ok(Self {
            openai_api_key: next(),
            astra_db_api_endpoint: next(),
            astra_db_application_token: next(),
            astra_db_keyspace: next(),
        })
    }
}
