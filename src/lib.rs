//! Product Assistant - retrieval and evaluation plumbing for an e-commerce
//! question answering service.
//!
//! The crate has three independent parts:
//! 1. A scraper that collects product listings and top reviews from a
//!    shopping site into CSV
//! 2. A retriever that runs an MMR search over an Astra DB collection and
//!    drops candidates an LLM judges irrelevant
//! 3. An evaluator scoring (query, response, contexts) triples for context
//!    precision and response relevancy
//!
//! # Quick Start
//!
//! ```no_run
//! use product_assistant::{
//!     config::Config,
//!     eval::RagEvaluator,
//!     retriever::Retriever,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!
//!     // Fails fast when a required environment variable is unset
//!     let retriever = Retriever::from_env(config.clone())?;
//!     let query = "Can you suggest good budget laptops?";
//!     let documents = retriever.query(query).await?;
//!
//!     let contexts: Vec<String> = documents.iter().map(|d| d.format_context()).collect();
//!     let evaluator = RagEvaluator::new(config.llm, config.embedding);
//!     let scores = evaluator
//!         .evaluate(query, "The Acer Aspire 3 is a solid choice.", &contexts)
//!         .await?;
//!
//!     println!("{:?}", scores);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **ProductScraper**: browser-driven search and review collection
//! - **AstraCollection**: vector store client for the Astra DB Data API
//! - **Retriever**: cached MMR + LLM filter pipeline
//! - **RagEvaluator**: LLM- and embedding-backed metrics

pub mod config;
pub mod crawler;
pub mod embeddings;
pub mod error;
pub mod eval;
pub mod llm;
pub mod persistence;
pub mod retriever;
pub mod vector_store;

// Re-export commonly used types
pub use config::{Config, Credentials};
pub use crawler::{ProductRecord, ProductScraper, ReviewOutcome};
pub use error::{AssistantError, Result};
pub use eval::{EvaluationSample, EvaluationScores, RagEvaluator};
pub use llm::LlmClient;
pub use persistence::{load_records, persist};
pub use retriever::Retriever;
pub use vector_store::RetrievedDocument;
