//! Product Assistant CLI
//!
//! Scrape product reviews, query the product vector store, and score
//! answers built from retrieved context.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use product_assistant::{
    config::{Config, Credentials, LlmConfig},
    crawler::ProductScraper,
    embeddings::{Embedder, EmbeddingClient},
    eval::RagEvaluator,
    llm::LlmClient,
    persistence::persist,
    retriever::Retriever,
};
use std::path::PathBuf;
use std::time::Instant;

/// Product Assistant - scraping, retrieval and evaluation for product Q&A
#[derive(Parser)]
#[command(name = "product-assistant")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape products and their top reviews into a CSV file
    Scrape {
        /// Search query to run on the shopping site
        query: String,

        /// Maximum number of products to scrape
        #[arg(short = 'n', long, default_value_t = 1)]
        max_products: usize,

        /// Number of reviews to keep per product
        #[arg(short, long, default_value_t = 2)]
        review_count: usize,

        /// Output CSV path (defaults to <output_dir>/product_reviews.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Retrieve relevant product documents for a query
    Retrieve {
        /// The user query
        query: String,
    },

    /// Retrieve context for a query and score a response against it
    Evaluate {
        /// The user query
        query: String,

        /// The response to score
        #[arg(short, long)]
        response: String,
    },

    /// Test LLM and embedding connections
    Test,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Scrape {
            query,
            max_products,
            review_count,
            output,
        } => cmd_scrape(config, query, max_products, review_count, output).await,
        Commands::Retrieve { query } => cmd_retrieve(config, query).await,
        Commands::Evaluate { query, response } => cmd_evaluate(config, query, response).await,
        Commands::Test => cmd_test(config).await,
    }
}

async fn cmd_scrape(
    config: Config,
    query: String,
    max_products: usize,
    review_count: usize,
    output: Option<PathBuf>,
) -> Result<()> {
    let output = output.unwrap_or_else(|| config.scraper.default_output_path());
    let scraper =
        ProductScraper::with_webdriver(config.scraper).context("Invalid scraper configuration")?;

    println!("Scraping \"{}\" (up to {} products)...", query, max_products);
    let start = Instant::now();

    let records = scraper
        .search_products(&query, max_products, review_count)
        .await
        .context("Product search failed")?;

    persist(&records, &output).context("Failed to save products")?;

    println!("\nScraped {} products in {:.2?}", records.len(), start.elapsed());
    for record in &records {
        println!("  {} | {} | {}", record.product_id, record.title, record.price);
    }
    println!("\nSaved to: {}", output.display());

    Ok(())
}

async fn cmd_retrieve(config: Config, query: String) -> Result<()> {
    let retriever = Retriever::from_env(config).context("Failed to create retriever")?;

    println!("Retrieving for: \"{}\"\n", query);
    let documents = retriever.query(&query).await.context("Retrieval failed")?;

    if documents.is_empty() {
        println!("No relevant documents found.");
        return Ok(());
    }

    println!("{}", "─".repeat(60));
    for (i, document) in documents.iter().enumerate() {
        println!("{:>2}. {}", i + 1, document.metadata_text("product_title"));
        for line in document.format_context().lines().skip(1) {
            println!("    {}", line);
        }
        println!();
    }
    println!("{}", "─".repeat(60));
    println!("Found {} documents", documents.len());

    Ok(())
}

async fn cmd_evaluate(config: Config, query: String, response: String) -> Result<()> {
    let credentials = Credentials::from_env().context("Missing credentials")?;
    let retriever = Retriever::new(config.clone(), credentials.clone())
        .context("Failed to create retriever")?;

    let documents = retriever.query(&query).await.context("Retrieval failed")?;
    let contexts: Vec<String> = documents.iter().map(|d| d.format_context()).collect();
    println!("Retrieved {} contexts for: \"{}\"", contexts.len(), query);

    let llm = LlmConfig {
        api_key: credentials.openai_api_key.clone(),
        ..config.llm
    };
    let mut embedding = config.embedding;
    embedding.api_key = credentials.openai_api_key;

    let evaluator = RagEvaluator::new(llm, embedding);
    let scores = evaluator
        .evaluate(&query, &response, &contexts)
        .await
        .context("Evaluation failed")?;

    println!("\nEvaluation");
    println!("{}", "─".repeat(40));
    println!("  Context precision:   {:.4}", scores.context_precision);
    println!("  Response relevancy:  {:.4}", scores.response_relevancy);

    Ok(())
}

async fn cmd_test(config: Config) -> Result<()> {
    println!("Testing connections...\n");

    println!("Configuration:");
    println!("  API Base:         {}", config.llm.api_base);
    println!("  Model:            {}", config.llm.model);
    println!("  Embedding model:  {}", config.embedding.model);
    println!("  API Key:          {}...", key_preview(&config.llm.api_key));
    println!();

    if let Err(e) = config.validate() {
        println!("Configuration error: {}", e);
        return Ok(());
    }

    let client = LlmClient::new(config.llm);
    println!("Sending test chat request...");
    match client.test_connection().await {
        Ok(()) => println!("  Chat: OK"),
        Err(e) => println!("  Chat failed: {}", e),
    }

    let embedder = EmbeddingClient::new(config.embedding);
    println!("Sending test embedding request...");
    match embedder.embed("connection test").await {
        Ok(vector) => println!("  Embeddings: OK ({} dimensions)", vector.len()),
        Err(e) => println!("  Embeddings failed: {}", e),
    }

    Ok(())
}

/// First few characters of a secret, safe for any UTF-8 input.
fn key_preview(key: &str) -> String {
    key.chars().take(8).collect()
}
