//! Retrieval over the product review collection.
//!
//! A query is embedded, the `fetch_k` nearest documents are pulled from the
//! vector store, candidates under the similarity floor are dropped, MMR
//! picks `top_k` of the rest, and an LLM relevance filter removes whatever
//! the model judges off-topic.

mod filter;
mod mmr;

pub use filter::{LlmRelevanceFilter, parse_verdict};
pub use mmr::maximal_marginal_relevance;

use crate::config::{Config, Credentials, LlmConfig, RetrieverConfig};
use crate::embeddings::{Embedder, EmbeddingClient};
use crate::error::Result;
use crate::llm::LlmClient;
use crate::vector_store::{AstraCollection, RetrievedDocument, VectorStore};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// MMR search over a vector store followed by an LLM relevance filter.
pub struct CompressionRetriever {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    filter: LlmRelevanceFilter,
    params: RetrieverConfig,
}

impl CompressionRetriever {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        filter: LlmRelevanceFilter,
        params: RetrieverConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            filter,
            params,
        }
    }

    /// Diversity-aware candidate selection, before the LLM filter runs.
    pub async fn mmr_search(&self, query: &str) -> Result<Vec<RetrievedDocument>> {
        let query_vector = self.embedder.embed(query).await?;
        let candidates = self
            .store
            .search_by_vector(&query_vector, self.params.fetch_k)
            .await?;

        let candidates: Vec<_> = candidates
            .into_iter()
            .filter(|c| c.similarity >= self.params.score_threshold)
            .collect();

        let embeddings: Vec<Vec<f32>> = candidates.iter().map(|c| c.embedding.clone()).collect();
        let picked = maximal_marginal_relevance(
            &query_vector,
            &embeddings,
            self.params.lambda_mult,
            self.params.top_k,
        );

        let mut slots: Vec<Option<RetrievedDocument>> =
            candidates.into_iter().map(|c| Some(c.document)).collect();

        Ok(picked
            .into_iter()
            .filter_map(|i| slots.get_mut(i).and_then(Option::take))
            .collect())
    }

    /// Run the full retrieval for `query`.
    pub async fn invoke(&self, query: &str) -> Result<Vec<RetrievedDocument>> {
        let candidates = self.mmr_search(query).await?;
        self.filter.compress(candidates, query).await
    }
}

/// Lazily-built retriever bound to one configuration and credential set.
pub struct Retriever {
    config: Config,
    credentials: Credentials,
    inner: OnceCell<CompressionRetriever>,
}

impl Retriever {
    /// Create a retriever; nothing is contacted until the first query.
    pub fn new(config: Config, credentials: Credentials) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            credentials,
            inner: OnceCell::new(),
        })
    }

    /// Create a retriever with credentials from the environment.
    ///
    /// Fails with [`AssistantError::MissingEnvironment`] listing every
    /// unset variable.
    ///
    /// [`AssistantError::MissingEnvironment`]: crate::error::AssistantError::MissingEnvironment
    pub fn from_env(config: Config) -> Result<Self> {
        let credentials = Credentials::from_env()?;
        Self::new(config, credentials)
    }

    /// Build the vector store client and retriever on first use; later calls
    /// return the cached instance.
    pub async fn load(&self) -> Result<&CompressionRetriever> {
        self.inner
            .get_or_try_init(|| async { Ok(self.build()) })
            .await
    }

    fn build(&self) -> CompressionRetriever {
        let store = AstraCollection::new(&self.credentials, &self.config.astra_db.collection_name);

        let mut embedding_config = self.config.embedding.clone();
        embedding_config.api_key = self.credentials.openai_api_key.clone();
        let embedder = EmbeddingClient::new(embedding_config);

        let llm = LlmClient::new(LlmConfig {
            api_key: self.credentials.openai_api_key.clone(),
            ..self.config.llm.clone()
        });

        log::info!(
            "Retriever loaded successfully (collection '{}', top_k {}, fetch_k {})",
            store.collection_name(),
            self.config.retriever.top_k,
            self.config.retriever.fetch_k
        );

        CompressionRetriever::new(
            Arc::new(store),
            Arc::new(embedder),
            LlmRelevanceFilter::new(Arc::new(llm)),
            self.config.retriever.clone(),
        )
    }

    /// Retrieve the filtered documents for `text`.
    pub async fn query(&self, text: &str) -> Result<Vec<RetrievedDocument>> {
        let retriever = self.load().await?;
        retriever.invoke(text).await
    }
}
