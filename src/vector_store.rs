//! Hosted vector collection client (Astra DB Data API).
//!
//! Documents are stored the way the ingestion side writes them: a
//! `content` string, a `metadata` object and the `$vector` embedding.

use crate::config::Credentials;
use crate::error::{AssistantError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// A document returned by retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl RetrievedDocument {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Metadata value rendered as text, or `"N/A"`.
    pub fn metadata_text(&self, key: &str) -> String {
        match self.metadata.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => "N/A".to_string(),
            Some(other) => other.to_string(),
        }
    }

    /// Render as an evaluation context block.
    pub fn format_context(&self) -> String {
        format!(
            "Title: {}\nPrice: {}\nRating: {}\nReviews:\n{}",
            self.metadata_text("product_title"),
            self.metadata_text("price"),
            self.metadata_text("rating"),
            self.content.trim()
        )
    }
}

/// A nearest-neighbour hit with the vector needed for MMR re-ranking.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub document: RetrievedDocument,
    pub embedding: Vec<f32>,
    /// Similarity to the query as reported by the store.
    pub similarity: f32,
}

/// Similarity search over stored document vectors.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Return up to `k` nearest neighbours of `vector`, most similar first.
    async fn search_by_vector(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredCandidate>>;
}

#[derive(Debug, Deserialize)]
struct FindResponse {
    #[serde(default)]
    data: Option<FindData>,
    #[serde(default)]
    errors: Vec<DataApiError>,
}

#[derive(Debug, Deserialize)]
struct FindData {
    documents: Vec<StoredDocument>,
}

#[derive(Debug, Deserialize)]
struct StoredDocument {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    metadata: Map<String, Value>,
    #[serde(rename = "$vector", default)]
    vector: Vec<f32>,
    #[serde(rename = "$similarity", default)]
    similarity: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct DataApiError {
    message: String,
    #[serde(rename = "errorCode", default)]
    error_code: Option<String>,
}

/// One collection in an Astra DB keyspace.
#[derive(Clone)]
pub struct AstraCollection {
    client: Client,
    api_endpoint: String,
    token: String,
    keyspace: String,
    collection: String,
    filter: Map<String, Value>,
}

impl AstraCollection {
    pub fn new(credentials: &Credentials, collection: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_endpoint: credentials.astra_db_api_endpoint.clone(),
            token: credentials.astra_db_application_token.clone(),
            keyspace: credentials.astra_db_keyspace.clone(),
            collection: collection.into(),
            filter: Map::new(),
        }
    }

    /// Restrict searches to documents whose metadata equals `value` at `key`.
    pub fn with_metadata_filter(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.filter.insert(format!("metadata.{}", key), value.into());
        self
    }

    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    fn endpoint(&self) -> String {
        let base = self.api_endpoint.trim_end_matches('/');
        format!("{}/api/json/v1/{}/{}", base, self.keyspace, self.collection)
    }

    fn find_body(&self, vector: &[f32], k: usize) -> Value {
        json!({
            "find": {
                "filter": self.filter,
                "sort": { "$vector": vector },
                "projection": { "content": 1, "metadata": 1, "$vector": 1 },
                "options": { "limit": k, "includeSimilarity": true }
            }
        })
    }

    fn parse_find(body: &str) -> Result<Vec<ScoredCandidate>> {
        let parsed: FindResponse = serde_json::from_str(body)
            .map_err(|e| AssistantError::VectorStore(format!("Malformed response: {}", e)))?;

        if let Some(error) = parsed.errors.first() {
            return Err(AssistantError::VectorStore(format!(
                "{} ({})",
                error.message,
                error.error_code.as_deref().unwrap_or("unknown")
            )));
        }

        let documents = parsed.data.map(|d| d.documents).unwrap_or_default();

        Ok(documents
            .into_iter()
            .map(|doc| ScoredCandidate {
                document: RetrievedDocument {
                    content: doc.content.unwrap_or_default(),
                    metadata: doc.metadata,
                },
                embedding: doc.vector,
                similarity: doc.similarity.unwrap_or(0.0),
            })
            .collect())
    }
}

#[async_trait]
impl VectorStore for AstraCollection {
    async fn search_by_vector(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredCandidate>> {
        let response = self
            .client
            .post(self.endpoint())
            .header("Token", &self.token)
            .json(&self.find_body(vector, k))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(AssistantError::VectorStore(format!(
                "Request failed ({}): {}",
                status, body
            )));
        }

        Self::parse_find(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> Credentials {
        Credentials {
            openai_api_key: "sk".to_string(),
            astra_db_api_endpoint: "https://db-id-region.apps.astra.datastax.com/".to_string(),
            astra_db_application_token: "AstraCS:t".to_string(),
            astra_db_keyspace: "default_keyspace".to_string(),
        }
    }

    #[test]
    fn test_endpoint_construction() {
        let collection = AstraCollection::new(&credentials(), "ecommercedata");
        assert_eq!(
            collection.endpoint(),
            "https://db-id-region.apps.astra.datastax.com/api/json/v1/default_keyspace/ecommercedata"
        );
    }

    #[test]
    fn test_find_body_shape() {
        let collection =
            AstraCollection::new(&credentials(), "c").with_metadata_filter("rating", "4.5");
        let body = collection.find_body(&[0.5, 0.25], 20);

        assert_eq!(body["find"]["options"]["limit"], 20);
        assert_eq!(body["find"]["options"]["includeSimilarity"], true);
        assert_eq!(body["find"]["sort"]["$vector"], json!([0.5, 0.25]));
        assert_eq!(body["find"]["filter"]["metadata.rating"], "4.5");
    }

    #[test]
    fn test_parse_find_documents() {
        let body = r#"{"data": {"documents": [
            {"_id": "1", "content": "Great battery", "metadata": {"product_title": "Phone X", "price": "₹9,999"},
             "$vector": [0.1, 0.2], "$similarity": 0.91}
        ], "nextPageState": null}}"#;

        let candidates = AstraCollection::parse_find(body).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].document.content, "Great battery");
        assert_eq!(candidates[0].embedding, vec![0.1, 0.2]);
        assert!((candidates[0].similarity - 0.91).abs() < 1e-6);
        assert_eq!(candidates[0].document.metadata_text("product_title"), "Phone X");
    }

    #[test]
    fn test_parse_find_surfaces_api_errors() {
        let body = r#"{"errors": [{"message": "Collection does not exist", "errorCode": "COLLECTION_NOT_EXIST"}]}"#;
        let err = AstraCollection::parse_find(body).unwrap_err().to_string();
        assert!(err.contains("COLLECTION_NOT_EXIST"));
    }

    #[test]
    fn test_format_context_uses_placeholders() {
        let doc = RetrievedDocument::new("  Works well  ").with_metadata("product_title", "Laptop");
        assert_eq!(
            doc.format_context(),
            "Title: Laptop\nPrice: N/A\nRating: N/A\nReviews:\nWorks well"
        );
    }
}
