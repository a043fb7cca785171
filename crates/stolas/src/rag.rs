//! Retrieval-Augmented Generation pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use paimon_core::Result;
use serde::{Deserialize, Serialize};

use crate::embedding::Embedder;
use crate::store::{SearchParams, SearchResult, VectorStore};

/// Configuration for retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Maximum number of segments returned.
    pub max_results: usize,
    /// Minimum relevance score a segment must reach, where relevance is
    /// `(cosine + 1) / 2`. The default 0.75 admits cosine 0.5 and above.
    pub min_score: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_results: 5,
            min_score: 0.75,
        }
    }
}

/// Source of context segments for a user query.
#[async_trait]
pub trait ContentRetriever: Send + Sync {
    /// Returns segments relevant to `query`, best first.
    async fn retrieve(&self, query: &str) -> Result<Vec<SearchResult>>;
}

/// RAG pipeline for retrieval-augmented generation.
pub struct RagPipeline {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    config: RetrievalConfig,
}

impl RagPipeline {
    /// Creates a new RAG pipeline.
    ///
    /// `embedder` must be the one used at ingestion time.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            config,
        }
    }

    /// Returns the retrieval configuration.
    #[must_use]
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Builds context from retrieved segments.
    #[must_use]
    pub fn build_context(&self, results: &[SearchResult]) -> String {
        build_context(results)
    }

    /// Returns `query` with retrieved context appended, or `query` unchanged
    /// when nothing relevant was found.
    ///
    /// # Errors
    ///
    /// Returns an error if retrieval fails.
    pub async fn augment(&self, query: &str) -> Result<String> {
        let results = self.retrieve(query).await?;
        Ok(augment_with(query, &self.build_context(&results)))
    }
}

/// Numbers retrieved segments into a context block, best first.
#[must_use]
pub fn build_context(results: &[SearchResult]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("[{}] {}", i + 1, r.segment.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Appends a context block to a user message.
#[must_use]
pub fn augment_with(query: &str, context: &str) -> String {
    if context.is_empty() {
        return query.to_string();
    }
    format!("{query}\n\nAnswer using the following information:\n{context}")
}

#[async_trait]
impl ContentRetriever for RagPipeline {
    async fn retrieve(&self, query: &str) -> Result<Vec<SearchResult>> {
        let query_embedding = self.embedder.embed_single(query).await?;

        let params = SearchParams {
            top_k: self.config.max_results,
            min_score: Some(self.config.min_score),
        };
        let results = self.store.search(&query_embedding, params).await?;

        tracing::debug!(
            hits = results.len(),
            top_score = results.first().map(|r| r.score),
            "Retrieved segments"
        );

        Ok(results)
    }
}
