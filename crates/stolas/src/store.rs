//! Vector storage backends.

use async_trait::async_trait;
use paimon_core::Result;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::document::TextSegment;
use crate::embedding::{cosine_similarity, relevance_score};

/// A stored embedding and the segment it was computed from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Unique identifier.
    pub id: String,
    /// The embedding vector.
    pub vector: Vec<f32>,
    /// The originating segment.
    pub segment: TextSegment,
}

impl VectorRecord {
    /// Creates a record with a fresh identifier.
    #[must_use]
    pub fn new(vector: Vec<f32>, segment: TextSegment) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            vector,
            segment,
        }
    }
}

/// A search hit.
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// The matched segment.
    pub segment: TextSegment,
    /// Relevance to the query in `[0, 1]`, `(cosine + 1) / 2`.
    pub score: f32,
}

/// Parameters for vector search.
#[derive(Debug, Clone)]
pub struct SearchParams {
    /// Maximum number of results.
    pub top_k: usize,
    /// Minimum relevance score; hits below it are dropped.
    pub min_score: Option<f32>,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            top_k: 10,
            min_score: None,
        }
    }
}

/// Trait for vector storage backends.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Appends records. Returns the number added.
    async fn add(&self, records: Vec<VectorRecord>) -> Result<usize>;

    /// Searches for the most similar records.
    async fn search(&self, query: &[f32], params: SearchParams) -> Result<Vec<SearchResult>>;

    /// Replaces the entire contents with `records`.
    async fn replace(&self, records: Vec<VectorRecord>) -> Result<usize>;

    /// Removes every record.
    async fn clear(&self) -> Result<()>;

    /// Returns the total number of records.
    async fn count(&self) -> Result<usize>;
}

/// In-memory vector store with brute-force search.
///
/// Records keep insertion order, which also breaks score ties.
#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<Vec<VectorRecord>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn add(&self, records: Vec<VectorRecord>) -> Result<usize> {
        let count = records.len();
        self.records.write().extend(records);
        Ok(count)
    }

    async fn search(&self, query: &[f32], params: SearchParams) -> Result<Vec<SearchResult>> {
        let store = self.records.read();

        let mut results: Vec<SearchResult> = store
            .iter()
            .map(|record| SearchResult {
                segment: record.segment.clone(),
                score: relevance_score(cosine_similarity(query, &record.vector)),
            })
            .filter(|r| params.min_score.map_or(true, |min| r.score >= min))
            .collect();

        // Stable sort keeps insertion order among equal scores.
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(params.top_k);

        Ok(results)
    }

    async fn replace(&self, records: Vec<VectorRecord>) -> Result<usize> {
        let count = records.len();
        *self.records.write() = records;
        Ok(count)
    }

    async fn clear(&self) -> Result<()> {
        self.records.write().clear();
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(vector: Vec<f32>, text: &str) -> VectorRecord {
        VectorRecord::new(vector, TextSegment::from_text(text))
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemoryStore::new();
        store
            .add(vec![
                record(vec![1.0, 0.0, 0.0], "east"),
                record(vec![0.0, 1.0, 0.0], "north"),
                record(vec![0.7, 0.7, 0.0], "north-east"),
            ])
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 3);

        let results = store
            .search(&[1.0, 0.0, 0.0], SearchParams::default())
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].segment.text, "east");
        assert!(results[0].score > 0.99);
        assert_eq!(results[1].segment.text, "north-east");
    }

    #[tokio::test]
    async fn test_min_score_and_top_k() {
        let store = InMemoryStore::new();
        store
            .add(vec![
                record(vec![1.0, 0.0], "a"),
                record(vec![0.9, 0.1], "b"),
                record(vec![0.0, 1.0], "c"),
            ])
            .await
            .unwrap();

        let params = SearchParams {
            top_k: 1,
            min_score: Some(0.75),
        };
        let results = store.search(&[1.0, 0.0], params).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].segment.text, "a");

        let params = SearchParams {
            top_k: 10,
            min_score: Some(0.75),
        };
        let results = store.search(&[1.0, 0.0], params).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.score >= 0.75));
    }

    #[tokio::test]
    async fn test_scores_are_relevance_not_raw_cosine() {
        let store = InMemoryStore::new();
        store
            .add(vec![
                record(vec![0.6, 0.8], "related"),
                record(vec![-1.0, 0.0], "opposite"),
            ])
            .await
            .unwrap();

        let params = SearchParams {
            top_k: 10,
            min_score: Some(0.75),
        };
        let results = store.search(&[1.0, 0.0], params).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].segment.text, "related");
        assert!((results[0].score - 0.8).abs() < 1e-5);

        let all = store.search(&[1.0, 0.0], SearchParams::default()).await.unwrap();
        assert!(all.iter().all(|r| (0.0..=1.0).contains(&r.score)));
    }

    #[tokio::test]
    async fn test_ties_keep_insertion_order() {
        let store = InMemoryStore::new();
        store
            .add(vec![
                record(vec![1.0, 0.0], "first"),
                record(vec![1.0, 0.0], "second"),
                record(vec![1.0, 0.0], "third"),
            ])
            .await
            .unwrap();

        let results = store.search(&[1.0, 0.0], SearchParams::default()).await.unwrap();
        let texts: Vec<_> = results.iter().map(|r| r.segment.text.as_str()).collect();
        assert_eq!(texts, ["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_replace_and_clear() {
        let store = InMemoryStore::new();
        store.add(vec![record(vec![1.0], "old")]).await.unwrap();

        store
            .replace(vec![record(vec![1.0], "new-1"), record(vec![1.0], "new-2")])
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
        let results = store.search(&[1.0], SearchParams::default()).await.unwrap();
        assert!(results.iter().all(|r| r.segment.text.starts_with("new")));

        store.clear().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(store.search(&[1.0], SearchParams::default()).await.unwrap().is_empty());
    }
}
