//! Embeddings over an OpenAI-compatible API.

use async_trait::async_trait;
use paimon_core::{Error, Result};
use serde::Deserialize;
use serde_json::json;
use stolas::Embedder;

use crate::client::{OpenAiClient, OpenAiConfig};

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// An embedding model served behind `/embeddings`.
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    client: OpenAiClient,
    model: String,
    dimension: usize,
}

impl OpenAiEmbedder {
    /// Creates an embedder.
    ///
    /// `dimension` is the vector size the model produces; responses of any
    /// other size are rejected.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &OpenAiConfig, model: impl Into<String>, dimension: usize) -> Result<Self> {
        Ok(Self::with_client(OpenAiClient::new(config)?, model, dimension))
    }

    /// Creates an embedder sharing an existing client.
    pub fn with_client(client: OpenAiClient, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            client,
            model: model.into(),
            dimension,
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let payload = json!({
            "model": self.model,
            "input": texts,
            "encoding_format": "float",
        });
        let response = self.client.post_json("/embeddings", &payload).await?;
        let body: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| Error::backend("openai", format!("invalid embeddings body: {e}")))?;

        order_embeddings(body.data, texts.len(), self.dimension)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn order_embeddings(mut data: Vec<EmbeddingData>, expected: usize, dimension: usize) -> Result<Vec<Vec<f32>>> {
    if data.len() != expected {
        return Err(Error::backend(
            "openai",
            format!("expected {expected} embeddings, got {}", data.len()),
        ));
    }
    data.sort_by_key(|d| d.index);

    data.into_iter()
        .map(|d| {
            if d.embedding.len() == dimension {
                Ok(d.embedding)
            } else {
                Err(Error::backend(
                    "openai",
                    format!("expected dimension {dimension}, got {}", d.embedding.len()),
                ))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embeddings_are_reordered_by_index() {
        let body: EmbeddingsResponse = serde_json::from_str(
            r#"{"data":[{"index":1,"embedding":[0.0,1.0]},{"index":0,"embedding":[1.0,0.0]}]}"#,
        )
        .unwrap();
        let vectors = order_embeddings(body.data, 2, 2).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_dimension_mismatch_is_rejected() {
        let data = vec![EmbeddingData {
            index: 0,
            embedding: vec![1.0, 2.0, 3.0],
        }];
        assert!(order_embeddings(data, 1, 2).is_err());
    }

    #[test]
    fn test_count_mismatch_is_rejected() {
        assert!(order_embeddings(Vec::new(), 1, 2).is_err());
    }

    #[tokio::test]
    async fn test_empty_input_skips_request() {
        let embedder = OpenAiEmbedder::new(&OpenAiConfig::default(), "text-embedding-v3", 1024).unwrap();
        assert!(embedder.embed(&[]).await.unwrap().is_empty());
        assert_eq!(embedder.model_name(), "text-embedding-v3");
    }
}
