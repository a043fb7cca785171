//! Embedding ingestion: split, transform, embed, store.

use std::sync::Arc;

use paimon_core::{Error, Result};

use crate::document::{Document, TextSegment};
use crate::embedding::Embedder;
use crate::splitter::DocumentSplitter;
use crate::store::{VectorRecord, VectorStore};
use crate::transformer::SegmentTransformer;

/// Summary of an ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestionReport {
    /// Documents processed.
    pub documents: usize,
    /// Segments embedded and stored.
    pub segments: usize,
}

/// Turns documents into stored embeddings.
pub struct EmbeddingIngestor {
    splitter: Arc<dyn DocumentSplitter>,
    transformer: Option<Arc<dyn SegmentTransformer>>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    batch_size: usize,
}

impl EmbeddingIngestor {
    /// Default number of segments per embedding call.
    pub const DEFAULT_BATCH_SIZE: usize = 32;

    /// Creates an ingestor without a transformer.
    pub fn new(
        splitter: Arc<dyn DocumentSplitter>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            splitter,
            transformer: None,
            embedder,
            store,
            batch_size: Self::DEFAULT_BATCH_SIZE,
        }
    }

    /// Sets the segment transformer.
    #[must_use]
    pub fn with_transformer(mut self, transformer: Arc<dyn SegmentTransformer>) -> Self {
        self.transformer = Some(transformer);
        self
    }

    /// Sets the embedding batch size (at least 1).
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Returns the store written to.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Appends the documents' segments to the store.
    ///
    /// Running this twice over the same documents stores duplicates.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding or storage fails. Nothing is stored in
    /// that case.
    pub async fn ingest(&self, documents: &[Document]) -> Result<IngestionReport> {
        let records = self.embed_documents(documents).await?;
        let segments = self.store.add(records).await?;

        tracing::info!(
            documents = documents.len(),
            segments = segments,
            "Ingested documents"
        );

        Ok(IngestionReport {
            documents: documents.len(),
            segments,
        })
    }

    /// Replaces the store contents with the documents' segments.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding or storage fails. The previous
    /// contents are kept when embedding fails.
    pub async fn rebuild(&self, documents: &[Document]) -> Result<IngestionReport> {
        let records = self.embed_documents(documents).await?;
        let segments = self.store.replace(records).await?;

        tracing::info!(
            documents = documents.len(),
            segments = segments,
            "Rebuilt index"
        );

        Ok(IngestionReport {
            documents: documents.len(),
            segments,
        })
    }

    async fn embed_documents(&self, documents: &[Document]) -> Result<Vec<VectorRecord>> {
        let mut segments = self.splitter.split_all(documents);
        if let Some(transformer) = &self.transformer {
            segments = transformer.transform_all(segments);
        }

        let mut records = Vec::with_capacity(segments.len());
        for batch in segments.chunks(self.batch_size) {
            records.extend(self.embed_batch(batch).await?);
        }
        Ok(records)
    }

    async fn embed_batch(&self, batch: &[TextSegment]) -> Result<Vec<VectorRecord>> {
        let texts: Vec<&str> = batch.iter().map(|s| s.text.as_str()).collect();
        let vectors = self
            .embedder
            .embed(&texts)
            .await
            .map_err(|e| Error::ingestion(format!("embedding failed: {e}")))?;

        if vectors.len() != batch.len() {
            return Err(Error::ingestion(format!(
                "embedder returned {} vectors for {} segments",
                vectors.len(),
                batch.len()
            )));
        }

        tracing::debug!(batch = batch.len(), model = self.embedder.model_name(), "Embedded batch");

        Ok(vectors
            .into_iter()
            .zip(batch.iter().cloned())
            .map(|(vector, segment)| VectorRecord::new(vector, segment))
            .collect())
    }
}
