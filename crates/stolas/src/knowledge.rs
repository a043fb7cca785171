//! Startup ingestion of a document directory into a queryable index.

use std::path::PathBuf;
use std::sync::Arc;

use paimon_core::Result;
use serde::{Deserialize, Serialize};

use crate::embedding::Embedder;
use crate::ingest::{EmbeddingIngestor, IngestionReport};
use crate::loader::FileSystemDocumentLoader;
use crate::rag::{RagPipeline, RetrievalConfig};
use crate::splitter::ParagraphSplitter;
use crate::store::{InMemoryStore, VectorStore};
use crate::transformer::FileNamePrefixTransformer;

/// What to do when documents cannot be loaded or indexed at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestFailurePolicy {
    /// Log a warning and serve from an empty index.
    #[default]
    Degrade,
    /// Abort startup with the error.
    FailFast,
}

/// Knowledge base configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeBaseConfig {
    /// Directory holding the source documents.
    pub docs_dir: PathBuf,
    /// Maximum segment size in characters.
    pub max_segment_size: usize,
    /// Maximum overlap between adjacent segments in characters.
    pub max_overlap: usize,
    /// Segments per embedding call.
    pub batch_size: usize,
    /// Retrieval settings.
    #[serde(flatten)]
    pub retrieval: RetrievalConfig,
    /// Behavior on ingestion failure.
    pub on_ingest_failure: IngestFailurePolicy,
}

impl Default for KnowledgeBaseConfig {
    fn default() -> Self {
        Self {
            docs_dir: PathBuf::from("docs"),
            max_segment_size: 1000,
            max_overlap: 200,
            batch_size: EmbeddingIngestor::DEFAULT_BATCH_SIZE,
            retrieval: RetrievalConfig::default(),
            on_ingest_failure: IngestFailurePolicy::default(),
        }
    }
}

/// Outcome of startup ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestStatus {
    /// All documents were indexed.
    Ready {
        /// Documents indexed.
        documents: usize,
        /// Segments stored.
        segments: usize,
    },
    /// Ingestion failed and the index is empty.
    Degraded {
        /// Why ingestion failed.
        reason: String,
    },
}

impl IngestStatus {
    /// Returns true if documents were indexed successfully.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }
}

/// An indexed document collection plus its retriever.
pub struct KnowledgeBase {
    pipeline: Arc<RagPipeline>,
    ingestor: EmbeddingIngestor,
    status: IngestStatus,
    config: KnowledgeBaseConfig,
}

impl KnowledgeBase {
    /// Loads, splits, embeds and indexes `config.docs_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid splitter settings, or for any load or
    /// ingestion failure under [`IngestFailurePolicy::FailFast`].
    pub async fn bootstrap(config: KnowledgeBaseConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let splitter = Arc::new(ParagraphSplitter::new(
            config.max_segment_size,
            config.max_overlap,
        )?);
        let store: Arc<dyn VectorStore> = Arc::new(InMemoryStore::new());

        let ingestor = EmbeddingIngestor::new(splitter, embedder.clone(), store.clone())
            .with_transformer(Arc::new(FileNamePrefixTransformer))
            .with_batch_size(config.batch_size);
        let pipeline = Arc::new(RagPipeline::new(embedder, store, config.retrieval.clone()));

        let mut kb = Self {
            pipeline,
            ingestor,
            status: IngestStatus::Degraded {
                reason: "not ingested".to_string(),
            },
            config,
        };
        kb.reload().await?;
        Ok(kb)
    }

    /// Re-reads the document directory and rebuilds the index from scratch.
    ///
    /// # Errors
    ///
    /// Returns an error under [`IngestFailurePolicy::FailFast`] if loading or
    /// ingestion fails.
    pub async fn reload(&mut self) -> Result<&IngestStatus> {
        let outcome = match FileSystemDocumentLoader::load_documents(&self.config.docs_dir).await {
            Ok(documents) => self.ingestor.rebuild(&documents).await,
            Err(e) => Err(e),
        };

        self.status = match outcome {
            Ok(IngestionReport {
                documents,
                segments,
            }) => IngestStatus::Ready {
                documents,
                segments,
            },
            Err(e) if self.config.on_ingest_failure == IngestFailurePolicy::Degrade => {
                tracing::warn!(
                    error = %e,
                    dir = %self.config.docs_dir.display(),
                    "Document ingestion failed, continuing with an empty index"
                );
                self.ingestor.store().clear().await?;
                IngestStatus::Degraded {
                    reason: e.to_string(),
                }
            }
            Err(e) => return Err(e),
        };

        Ok(&self.status)
    }

    /// Returns the retriever over the indexed segments.
    #[must_use]
    pub fn retriever(&self) -> Arc<RagPipeline> {
        self.pipeline.clone()
    }

    /// Returns the startup ingestion status.
    #[must_use]
    pub fn status(&self) -> &IngestStatus {
        &self.status
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &KnowledgeBaseConfig {
        &self.config
    }
}
