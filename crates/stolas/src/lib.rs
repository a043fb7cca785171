//! # Stolas
//!
//! *"The Prince reveals hidden knowledge"*
//!
//! Stolas is the knowledge engine for Paimon,
//! turning a directory of documents into a queryable in-memory index.
//!
//! ## Features
//!
//! - **Document Loading**: Filesystem loader with provenance metadata
//! - **Splitting**: Paragraph-aware segmentation with bounded overlap
//! - **Embedding**: Pluggable embedders and similarity helpers
//! - **Retrieval**: Thresholded top-K search over an in-memory store

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod document;
pub mod embedding;
pub mod ingest;
pub mod knowledge;
pub mod loader;
pub mod rag;
pub mod splitter;
pub mod store;
pub mod transformer;

pub use document::{Document, Metadata, TextSegment};
pub use embedding::{cosine_similarity, relevance_score, Embedder, HashingEmbedder};
pub use ingest::{EmbeddingIngestor, IngestionReport};
pub use knowledge::{IngestFailurePolicy, IngestStatus, KnowledgeBase, KnowledgeBaseConfig};
pub use loader::FileSystemDocumentLoader;
pub use rag::{augment_with, build_context, ContentRetriever, RagPipeline, RetrievalConfig};
pub use splitter::{DocumentSplitter, ParagraphSplitter, Span};
pub use store::{InMemoryStore, SearchParams, SearchResult, VectorRecord, VectorStore};
pub use transformer::{FileNamePrefixTransformer, SegmentTransformer};
