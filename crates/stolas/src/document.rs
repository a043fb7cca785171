//! Documents and the text segments cut from them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key/value metadata attached to documents and segments.
pub type Metadata = HashMap<String, Value>;

/// Metadata key holding the source file name.
pub const FILE_NAME: &str = "file_name";

/// Metadata key holding the absolute path of the source directory.
pub const ABSOLUTE_DIRECTORY_PATH: &str = "absolute_directory_path";

/// Metadata key holding a segment's position within its document.
pub const INDEX: &str = "index";

/// A loaded document. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    text: String,
    metadata: Metadata,
}

impl Document {
    /// Creates a document without metadata.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: Metadata::new(),
        }
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Returns the document text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the document metadata.
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Returns the source file name, if known.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.metadata.get(FILE_NAME).and_then(Value::as_str)
    }
}

/// A contiguous slice of a document plus derived metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSegment {
    /// Segment text.
    pub text: String,
    /// Metadata copied from the document, plus the segment index.
    pub metadata: Metadata,
}

impl TextSegment {
    /// Creates a segment with the given metadata.
    #[must_use]
    pub fn new(text: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }

    /// Creates a segment without metadata.
    #[must_use]
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::new(text, Metadata::new())
    }

    /// Returns a string metadata value.
    #[must_use]
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    /// Returns the source file name, if known.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.metadata_str(FILE_NAME)
    }

    /// Returns the segment's index within its document.
    #[must_use]
    pub fn index(&self) -> Option<u64> {
        self.metadata.get(INDEX).and_then(Value::as_u64)
    }
}
