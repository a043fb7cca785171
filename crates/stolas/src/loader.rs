//! Filesystem document loading.

use std::path::Path;

use paimon_core::{Error, Result};

use crate::document::{Document, ABSOLUTE_DIRECTORY_PATH, FILE_NAME};

/// Loads plain-text documents from a directory.
///
/// Only regular files directly inside the directory are read. Hidden files
/// are skipped and documents are returned sorted by file name.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSystemDocumentLoader;

impl FileSystemDocumentLoader {
    /// Loads every document in `dir`.
    ///
    /// # Errors
    ///
    /// Returns an ingestion error if the directory cannot be read or a file
    /// is not valid UTF-8.
    pub async fn load_documents(dir: impl AsRef<Path>) -> Result<Vec<Document>> {
        let dir = dir.as_ref();
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| Error::ingestion(format!("cannot read {}: {e}", dir.display())))?;

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            if !hidden && entry.file_type().await?.is_file() {
                paths.push(entry.path());
            }
        }
        paths.sort();

        let mut documents = Vec::with_capacity(paths.len());
        for path in paths {
            documents.push(Self::load_document(&path).await?);
        }

        tracing::info!(dir = %dir.display(), count = documents.len(), "Loaded documents");
        Ok(documents)
    }

    /// Loads a single file.
    ///
    /// # Errors
    ///
    /// Returns an ingestion error if the file cannot be read or is not valid
    /// UTF-8.
    pub async fn load_document(path: impl AsRef<Path>) -> Result<Document> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| Error::ingestion(format!("cannot read {}: {e}", path.display())))?;
        let text = String::from_utf8(bytes)
            .map_err(|_| Error::ingestion(format!("{} is not valid UTF-8", path.display())))?;

        let absolute = tokio::fs::canonicalize(path).await?;
        let file_name = absolute
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let directory = absolute
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();

        tracing::debug!(file = %file_name, chars = text.chars().count(), "Loaded document");

        Ok(Document::new(text)
            .with_metadata(FILE_NAME, file_name)
            .with_metadata(ABSOLUTE_DIRECTORY_PATH, directory))
    }
}
