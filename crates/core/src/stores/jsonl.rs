use crate::models::{BookChunk, BookDocument, ChunkRow};
use crate::traits::ChunkSink;
use crate::IngestError;
use async_trait::async_trait;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Appends one JSON object per chunk row to a file.
pub struct JsonlChunkStore {
    path: PathBuf,
}

impl JsonlChunkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drops every stored row.
    pub async fn reset(&self) -> Result<(), IngestError> {
        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, b"").await?;
        Ok(())
    }

    pub async fn read_rows(&self) -> Result<Vec<ChunkRow>, IngestError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(error.into()),
        };

        let mut rows = Vec::new();
        for (line_no, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ChunkRow>(line) {
                Ok(row) => rows.push(row),
                Err(error) => warn!(
                    path = %self.path.display(),
                    line = line_no + 1,
                    error = %error,
                    "ignoring malformed chunk row"
                ),
            }
        }

        Ok(rows)
    }
}

#[async_trait]
impl ChunkSink for JsonlChunkStore {
    async fn existing_book_ids(&self) -> Result<HashSet<String>, IngestError> {
        Ok(self
            .read_rows()
            .await?
            .into_iter()
            .map(|row| row.book_id)
            .collect())
    }

    async fn write_document(
        &self,
        document: &BookDocument,
        chunks: &[BookChunk],
        embeddings: Option<&[Vec<f32>]>,
    ) -> Result<(), IngestError> {
        if let Some(embeddings) = embeddings {
            if embeddings.len() != chunks.len() {
                return Err(IngestError::Sink(format!(
                    "embedding count {} doesn't match chunk count {}",
                    embeddings.len(),
                    chunks.len()
                )));
            }
        }

        let mut buffer = String::new();
        for (position, chunk) in chunks.iter().enumerate() {
            let vector = embeddings.map(|vectors| vectors[position].clone());
            buffer.push_str(&serde_json::to_string(&ChunkRow::from_chunk(chunk, vector))?);
            buffer.push('\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|error| {
                IngestError::Sink(format!("cannot open {}: {error}", self.path.display()))
            })?;
        file.write_all(buffer.as_bytes()).await?;
        file.flush().await?;

        debug!(
            book_id = %document.document_id,
            rows = chunks.len(),
            path = %self.path.display(),
            "rows appended"
        );
        Ok(())
    }
}
