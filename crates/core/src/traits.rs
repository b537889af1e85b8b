use crate::models::{BookChunk, BookDocument};
use crate::IngestError;
use async_trait::async_trait;
use std::collections::HashSet;

/// Persistence seam for finished documents.
///
/// `write_document` receives every chunk of one document at once; an error is
/// treated as fatal for the whole batch.
#[async_trait]
pub trait ChunkSink {
    async fn existing_book_ids(&self) -> Result<HashSet<String>, IngestError>;

    async fn write_document(
        &self,
        document: &BookDocument,
        chunks: &[BookChunk],
        embeddings: Option<&[Vec<f32>]>,
    ) -> Result<(), IngestError>;
}
