use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("partition service failed: {0}")]
    PartitionFailed(String),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("chunk sink failed: {0}")]
    Sink(String),
}

/// Why a single document was left out of a batch. Never aborts the batch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SkipReason {
    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("path has no usable file name: {0}")]
    MissingFileName(String),

    #[error("book id {book_id} is already used by {first_path}")]
    DuplicateBookId { book_id: String, first_path: String },
}

impl From<IngestError> for SkipReason {
    fn from(error: IngestError) -> Self {
        match error {
            IngestError::MissingFileName(path) => SkipReason::MissingFileName(path),
            IngestError::Embedding(details) => SkipReason::Embedding(details),
            other => SkipReason::Extraction(other.to_string()),
        }
    }
}
