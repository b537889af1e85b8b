pub mod assembler;
pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod heading;
pub mod metadata;
pub mod models;
pub mod stores;
pub mod traits;

pub use assembler::{
    book_id_for, digest_file, discover_pdf_files, ingest_folder, AssembledDocument, BatchOptions,
    DocumentAssembler, DocumentOutcome, DocumentSummary, IngestionReport, SkippedPdf,
};
pub use chunking::{
    normalize_page_text, normalize_whitespace, split_spans, Chunker, ChunkingConfig,
};
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, EmbeddingEndpointConfig, RemoteEmbedder,
    DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{IngestError, SkipReason};
pub use extractor::{
    LayoutFallbackExtractor, LopdfExtractor, PartitionEndpointConfig, PartitionServiceExtractor,
    PdfExtractor,
};
pub use heading::{HeadingDetector, HeadingRule};
pub use metadata::{parse_publication_year, resolve as resolve_metadata};
pub use models::{
    BookChunk, BookDocument, ChunkRow, ElementCategory, ExtractedDocument, HeadingCandidate,
    HeadingSource, IngestionOptions, Page, PageElement, ResolvedMetadata, SourceMetadata,
    TaggedPage, UNKNOWN_AUTHOR,
};
pub use stores::JsonlChunkStore;
pub use traits::ChunkSink;
