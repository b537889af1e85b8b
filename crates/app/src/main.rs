use book_chunker_core::{
    book_id_for, digest_file, ingest_folder, BatchOptions, CharacterNgramEmbedder, ChunkSink,
    DocumentAssembler, Embedder, EmbeddingEndpointConfig, HeadingDetector, IngestionOptions,
    JsonlChunkStore, LayoutFallbackExtractor, PartitionEndpointConfig, PdfExtractor,
    RemoteEmbedder,
};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "book-chunker", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    chunking: ChunkingArgs,

    /// Layout partition service URL; plain text extraction is used when unset.
    #[arg(long, env = "PARTITION_ENDPOINT")]
    partition_endpoint: Option<String>,

    /// Bearer token for the partition service.
    #[arg(long, env = "PARTITION_API_KEY", hide_env_values = true)]
    partition_api_key: Option<String>,
}

#[derive(Args)]
struct ChunkingArgs {
    /// Hard maximum characters per chunk.
    #[arg(long, env = "CHUNK_MAX_CHARS", default_value_t = 2000)]
    max_chars: usize,

    /// Characters shared between consecutive chunks.
    #[arg(long, env = "CHUNK_OVERLAP", default_value_t = 300)]
    overlap_chars: usize,

    /// Boundary search never cuts a chunk shorter than this.
    #[arg(long, env = "CHUNK_MIN_CHARS", default_value_t = 500)]
    min_chars: usize,

    /// Longest first line still considered as a heading.
    #[arg(long, env = "HEADING_MAX_CHARS", default_value_t = 80)]
    heading_max_chars: usize,
}

impl ChunkingArgs {
    fn options(&self) -> IngestionOptions {
        IngestionOptions {
            chunk_max_chars: self.max_chars,
            chunk_overlap_chars: self.overlap_chars,
            min_chunk_chars: self.min_chars,
            heading_max_chars: self.heading_max_chars,
        }
    }
}

#[derive(Args)]
struct EmbeddingArgs {
    /// OpenAI-compatible embeddings URL; rows carry no vector when unset.
    #[arg(long, env = "EMBEDDING_ENDPOINT")]
    embedding_endpoint: Option<String>,

    #[arg(long, env = "EMBEDDING_API_KEY", hide_env_values = true)]
    embedding_api_key: Option<String>,

    #[arg(long, env = "EMBEDDING_MODEL", default_value = "text-embedding-3-small")]
    embedding_model: String,

    /// Length every returned vector must have.
    #[arg(long, env = "EMBEDDING_DIMENSIONS", default_value_t = 1536)]
    embedding_dimensions: usize,

    /// Offline hashed trigram vectors instead of a model, for dry runs.
    #[arg(long, default_value_t = false, conflicts_with = "embedding_endpoint")]
    offline_embeddings: bool,
}

impl EmbeddingArgs {
    fn embedder(&self) -> anyhow::Result<Option<Box<dyn Embedder>>> {
        if self.offline_embeddings {
            return Ok(Some(Box::new(CharacterNgramEmbedder::default())));
        }

        let Some(endpoint) = self
            .embedding_endpoint
            .as_deref()
            .filter(|endpoint| !endpoint.trim().is_empty())
        else {
            return Ok(None);
        };

        let config = EmbeddingEndpointConfig::new(
            endpoint,
            self.embedding_api_key.clone(),
            &self.embedding_model,
            self.embedding_dimensions,
        )
        .map_err(|error| anyhow::anyhow!(error.to_string()))?;
        Ok(Some(Box::new(RemoteEmbedder::new(config))))
    }
}

#[derive(Subcommand)]
enum Command {
    /// Chunk every PDF under a folder and append rows to a JSON-lines file.
    Ingest {
        /// Folder that contains PDFs recursively.
        #[arg(long)]
        folder: String,
        /// Output JSON-lines file.
        #[arg(long, default_value = "chunks.jsonl")]
        out: String,
        /// Keep existing rows and skip books already present.
        #[arg(long, short = 'r', default_value_t = false)]
        resume: bool,
        #[command(flatten)]
        embedding: EmbeddingArgs,
    },
    /// Chunk a single PDF and print the chunks as JSON.
    Chunk {
        #[arg(long)]
        file: String,
    },
    /// Print the heading detected on each page of a PDF.
    Headings {
        #[arg(long)]
        file: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let options = cli.chunking.options();

    let layout = cli
        .partition_endpoint
        .as_deref()
        .filter(|endpoint| !endpoint.trim().is_empty())
        .map(|endpoint| PartitionEndpointConfig::new(endpoint, cli.partition_api_key.clone()))
        .transpose()
        .map_err(|error| anyhow::anyhow!(error.to_string()))?;

    let assembler = DocumentAssembler::new(LayoutFallbackExtractor::new(layout.clone()), &options)
        .map_err(|error| anyhow::anyhow!(error.to_string()))?;

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        max_chars = options.chunk_max_chars,
        overlap_chars = options.chunk_overlap_chars,
        layout_service = layout.is_some(),
        "book-chunker boot"
    );

    match cli.command {
        Command::Ingest {
            folder,
            out,
            resume,
            embedding,
        } => {
            let store = JsonlChunkStore::new(&out);
            if !resume {
                store
                    .reset()
                    .await
                    .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            } else {
                let existing = store
                    .existing_book_ids()
                    .await
                    .map_err(|error| anyhow::anyhow!(error.to_string()))?;
                info!(existing = existing.len(), "resume mode, loaded books are skipped");
            }

            let embedder = embedding.embedder()?;

            let report = ingest_folder(
                &assembler,
                Path::new(&folder),
                &store,
                embedder.as_deref(),
                BatchOptions { resume },
            )
            .await
            .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            if !report.skipped_files.is_empty() {
                warn!(
                    "skipped_files={} for folder={}",
                    report.skipped_files.len(),
                    folder
                );
                for skipped in &report.skipped_files {
                    warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
                }
            }

            if report.chunk_count() == 0 && report.already_loaded.is_empty() {
                println!("0 chunks written (no extractable text or all files were skipped)");
            }

            println!(
                "{} chunks from {} books written to {} at {} ({} skipped, {} already loaded)",
                report.chunk_count(),
                report.documents.len(),
                store.path().display(),
                Utc::now().to_rfc3339(),
                report.skipped_files.len(),
                report.already_loaded.len()
            );
        }
        Command::Chunk { file } => {
            let assembled = assembler
                .assemble(Path::new(&file))
                .map_err(|reason| anyhow::anyhow!("{file}: {reason}"))?;

            info!(
                book_id = %assembled.document.document_id,
                chunk_count = assembled.chunks.len(),
                "chunked"
            );
            println!("{}", serde_json::to_string_pretty(&assembled.chunks)?);
        }
        Command::Headings { file } => {
            let path = Path::new(&file);
            let extracted = LayoutFallbackExtractor::new(layout)
                .extract(path)
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            let detector = HeadingDetector::new(options.heading_max_chars)
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            println!(
                "book_id={} checksum={}",
                book_id_for(path).map_err(|error| anyhow::anyhow!(error.to_string()))?,
                digest_file(path).map_err(|error| anyhow::anyhow!(error.to_string()))?
            );
            for page in &extracted.pages {
                match detector.detect(page) {
                    Some(heading) => println!(
                        "[page {}] {:?}: {}",
                        page.page_number, heading.confidence_source, heading.text
                    ),
                    None => println!("[page {}] -", page.page_number),
                }
            }
        }
    }

    Ok(())
}
