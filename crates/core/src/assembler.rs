use crate::chunking::{Chunker, ChunkingConfig};
use crate::embeddings::Embedder;
use crate::error::{IngestError, SkipReason};
use crate::extractor::PdfExtractor;
use crate::heading::HeadingDetector;
use crate::metadata;
use crate::models::{BookChunk, BookDocument, ExtractedDocument, IngestionOptions, TaggedPage};
use crate::traits::ChunkSink;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Book id of a file: its name without extension.
pub fn book_id_for(path: &Path) -> Result<String, IngestError> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::trim)
        .filter(|stem| !stem.is_empty())
        .map(str::to_string)
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))
}

/// Reserves the book id of `path` for this batch. Stems repeat across
/// subfolders; only the first file (in discovery order) keeps the id.
fn claim_book_id(
    claimed: &mut HashMap<String, PathBuf>,
    path: &Path,
) -> Result<String, SkipReason> {
    let book_id = book_id_for(path)?;
    match claimed.entry(book_id.clone()) {
        Entry::Occupied(first) => Err(SkipReason::DuplicateBookId {
            book_id,
            first_path: first.get().display().to_string(),
        }),
        Entry::Vacant(slot) => {
            slot.insert(path.to_path_buf());
            Ok(book_id)
        }
    }
}

fn check_dimensions(
    vectors: Vec<Vec<f32>>,
    dimensions: usize,
) -> Result<Vec<Vec<f32>>, IngestError> {
    match vectors.iter().find(|vector| vector.len() != dimensions) {
        Some(vector) => Err(IngestError::Embedding(format!(
            "expected {dimensions} dimensions, got {}",
            vector.len()
        ))),
        None => Ok(vectors),
    }
}

#[derive(Debug, Clone)]
pub struct AssembledDocument {
    pub document: BookDocument,
    pub chunks: Vec<BookChunk>,
}

#[derive(Debug)]
pub struct DocumentOutcome {
    pub path: PathBuf,
    pub result: Result<AssembledDocument, SkipReason>,
}

/// Runs extraction, heading detection, metadata resolution and chunking for
/// one file at a time. Holds no per-document state between calls.
pub struct DocumentAssembler<E> {
    extractor: E,
    detector: HeadingDetector,
    chunker: Chunker,
}

impl<E: PdfExtractor> DocumentAssembler<E> {
    /// Fails on an invalid chunking configuration, before any file is touched.
    pub fn new(extractor: E, options: &IngestionOptions) -> Result<Self, IngestError> {
        Ok(Self {
            extractor,
            detector: HeadingDetector::new(options.heading_max_chars)?,
            chunker: Chunker::new(ChunkingConfig::from(options))?,
        })
    }

    pub fn tag_pages(&self, extracted: ExtractedDocument) -> Vec<TaggedPage> {
        extracted
            .pages
            .into_iter()
            .map(|page| TaggedPage {
                heading: self.detector.detect(&page),
                page,
            })
            .collect()
    }

    pub fn assemble(&self, path: &Path) -> Result<AssembledDocument, SkipReason> {
        let book_id = book_id_for(path)?;
        let checksum = digest_file(path)?;
        debug!(path = %path.display(), book_id = %book_id, "extracting");

        let extracted = self.extractor.extract(path)?;
        Ok(self.assemble_extracted(book_id, path, checksum, extracted))
    }

    pub fn assemble_extracted(
        &self,
        book_id: String,
        path: &Path,
        checksum: String,
        extracted: ExtractedDocument,
    ) -> AssembledDocument {
        let resolved = metadata::resolve(&extracted.metadata);
        let document = BookDocument {
            document_id: book_id,
            source_path: path.to_string_lossy().to_string(),
            author: resolved.author,
            publication_year: resolved.publication_year,
            title: resolved.title,
            checksum,
            ingested_at: Utc::now(),
        };

        let tagged = self.tag_pages(extracted);
        let chunks = self.chunker.chunk(&document, &tagged);

        info!(
            book_id = %document.document_id,
            author = %document.author,
            publication_year = ?document.publication_year,
            pages = tagged.len(),
            chunk_count = chunks.len(),
            "document assembled"
        );

        AssembledDocument { document, chunks }
    }

    /// Assembles every path independently; a failing file never stops the rest.
    pub fn assemble_batch(&self, paths: &[PathBuf]) -> Vec<DocumentOutcome> {
        let mut claimed = HashMap::new();
        paths
            .iter()
            .map(|path| {
                let result = claim_book_id(&mut claimed, path).and_then(|_| self.assemble(path));
                if let Err(reason) = &result {
                    warn!(path = %path.display(), reason = %reason, "skipped pdf");
                }
                DocumentOutcome {
                    path: path.clone(),
                    result,
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: SkipReason,
}

#[derive(Debug, Clone)]
pub struct DocumentSummary {
    pub book_id: String,
    pub path: PathBuf,
    pub chunk_count: usize,
}

#[derive(Debug, Default)]
pub struct IngestionReport {
    pub documents: Vec<DocumentSummary>,
    pub skipped_files: Vec<SkippedPdf>,
    pub already_loaded: Vec<String>,
}

impl IngestionReport {
    pub fn chunk_count(&self) -> usize {
        self.documents.iter().map(|summary| summary.chunk_count).sum()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOptions {
    /// Skip books the sink already holds.
    pub resume: bool,
}

/// Assembles every PDF under `folder` and hands each finished document to `sink`.
///
/// Per-file extraction or embedding failures are recorded in the report. A sink
/// failure aborts the remaining files and is returned; documents written before
/// it stay complete.
pub async fn ingest_folder<E, S>(
    assembler: &DocumentAssembler<E>,
    folder: &Path,
    sink: &S,
    embedder: Option<&dyn Embedder>,
    options: BatchOptions,
) -> Result<IngestionReport, IngestError>
where
    E: PdfExtractor,
    S: ChunkSink + Sync,
{
    let files = discover_pdf_files(folder);

    if files.is_empty() {
        return Err(IngestError::InvalidArgument(format!(
            "no pdf files found in {}",
            folder.display()
        )));
    }

    let existing = if options.resume {
        sink.existing_book_ids().await?
    } else {
        Default::default()
    };

    let mut report = IngestionReport::default();
    let mut claimed = HashMap::new();

    for path in files {
        let book_id = match claim_book_id(&mut claimed, &path) {
            Ok(book_id) => book_id,
            Err(reason) => {
                warn!(path = %path.display(), reason = %reason, "skipped pdf");
                report.skipped_files.push(SkippedPdf { path, reason });
                continue;
            }
        };

        if existing.contains(&book_id) {
            debug!(book_id = %book_id, "already loaded");
            report.already_loaded.push(book_id);
            continue;
        }

        info!(path = %path.display(), "processing");
        let assembled = match assembler.assemble(&path) {
            Ok(assembled) => assembled,
            Err(reason) => {
                warn!(path = %path.display(), reason = %reason, "skipped pdf");
                report.skipped_files.push(SkippedPdf { path, reason });
                continue;
            }
        };

        if assembled.chunks.is_empty() {
            info!(book_id = %assembled.document.document_id, "no extractable text");
            report.documents.push(DocumentSummary {
                book_id: assembled.document.document_id,
                path,
                chunk_count: 0,
            });
            continue;
        }

        let embeddings = match embedder {
            Some(embedder) => {
                let texts: Vec<&str> = assembled
                    .chunks
                    .iter()
                    .map(|chunk| chunk.content.as_str())
                    .collect();
                match embedder
                    .embed_all(&texts)
                    .and_then(|vectors| check_dimensions(vectors, embedder.dimensions()))
                {
                    Ok(vectors) => Some(vectors),
                    Err(error) => {
                        let reason = SkipReason::from(error);
                        warn!(path = %path.display(), reason = %reason, "skipped pdf");
                        report.skipped_files.push(SkippedPdf { path, reason });
                        continue;
                    }
                }
            }
            None => None,
        };

        sink.write_document(&assembled.document, &assembled.chunks, embeddings.as_deref())
            .await?;

        report.documents.push(DocumentSummary {
            book_id: assembled.document.document_id,
            path,
            chunk_count: assembled.chunks.len(),
        });
    }

    Ok(report)
}
