use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const UNKNOWN_AUTHOR: &str = "Unknown";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookDocument {
    pub document_id: String,
    pub source_path: String,
    pub author: String,
    pub publication_year: Option<i32>,
    pub title: Option<String>,
    pub checksum: String,
    pub ingested_at: DateTime<Utc>,
}

/// Classification tag attached to an extracted text span by a layout model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementCategory {
    Title,
    NarrativeText,
    ListItem,
    Table,
    Header,
    Footer,
    Other(String),
}

impl ElementCategory {
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "Title" | "title" | "Heading" | "heading" => Self::Title,
            "NarrativeText" | "narrative_text" | "Text" | "text" | "UncategorizedText" => {
                Self::NarrativeText
            }
            "ListItem" | "list_item" => Self::ListItem,
            "Table" | "table" => Self::Table,
            "Header" | "header" => Self::Header,
            "Footer" | "footer" => Self::Footer,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_structural_title(&self) -> bool {
        matches!(self, Self::Title)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageElement {
    pub category: ElementCategory,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// 1-based, increasing within a document.
    pub page_number: u32,
    pub raw_text: String,
    /// `None` when the extractor has no layout model.
    pub elements: Option<Vec<PageElement>>,
}

impl Page {
    pub fn plain(page_number: u32, raw_text: impl Into<String>) -> Self {
        Self {
            page_number,
            raw_text: raw_text.into(),
            elements: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeadingSource {
    LayoutTitle,
    NumberedDivision,
    CapitalizedShortLine,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadingCandidate {
    pub text: String,
    pub page_number: u32,
    pub confidence_source: HeadingSource,
}

/// A page paired with the heading detected on it, as consumed by the chunker.
#[derive(Debug, Clone)]
pub struct TaggedPage {
    pub page: Page,
    pub heading: Option<HeadingCandidate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookChunk {
    pub book_id: String,
    pub chunk_id: String,
    pub chunk_index: u64,
    pub content: String,
    pub section_title: Option<String>,
    pub page_number: u32,
    pub author: String,
    pub publication_year: Option<i32>,
}

/// Raw document-level metadata as found in the source file. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub author: Option<String>,
    pub creation_date: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMetadata {
    pub author: String,
    pub publication_year: Option<i32>,
    pub title: Option<String>,
}

/// Pages and metadata produced by an extractor for one file.
#[derive(Debug, Clone, Default)]
pub struct ExtractedDocument {
    pub pages: Vec<Page>,
    pub metadata: SourceMetadata,
}

/// Row shape handed to persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRow {
    pub book_id: String,
    pub chunk_id: String,
    pub content: String,
    pub author: String,
    pub publication_year: Option<i32>,
    pub section_title: Option<String>,
    pub page_number: u32,
    pub chunk_index: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
}

impl ChunkRow {
    pub fn from_chunk(chunk: &BookChunk, vector: Option<Vec<f32>>) -> Self {
        Self {
            book_id: chunk.book_id.clone(),
            chunk_id: chunk.chunk_id.clone(),
            content: chunk.content.clone(),
            author: chunk.author.clone(),
            publication_year: chunk.publication_year,
            section_title: chunk.section_title.clone(),
            page_number: chunk.page_number,
            chunk_index: chunk.chunk_index,
            vector,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub chunk_max_chars: usize,
    pub chunk_overlap_chars: usize,
    pub min_chunk_chars: usize,
    pub heading_max_chars: usize,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_max_chars: 2_000,
            chunk_overlap_chars: 300,
            min_chunk_chars: 500,
            heading_max_chars: 80,
        }
    }
}
