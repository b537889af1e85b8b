use crate::error::IngestError;
use crate::models::{BookChunk, BookDocument, IngestionOptions, TaggedPage};
use sha2::{Digest, Sha256};

/// Placed between the normalized text of consecutive pages.
pub const PAGE_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
    /// Boundary search avoids cuts shorter than this; capped at `max_chars`.
    pub min_chars: usize,
}

impl From<IngestionOptions> for ChunkingConfig {
    fn from(value: IngestionOptions) -> Self {
        Self::from(&value)
    }
}

impl From<&IngestionOptions> for ChunkingConfig {
    fn from(value: &IngestionOptions) -> Self {
        Self {
            max_chars: value.chunk_max_chars,
            overlap_chars: value.chunk_overlap_chars,
            min_chars: value.min_chunk_chars,
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self::from(IngestionOptions::default())
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.max_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "max_chars must be greater than 0".to_string(),
            ));
        }

        if self.overlap_chars >= self.max_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap_chars ({}) must be smaller than max_chars ({})",
                self.overlap_chars, self.max_chars
            )));
        }

        Ok(())
    }

    fn boundary_floor(&self) -> usize {
        self.min_chars
            .max(self.overlap_chars + 1)
            .min(self.max_chars)
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\u{a0}', " ")
}

/// Collapses spacing inside each line and runs of blank lines into a single
/// blank line, keeping the line structure the boundary search relies on.
pub fn normalize_page_text(text: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut pending_blank = false;

    for line in text.lines() {
        let collapsed = normalize_whitespace(line);
        if collapsed.is_empty() {
            pending_blank = !lines.is_empty();
            continue;
        }

        if pending_blank {
            lines.push(String::new());
            pending_blank = false;
        }
        lines.push(collapsed);
    }

    lines.join("\n")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    Paragraph,
    Line,
    Sentence,
    Whitespace,
}

impl Boundary {
    const PREFERENCE: [Boundary; 4] = [
        Boundary::Paragraph,
        Boundary::Line,
        Boundary::Sentence,
        Boundary::Whitespace,
    ];

    /// Whether cutting right before `chars[cut]` lands on this kind of boundary.
    fn accepts(self, chars: &[char], cut: usize) -> bool {
        if cut == 0 {
            return false;
        }
        let before = chars[cut - 1];

        match self {
            Boundary::Paragraph => cut >= 2 && before == '\n' && chars[cut - 2] == '\n',
            Boundary::Line => before == '\n',
            Boundary::Sentence => {
                before.is_whitespace()
                    && cut >= 2
                    && matches!(chars[cut - 2], '.' | '!' | '?' | '"' | '\u{201d}')
            }
            Boundary::Whitespace => before.is_whitespace(),
        }
    }
}

fn find_cut(chars: &[char], start: usize, config: ChunkingConfig) -> usize {
    let hard = start + config.max_chars;
    let floor = start + config.boundary_floor();

    Boundary::PREFERENCE
        .iter()
        .find_map(|boundary| (floor..=hard).rev().find(|&cut| boundary.accepts(chars, cut)))
        .unwrap_or(hard)
}

/// Splits `chars` into `[start, end)` spans no longer than `max_chars`, where each
/// span after the first starts `overlap_chars` before the previous one ended.
pub fn split_spans(chars: &[char], config: ChunkingConfig) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        if chars.len() - start <= config.max_chars {
            spans.push((start, chars.len()));
            break;
        }

        let end = find_cut(chars, start, config);
        spans.push((start, end));
        start = end - config.overlap_chars;
    }

    spans
}

/// Normalized text of one document plus where each page and heading takes effect.
#[derive(Debug, Default)]
struct DocumentLayout {
    chars: Vec<char>,
    page_starts: Vec<(usize, u32)>,
    section_starts: Vec<(usize, String)>,
}

impl DocumentLayout {
    fn build(pages: &[TaggedPage]) -> Self {
        let mut layout = Self::default();
        let mut pending_heading: Option<String> = None;

        for tagged in pages {
            if let Some(heading) = &tagged.heading {
                pending_heading = Some(heading.text.clone());
            }

            let normalized = normalize_page_text(&tagged.page.raw_text);
            if normalized.is_empty() {
                continue;
            }

            if !layout.chars.is_empty() {
                layout.chars.extend(PAGE_SEPARATOR.chars());
            }
            let offset = layout.chars.len();
            layout.page_starts.push((offset, tagged.page.page_number));
            if let Some(heading) = pending_heading.take() {
                layout.section_starts.push((offset, heading));
            }
            layout.chars.extend(normalized.chars());
        }

        layout
    }

    fn page_at(&self, offset: usize) -> u32 {
        self.page_starts
            .iter()
            .take_while(|(start, _)| *start <= offset)
            .last()
            .map(|(_, page)| *page)
            .unwrap_or(1)
    }

    fn section_at(&self, offset: usize) -> Option<String> {
        self.section_starts
            .iter()
            .take_while(|(start, _)| *start <= offset)
            .last()
            .map(|(_, heading)| heading.clone())
    }
}

/// Turns a document's tagged pages into bounded, overlapping chunks.
///
/// Holds only configuration; every call to [`Chunker::chunk`] starts from
/// empty state, so one instance can serve any number of documents.
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Result<Self, IngestError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn chunk(&self, document: &BookDocument, pages: &[TaggedPage]) -> Vec<BookChunk> {
        let layout = DocumentLayout::build(pages);

        split_spans(&layout.chars, self.config)
            .into_iter()
            .enumerate()
            .map(|(index, (start, end))| {
                let content: String = layout.chars[start..end].iter().collect();
                let chunk_index = index as u64;

                BookChunk {
                    chunk_id: make_chunk_id(&document.document_id, chunk_index, &content),
                    book_id: document.document_id.clone(),
                    chunk_index,
                    content,
                    section_title: layout.section_at(start),
                    page_number: layout.page_at(start),
                    author: document.author.clone(),
                    publication_year: document.publication_year,
                }
            })
            .collect()
    }
}

fn make_chunk_id(book_id: &str, index: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(book_id.as_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heading::HeadingDetector;
    use crate::models::{HeadingCandidate, HeadingSource, Page};

    fn document(id: &str) -> BookDocument {
        BookDocument {
            document_id: id.to_string(),
            source_path: format!("/tmp/{id}.pdf"),
            author: "Martin Kleppmann".to_string(),
            publication_year: Some(2017),
            title: None,
            checksum: "checksum".to_string(),
            ingested_at: chrono::Utc::now(),
        }
    }

    fn words(count: usize) -> String {
        vec!["word"; count].join(" ")
    }

    fn tag(pages: Vec<Page>) -> Vec<TaggedPage> {
        let detector = HeadingDetector::new(80).expect("detector");
        pages
            .into_iter()
            .map(|page| TaggedPage {
                heading: detector.detect(&page),
                page,
            })
            .collect()
    }

    fn heading(text: &str, page_number: u32) -> Option<HeadingCandidate> {
        Some(HeadingCandidate {
            text: text.to_string(),
            page_number,
            confidence_source: HeadingSource::LayoutTitle,
        })
    }

    fn prose_pages() -> Vec<Page> {
        (1..=6)
            .map(|page_number| {
                let text = (0..40)
                    .map(|sentence| {
                        let line = format!(
                            "Sentence {sentence} on page {page_number} describes how replicas agree on a value."
                        );
                        if sentence % 7 == 6 {
                            format!("{line}\n\n")
                        } else {
                            format!("{line}\n")
                        }
                    })
                    .collect::<String>();
                Page::plain(page_number, text)
            })
            .collect()
    }

    fn assert_chunk_properties(chunks: &[BookChunk], pages: &[TaggedPage], config: ChunkingConfig) {
        for (position, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, position as u64);
            assert!(chunk.content.chars().count() <= config.max_chars);
        }

        for pair in chunks.windows(2) {
            let previous: Vec<char> = pair[0].content.chars().collect();
            let next: Vec<char> = pair[1].content.chars().collect();
            let tail = &previous[previous.len() - config.overlap_chars..];
            let head = &next[..config.overlap_chars];
            assert_eq!(tail, head);
        }

        let mut rebuilt = String::new();
        for (position, chunk) in chunks.iter().enumerate() {
            if position == 0 {
                rebuilt.push_str(&chunk.content);
            } else {
                rebuilt.extend(chunk.content.chars().skip(config.overlap_chars));
            }
        }
        let original = pages
            .iter()
            .map(|tagged| tagged.page.raw_text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        assert_eq!(normalize_whitespace(&rebuilt), normalize_whitespace(&original));
    }

    #[test]
    fn whitespace_is_normalized() {
        let input = "A  \t  lot\nof   spacing";
        let normalized = normalize_whitespace(input);
        assert_eq!(normalized, "A lot of spacing");
    }

    #[test]
    fn page_text_keeps_lines_and_single_blank_lines() {
        let input = "  Title  \n\n\n\nfirst   line\r\nsecond\t line\n\n";
        assert_eq!(normalize_page_text(input), "Title\n\nfirst line\nsecond line");
    }

    #[test]
    fn overlap_not_below_max_is_rejected() {
        let config = ChunkingConfig {
            max_chars: 100,
            overlap_chars: 100,
            min_chars: 10,
        };
        assert!(matches!(
            Chunker::new(config),
            Err(IngestError::InvalidChunkConfig(_))
        ));

        let zero_overlap = ChunkingConfig {
            max_chars: 100,
            overlap_chars: 0,
            min_chars: 10,
        };
        assert!(Chunker::new(zero_overlap).is_ok());
    }

    #[test]
    fn soft_minimum_above_max_is_clamped() {
        let config = ChunkingConfig {
            max_chars: 400,
            overlap_chars: 100,
            min_chars: 500,
        };
        let chunker = Chunker::new(config).expect("min_chars never invalidates a config");
        let pages = tag(vec![Page::plain(1, words(300))]);

        let chunks = chunker.chunk(&document("short-chunks"), &pages);
        assert!(chunks.len() > 1);
        assert_chunk_properties(&chunks, &pages, config);
    }

    #[test]
    fn three_page_book_yields_four_chunks_under_first_chapter() {
        let pages = tag(vec![
            Page::plain(1, format!("Chapter 1: Intro\n{}", words(96))),
            Page::plain(2, words(500)),
            Page::plain(3, words(20)),
        ]);
        let config = ChunkingConfig {
            max_chars: 1000,
            overlap_chars: 100,
            min_chars: 500,
        };

        let chunks = Chunker::new(config)
            .expect("valid config")
            .chunk(&document("designing-data"), &pages);

        assert_eq!(chunks.len(), 4);
        assert!(chunks
            .iter()
            .all(|chunk| chunk.section_title.as_deref() == Some("Chapter 1: Intro")));
        let starts: Vec<u32> = chunks.iter().map(|chunk| chunk.page_number).collect();
        assert_eq!(starts, vec![1, 2, 2, 2]);
        assert_eq!(chunks[0].book_id, "designing-data");
        assert_eq!(chunks[0].author, "Martin Kleppmann");
        assert_eq!(chunks[3].publication_year, Some(2017));
        assert_chunk_properties(&chunks, &pages, config);
    }

    #[test]
    fn empty_document_yields_no_chunks() {
        let chunker = Chunker::new(ChunkingConfig::default()).expect("valid config");
        assert!(chunker.chunk(&document("empty"), &[]).is_empty());

        let blank_pages = tag(vec![Page::plain(1, ""), Page::plain(2, "  \n \t")]);
        assert!(chunker.chunk(&document("blank"), &blank_pages).is_empty());
    }

    #[test]
    fn short_document_is_kept_as_single_chunk() {
        let pages = tag(vec![Page::plain(1, "just a few words")]);
        let chunks = Chunker::new(ChunkingConfig::default())
            .expect("valid config")
            .chunk(&document("tiny"), &pages);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "just a few words");
        assert_eq!(chunks[0].section_title, None);
    }

    #[test]
    fn chunk_properties_hold_across_configs() {
        let pages = tag(prose_pages());
        for (max_chars, overlap_chars, min_chars) in
            [(2000, 300, 500), (700, 0, 200), (450, 120, 50), (300, 250, 0)]
        {
            let config = ChunkingConfig {
                max_chars,
                overlap_chars,
                min_chars,
            };
            let chunks = Chunker::new(config)
                .expect("valid config")
                .chunk(&document("prose"), &pages);

            assert!(chunks.len() > 1);
            assert_chunk_properties(&chunks, &pages, config);
        }
    }

    #[test]
    fn boundaries_prefer_paragraphs_over_words() {
        let pages = tag(prose_pages());
        let chunks = Chunker::new(ChunkingConfig::default())
            .expect("valid config")
            .chunk(&document("prose"), &pages);

        for chunk in &chunks[..chunks.len() - 1] {
            assert!(chunk.content.ends_with("\n\n") || chunk.content.ends_with('\n'));
        }
    }

    #[test]
    fn unbroken_text_is_hard_cut() {
        let pages = tag(vec![Page::plain(1, "x".repeat(2500))]);
        let config = ChunkingConfig {
            max_chars: 1000,
            overlap_chars: 100,
            min_chars: 500,
        };
        let chunks = Chunker::new(config)
            .expect("valid config")
            .chunk(&document("solid"), &pages);

        let lengths: Vec<usize> = chunks.iter().map(|chunk| chunk.content.len()).collect();
        assert_eq!(lengths, vec![1000, 1000, 700]);
        assert_chunk_properties(&chunks, &pages, config);
    }

    #[test]
    fn heading_never_labels_earlier_chunks() {
        let pages = tag(vec![
            Page::plain(1, words(300)),
            Page::plain(2, format!("Chapter 2 Streams\n{}", words(300))),
            Page::plain(3, words(300)),
        ]);
        let config = ChunkingConfig {
            max_chars: 800,
            overlap_chars: 80,
            min_chars: 400,
        };
        let chunks = Chunker::new(config)
            .expect("valid config")
            .chunk(&document("streams"), &pages);

        assert!(chunks.iter().any(|chunk| chunk.page_number == 1
            && chunk.content.contains("Chapter 2 Streams")));
        for chunk in &chunks {
            if chunk.page_number < 2 {
                assert_eq!(chunk.section_title, None);
            } else {
                assert_eq!(chunk.section_title.as_deref(), Some("Chapter 2 Streams"));
            }
        }
    }

    #[test]
    fn heading_on_blank_page_applies_from_next_page() {
        let pages = vec![
            TaggedPage {
                page: Page::plain(1, words(100)),
                heading: None,
            },
            TaggedPage {
                page: Page::plain(2, ""),
                heading: heading("Part Two", 2),
            },
            TaggedPage {
                page: Page::plain(3, words(100)),
                heading: None,
            },
        ];
        let config = ChunkingConfig {
            max_chars: 300,
            overlap_chars: 20,
            min_chars: 100,
        };
        let chunks = Chunker::new(config)
            .expect("valid config")
            .chunk(&document("parts"), &pages);

        for chunk in &chunks {
            let expected = (chunk.page_number >= 3).then_some("Part Two");
            assert_eq!(chunk.section_title.as_deref(), expected);
        }
        assert!(chunks.iter().any(|chunk| chunk.page_number == 3));
    }

    #[test]
    fn chunking_is_deterministic() {
        let pages = tag(prose_pages());
        let chunker = Chunker::new(ChunkingConfig::default()).expect("valid config");
        let first = chunker.chunk(&document("prose"), &pages);
        let second = chunker.chunk(&document("prose"), &pages);
        assert_eq!(first, second);
    }

    #[test]
    fn multibyte_text_is_counted_in_characters() {
        let pages = tag(vec![Page::plain(1, "é".repeat(150))]);
        let config = ChunkingConfig {
            max_chars: 100,
            overlap_chars: 10,
            min_chars: 50,
        };
        let chunks = Chunker::new(config)
            .expect("valid config")
            .chunk(&document("accents"), &pages);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content.chars().count(), 100);
        assert_eq!(chunks[1].content.chars().count(), 60);
    }
}
