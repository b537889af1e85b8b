use crate::error::IngestError;
use crate::metadata::read_info_metadata;
use crate::models::{ElementCategory, ExtractedDocument, Page, PageElement, SourceMetadata};
use base64::{engine::general_purpose::STANDARD, Engine};
use lopdf::Document;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};
use url::Url;

pub trait PdfExtractor {
    fn extract(&self, path: &Path) -> Result<ExtractedDocument, IngestError>;
}

/// Local text extraction. Produces no element classification.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract(&self, path: &Path) -> Result<ExtractedDocument, IngestError> {
        let document =
            Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        if document.is_encrypted() {
            return Err(IngestError::PdfParse(format!(
                "pdf is encrypted: {}",
                path.display()
            )));
        }

        let pages = collect_pages(path, document.get_pages().into_keys(), |page_no| {
            document.extract_text(&[page_no])
        });

        Ok(ExtractedDocument {
            pages,
            metadata: read_info_metadata(&document),
        })
    }
}

/// One page per number. A page whose text cannot be decoded stays in the
/// document with empty text instead of failing the whole file.
fn collect_pages<I, F, E>(path: &Path, page_numbers: I, mut extract: F) -> Vec<Page>
where
    I: IntoIterator<Item = u32>,
    F: FnMut(u32) -> Result<String, E>,
    E: std::fmt::Display,
{
    page_numbers
        .into_iter()
        .map(|page_no| match extract(page_no) {
            Ok(text) => Page::plain(page_no, text),
            Err(error) => {
                warn!(
                    path = %path.display(),
                    page = page_no,
                    error = %error,
                    "page text extraction failed, keeping empty page"
                );
                Page::plain(page_no, String::new())
            }
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct PartitionEndpointConfig {
    pub endpoint: Url,
    pub api_key: Option<String>,
}

impl PartitionEndpointConfig {
    pub fn new(endpoint: &str, api_key: Option<String>) -> Result<Self, IngestError> {
        let api_key = api_key.and_then(|value| {
            let key = value.trim().to_string();
            if key.is_empty() {
                None
            } else {
                Some(key)
            }
        });

        Ok(Self {
            endpoint: Url::parse(endpoint.trim())?,
            api_key,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
struct PartitionRequest {
    pdf_base64: String,
    source_path: String,
}

#[derive(Debug, Clone, Deserialize)]
struct PartitionResponse {
    #[serde(default)]
    elements: Vec<PartitionElement>,
    #[serde(default)]
    metadata: Option<PartitionMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
struct PartitionElement {
    #[serde(default, alias = "type")]
    category: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    page_number: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PartitionMetadata {
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    creation_date: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

/// Layout-model extraction through a remote partition service.
///
/// The service receives the PDF as base64 JSON and answers with classified
/// elements (`Title`, `NarrativeText`, ...) tagged with page numbers.
#[derive(Debug, Clone)]
pub struct PartitionServiceExtractor {
    config: PartitionEndpointConfig,
}

impl PartitionServiceExtractor {
    pub fn new(config: PartitionEndpointConfig) -> Self {
        Self { config }
    }

    fn extract_blocking(&self, path: &Path) -> Result<ExtractedDocument, IngestError> {
        let pdf = std::fs::read(path)?;
        let payload = PartitionRequest {
            pdf_base64: STANDARD.encode(pdf),
            source_path: path.to_string_lossy().to_string(),
        };

        let mut request = Client::new()
            .post(self.config.endpoint.clone())
            .header("content-type", "application/json")
            .json(&payload);

        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send()?;

        if !response.status().is_success() {
            return Err(IngestError::PartitionFailed(format!(
                "partition request to {} returned {}",
                self.config.endpoint,
                response.status()
            )));
        }

        let payload: PartitionResponse = response.json()?;
        payload_to_document(payload, path)
    }
}

impl PdfExtractor for PartitionServiceExtractor {
    fn extract(&self, path: &Path) -> Result<ExtractedDocument, IngestError> {
        // The blocking client owns a runtime and must live off any async worker.
        std::thread::scope(|scope| {
            scope
                .spawn(|| self.extract_blocking(path))
                .join()
                .unwrap_or_else(|_| {
                    Err(IngestError::PartitionFailed(format!(
                        "partition worker panicked for {}",
                        path.display()
                    )))
                })
        })
    }
}

fn payload_to_document(
    payload: PartitionResponse,
    path: &Path,
) -> Result<ExtractedDocument, IngestError> {
    let mut grouped: BTreeMap<u32, Vec<PageElement>> = BTreeMap::new();

    for element in payload.elements {
        let Some(text) = element.text.map(|value| value.trim().to_string()) else {
            continue;
        };
        if text.is_empty() {
            continue;
        }

        let category = element
            .category
            .as_deref()
            .map(ElementCategory::from_label)
            .unwrap_or(ElementCategory::NarrativeText);

        grouped
            .entry(element.page_number.unwrap_or(1))
            .or_default()
            .push(PageElement { category, text });
    }

    if grouped.is_empty() {
        return Err(IngestError::PartitionFailed(format!(
            "partition response was empty for {}",
            path.display()
        )));
    }

    let pages = grouped
        .into_iter()
        .map(|(page_number, elements)| Page {
            page_number,
            raw_text: elements
                .iter()
                .map(|element| element.text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n"),
            elements: Some(elements),
        })
        .collect();

    let metadata = payload.metadata.unwrap_or_default();

    Ok(ExtractedDocument {
        pages,
        metadata: SourceMetadata {
            author: metadata.author,
            creation_date: metadata.creation_date,
            title: metadata.title,
        },
    })
}

/// Tries the layout service first when one is configured and falls back to
/// plain lopdf text when it is missing or fails.
#[derive(Debug, Clone, Default)]
pub struct LayoutFallbackExtractor {
    layout: Option<PartitionServiceExtractor>,
    fallback: LopdfExtractor,
}

impl LayoutFallbackExtractor {
    pub fn new(layout: Option<PartitionEndpointConfig>) -> Self {
        Self {
            layout: layout.map(PartitionServiceExtractor::new),
            fallback: LopdfExtractor,
        }
    }
}

impl PdfExtractor for LayoutFallbackExtractor {
    fn extract(&self, path: &Path) -> Result<ExtractedDocument, IngestError> {
        let Some(layout) = &self.layout else {
            return self.fallback.extract(path);
        };

        match layout.extract(path) {
            Ok(document) => {
                debug!(path = %path.display(), pages = document.pages.len(), "layout extraction");
                Ok(document)
            }
            Err(layout_error) => {
                warn!(
                    path = %path.display(),
                    error = %layout_error,
                    "layout extraction failed, using plain text"
                );
                self.fallback.extract(path).map_err(|fallback_error| {
                    IngestError::PdfParse(format!(
                        "{fallback_error}; layout extraction also failed: {layout_error}"
                    ))
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn element(category: &str, text: &str, page: Option<u32>) -> PartitionElement {
        PartitionElement {
            category: Some(category.to_string()),
            text: Some(text.to_string()),
            page_number: page,
        }
    }

    #[test]
    fn partition_payload_groups_elements_by_page() {
        let response = PartitionResponse {
            elements: vec![
                element("Title", "Chapter 1: Reliable Systems", Some(1)),
                element("NarrativeText", "Many applications today are data-intensive.", Some(1)),
                element("NarrativeText", "   ", Some(2)),
                element("ListItem", "Scalability", Some(3)),
            ],
            metadata: Some(PartitionMetadata {
                author: Some("Martin Kleppmann".to_string()),
                creation_date: Some("D:2017".to_string()),
                title: None,
            }),
        };

        let document = payload_to_document(response, Path::new("ddia.pdf"))
            .expect("partition response should be parsed");

        assert_eq!(document.pages.len(), 2);
        assert_eq!(document.pages[0].page_number, 1);
        assert_eq!(
            document.pages[0].raw_text,
            "Chapter 1: Reliable Systems\n\nMany applications today are data-intensive."
        );
        let elements = document.pages[0].elements.as_ref().expect("elements");
        assert_eq!(elements[0].category, ElementCategory::Title);
        assert_eq!(document.pages[1].page_number, 3);
        assert_eq!(document.metadata.author.as_deref(), Some("Martin Kleppmann"));
    }

    #[test]
    fn partition_payload_accepts_type_alias() {
        let response: PartitionResponse = serde_json::from_str(
            r#"{"elements":[{"type":"Title","text":"Preface","page_number":2}]}"#,
        )
        .expect("json");

        let document = payload_to_document(response, Path::new("x.pdf")).expect("document");
        let elements = document.pages[0].elements.as_ref().expect("elements");
        assert_eq!(elements[0].category, ElementCategory::Title);
        assert_eq!(document.metadata, SourceMetadata::default());
    }

    #[test]
    fn empty_partition_payload_is_an_error() {
        let response = PartitionResponse {
            elements: Vec::new(),
            metadata: None,
        };
        assert!(matches!(
            payload_to_document(response, Path::new("x.pdf")),
            Err(IngestError::PartitionFailed(_))
        ));
    }

    #[test]
    fn endpoint_config_trims_blank_key() {
        let config =
            PartitionEndpointConfig::new(" http://localhost:8000/partition ", Some("  ".to_string()))
                .expect("valid url");
        assert_eq!(config.api_key, None);
        assert_eq!(config.endpoint.path(), "/partition");
        assert!(PartitionEndpointConfig::new("not a url", None).is_err());
    }

    #[test]
    fn undecodable_page_is_kept_empty() {
        let pages = collect_pages(Path::new("book.pdf"), 1..=3, |page_no| {
            if page_no == 2 {
                Err("unknown font encoding")
            } else {
                Ok(format!("Text of page {page_no}"))
            }
        });

        assert_eq!(pages.len(), 3);
        assert_eq!(pages[1], Page::plain(2, String::new()));
        assert_eq!(pages[2].raw_text, "Text of page 3");
    }

    #[test]
    fn lopdf_rejects_broken_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"%PDF-1.4\n%broken")?;

        let result = LayoutFallbackExtractor::default().extract(&path);
        assert!(matches!(result, Err(IngestError::PdfParse(_))));
        Ok(())
    }
}
