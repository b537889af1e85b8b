use crate::models::{ResolvedMetadata, SourceMetadata, UNKNOWN_AUTHOR};
use lopdf::{Dictionary, Document, Object};

/// Normalizes raw source metadata. Malformed values degrade to defaults.
pub fn resolve(source: &SourceMetadata) -> ResolvedMetadata {
    let author = source
        .author
        .as_deref()
        .and_then(clean_text)
        .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string());

    ResolvedMetadata {
        author,
        publication_year: source.creation_date.as_deref().and_then(parse_publication_year),
        title: source.title.as_deref().and_then(clean_text),
    }
}

/// Year from a PDF date (`D:YYYYMMDD...`), a bare `YYYYMMDD...` stamp, or a
/// value that starts with exactly four digits (`2004-05-01`).
pub fn parse_publication_year(raw: &str) -> Option<i32> {
    let trimmed = raw.trim();
    let (digits, is_pdf_date) = match trimmed.strip_prefix("D:") {
        Some(rest) => (rest, true),
        None => (trimmed, false),
    };

    let leading_digits = digits.chars().take_while(char::is_ascii_digit).count();
    let accepted = if is_pdf_date {
        leading_digits >= 4
    } else {
        leading_digits == 4 || leading_digits >= 8
    };
    if !accepted {
        return None;
    }

    digits[..4].parse::<i32>().ok().filter(|year| *year > 0)
}

fn clean_text(value: &str) -> Option<String> {
    let cleaned = value
        .chars()
        .filter(|c| !c.is_control() && *c != '\u{feff}')
        .collect::<String>();
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Reads `/Author`, `/Title` and `/CreationDate` from the trailer Info dictionary.
pub fn read_info_metadata(document: &Document) -> SourceMetadata {
    let Some(info) = info_dictionary(document) else {
        return SourceMetadata::default();
    };

    SourceMetadata {
        author: info_string(document, info, b"Author"),
        creation_date: info_string(document, info, b"CreationDate"),
        title: info_string(document, info, b"Title"),
    }
}

fn info_dictionary(document: &Document) -> Option<&Dictionary> {
    match document.trailer.get(b"Info").ok()? {
        Object::Reference(id) => document.get_object(*id).ok()?.as_dict().ok(),
        Object::Dictionary(dictionary) => Some(dictionary),
        _ => None,
    }
}

fn info_string(document: &Document, info: &Dictionary, key: &[u8]) -> Option<String> {
    let value = match info.get(key).ok()? {
        Object::Reference(id) => document.get_object(*id).ok()?,
        other => other,
    };

    match value {
        Object::String(bytes, _) => Some(decode_pdf_text(bytes)),
        Object::Name(bytes) => Some(decode_pdf_text(bytes)),
        _ => None,
    }
}

/// PDF text strings are UTF-16BE when they carry a byte order mark, otherwise
/// PDFDocEncoding, which agrees with Latin-1 for printable text.
pub fn decode_pdf_text(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect::<Vec<_>>();
        return String::from_utf16_lossy(&units);
    }

    if let Some(utf8) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(utf8).into_owned();
    }

    bytes.iter().map(|byte| char::from(*byte)).collect()
}
