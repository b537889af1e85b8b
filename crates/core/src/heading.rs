//! Per-page section heading detection.
//!
//! A page is run through an ordered list of [`HeadingRule`]s and the first rule
//! that accepts yields the page's [`HeadingCandidate`]. Layout classification
//! from the extractor wins over line heuristics; pages with no match return
//! `None` so the previous heading stays in effect.

use crate::error::IngestError;
use crate::models::{HeadingCandidate, HeadingSource, Page};
use regex::Regex;

/// Accepted heading text is capped at this many characters.
pub const MAX_HEADING_TEXT_CHARS: usize = 120;

const DIVISION_PATTERN: &str =
    r"^(?i:chapter|section|part|appendix|book)\s+(?:\d+|(?i:[ivxlcdm]+))\b|^\d+(?:\.\d+)*\.?\s+\p{Lu}";

const TERMINAL_PUNCTUATION: [char; 5] = ['.', '!', '?', ';', ','];

const MINOR_WORDS: [&str; 14] = [
    "a", "an", "and", "as", "at", "by", "for", "in", "of", "on", "or", "the", "to", "with",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadingRule {
    /// First element the extractor classified as a title.
    LayoutTitle,
    /// First line reads like "Chapter 5", "Part IV" or "3.2 Storage".
    NumberedDivision,
    /// First line is short, unpunctuated and title-cased or all caps.
    CapitalizedShortLine,
}

impl HeadingRule {
    pub const ALL: [HeadingRule; 3] = [
        HeadingRule::LayoutTitle,
        HeadingRule::NumberedDivision,
        HeadingRule::CapitalizedShortLine,
    ];

    fn source(self) -> HeadingSource {
        match self {
            HeadingRule::LayoutTitle => HeadingSource::LayoutTitle,
            HeadingRule::NumberedDivision => HeadingSource::NumberedDivision,
            HeadingRule::CapitalizedShortLine => HeadingSource::CapitalizedShortLine,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HeadingDetector {
    rules: Vec<HeadingRule>,
    max_line_chars: usize,
    division_re: Regex,
}

impl HeadingDetector {
    pub fn new(max_line_chars: usize) -> Result<Self, IngestError> {
        Self::with_rules(HeadingRule::ALL.to_vec(), max_line_chars)
    }

    pub fn with_rules(rules: Vec<HeadingRule>, max_line_chars: usize) -> Result<Self, IngestError> {
        if max_line_chars == 0 {
            return Err(IngestError::InvalidArgument(
                "heading line threshold must be positive".to_string(),
            ));
        }

        Ok(Self {
            rules,
            max_line_chars,
            division_re: Regex::new(DIVISION_PATTERN)?,
        })
    }

    pub fn detect(&self, page: &Page) -> Option<HeadingCandidate> {
        let first_line = first_non_empty_line(&page.raw_text);

        self.rules.iter().find_map(|rule| {
            let text = match rule {
                HeadingRule::LayoutTitle => layout_title(page),
                HeadingRule::NumberedDivision | HeadingRule::CapitalizedShortLine => first_line
                    .filter(|line| self.line_matches(*rule, line))
                    .map(str::to_string),
            }?;

            Some(HeadingCandidate {
                text: clean_heading_text(&text),
                page_number: page.page_number,
                confidence_source: rule.source(),
            })
        })
    }

    /// Whether a single line would be accepted by any of the line heuristics.
    pub fn looks_like_heading(&self, line: &str) -> bool {
        let line = line.trim();
        [HeadingRule::NumberedDivision, HeadingRule::CapitalizedShortLine]
            .into_iter()
            .any(|rule| self.line_matches(rule, line))
    }

    fn line_matches(&self, rule: HeadingRule, line: &str) -> bool {
        if !is_short_unpunctuated(line, self.max_line_chars) {
            return false;
        }

        match rule {
            HeadingRule::LayoutTitle => false,
            HeadingRule::NumberedDivision => self.division_re.is_match(line),
            HeadingRule::CapitalizedShortLine => {
                !reads_like_body_text(line) && (is_all_caps(line) || is_title_case(line))
            }
        }
    }
}

fn layout_title(page: &Page) -> Option<String> {
    page.elements
        .as_ref()?
        .iter()
        .filter(|element| element.category.is_structural_title())
        .map(|element| element.text.trim())
        .find(|text| !text.is_empty())
        .map(str::to_string)
}

fn first_non_empty_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|line| !line.is_empty())
}

fn clean_heading_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(MAX_HEADING_TEXT_CHARS)
        .collect()
}

fn is_short_unpunctuated(line: &str, max_chars: usize) -> bool {
    let line = line.trim();
    if line.is_empty() || line.chars().count() > max_chars {
        return false;
    }

    match line.chars().last() {
        Some(last) => !TERMINAL_PUNCTUATION.contains(&last),
        None => false,
    }
}

fn words_with_letters(line: &str) -> impl Iterator<Item = &str> {
    line.split_whitespace()
        .filter(|word| word.chars().any(char::is_alphabetic))
}

fn first_letter(word: &str) -> Option<char> {
    word.chars().find(|c| c.is_alphabetic())
}

/// Lowercase start or a majority of lowercase words marks continuation prose.
fn reads_like_body_text(line: &str) -> bool {
    let Some(first) = words_with_letters(line).next().and_then(first_letter) else {
        return true;
    };
    if first.is_lowercase() {
        return true;
    }

    let (lower, total) = words_with_letters(line)
        .skip(1)
        .filter(|word| !MINOR_WORDS.contains(&word.to_lowercase().as_str()))
        .filter_map(first_letter)
        .fold((0usize, 0usize), |(lower, total), letter| {
            (lower + usize::from(letter.is_lowercase()), total + 1)
        });

    total > 0 && lower * 2 > total
}

fn is_all_caps(line: &str) -> bool {
    let mut letters = line.chars().filter(|c| c.is_alphabetic()).peekable();
    letters.peek().is_some() && letters.all(|c| !c.is_lowercase())
}

fn is_title_case(line: &str) -> bool {
    words_with_letters(line)
        .enumerate()
        .filter(|(position, word)| {
            *position == 0 || !MINOR_WORDS.contains(&word.to_lowercase().as_str())
        })
        .filter_map(|(_, word)| first_letter(word))
        .all(|letter| letter.is_uppercase())
}
