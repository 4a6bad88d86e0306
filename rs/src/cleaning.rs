//! Text cleaning for scraped posts
//!
//! Strips markup, links, handles and hashtags from raw forum/social text,
//! keeps paragraph structure, and bounds the result by paragraph count and
//! an approximate token budget before it is handed to structuring.

use crate::constants::{CHARS_PER_TOKEN, DEFAULT_MAX_PARAGRAPHS, DEFAULT_MAX_TOKENS, MIN_TEXT_LENGTH};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static RE_HTML_TAG: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"<[^>]+>").ok());

static RE_URL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:https?://|www\.)\S+").ok());

// @handles and reddit-style u/ and r/ references
static RE_HANDLE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?:@\w+|\b[ur]/\w+)").ok());

static RE_HASHTAG: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"#\w+").ok());

static RE_PARAGRAPH_BREAK: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*\n").ok());

const HTML_ENTITIES: &[(&str, &str)] = &[
    ("&nbsp;", " "),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&#x27;", "'"),
    ("&apos;", "'"),
    // Last, so "&amp;lt;" decodes to "&lt;" and not "<"
    ("&amp;", "&"),
];

/// Cleaner settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanerOptions {
    pub max_paragraphs: usize,

    /// Approximate token budget, at [`CHARS_PER_TOKEN`] characters per token
    pub max_tokens: usize,

    /// Cleaned text shorter than this many characters is dropped
    pub min_length: usize,
}

impl Default for CleanerOptions {
    fn default() -> Self {
        Self {
            max_paragraphs: DEFAULT_MAX_PARAGRAPHS,
            max_tokens: DEFAULT_MAX_TOKENS,
            min_length: MIN_TEXT_LENGTH,
        }
    }
}

fn strip(pattern: &LazyLock<Option<Regex>>, text: &str) -> String {
    match pattern.as_ref() {
        Some(re) => re.replace_all(text, " ").into_owned(),
        None => {
            tracing::warn!("Cleaning pattern failed to compile, skipping it");
            text.to_string()
        }
    }
}

/// Decode the common HTML entities
pub fn decode_entities(text: &str) -> String {
    HTML_ENTITIES
        .iter()
        .fold(text.to_string(), |acc, (entity, replacement)| {
            acc.replace(entity, replacement)
        })
}

/// Split text into trimmed, non-empty paragraphs (blank-line separated)
pub fn paragraphs(text: &str) -> Vec<String> {
    let normalized = text.replace("\r\n", "\n");
    let parts: Vec<&str> = match RE_PARAGRAPH_BREAK.as_ref() {
        Some(re) => re.split(&normalized).collect(),
        None => normalized.split("\n\n").collect(),
    };
    parts
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Collapse whitespace inside each paragraph and join paragraphs with a
/// single blank line
pub fn normalize_whitespace(text: &str) -> String {
    paragraphs(text)
        .iter()
        .map(|p| p.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Remove markup, links, handles and hashtags, then normalize whitespace
pub fn clean_text(raw: &str) -> String {
    if raw.trim().is_empty() {
        return String::new();
    }

    let text = decode_entities(raw);
    let text = strip(&RE_HTML_TAG, &text);
    let text = strip(&RE_URL, &text);
    let text = strip(&RE_HANDLE, &text);
    let text = strip(&RE_HASHTAG, &text);
    normalize_whitespace(&text)
}

/// Keep the first `max_paragraphs` paragraphs
pub fn truncate_to_paragraphs(text: &str, max_paragraphs: usize) -> String {
    paragraphs(text)
        .into_iter()
        .take(max_paragraphs)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Bound text to roughly `max_tokens` tokens.
///
/// Cuts after the last sentence end inside the window when it falls in the
/// final fifth of the window; otherwise hard-cuts and appends `...`.
pub fn enforce_length_limit(text: &str, max_tokens: usize) -> String {
    let max_chars = max_tokens.saturating_mul(CHARS_PER_TOKEN);
    let Some((cut, _)) = text.char_indices().nth(max_chars) else {
        return text.to_string();
    };

    let window = &text[..cut];
    let sentence_end = window
        .char_indices()
        .enumerate()
        .filter(|(_, (_, c))| matches!(*c, '.' | '!' | '?'))
        .last();

    match sentence_end {
        Some((char_pos, (byte_pos, c))) if char_pos as f64 > max_chars as f64 * 0.8 => {
            text[..byte_pos + c.len_utf8()].to_string()
        }
        _ => format!("{window}..."),
    }
}

/// Full cleaning step
#[derive(Debug, Clone, Default)]
pub struct Cleaner {
    options: CleanerOptions,
}

impl Cleaner {
    pub fn new(options: CleanerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CleanerOptions {
        &self.options
    }

    /// Clean, truncate and length-limit raw text. Returns `None` when too
    /// little text survives.
    pub fn clean(&self, raw: &str) -> Option<String> {
        let cleaned = clean_text(raw);
        let truncated = truncate_to_paragraphs(&cleaned, self.options.max_paragraphs);
        let limited = enforce_length_limit(&truncated, self.options.max_tokens);

        if limited.chars().count() < self.options.min_length {
            tracing::debug!(
                "Dropping cleaned text of {} chars (minimum {})",
                limited.chars().count(),
                self.options.min_length
            );
            return None;
        }
        Some(limited)
    }

    /// Clean a batch, dropping entries that end up too short
    pub fn clean_all<S: AsRef<str>>(&self, raw: &[S]) -> Vec<String> {
        raw.iter().filter_map(|text| self.clean(text.as_ref())).collect()
    }
}
