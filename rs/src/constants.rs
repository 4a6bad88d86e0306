//! Constants for the insight deduplication pipeline
//!
//! Defaults for the similarity engine, the corpus lookup and the cleaner.

// Field weights for the combined similarity score

/// Weight of the core tactic field.
pub const DEFAULT_TACTIC_WEIGHT: f64 = 0.60;

/// Weight of the results/metrics field.
pub const DEFAULT_RESULTS_WEIGHT: f64 = 0.25;

/// Weight of the limitations/context field.
pub const DEFAULT_LIMITATIONS_WEIGHT: f64 = 0.15;

/// Allowed deviation of the weight sum from 1.0.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

// Duplicate decision

/// Combined score at or above which a candidate is a duplicate.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.8;

// Corpus lookup

/// Maximum number of keywords extracted from a candidate's tactic text.
pub const DEFAULT_KEYWORD_LIMIT: usize = 8;

/// Keywords shorter than this (in characters) are ignored.
pub const MIN_KEYWORD_LENGTH: usize = 4;

/// Maximum number of records fetched by a keyword query.
pub const KEYWORD_FETCH_LIMIT: usize = 100;

/// Look-back window for the recent-records fallback query.
pub const RECENT_WINDOW_DAYS: u32 = 30;

/// Maximum number of records fetched by the recent-records query.
pub const RECENT_FETCH_LIMIT: usize = 500;

// Cleaning

/// Paragraphs kept from a cleaned post.
pub const DEFAULT_MAX_PARAGRAPHS: usize = 4;

/// Approximate token budget for cleaned text.
pub const DEFAULT_MAX_TOKENS: usize = 8000;

/// Characters per token used by the length estimate.
pub const CHARS_PER_TOKEN: usize = 4;

/// Cleaned text shorter than this is discarded.
pub const MIN_TEXT_LENGTH: usize = 50;

// Record schema

/// Upper bound of the difference score (inclusive).
pub const MAX_DIFFERENCE_SCORE: i64 = 100;
