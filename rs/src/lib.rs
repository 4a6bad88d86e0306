//! Insight deduplication for the ad-creative insight pipeline
//!
//! Decides whether a newly structured insight repeats one that is already
//! stored. Each candidate is compared field by field (tactic, results,
//! limitations) against a corpus batch using TF-IDF vectors and cosine
//! similarity, and the weighted score is checked against a threshold.
//!
//! The library also carries the pieces around that decision: the cleaning
//! step for scraped text, the structured-insight contract, a record store
//! trait with a local file-backed implementation, and a controller that
//! ties lookup, scoring and storage together.

pub mod cleaning;
pub mod config;
pub mod constants;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod models;
pub mod normalize;
pub mod similarity;
pub mod storage;
pub mod tfidf;

// Re-export main types for convenience
pub use cleaning::{Cleaner, CleanerOptions};
pub use config::{EngineConfig, FieldWeights};
pub use dedup::{DedupOptions, Deduplicator, DuplicateStats, IngestReport};
pub use engine::{decide, is_duplicate, score_candidate, SimilarityEngine};
pub use error::DedupError;
pub use models::{
    CorpusQuery, CorpusRecord, DuplicateDecision, FieldScores, InsightCandidate, InsightId,
    InsightStatus, InsightStore, SimilarityResult, StoredInsight, StructuredInsight,
};
pub use normalize::{normalize, NormalizerOptions};
pub use storage::{FileStorage, StorageError};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
