//! Deduplication controller
//!
//! Fetches a targeted comparison corpus from the record store, runs the
//! similarity engine and stores the candidates that survive.

use crate::constants::{
    DEFAULT_KEYWORD_LIMIT, KEYWORD_FETCH_LIMIT, MIN_KEYWORD_LENGTH, RECENT_FETCH_LIMIT,
    RECENT_WINDOW_DAYS,
};
use crate::engine::SimilarityEngine;
use crate::models::{
    CorpusQuery, CorpusRecord, DuplicateDecision, InsightCandidate, InsightId, InsightStore,
    StoredInsight,
};
use crate::normalize::{normalize, tokenize, NormalizerOptions};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Corpus lookup settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupOptions {
    /// Maximum keywords taken from the tactic text
    pub keyword_limit: usize,

    /// Maximum records fetched by a keyword query
    pub keyword_fetch_limit: usize,

    /// Look-back window used when no keywords are found
    pub recent_window_days: u32,

    pub recent_fetch_limit: usize,
}

impl Default for DedupOptions {
    fn default() -> Self {
        Self {
            keyword_limit: DEFAULT_KEYWORD_LIMIT,
            keyword_fetch_limit: KEYWORD_FETCH_LIMIT,
            recent_window_days: RECENT_WINDOW_DAYS,
            recent_fetch_limit: RECENT_FETCH_LIMIT,
        }
    }
}

/// Duplicate counts for a batch of candidates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DuplicateStats {
    pub total: usize,
    pub duplicates: usize,
    pub unique: usize,
    /// `duplicates / total`, 0.0 for an empty batch
    pub duplicate_rate: f64,
}

impl DuplicateStats {
    fn new(total: usize, duplicates: usize) -> Self {
        let duplicate_rate = if total > 0 {
            duplicates as f64 / total as f64
        } else {
            0.0
        };
        Self {
            total,
            duplicates,
            unique: total - duplicates,
            duplicate_rate,
        }
    }
}

/// Candidate rejected as a duplicate during ingest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedDuplicate {
    pub tactic_text: String,
    pub matched_id: InsightId,
    pub score: f64,
}

/// Outcome of [`Deduplicator::ingest`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Ids of newly stored (greylisted) insights, in input order
    pub stored: Vec<InsightId>,
    pub skipped: Vec<SkippedDuplicate>,
}

impl IngestReport {
    pub fn stats(&self) -> DuplicateStats {
        DuplicateStats::new(self.stored.len() + self.skipped.len(), self.skipped.len())
    }
}

/// Extract lookup keywords from the candidate's tactic text.
///
/// Distinct non-stop-word tokens of at least [`MIN_KEYWORD_LENGTH`]
/// characters, in first-occurrence order, at most `limit` of them.
pub fn extract_keywords(candidate: &InsightCandidate, limit: usize) -> Vec<String> {
    let normalized = normalize(
        &candidate.tactic_text,
        &NormalizerOptions::without_stop_words(),
    );

    let mut seen = HashSet::new();
    tokenize(&normalized)
        .into_iter()
        .filter(|token| token.chars().count() >= MIN_KEYWORD_LENGTH)
        .filter(|token| seen.insert(*token))
        .take(limit)
        .map(str::to_string)
        .collect()
}

/// Runs duplicate checks against a record store
pub struct Deduplicator<S: InsightStore> {
    store: S,
    engine: SimilarityEngine,
    options: DedupOptions,
}

impl<S: InsightStore> Deduplicator<S> {
    pub fn new(store: S, engine: SimilarityEngine) -> Self {
        Self::with_options(store, engine, DedupOptions::default())
    }

    pub fn with_options(store: S, engine: SimilarityEngine, options: DedupOptions) -> Self {
        Self {
            store,
            engine,
            options,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn engine(&self) -> &SimilarityEngine {
        &self.engine
    }

    /// Query used to fetch the comparison corpus for `candidate`: keyword
    /// lookup when the tactic yields keywords, recent records otherwise
    pub fn corpus_query(&self, candidate: &InsightCandidate) -> CorpusQuery {
        let keywords = extract_keywords(candidate, self.options.keyword_limit);
        if keywords.is_empty() {
            CorpusQuery::Recent {
                days: self.options.recent_window_days,
                limit: self.options.recent_fetch_limit,
            }
        } else {
            CorpusQuery::Keywords {
                keywords,
                limit: self.options.keyword_fetch_limit,
            }
        }
    }

    /// Fetch the comparison corpus for `candidate`
    pub async fn relevant_corpus(
        &self,
        candidate: &InsightCandidate,
    ) -> crate::Result<Vec<CorpusRecord>> {
        let query = self.corpus_query(candidate);
        let insights = self
            .store
            .fetch(&query)
            .await
            .context("Failed to fetch comparison corpus")?;
        Ok(insights.iter().map(CorpusRecord::from).collect())
    }

    /// Check one candidate against its relevant corpus
    pub async fn check(&self, candidate: &InsightCandidate) -> crate::Result<DuplicateDecision> {
        let corpus = self.relevant_corpus(candidate).await?;
        let decision = self.engine.is_duplicate(candidate, &corpus);

        if let (true, Some(best)) = (decision.is_duplicate, &decision.best_match) {
            tracing::info!(
                "Duplicate insight detected, similar to {} (score {:.3})",
                best.corpus_id,
                best.score
            );
        }
        Ok(decision)
    }

    /// Keep the candidates that are not duplicates of stored insights
    pub async fn filter_unique(
        &self,
        candidates: Vec<InsightCandidate>,
    ) -> crate::Result<Vec<InsightCandidate>> {
        let mut unique = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if self.check(&candidate).await?.is_duplicate {
                tracing::warn!("Skipping duplicate insight: {}", preview(&candidate.tactic_text));
            } else {
                unique.push(candidate);
            }
        }
        Ok(unique)
    }

    /// Count duplicates in a batch without storing anything
    pub async fn statistics(&self, candidates: &[InsightCandidate]) -> crate::Result<DuplicateStats> {
        let mut duplicates = 0;
        for candidate in candidates {
            if self.check(candidate).await?.is_duplicate {
                duplicates += 1;
            }
        }
        Ok(DuplicateStats::new(candidates.len(), duplicates))
    }

    /// Check each candidate and store the unique ones as greylisted insights.
    ///
    /// Candidates are processed in order and stored immediately, so a later
    /// candidate is also compared against earlier ones from the same batch.
    /// Every candidate is converted to a stored row before the first write;
    /// an invalid candidate rejects the batch with nothing stored.
    pub async fn ingest(&mut self, candidates: Vec<InsightCandidate>) -> crate::Result<IngestReport> {
        let prepared = candidates
            .into_iter()
            .enumerate()
            .map(|(index, candidate)| {
                StoredInsight::from_candidate(&candidate)
                    .map(|stored| (candidate, stored))
                    .with_context(|| format!("Invalid candidate at index {index}"))
            })
            .collect::<crate::Result<Vec<_>>>()?;

        let mut report = IngestReport::default();

        for (candidate, stored) in prepared {
            let decision = self.check(&candidate).await?;
            match decision.best_match {
                Some(best) if decision.is_duplicate => {
                    tracing::warn!("Skipping duplicate insight: {}", preview(&candidate.tactic_text));
                    report.skipped.push(SkippedDuplicate {
                        tactic_text: candidate.tactic_text,
                        matched_id: best.corpus_id,
                        score: best.score,
                    });
                }
                _ => {
                    let id = stored.id;
                    self.store
                        .store_insight(stored)
                        .await
                        .context("Failed to store insight")?;
                    tracing::debug!("Stored insight {}", id);
                    report.stored.push(id);
                }
            }
        }

        let stats = report.stats();
        tracing::info!(
            "Ingested {} insights: {} stored, {} duplicates",
            stats.total,
            stats.unique,
            stats.duplicates
        );
        Ok(report)
    }
}

/// First 50 characters of `text`, for log lines
fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(50).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
