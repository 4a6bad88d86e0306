//! Similarity engine
//!
//! Scores a candidate insight against a corpus batch field by field: each
//! field is normalized, vectorized with TF-IDF over the batch (candidate at
//! index 0, corpus records after it in input order), compared by cosine
//! similarity, and the three field scores are combined with the configured
//! weights. The engine keeps no state between calls.

use crate::config::{validate_threshold, EngineConfig};
use crate::error::DedupError;
use crate::models::{
    CorpusRecord, DuplicateDecision, FieldScores, InsightCandidate, InsightField, InsightText,
    SimilarityResult,
};
use crate::normalize::normalize;
use crate::similarity::cosine_similarity;
use crate::tfidf::vectorize;

/// Stateless TF-IDF similarity engine
///
/// Holds only a validated configuration, so a single engine can score many
/// candidates concurrently from different threads.
#[derive(Debug, Clone)]
pub struct SimilarityEngine {
    config: EngineConfig,
}

impl SimilarityEngine {
    /// Create an engine, rejecting invalid weights or threshold
    pub fn new(config: EngineConfig) -> Result<Self, DedupError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Score the candidate against every corpus record.
    ///
    /// Returns one result per record, in corpus order. An empty corpus yields
    /// an empty list.
    pub fn score_candidate(
        &self,
        candidate: &InsightCandidate,
        corpus: &[CorpusRecord],
    ) -> Vec<SimilarityResult> {
        if corpus.is_empty() {
            return Vec::new();
        }

        let mut field_scores = vec![FieldScores::default(); corpus.len()];
        for field in InsightField::ALL {
            let scores = self.field_similarities(field, candidate, corpus);
            for (record_scores, score) in field_scores.iter_mut().zip(scores) {
                record_scores.set(field, score);
            }
        }

        let results: Vec<SimilarityResult> = corpus
            .iter()
            .zip(field_scores)
            .map(|(record, field_scores)| SimilarityResult {
                corpus_id: record.id,
                score: self.config.weights.combine(&field_scores),
                field_scores,
            })
            .collect();

        tracing::debug!(
            "Scored candidate against {} corpus records",
            results.len()
        );
        results
    }

    /// Score the candidate and apply the configured threshold
    pub fn is_duplicate(
        &self,
        candidate: &InsightCandidate,
        corpus: &[CorpusRecord],
    ) -> DuplicateDecision {
        let results = self.score_candidate(candidate, corpus);
        select_best(&results, self.config.threshold)
    }

    /// Cosine similarity of one field of the candidate to the same field of
    /// every corpus record
    fn field_similarities(
        &self,
        field: InsightField,
        candidate: &InsightCandidate,
        corpus: &[CorpusRecord],
    ) -> Vec<f64> {
        let options = &self.config.normalizer;
        let documents: Vec<String> = std::iter::once(candidate.field_text(field))
            .chain(corpus.iter().map(|record| record.field_text(field)))
            .map(|text| normalize(text, options))
            .collect();

        let batch = vectorize(&documents);
        let Some((candidate_vector, corpus_vectors)) = batch.vectors.split_first() else {
            return Vec::new();
        };

        corpus_vectors
            .iter()
            .map(|vector| cosine_similarity(candidate_vector, vector))
            .collect()
    }
}

impl Default for SimilarityEngine {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }
}

/// Duplicate decision policy.
///
/// An empty result list is never a duplicate and has no best match.
/// Otherwise the best match is the first result with the maximum score, and
/// the candidate is a duplicate iff that score reaches `threshold`. A
/// threshold outside [0, 1] is a configuration error.
pub fn decide(
    results: &[SimilarityResult],
    threshold: f64,
) -> Result<DuplicateDecision, DedupError> {
    validate_threshold(threshold)?;
    Ok(select_best(results, threshold))
}

/// Policy body for an already validated threshold
fn select_best(results: &[SimilarityResult], threshold: f64) -> DuplicateDecision {
    let best = results.iter().fold(None, |best: Option<&SimilarityResult>, result| {
        match best {
            Some(current) if current.score >= result.score => Some(current),
            _ => Some(result),
        }
    });

    let Some(best) = best else {
        return DuplicateDecision::unique();
    };

    let decision = DuplicateDecision {
        is_duplicate: best.score >= threshold,
        best_match: Some(best.clone()),
    };
    tracing::debug!(
        "Best match {} scored {:.4} (threshold {}), duplicate: {}",
        best.corpus_id,
        best.score,
        threshold,
        decision.is_duplicate
    );
    decision
}

/// Score a candidate with an explicit configuration
pub fn score_candidate(
    candidate: &InsightCandidate,
    corpus: &[CorpusRecord],
    config: &EngineConfig,
) -> Result<Vec<SimilarityResult>, DedupError> {
    let engine = SimilarityEngine::new(*config)?;
    Ok(engine.score_candidate(candidate, corpus))
}

/// Classify a candidate with default weights and the given threshold
pub fn is_duplicate(
    candidate: &InsightCandidate,
    corpus: &[CorpusRecord],
    threshold: f64,
) -> Result<DuplicateDecision, DedupError> {
    let engine = SimilarityEngine::new(EngineConfig::default().with_threshold(threshold))?;
    Ok(engine.is_duplicate(candidate, corpus))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldWeights;
    use crate::models::InsightStatus;
    use uuid::Uuid;

    const TOLERANCE: f64 = 1e-9;

    fn record(tactic: &str, results: &str, limitations: &str) -> CorpusRecord {
        CorpusRecord {
            id: Uuid::new_v4(),
            tactic_text: tactic.to_string(),
            results_text: results.to_string(),
            limitations_text: limitations.to_string(),
            status: InsightStatus::Approved,
        }
    }

    fn stories_candidate() -> InsightCandidate {
        InsightCandidate::new(
            "Use emotional before/after stories",
            "45% engagement increase",
            "needs authentic stories",
            70,
        )
    }

    fn result(score: f64) -> SimilarityResult {
        SimilarityResult {
            corpus_id: Uuid::new_v4(),
            score,
            field_scores: FieldScores::default(),
        }
    }

    #[test]
    fn test_identical_record_scores_one() {
        let candidate = stories_candidate();
        let corpus = vec![record(
            &candidate.tactic_text,
            &candidate.results_text,
            &candidate.limitations_text,
        )];

        let results = SimilarityEngine::default().score_candidate(&candidate, &corpus);
        assert_eq!(results.len(), 1);
        assert!((results[0].score - 1.0).abs() < TOLERANCE);
        assert!((results[0].field_scores.tactic - 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn test_empty_candidate_scores_zero() {
        let candidate = InsightCandidate::new("", "", "", 0);
        let corpus = vec![
            record("Use UGC hooks", "3x ROAS", "small accounts"),
            record("Lead with price", "CPA down 20%", "discount brands only"),
        ];

        let results = SimilarityEngine::default().score_candidate(&candidate, &corpus);
        assert_eq!(results.len(), 2);
        for result in results {
            assert_eq!(result.score, 0.0);
            assert_eq!(result.field_scores, FieldScores::default());
        }
    }

    #[test]
    fn test_empty_corpus_is_unique() {
        let engine = SimilarityEngine::default();
        assert!(engine.score_candidate(&stories_candidate(), &[]).is_empty());

        let decision = engine.is_duplicate(&stories_candidate(), &[]);
        assert!(!decision.is_duplicate);
        assert!(decision.best_match.is_none());
    }

    #[test]
    fn test_same_tactic_different_details() {
        let candidate = stories_candidate();
        let corpus = vec![record(
            "Use emotional before/after stories",
            "Doubled click-through rate",
            "Works best for fitness brands",
        )];

        let decision = is_duplicate(&candidate, &corpus, 0.8).unwrap();
        let best = decision.best_match.unwrap();
        assert!((best.field_scores.tactic - 1.0).abs() < TOLERANCE);
        assert_eq!(best.field_scores.results, 0.0);
        assert_eq!(best.field_scores.limitations, 0.0);
        assert!((best.score - 0.6).abs() < TOLERANCE);
        assert!(!decision.is_duplicate);
    }

    #[test]
    fn test_pinned_scores_two_record_corpus() {
        let candidate = stories_candidate();
        let same_tactic = record(
            "Use emotional before/after stories",
            "Doubled click-through rate",
            "Works best for fitness brands",
        );
        let overlapping = record(
            "Use emotional stories in video ads",
            "45% engagement increase on reels",
            "needs authentic stories from customers",
        );
        let corpus = vec![same_tactic.clone(), overlapping.clone()];

        let results = SimilarityEngine::default().score_candidate(&candidate, &corpus);
        assert_eq!(results[0].corpus_id, same_tactic.id);
        assert!((results[0].score - 0.6).abs() < TOLERANCE);

        assert_eq!(results[1].corpus_id, overlapping.id);
        let fields = results[1].field_scores;
        assert!((fields.tactic - 0.350_475_822_655_437_14).abs() < TOLERANCE);
        assert!((fields.results - 0.681_581_398_838_366_1).abs() < TOLERANCE);
        assert!((fields.limitations - 0.681_581_398_838_366_1).abs() < TOLERANCE);
        assert!((results[1].score - 0.482_918_053_128_608_7).abs() < TOLERANCE);

        let decision = decide(&results, 0.8).unwrap();
        assert!(!decision.is_duplicate);
        assert_eq!(decision.best_match.unwrap().corpus_id, same_tactic.id);
    }

    #[test]
    fn test_idf_depends_on_batch() {
        // Alone, the overlapping record sees a different idf than in the
        // two-record batch above.
        let candidate = stories_candidate();
        let corpus = vec![record(
            "Use emotional stories in video ads",
            "45% engagement increase on reels",
            "needs authentic stories from customers",
        )];

        let results = SimilarityEngine::default().score_candidate(&candidate, &corpus);
        assert!((results[0].field_scores.tactic - 0.380_872_608_475_943_7).abs() < TOLERANCE);
        assert!((results[0].field_scores.results - 0.656_972_921_033_090_6).abs() < TOLERANCE);
        assert!((results[0].score - 0.491_312_733_498_802_45).abs() < TOLERANCE);
    }

    #[test]
    fn test_heavy_overlap_is_duplicate() {
        let candidate = stories_candidate();
        let corpus = vec![record(
            "use emotional before after stories",
            "45% engagement increase",
            "needs authentic customer stories",
        )];

        let decision = SimilarityEngine::default().is_duplicate(&candidate, &corpus);
        assert!(decision.is_duplicate);
        assert!(decision.best_match.unwrap().score >= 0.8);
    }

    #[test]
    fn test_custom_weights() {
        let config = EngineConfig::default()
            .with_weights(FieldWeights::new(0.0, 1.0, 0.0).unwrap());
        let candidate = stories_candidate();
        let corpus = vec![record("Totally different", &candidate.results_text, "x")];

        let results = score_candidate(&candidate, &corpus, &config).unwrap();
        assert!((results[0].score - 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        let bad_weights = EngineConfig::default().with_weights(FieldWeights {
            tactic: 0.5,
            results: 0.25,
            limitations: 0.15,
        });
        assert!(matches!(
            score_candidate(&stories_candidate(), &[], &bad_weights),
            Err(DedupError::Configuration { .. })
        ));

        assert!(matches!(
            is_duplicate(&stories_candidate(), &[], 1.5),
            Err(DedupError::Configuration { .. })
        ));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let results = vec![result(0.8)];
        assert!(decide(&results, 0.8).unwrap().is_duplicate);
        assert!(!decide(&results, 0.800_000_1).unwrap().is_duplicate);
    }

    #[test]
    fn test_decide_rejects_invalid_threshold() {
        let results = vec![result(0.9)];
        for threshold in [1.5, -3.0, f64::NAN] {
            assert!(matches!(
                decide(&results, threshold),
                Err(DedupError::Configuration { .. })
            ));
        }
        assert!(matches!(decide(&[], f64::NAN), Err(DedupError::Configuration { .. })));
    }

    #[test]
    fn test_tie_break_first_occurrence() {
        let results = vec![result(0.3), result(0.9), result(0.9), result(0.1)];
        let decision = decide(&results, 0.8).unwrap();
        assert!(decision.is_duplicate);
        assert_eq!(decision.best_match.unwrap().corpus_id, results[1].corpus_id);
    }

    #[test]
    fn test_best_match_reported_below_threshold() {
        let results = vec![result(0.2), result(0.4)];
        let decision = decide(&results, 0.8).unwrap();
        assert!(!decision.is_duplicate);
        assert_eq!(decision.best_match.unwrap().corpus_id, results[1].corpus_id);
    }

    #[test]
    fn test_stop_word_option_changes_scores() {
        let candidate = InsightCandidate::new("the best of the offer", "", "", 0);
        let corpus = vec![record("the worst of the hook", "", "")];

        let plain = SimilarityEngine::default().score_candidate(&candidate, &corpus);
        assert!(plain[0].field_scores.tactic > 0.0);

        let config = EngineConfig::default()
            .with_normalizer(crate::normalize::NormalizerOptions::without_stop_words());
        let filtered = score_candidate(&candidate, &corpus, &config).unwrap();
        assert_eq!(filtered[0].field_scores.tactic, 0.0);
    }

    #[test]
    fn test_parallel_scoring() {
        let engine = SimilarityEngine::default();
        let corpus = vec![record("Use emotional before/after stories", "", "")];

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let engine = engine.clone();
                let corpus = corpus.clone();
                std::thread::spawn(move || engine.score_candidate(&stories_candidate(), &corpus))
            })
            .collect();

        let expected = engine.score_candidate(&stories_candidate(), &corpus);
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    }
}
