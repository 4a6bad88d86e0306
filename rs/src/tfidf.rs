//! TF-IDF vectorization over a batch of normalized texts
//!
//! Term frequency is `count / total_tokens` per document, inverse document
//! frequency uses the smoothed form `ln((1 + N) / (1 + df)) + 1`. Vectors are
//! sparse and keyed by term in lexicographic order, so a batch always
//! produces the same vectors for the same input order.

use crate::normalize::tokenize;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Sparse TF-IDF vector; absent terms weigh 0
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SparseVector {
    weights: BTreeMap<String, f64>,
}

impl SparseVector {
    /// Weight of `term`, 0.0 if absent
    pub fn weight(&self, term: &str) -> f64 {
        self.weights.get(term).copied().unwrap_or(0.0)
    }

    /// Iterate `(term, weight)` pairs in lexicographic term order
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.weights.iter().map(|(term, weight)| (term.as_str(), *weight))
    }

    /// Number of non-zero entries
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Dot product with another vector over the same vocabulary
    pub fn dot(&self, other: &SparseVector) -> f64 {
        self.iter().map(|(term, weight)| weight * other.weight(term)).sum()
    }

    /// Euclidean norm
    pub fn norm(&self) -> f64 {
        self.weights.values().map(|w| w * w).sum::<f64>().sqrt()
    }
}

/// Vectors for one batch, in input order, plus the shared vocabulary
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TfIdfBatch {
    /// Union of all distinct tokens, sorted lexicographically
    pub vocabulary: Vec<String>,

    /// One vector per input document
    pub vectors: Vec<SparseVector>,
}

/// Smoothed inverse document frequency
pub fn inverse_document_frequency(documents: usize, document_frequency: usize) -> f64 {
    ((1.0 + documents as f64) / (1.0 + document_frequency as f64)).ln() + 1.0
}

/// Vectorize a batch of already-normalized documents.
///
/// A document without tokens gets an empty (all-zero) vector.
pub fn vectorize<S: AsRef<str>>(documents: &[S]) -> TfIdfBatch {
    let tokenized: Vec<Vec<&str>> = documents.iter().map(|d| tokenize(d.as_ref())).collect();

    let mut document_frequency: BTreeMap<&str, usize> = BTreeMap::new();
    for tokens in &tokenized {
        let distinct: BTreeSet<&str> = tokens.iter().copied().collect();
        for term in distinct {
            *document_frequency.entry(term).or_default() += 1;
        }
    }

    let idf: BTreeMap<&str, f64> = document_frequency
        .iter()
        .map(|(term, df)| (*term, inverse_document_frequency(documents.len(), *df)))
        .collect();

    let vectors = tokenized
        .iter()
        .map(|tokens| {
            let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
            for token in tokens {
                *counts.entry(*token).or_default() += 1;
            }

            let total = tokens.len() as f64;
            let weights = counts
                .into_iter()
                .map(|(term, count)| {
                    let tf = count as f64 / total;
                    let weight = tf * idf.get(term).copied().unwrap_or(0.0);
                    (term.to_string(), weight)
                })
                .collect();

            SparseVector { weights }
        })
        .collect();

    TfIdfBatch {
        vocabulary: document_frequency.keys().map(|term| term.to_string()).collect(),
        vectors,
    }
}
