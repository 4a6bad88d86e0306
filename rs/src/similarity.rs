//! Cosine similarity over sparse TF-IDF vectors

use crate::tfidf::SparseVector;

/// Calculate cosine similarity between two vectors.
///
/// Defined as 0.0 when either vector has zero norm. TF-IDF weights are
/// non-negative, so the result is clamped into [0.0, 1.0] to absorb rounding.
pub fn cosine_similarity(a: &SparseVector, b: &SparseVector) -> f64 {
    let norm_a = a.norm();
    let norm_b = b.norm();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let similarity = a.dot(b) / (norm_a * norm_b);
    if similarity.is_finite() {
        similarity.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
