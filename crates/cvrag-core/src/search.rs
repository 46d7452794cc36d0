//! Similarity math and the ordering/threshold contract shared by every
//! vector store implementation.

use std::cmp::Ordering;

use crate::defaults::SIMILARITY_DECIMALS;
use crate::models::SearchResult;

/// Cosine similarity of two vectors.
///
/// Returns 0.0 for mismatched lengths, empty input, or a zero-norm vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Round a similarity score for presentation to the model.
pub fn round_similarity(similarity: f32) -> f64 {
    let factor = 10f64.powi(SIMILARITY_DECIMALS);
    (f64::from(similarity) * factor).round() / factor
}

/// Order by similarity descending, keep the first `limit`, then drop
/// anything below `threshold`.
///
/// The sort is stable, so equal scores keep their storage order. A
/// non-positive `limit` yields no results.
pub fn finalize_results(
    mut results: Vec<SearchResult>,
    limit: i64,
    threshold: f32,
) -> Vec<SearchResult> {
    let limit = usize::try_from(limit).unwrap_or(0);
    results.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
    });
    results.truncate(limit);
    results.retain(|r| r.similarity >= threshold);
    results
}
