//! In-memory similarity search over stored embeddings
//!
//! Retrieval is an exhaustive cosine-similarity scan over every stored
//! vector, filtered by threshold and ranked top-K. There is no index; the
//! corpus is small enough that a linear pass per query is the simpler
//! trade-off. The confidence score folds both similarity strength and
//! retrieval coverage into a single [0, 1] trust value.

use std::cmp::Ordering;

use crate::types::{EmbeddingRecord, ScoredEmbedding};

/// Weight of the average similarity term in the confidence score
const CONFIDENCE_SIMILARITY_WEIGHT: f32 = 0.7;

/// Weight of the retrieval-coverage term in the confidence score
const CONFIDENCE_COVERAGE_WEIGHT: f32 = 0.3;

/// Calculate cosine similarity between two vectors
///
/// Returns 0.0 (never NaN, never an error) for empty, mismatched-length,
/// or zero-norm inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}

/// Score every record against the query vector, keep those at or above the
/// threshold, and return at most `top_k` of them ranked by similarity
/// descending.
///
/// Ties retain the relative order of the input records (stable sort); an
/// empty result is a valid outcome, not an error.
pub fn rank(
    query: &[f32],
    records: Vec<EmbeddingRecord>,
    top_k: usize,
    threshold: f32,
) -> Vec<ScoredEmbedding> {
    let mut scored: Vec<ScoredEmbedding> = records
        .into_iter()
        .map(|record| {
            let score = cosine_similarity(query, &record.vector);
            ScoredEmbedding { record, score }
        })
        .filter(|scored| scored.score >= threshold)
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    scored.truncate(top_k);
    scored
}

/// Reduce a ranked result set to a single [0, 1] trust value
///
/// Combines the mean similarity of the retained chunks with how much of the
/// requested top-K was actually filled, so a single near-duplicate hit
/// cannot alone claim full confidence. Empty input yields 0.0.
pub fn confidence_score(scored: &[ScoredEmbedding], top_k: usize) -> f32 {
    if scored.is_empty() || top_k == 0 {
        return 0.0;
    }

    let avg_similarity: f32 =
        scored.iter().map(|s| s.score).sum::<f32>() / scored.len() as f32;
    let chunk_ratio = f32::min(1.0, scored.len() as f32 / top_k as f32);

    let confidence =
        CONFIDENCE_SIMILARITY_WEIGHT * avg_similarity + CONFIDENCE_COVERAGE_WEIGHT * chunk_ratio;
    confidence.clamp(0.0, 1.0)
}
