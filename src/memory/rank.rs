//! Similarity ranking over search candidates.
//!
//! Scores every candidate against the query vector with cosine similarity,
//! orders by score descending with an id-ascending tie-break, and truncates
//! to the requested limit. The tie-break makes repeated searches against an
//! unchanged corpus return identical orderings regardless of the order the
//! backend produced the candidates in.

use crate::memory::types::MemoryRecord;
use crate::storage::Candidate;

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1]; 0.0 if either vector is empty, has zero
/// magnitude, or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Rank candidates by descending cosine similarity to `query_vector` and
/// return the first `limit` records.
///
/// Ties (including NaN scores, which compare as equal) fall back to id
/// ascending. An empty candidate set returns empty without scoring.
pub fn rank(query_vector: &[f32], candidates: Vec<Candidate>, limit: usize) -> Vec<MemoryRecord> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(f32, MemoryRecord)> = candidates
        .into_iter()
        .map(|c| (cosine_similarity(query_vector, &c.vector), c.record))
        .collect();

    scored.sort_by(|(score_a, rec_a), (score_b, rec_b)| {
        score_b
            .partial_cmp(score_a)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| rec_a.id.cmp(&rec_b.id))
    });

    scored.into_iter().take(limit).map(|(_, r)| r).collect()
}
