//! Maximal Marginal Relevance selection.
//!
//! MMR = λ × similarity(query, doc) − (1 − λ) × max(similarity(doc, selected))
//!
//! λ = 1.0 ranks purely by relevance, λ = 0.0 purely by novelty.

use crate::similarity::{cosine_with_magnitudes, magnitude};

/// A candidate eligible for selection. `order` is its position in original
/// document order and breaks score ties (lower wins).
#[derive(Debug, Clone, Copy)]
pub struct MmrCandidate<'a> {
    pub position: usize,
    pub order: u64,
    pub vector: &'a [f32],
}

/// Picks up to `k` candidates, returning `(position, relevance)` pairs in
/// selection order. The first pick is always the most relevant candidate.
pub fn mmr_select(
    query: &[f32],
    candidates: &[MmrCandidate<'_>],
    k: usize,
    lambda: f32,
) -> Vec<(usize, f32)> {
    if candidates.is_empty() || k == 0 {
        return Vec::new();
    }

    let lambda = lambda.clamp(0.0, 1.0);
    let query_mag = magnitude(query);
    let magnitudes = candidates
        .iter()
        .map(|candidate| magnitude(candidate.vector))
        .collect::<Vec<_>>();
    let relevance = candidates
        .iter()
        .zip(magnitudes.iter())
        .map(|(candidate, mag)| cosine_with_magnitudes(query, candidate.vector, query_mag, *mag))
        .collect::<Vec<_>>();

    // Highest similarity to any selected candidate, per remaining candidate.
    let mut redundancy = vec![f32::NEG_INFINITY; candidates.len()];
    let mut remaining = (0..candidates.len()).collect::<Vec<_>>();
    let mut selected = Vec::with_capacity(k.min(candidates.len()));

    while selected.len() < k && !remaining.is_empty() {
        let mut best_slot = 0;
        let mut best_score = f32::NEG_INFINITY;

        for (slot, &index) in remaining.iter().enumerate() {
            let score = if selected.is_empty() {
                relevance[index]
            } else {
                lambda * relevance[index] - (1.0 - lambda) * redundancy[index]
            };

            let best_index = remaining[best_slot];
            let wins = score > best_score
                || (score == best_score && candidates[index].order < candidates[best_index].order);
            if wins {
                best_slot = slot;
                best_score = score;
            }
        }

        let chosen = remaining.swap_remove(best_slot);
        selected.push((candidates[chosen].position, relevance[chosen]));

        for &index in &remaining {
            let similarity = cosine_with_magnitudes(
                candidates[index].vector,
                candidates[chosen].vector,
                magnitudes[index],
                magnitudes[chosen],
            );
            redundancy[index] = redundancy[index].max(similarity);
        }
    }

    selected
}
