//! Maximal marginal relevance selection.

use crate::embeddings::cosine_similarity;

/// Pick up to `k` indices from `embeddings`, trading similarity to `query`
/// against similarity to what has already been picked.
///
/// `lambda_mult` of 1.0 ranks purely by relevance, 0.0 purely by diversity.
/// The first pick is always the candidate most similar to the query.
pub fn maximal_marginal_relevance(
    query: &[f32],
    embeddings: &[Vec<f32>],
    lambda_mult: f32,
    k: usize,
) -> Vec<usize> {
    let limit = k.min(embeddings.len());
    if limit == 0 {
        return Vec::new();
    }

    let to_query: Vec<f32> = embeddings
        .iter()
        .map(|e| cosine_similarity(query, e))
        .collect();

    // Ties go to the earlier candidate, keeping the store's ranking.
    let first = (1..to_query.len()).fold(0, |best, i| {
        if to_query[i] > to_query[best] {
            i
        } else {
            best
        }
    });

    let mut selected = vec![first];
    // Highest similarity of each candidate to anything already selected.
    let mut redundancy: Vec<f32> = embeddings
        .iter()
        .map(|e| cosine_similarity(e, &embeddings[first]))
        .collect();

    while selected.len() < limit {
        let mut best_score = f32::NEG_INFINITY;
        let mut best = None;

        for (i, &query_score) in to_query.iter().enumerate() {
            if selected.contains(&i) {
                continue;
            }
            let score = lambda_mult * query_score - (1.0 - lambda_mult) * redundancy[i];
            if score > best_score {
                best_score = score;
                best = Some(i);
            }
        }

        let Some(next) = best else { break };
        selected.push(next);

        for (i, r) in redundancy.iter_mut().enumerate() {
            *r = r.max(cosine_similarity(&embeddings[i], &embeddings[next]));
        }
    }

    selected
}
