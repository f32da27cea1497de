//! The MMR (Maximal Marginal Relevance) helper.
//!
//! Maintains an incremental candidate pool scored by relevance minus redundancy against whatever
//! has already been selected, so callers can drain picks one at a time as new candidates arrive
//! from ANN seeding or graph expansion.

use std::collections::HashMap;

/// One not-yet-selected candidate's cached scoring state.
#[derive(Debug, Clone)]
struct Candidate {
    embedding: Vec<f32>,
    similarity_to_query: f32,
    current_redundancy: f32,
}

impl Candidate {
    fn mmr_score(&self, lambda_mult: f32) -> f32 {
        lambda_mult * self.similarity_to_query - (1.0 - lambda_mult) * self.current_redundancy
    }
}

fn normalize(mut embedding: Vec<f32>) -> Vec<f32> {
    let norm = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in embedding.iter_mut() {
            *x /= norm;
        }
    }
    embedding
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Incremental MMR candidate pool. Construct with a unit-normalized query embedding, feed
/// candidates as they arrive (e.g. from ANN-fetch or graph expansion), and repeatedly call
/// [`MmrHelper::pop_best`] to drain up to `k` picks in relevance/diversity order.
pub struct MmrHelper {
    query_embedding: Vec<f32>,
    lambda_mult: f32,
    k: usize,
    score_threshold: f32,
    candidates: HashMap<String, Candidate>,
    selected_embeddings: Vec<Vec<f32>>,
    selected_ids: Vec<String>,
}

impl MmrHelper {
    /// `query_embedding` is normalized defensively here too, so callers never need to think about
    /// it twice.
    pub fn new(query_embedding: Vec<f32>, lambda_mult: f32, k: usize, score_threshold: f32) -> Self {
        Self {
            query_embedding: normalize(query_embedding),
            lambda_mult,
            k,
            score_threshold,
            candidates: HashMap::new(),
            selected_embeddings: Vec::new(),
            selected_ids: Vec::new(),
        }
    }

    /// How many more picks [`MmrHelper::pop_best`] will yield before the `k` budget is exhausted.
    pub fn remaining_budget(&self) -> usize {
        self.k.saturating_sub(self.selected_ids.len())
    }

    /// Insert new candidates. An id already present (selected or still pooled) is ignored --
    /// `_get_adjacent`'s first-occurrence dedup happens upstream, but this is a second line of
    /// defense against re-adding an id via a different traversal path.
    pub fn add_candidates(&mut self, incoming: impl IntoIterator<Item = (String, Vec<f32>)>) {
        for (id, embedding) in incoming {
            if self.selected_ids.contains(&id) || self.candidates.contains_key(&id) {
                continue;
            }
            let embedding = normalize(embedding);
            let similarity_to_query = dot(&self.query_embedding, &embedding);
            let current_redundancy = self
                .selected_embeddings
                .iter()
                .map(|s| dot(s, &embedding))
                .fold(f32::MIN, f32::max);
            let current_redundancy = if current_redundancy == f32::MIN {
                0.0
            } else {
                current_redundancy
            };
            self.candidates.insert(
                id,
                Candidate {
                    embedding,
                    similarity_to_query,
                    current_redundancy,
                },
            );
        }
    }

    fn best_candidate_id(&self) -> Option<&str> {
        self.candidates
            .iter()
            .max_by(|(id_a, a), (id_b, b)| {
                a.mmr_score(self.lambda_mult)
                    .partial_cmp(&b.mmr_score(self.lambda_mult))
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| {
                        a.similarity_to_query
                            .partial_cmp(&b.similarity_to_query)
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    // Lexicographically *smaller* id wins a tie, so reverse the id comparison.
                    .then_with(|| id_b.cmp(id_a))
            })
            .map(|(id, _)| id.as_str())
    }

    /// Remove and return the id of the highest-scoring remaining candidate, if any clears
    /// `score_threshold` and the `k` budget isn't already exhausted. Updates every remaining
    /// candidate's redundancy against the newly selected embedding.
    pub fn pop_best(&mut self) -> Option<String> {
        if self.remaining_budget() == 0 {
            return None;
        }

        let best_id = self.best_candidate_id()?.to_string();
        let best = self.candidates.get(&best_id)?;
        if best.mmr_score(self.lambda_mult) < self.score_threshold {
            return None;
        }

        let picked = self.candidates.remove(&best_id)?;
        for other in self.candidates.values_mut() {
            let sim = dot(&picked.embedding, &other.embedding);
            other.current_redundancy = other.current_redundancy.max(sim);
        }
        self.selected_embeddings.push(picked.embedding);
        self.selected_ids.push(best_id.clone());
        Some(best_id)
    }

    /// Snapshot of unselected candidate ids.
    pub fn candidate_ids(&self) -> Vec<String> {
        self.candidates.keys().cloned().collect()
    }

    /// Ids selected so far, in selection order.
    pub fn selected_ids(&self) -> &[String] {
        &self.selected_ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vec2(x: f32, y: f32) -> Vec<f32> {
        vec![x, y]
    }

    #[test]
    fn picks_most_similar_first() {
        let mut helper = MmrHelper::new(vec2(1.0, 0.0), 0.5, 2, f32::MIN);
        helper.add_candidates([
            ("near".to_string(), vec2(0.9, 0.1)),
            ("far".to_string(), vec2(0.1, 0.9)),
        ]);
        assert_eq!(helper.pop_best().as_deref(), Some("near"));
    }

    #[test]
    fn penalizes_redundancy_against_already_selected() {
        // Two near-identical candidates plus one orthogonal, less similar candidate. After the
        // first (most similar) pick, the MMR penalty should make the orthogonal candidate win the
        // second slot over its near-duplicate twin.
        let mut helper = MmrHelper::new(vec2(1.0, 0.0), 0.8, 3, f32::MIN);
        helper.add_candidates([
            ("twin-a".to_string(), vec2(1.0, 0.0)),
            ("twin-b".to_string(), vec2(0.99, 0.14)),
            ("diverse".to_string(), vec2(0.5, 0.866)),
        ]);
        assert_eq!(helper.pop_best().as_deref(), Some("twin-a"));
        assert_eq!(helper.pop_best().as_deref(), Some("diverse"));
    }

    #[test]
    fn respects_k_budget() {
        let mut helper = MmrHelper::new(vec2(1.0, 0.0), 0.5, 1, f32::MIN);
        helper.add_candidates([
            ("a".to_string(), vec2(1.0, 0.0)),
            ("b".to_string(), vec2(0.0, 1.0)),
        ]);
        assert!(helper.pop_best().is_some());
        assert!(helper.pop_best().is_none());
    }

    #[test]
    fn respects_score_threshold() {
        let mut helper = MmrHelper::new(vec2(1.0, 0.0), 0.5, 5, 10.0);
        helper.add_candidates([("a".to_string(), vec2(1.0, 0.0))]);
        assert!(helper.pop_best().is_none());
    }

    #[test]
    fn ties_break_on_lexicographically_smaller_id() {
        let mut helper = MmrHelper::new(vec2(1.0, 0.0), 0.5, 2, f32::MIN);
        helper.add_candidates([
            ("zebra".to_string(), vec2(1.0, 0.0)),
            ("alpha".to_string(), vec2(1.0, 0.0)),
        ]);
        assert_eq!(helper.pop_best().as_deref(), Some("alpha"));
    }

    #[test]
    fn all_zero_embedding_normalizes_to_itself_without_panic() {
        let mut helper = MmrHelper::new(vec2(0.0, 0.0), 0.5, 1, f32::MIN);
        helper.add_candidates([("zero".to_string(), vec2(0.0, 0.0))]);
        assert_eq!(helper.pop_best().as_deref(), Some("zero"));
    }
}
