//! Hybrid route matcher.
//!
//! Resolves an utterance to at most one route of an [`IndexSnapshot`] using
//! one of two strategies that share a single similarity threshold:
//!
//! | Strategy | Retrieval | Decision |
//! |----------|-----------|----------|
//! | [`Strategy::Nearest`] | 1-NN query against the ANN index | `1 - distance >= threshold` |
//! | [`Strategy::Hybrid`] | top-k lexical candidates, reranked by cosine similarity | best similarity `>= threshold` |
//!
//! A below-threshold result is [`MatchOutcome::NoMatch`], not an error.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{Collaborator, RouterError, Result};
use crate::index::{tokenize, IndexSnapshot};
use crate::registry::Route;
use crate::traits::EmbeddingProvider;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Retrieval strategy, selectable per call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Direct nearest neighbour over route embeddings.
    #[serde(alias = "hnswlib")]
    Nearest,
    /// Lexical prefilter followed by semantic rerank.
    #[default]
    #[serde(alias = "bm25_hybrid")]
    Hybrid,
}

impl FromStr for Strategy {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "nearest" | "hnswlib" => Ok(Self::Nearest),
            "hybrid" | "bm25_hybrid" => Ok(Self::Hybrid),
            other => Err(RouterError::config(format!(
                "invalid strategy `{other}`: choose `nearest` or `hybrid`"
            ))),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nearest => f.write_str("nearest"),
            Self::Hybrid => f.write_str("hybrid"),
        }
    }
}

/// A lexical candidate considered by [`Strategy::Hybrid`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    /// Position of the route in the index.
    pub index: usize,
    pub phrase: String,
    pub lexical_score: f32,
    pub similarity: f32,
}

/// A route that cleared the similarity threshold.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub route: Arc<Route>,
    /// Position of the route in the index.
    pub index: usize,
    pub score: f32,
    pub strategy: Strategy,
    /// Lexical candidates in prefilter order (empty for `Nearest`).
    pub candidates: Vec<Candidate>,
}

/// Result of matching one utterance.
#[derive(Debug, Clone)]
pub enum MatchOutcome {
    Matched(RouteMatch),
    /// No route was similar enough.  `best_score` is the highest similarity
    /// seen, if any route was scored at all.
    NoMatch {
        best_score: Option<f32>,
        candidates: Vec<Candidate>,
    },
}

impl MatchOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Matched(_))
    }

    /// The matched route, if any.
    pub fn route(&self) -> Option<&Arc<Route>> {
        match self {
            Self::Matched(m) => Some(&m.route),
            Self::NoMatch { .. } => None,
        }
    }

    /// Similarity of the match, or the best below-threshold similarity.
    pub fn score(&self) -> Option<f32> {
        match self {
            Self::Matched(m) => Some(m.score),
            Self::NoMatch { best_score, .. } => *best_score,
        }
    }

    pub fn candidates(&self) -> &[Candidate] {
        match self {
            Self::Matched(m) => &m.candidates,
            Self::NoMatch { candidates, .. } => candidates,
        }
    }
}

// ---------------------------------------------------------------------------
// HybridMatcher
// ---------------------------------------------------------------------------

/// Threshold-gated route retrieval over an [`IndexSnapshot`].
///
/// Holds no mutable state; one matcher serves any number of concurrent
/// queries.
#[derive(Clone)]
pub struct HybridMatcher {
    embedder: Arc<dyn EmbeddingProvider>,
    threshold: f32,
    candidate_count: usize,
}

impl HybridMatcher {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, config: &EngineConfig) -> Self {
        Self {
            embedder,
            threshold: config.similarity_threshold,
            candidate_count: config.candidate_count,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Match `utterance` against `snapshot` with the given strategy.
    pub async fn find(
        &self,
        snapshot: &IndexSnapshot,
        utterance: &str,
        strategy: Strategy,
    ) -> Result<MatchOutcome> {
        let outcome = match strategy {
            Strategy::Nearest => self.find_nearest(snapshot, utterance).await?,
            Strategy::Hybrid => self.find_hybrid(snapshot, utterance).await?,
        };

        match &outcome {
            MatchOutcome::Matched(m) => tracing::debug!(
                utterance,
                strategy = %strategy,
                phrase = %m.route.phrase,
                score = m.score,
                "route matched"
            ),
            MatchOutcome::NoMatch { best_score, .. } => tracing::debug!(
                utterance,
                strategy = %strategy,
                best_score = ?best_score,
                threshold = self.threshold,
                "no route above threshold"
            ),
        }

        Ok(outcome)
    }

    // -- Strategies ---------------------------------------------------------

    /// 1-NN over the ANN index; similarity is `1 - cosine distance`.
    async fn find_nearest(&self, snapshot: &IndexSnapshot, utterance: &str) -> Result<MatchOutcome> {
        let query = self.embedder.embed(utterance).await?;
        let neighbors = snapshot.ann.knn(&query, 1).await?;

        let Some(nearest) = neighbors.first() else {
            return Ok(MatchOutcome::NoMatch {
                best_score: None,
                candidates: Vec::new(),
            });
        };

        let route = snapshot.route(nearest.index).ok_or_else(|| {
            RouterError::collaborator(
                Collaborator::AnnIndex,
                format!(
                    "neighbour index {} is out of range for {} routes",
                    nearest.index,
                    snapshot.len()
                ),
            )
        })?;

        let score = 1.0 - nearest.distance;
        if score >= self.threshold {
            Ok(MatchOutcome::Matched(RouteMatch {
                route: Arc::clone(route),
                index: nearest.index,
                score,
                strategy: Strategy::Nearest,
                candidates: Vec::new(),
            }))
        } else {
            Ok(MatchOutcome::NoMatch {
                best_score: Some(score),
                candidates: Vec::new(),
            })
        }
    }

    /// Lexical top-k prefilter, then cosine rerank of the survivors.
    async fn find_hybrid(&self, snapshot: &IndexSnapshot, utterance: &str) -> Result<MatchOutcome> {
        let scores = snapshot.lexical.score(&tokenize(utterance)).await?;
        if scores.len() != snapshot.len() {
            return Err(RouterError::collaborator(
                Collaborator::LexicalScorer,
                format!("returned {} scores for {} routes", scores.len(), snapshot.len()),
            ));
        }

        let top = top_k_stable(&scores, self.candidate_count);
        tracing::trace!(candidates = ?top, "lexical prefilter");

        let query = self.embedder.embed(utterance).await?;

        let mut candidates = Vec::with_capacity(top.len());
        for &index in &top {
            let vector = &snapshot.vectors[index];
            if vector.len() != query.len() {
                return Err(RouterError::collaborator(
                    Collaborator::Embedding,
                    format!(
                        "query dimension {} does not match index dimension {}",
                        query.len(),
                        vector.len()
                    ),
                ));
            }
            candidates.push(Candidate {
                index,
                phrase: snapshot.phrases[index].clone(),
                lexical_score: scores[index],
                similarity: cosine_similarity(&query, vector),
            });
        }

        // Strict comparison keeps the earliest candidate on ties.
        let mut best: Option<&Candidate> = None;
        for candidate in &candidates {
            if best.is_none_or(|b| candidate.similarity > b.similarity) {
                best = Some(candidate);
            }
        }

        let Some(best) = best else {
            return Ok(MatchOutcome::NoMatch {
                best_score: None,
                candidates,
            });
        };

        let (index, score) = (best.index, best.similarity);
        if score >= self.threshold {
            Ok(MatchOutcome::Matched(RouteMatch {
                route: Arc::clone(&snapshot.routes[index]),
                index,
                score,
                strategy: Strategy::Hybrid,
                candidates,
            }))
        } else {
            Ok(MatchOutcome::NoMatch {
                best_score: Some(score),
                candidates,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Indices of the `k` highest scores, descending; ties keep index order.
/// Returns `min(k, scores.len())` indices.
pub fn top_k_stable(scores: &[f32], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
    order.truncate(k);
    order
}

/// Cosine similarity of two equal-length vectors.  A zero vector has
/// similarity `0.0` with everything.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_names() {
        assert_eq!("hnswlib".parse::<Strategy>().unwrap(), Strategy::Nearest);
        assert_eq!("bm25_hybrid".parse::<Strategy>().unwrap(), Strategy::Hybrid);
        assert_eq!("nearest".parse::<Strategy>().unwrap(), Strategy::Nearest);
        assert!("fuzzy".parse::<Strategy>().unwrap_err().is_configuration());
        assert_eq!(Strategy::default(), Strategy::Hybrid);
    }

    #[test]
    fn top_k_is_stable_on_ties() {
        let scores = [0.5, 1.0, 0.5, 1.0, 0.0];
        assert_eq!(top_k_stable(&scores, 3), [1, 3, 0]);
    }

    #[test]
    fn top_k_clamps_to_available() {
        assert_eq!(top_k_stable(&[0.2, 0.9], 3), [1, 0]);
        assert!(top_k_stable(&[], 3).is_empty());
    }

    #[test]
    fn cosine_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
