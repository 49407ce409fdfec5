//! One-shot index construction.
//!
//! [`IndexBuilder::build`] turns the frozen route list into an
//! [`IndexSnapshot`]: one embedding per trigger phrase, an ANN index over
//! those embeddings and a lexical index over the whitespace-tokenized
//! phrases.  The snapshot is immutable and shared read-only by every
//! concurrent match.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{Collaborator, RouterError, Result};
use crate::registry::Route;
use crate::traits::{AnnIndex, AnnIndexBuilder, EmbeddingProvider, LexicalIndex, LexicalIndexBuilder};

/// Split text the way both the corpus and queries are tokenized for the
/// lexical scorer.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}

/// The frozen routes plus the retrieval structures built over them.
///
/// `routes`, `phrases` and `vectors` are index-aligned.
pub struct IndexSnapshot {
    pub routes: Vec<Arc<Route>>,
    pub phrases: Vec<String>,
    pub vectors: Vec<Vec<f32>>,
    pub ann: Box<dyn AnnIndex>,
    pub lexical: Box<dyn LexicalIndex>,
    pub built_at: DateTime<Utc>,
}

impl IndexSnapshot {
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn route(&self, index: usize) -> Option<&Arc<Route>> {
        self.routes.get(index)
    }
}

impl std::fmt::Debug for IndexSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexSnapshot")
            .field("phrases", &self.phrases)
            .field("dimension", &self.vectors.first().map(Vec::len))
            .field("built_at", &self.built_at)
            .finish_non_exhaustive()
    }
}

/// Builds [`IndexSnapshot`]s from the configured collaborators.
#[derive(Clone)]
pub struct IndexBuilder {
    embedder: Arc<dyn EmbeddingProvider>,
    ann: Arc<dyn AnnIndexBuilder>,
    lexical: Arc<dyn LexicalIndexBuilder>,
}

impl IndexBuilder {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        ann: Arc<dyn AnnIndexBuilder>,
        lexical: Arc<dyn LexicalIndexBuilder>,
    ) -> Self {
        Self {
            embedder,
            ann,
            lexical,
        }
    }

    /// Embed every phrase in one batch and build both indexes.
    pub async fn build(&self, routes: Vec<Route>) -> Result<IndexSnapshot> {
        if routes.is_empty() {
            return Err(RouterError::config("no routes have been registered"));
        }

        let phrases: Vec<String> = routes.iter().map(|r| r.phrase.clone()).collect();
        let texts: Vec<&str> = phrases.iter().map(String::as_str).collect();

        let vectors = self.embedder.embed_batch(&texts).await?;
        if vectors.len() != phrases.len() {
            return Err(RouterError::collaborator(
                Collaborator::Embedding,
                format!("returned {} vectors for {} phrases", vectors.len(), phrases.len()),
            ));
        }
        let dimension = self.embedder.dimension();
        if let Some(bad) = vectors.iter().position(|v| v.len() != dimension) {
            return Err(RouterError::collaborator(
                Collaborator::Embedding,
                format!(
                    "vector for `{}` has dimension {}, expected {dimension}",
                    phrases[bad],
                    vectors[bad].len()
                ),
            ));
        }

        let ann = self.ann.build(&vectors).await?;
        if ann.len() != vectors.len() {
            return Err(RouterError::collaborator(
                Collaborator::AnnIndex,
                format!("indexed {} of {} vectors", ann.len(), vectors.len()),
            ));
        }

        let corpus: Vec<Vec<String>> = phrases.iter().map(|p| tokenize(p)).collect();
        let lexical = self.lexical.build(&corpus).await?;

        tracing::info!(routes = routes.len(), dimension, "route index built");

        Ok(IndexSnapshot {
            routes: routes.into_iter().map(Arc::new).collect(),
            phrases,
            vectors,
            ann,
            lexical,
            built_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_splits_on_any_whitespace() {
        assert_eq!(
            tokenize("  Want to\tcancel a\ncard. "),
            ["Want", "to", "cancel", "a", "card."]
        );
        assert!(tokenize("   ").is_empty());
    }
}
