//! Contracts for the external collaborators the kernel consumes.
//!
//! The kernel never embeds text, searches vectors, scores terms or finds
//! entities itself.  It drives implementations of these traits, all of
//! which are `Send + Sync` and may suspend.  Errors they return are
//! propagated to the caller unchanged and are never retried.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Turns text into fixed-length, unit-normalized vectors.
///
/// Must be deterministic: identical input yields an identical vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed many texts at once.
    ///
    /// The default implementation calls [`EmbeddingProvider::embed`] for
    /// each text; providers with a native batch API should override it.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    /// Length of every vector this provider returns.
    fn dimension(&self) -> usize;
}

/// One k-NN result: a position in the indexed vector collection and its
/// cosine distance (`0.0` identical, `2.0` opposite) from the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    pub distance: f32,
}

/// Builds an [`AnnIndex`] over a vector collection.
#[async_trait]
pub trait AnnIndexBuilder: Send + Sync {
    async fn build(&self, vectors: &[Vec<f32>]) -> Result<Box<dyn AnnIndex>>;
}

/// Nearest-neighbour search over the vectors it was built from.
#[async_trait]
pub trait AnnIndex: Send + Sync {
    /// Up to `k` neighbours of `query`, nearest first.
    async fn knn(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>>;

    /// Number of indexed vectors.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builds a [`LexicalIndex`] over a tokenized corpus.
#[async_trait]
pub trait LexicalIndexBuilder: Send + Sync {
    async fn build(&self, corpus: &[Vec<String>]) -> Result<Box<dyn LexicalIndex>>;
}

/// Term-overlap relevance scoring.
#[async_trait]
pub trait LexicalIndex: Send + Sync {
    /// One score per corpus document, in corpus order.  Higher is more
    /// relevant.
    async fn score(&self, query: &[String]) -> Result<Vec<f32>>;
}

/// Proposes a raw value for a semantic key found in an utterance.
#[async_trait]
pub trait EntityExtractor: Send + Sync {
    /// Return the raw value for `key`, or `None` if the utterance does not
    /// contain one.  `hint` is the field's free-text description.
    async fn extract(&self, utterance: &str, key: &str, hint: Option<&str>) -> Result<Option<Value>>;
}
