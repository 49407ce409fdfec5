//! Feature-hashing embedder.
//!
//! A dependency-free, fully deterministic stand-in for a sentence embedding
//! model.  Each text is reduced to lowercased word unigrams plus character
//! trigrams of every word, each feature is hashed (FNV-1a) into one of
//! `dimension` buckets, and the bucket vector is L2-normalized.
//!
//! Similar phrasing lands in overlapping buckets, so cosine similarity
//! tracks lexical and sub-word overlap.  It has no notion of synonyms; use a
//! model-backed provider such as [`crate::OpenAiEmbedder`] for that.

use async_trait::async_trait;
use chatsroute_kernel::{EmbeddingProvider, Result as RouterResult};

/// Default number of hash buckets.
pub const DEFAULT_DIMENSION: usize = 512;

const WORD_WEIGHT: f32 = 1.0;
const TRIGRAM_WEIGHT: f32 = 0.5;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Deterministic hashing embedder.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    /// Create an embedder with `dimension` buckets (at least 1).
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// Embed synchronously.  Text without any word characters yields the
    /// zero vector.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension];

        for word in words(text) {
            vector[self.bucket(word.as_bytes())] += WORD_WEIGHT;

            let padded: Vec<char> = std::iter::once('#')
                .chain(word.chars())
                .chain(std::iter::once('#'))
                .collect();
            for trigram in padded.windows(3) {
                let gram: String = trigram.iter().collect();
                vector[self.bucket(gram.as_bytes())] += TRIGRAM_WEIGHT;
            }
        }

        normalize(&mut vector);
        vector
    }

    fn bucket(&self, bytes: &[u8]) -> usize {
        (fnv1a(bytes) % self.dimension as u64) as usize
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> RouterResult<Vec<f32>> {
        Ok(self.embed_text(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> RouterResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Lowercased words with surrounding punctuation removed.
fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME)
    })
}

/// Scale `vector` to unit length in place.  Zero vectors are left alone.
pub(crate) fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatsroute_kernel::matcher::cosine_similarity;

    #[test]
    fn identical_text_is_identical_vector() {
        let embedder = HashingEmbedder::default();
        let a = embedder.embed_text("Want to cancel a credit card.");
        let b = embedder.embed_text("Want to cancel a credit card.");
        assert_eq!(a, b);
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn vectors_are_unit_length() {
        let embedder = HashingEmbedder::new(64);
        let v = embedder.embed_text("check my account balance");
        assert_eq!(v.len(), 64);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn case_and_punctuation_are_ignored() {
        let embedder = HashingEmbedder::default();
        assert_eq!(
            embedder.embed_text("CANCEL my card!"),
            embedder.embed_text("cancel my card")
        );
    }

    #[test]
    fn related_text_scores_higher_than_unrelated() {
        let embedder = HashingEmbedder::default();
        let route = embedder.embed_text("Want to cancel a credit card.");
        let related = embedder.embed_text("please cancel my credit card");
        let unrelated = embedder.embed_text("what is the weather tomorrow");
        assert!(cosine_similarity(&route, &related) > cosine_similarity(&route, &unrelated));
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::new(8);
        assert!(embedder.embed_text("  ?! ").iter().all(|x| *x == 0.0));
    }

    #[test]
    fn fnv_reference_values() {
        assert_eq!(fnv1a(b""), FNV_OFFSET);
        assert_eq!(fnv1a(b"a"), 0xaf63_dc4c_8601_ec8c);
    }
}
