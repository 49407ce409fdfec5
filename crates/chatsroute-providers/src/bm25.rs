//! BM25 Okapi lexical scorer.
//!
//! Scores follow the classic Okapi formulation with the IDF floor used by
//! the widely deployed `rank_bm25` package: terms whose IDF would be
//! negative (present in more than half of the corpus) get
//! `epsilon * average_idf` instead.  Tokens are compared exactly, so
//! callers decide on case folding when they tokenize.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use chatsroute_kernel::{LexicalIndex, LexicalIndexBuilder, Result as RouterResult};

/// Okapi tuning parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bm25Params {
    /// Term-frequency saturation.
    pub k1: f32,
    /// Document-length normalization.
    pub b: f32,
    /// Floor for negative IDF values, as a fraction of the average IDF.
    pub epsilon: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self {
            k1: 1.5,
            b: 0.75,
            epsilon: 0.25,
        }
    }
}

/// A BM25 Okapi index over a tokenized corpus.
#[derive(Debug, Clone)]
pub struct Bm25Okapi {
    params: Bm25Params,
    doc_freqs: Vec<HashMap<String, usize>>,
    doc_lens: Vec<usize>,
    avg_doc_len: f32,
    idf: HashMap<String, f32>,
}

impl Bm25Okapi {
    pub fn new(corpus: &[Vec<String>], params: Bm25Params) -> Self {
        let mut doc_freqs = Vec::with_capacity(corpus.len());
        let mut doc_lens = Vec::with_capacity(corpus.len());
        let mut containing: HashMap<String, usize> = HashMap::new();

        for doc in corpus {
            let mut freqs: HashMap<String, usize> = HashMap::new();
            for token in doc {
                *freqs.entry(token.clone()).or_default() += 1;
            }
            for token in freqs.keys() {
                *containing.entry(token.clone()).or_default() += 1;
            }
            doc_lens.push(doc.len());
            doc_freqs.push(freqs);
        }

        let total_len: usize = doc_lens.iter().sum();
        let avg_doc_len = if corpus.is_empty() || total_len == 0 {
            1.0
        } else {
            total_len as f32 / corpus.len() as f32
        };

        let n = corpus.len() as f32;
        let mut idf = HashMap::with_capacity(containing.len());
        let mut idf_sum = 0.0_f32;
        let mut negative = Vec::new();
        for (token, count) in containing {
            let count = count as f32;
            let value = (n - count + 0.5).ln() - (count + 0.5).ln();
            idf_sum += value;
            if value < 0.0 {
                negative.push(token.clone());
            }
            idf.insert(token, value);
        }

        if !idf.is_empty() {
            let floor = params.epsilon * idf_sum / idf.len() as f32;
            for token in negative {
                idf.insert(token, floor);
            }
        }

        Self {
            params,
            doc_freqs,
            doc_lens,
            avg_doc_len,
            idf,
        }
    }

    /// One score per document, in corpus order.  Repeated query tokens
    /// count once per occurrence.
    pub fn scores(&self, query: &[String]) -> Vec<f32> {
        let Bm25Params { k1, b, .. } = self.params;

        self.doc_freqs
            .iter()
            .zip(&self.doc_lens)
            .map(|(freqs, &len)| {
                let norm = k1 * (1.0 - b + b * len as f32 / self.avg_doc_len);
                query
                    .iter()
                    .map(|token| {
                        let tf = freqs.get(token).copied().unwrap_or(0) as f32;
                        let idf = self.idf.get(token).copied().unwrap_or(0.0);
                        idf * (tf * (k1 + 1.0)) / (tf + norm)
                    })
                    .sum::<f32>()
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.doc_freqs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_freqs.is_empty()
    }
}

#[async_trait]
impl LexicalIndex for Bm25Okapi {
    async fn score(&self, query: &[String]) -> RouterResult<Vec<f32>> {
        Ok(self.scores(query))
    }
}

/// Builds [`Bm25Okapi`] indexes with fixed parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bm25Builder {
    params: Bm25Params,
}

impl Bm25Builder {
    pub fn new(params: Bm25Params) -> Self {
        Self { params }
    }
}

#[async_trait]
impl LexicalIndexBuilder for Bm25Builder {
    async fn build(&self, corpus: &[Vec<String>]) -> RouterResult<Box<dyn LexicalIndex>> {
        let index = Bm25Okapi::new(corpus, self.params);
        tracing::debug!(documents = index.len(), vocabulary = index.idf.len(), "bm25 index built");
        Ok(Box::new(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatsroute_kernel::tokenize;

    fn corpus(docs: &[&str]) -> Vec<Vec<String>> {
        docs.iter().map(|d| tokenize(d)).collect()
    }

    #[test]
    fn rare_terms_rank_their_document_first() {
        let index = Bm25Okapi::new(
            &corpus(&[
                "open a new savings account",
                "close my checking account",
                "transfer money between accounts",
                "report a lost card",
            ]),
            Bm25Params::default(),
        );
        let scores = index.scores(&tokenize("lost card"));
        let best = scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(best, Some(3));
        assert_eq!(scores[0], 0.0);
    }

    #[test]
    fn matches_reference_idf() {
        // Three documents, "card" appears in one: idf = ln(2.5) - ln(1.5).
        let index = Bm25Okapi::new(&corpus(&["card", "x", "y"]), Bm25Params::default());
        let expected = (2.5_f32).ln() - (1.5_f32).ln();
        assert!((index.idf["card"] - expected).abs() < 1e-6);

        // tf = 1, doc len equals the average, so the tf factor is exactly 1.
        let scores = index.scores(&tokenize("card"));
        assert!((scores[0] - expected).abs() < 1e-6);
        assert_eq!(scores[1], 0.0);
    }

    #[test]
    fn common_terms_get_epsilon_floor() {
        // "the" is in every document, so its raw idf is negative.
        let index = Bm25Okapi::new(
            &corpus(&["the cat", "the dog", "the bird"]),
            Bm25Params::default(),
        );
        let rare = (2.5_f32).ln() - (1.5_f32).ln();
        let common = (0.5_f32).ln() - (3.5_f32).ln();
        let floor = 0.25 * (3.0 * rare + common) / 4.0;
        assert!((index.idf["the"] - floor).abs() < 1e-6);
        assert!(index.idf["the"] < index.idf["cat"]);
    }

    #[test]
    fn tokens_are_case_sensitive() {
        let index = Bm25Okapi::new(&corpus(&["Cancel card", "x", "y"]), Bm25Params::default());
        assert_eq!(index.scores(&tokenize("CANCEL"))[0], 0.0);
        assert!(index.scores(&tokenize("Cancel"))[0] > 0.0);
    }

    #[test]
    fn empty_query_scores_zero() {
        let index = Bm25Okapi::new(&corpus(&["a b", "c"]), Bm25Params::default());
        assert_eq!(index.scores(&[]), vec![0.0, 0.0]);
    }
}
