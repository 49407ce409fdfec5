//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::error::{RouterError, Result};
use crate::matcher::Strategy;

/// Minimum cosine similarity for a route to be returned.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.5;

/// Lexical candidates reranked by the hybrid strategy.
pub const DEFAULT_CANDIDATE_COUNT: usize = 3;

/// Tunables shared by every match an engine serves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Routes scoring below this similarity are never returned.
    pub similarity_threshold: f32,
    /// How many lexical candidates [`Strategy::Hybrid`] reranks.
    pub candidate_count: usize,
    /// Strategy used when the caller does not pick one.
    pub default_strategy: Strategy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            candidate_count: DEFAULT_CANDIDATE_COUNT,
            default_strategy: Strategy::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if !(-1.0..=1.0).contains(&self.similarity_threshold) {
            return Err(RouterError::config(format!(
                "similarity_threshold {} is outside [-1, 1]",
                self.similarity_threshold
            )));
        }
        if self.candidate_count == 0 {
            return Err(RouterError::config("candidate_count must be at least 1"));
        }
        Ok(())
    }
}
