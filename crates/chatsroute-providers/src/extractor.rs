//! Entity extractors.
//!
//! - [`PatternExtractor`] -- one regex per parameter key.  The first capture
//!   group of the first match is the raw value (the whole match when the
//!   pattern has no groups).
//! - [`NullExtractor`] -- never finds anything, so every parameter resolves
//!   to its declared default.

use std::collections::HashMap;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use chatsroute_kernel::{EntityExtractor, Result as RouterResult};

use crate::error::{ProviderError, Result};

/// Regex-driven entity extraction, keyed by parameter key.
#[derive(Debug, Clone, Default)]
pub struct PatternExtractor {
    patterns: HashMap<String, Regex>,
}

impl PatternExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the pattern used for `key`, replacing any previous one.
    pub fn with_pattern(mut self, key: impl Into<String>, pattern: &str) -> Result<Self> {
        self.add_pattern(key, pattern)?;
        Ok(self)
    }

    pub fn add_pattern(&mut self, key: impl Into<String>, pattern: &str) -> Result<()> {
        let key = key.into();
        if pattern.is_empty() {
            tracing::warn!(key = %key, "empty extraction pattern ignored");
            return Ok(());
        }
        let compiled = Regex::new(pattern).map_err(|e| ProviderError::InvalidPattern {
            key: key.clone(),
            reason: e.to_string(),
        })?;
        tracing::debug!(key = %key, pattern, "extraction pattern added");
        self.patterns.insert(key, compiled);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Synchronous lookup used by the [`EntityExtractor`] impl.
    pub fn find(&self, utterance: &str, key: &str) -> Option<String> {
        let caps = self.patterns.get(key)?.captures(utterance)?;
        caps.get(1)
            .or_else(|| caps.get(0))
            .map(|m| m.as_str().to_string())
    }
}

#[async_trait]
impl EntityExtractor for PatternExtractor {
    async fn extract(&self, utterance: &str, key: &str, _hint: Option<&str>) -> RouterResult<Option<Value>> {
        Ok(self.find(utterance, key).map(Value::String))
    }
}

/// Extractor that never proposes a value.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullExtractor;

#[async_trait]
impl EntityExtractor for NullExtractor {
    async fn extract(&self, _utterance: &str, _key: &str, _hint: Option<&str>) -> RouterResult<Option<Value>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_group_is_the_value() {
        let extractor = PatternExtractor::new()
            .with_pattern("card_number", r"(\d[\d\- ]{10,}\d)")
            .unwrap()
            .with_pattern("amount", r"\$\d+(?:\.\d+)?")
            .unwrap();

        assert_eq!(
            extractor.find("cancel card 4111-1111-1111-1111 now", "card_number").as_deref(),
            Some("4111-1111-1111-1111")
        );
        // No group: whole match.
        assert_eq!(extractor.find("send $12.50 to bob", "amount").as_deref(), Some("$12.50"));
    }

    #[test]
    fn unknown_key_or_no_match_is_none() {
        let extractor = PatternExtractor::new().with_pattern("n", r"(\d+)").unwrap();
        assert!(extractor.find("no digits", "n").is_none());
        assert!(extractor.find("42", "other").is_none());
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let err = PatternExtractor::new().with_pattern("bad", "[unclosed").unwrap_err();
        assert!(matches!(err, ProviderError::InvalidPattern { .. }));
    }

    #[test]
    fn empty_pattern_is_skipped() {
        let extractor = PatternExtractor::new().with_pattern("x", "").unwrap();
        assert!(extractor.is_empty());
    }

    #[tokio::test]
    async fn null_extractor_finds_nothing() {
        let found = NullExtractor.extract("card 1234", "card_number", None).await.unwrap();
        assert!(found.is_none());
    }
}
