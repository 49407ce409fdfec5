//! Kernel error types.
//!
//! All routing subsystems surface errors through [`RouterError`], which is
//! the single error type returned by every public API in this crate.  A
//! failed match is *not* an error: see [`crate::matcher::MatchOutcome`].

/// Unified error type for the chatsroute kernel.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    // -- Configuration ------------------------------------------------------
    /// The engine was configured in a way it cannot serve: an empty
    /// registry, a registration after the index was built, a malformed
    /// schema declaration, or an unknown strategy name.
    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    // -- Collaborators ------------------------------------------------------
    /// An external collaborator (embedding provider, ANN index, lexical
    /// scorer, entity extractor) failed.  Propagated unchanged; the kernel
    /// never retries.
    #[error("{collaborator} failed: {reason}")]
    Collaborator {
        /// Which collaborator raised the error.
        collaborator: Collaborator,
        reason: String,
    },

    // -- Handlers -----------------------------------------------------------
    /// The matched handler returned an error.
    #[error("handler `{handler}` failed: {reason}")]
    Handler { handler: String, reason: String },

    // -- Generic ------------------------------------------------------------
    /// Catch-all for invariant violations that don't fit a specific
    /// variant.  Prefer a typed variant whenever possible.
    #[error("internal router error: {0}")]
    Internal(String),
}

/// The external collaborators the kernel consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collaborator {
    Embedding,
    AnnIndex,
    LexicalScorer,
    EntityExtractor,
}

impl std::fmt::Display for Collaborator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Embedding => "embedding provider",
            Self::AnnIndex => "ann index",
            Self::LexicalScorer => "lexical scorer",
            Self::EntityExtractor => "entity extractor",
        };
        f.write_str(name)
    }
}

impl RouterError {
    /// Shorthand for a [`RouterError::Configuration`].
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`RouterError::Collaborator`].
    pub fn collaborator(collaborator: Collaborator, reason: impl std::fmt::Display) -> Self {
        Self::Collaborator {
            collaborator,
            reason: reason.to_string(),
        }
    }

    /// Whether this is a configuration error.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }
}

/// Convenience alias used throughout the kernel crate.
pub type Result<T> = std::result::Result<T, RouterError>;
