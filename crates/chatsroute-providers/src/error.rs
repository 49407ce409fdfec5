//! Provider error types.
//!
//! All providers surface errors through [`ProviderError`].  When a provider
//! is driven by the kernel, the error converts into
//! [`RouterError`] so the caller sees which collaborator failed.

use chatsroute_kernel::{Collaborator, RouterError};

/// Unified error type for the default providers.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// An HTTP request to a remote embedding service failed.
    #[error("embedding request failed: {reason}")]
    Request { reason: String },

    /// A remote embedding service answered with something unusable.
    #[error("invalid embedding response: {reason}")]
    Response { reason: String },

    /// Vectors handed to an index do not share one dimension.
    #[error("vector {index} has dimension {actual}, expected {expected}")]
    Dimension {
        index: usize,
        expected: usize,
        actual: usize,
    },

    /// An extraction pattern failed to compile.
    #[error("invalid pattern for `{key}`: {reason}")]
    InvalidPattern { key: String, reason: String },

    /// A provider was configured with unusable settings.
    #[error("provider configuration error: {0}")]
    Config(String),
}

impl ProviderError {
    /// The collaborator role a failure of this kind belongs to.
    pub fn collaborator(&self) -> Collaborator {
        match self {
            Self::Request { .. } | Self::Response { .. } | Self::Config(_) => Collaborator::Embedding,
            Self::Dimension { .. } => Collaborator::AnnIndex,
            Self::InvalidPattern { .. } => Collaborator::EntityExtractor,
        }
    }
}

impl From<ProviderError> for RouterError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Config(reason) => RouterError::Configuration { reason },
            other => RouterError::collaborator(other.collaborator(), &other),
        }
    }
}

/// Convenience alias used throughout the providers crate.
pub type Result<T> = std::result::Result<T, ProviderError>;
