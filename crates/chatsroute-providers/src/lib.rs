//! Default collaborators for the chatsroute kernel.
//!
//! Each provider implements one of the collaborator traits from
//! [`chatsroute_kernel::traits`]:
//!
//! | Trait | Provider |
//! |-------|----------|
//! | `EmbeddingProvider` | [`HashingEmbedder`] (local, deterministic), [`OpenAiEmbedder`] (remote) |
//! | `AnnIndexBuilder` | [`FlatIndexBuilder`] (exact cosine search) |
//! | `LexicalIndexBuilder` | [`Bm25Builder`] (BM25 Okapi) |
//! | `EntityExtractor` | [`PatternExtractor`], [`NullExtractor`] |
//!
//! [`local_collaborators`] wires the local providers into a ready-to-use
//! [`Collaborators`] set.

pub mod bm25;
pub mod error;
pub mod extractor;
pub mod flat;
pub mod hashing;
pub mod openai;

use std::sync::Arc;

use chatsroute_kernel::{Collaborators, EmbeddingProvider, EntityExtractor};

pub use bm25::{Bm25Builder, Bm25Okapi, Bm25Params};
pub use error::{ProviderError, Result};
pub use extractor::{NullExtractor, PatternExtractor};
pub use flat::{FlatIndex, FlatIndexBuilder};
pub use hashing::HashingEmbedder;
pub use openai::{OpenAiConfig, OpenAiEmbedder};

/// Flat cosine index and BM25 scoring around the given embedder and
/// extractor.
pub fn collaborators(
    embedder: Arc<dyn EmbeddingProvider>,
    extractor: Arc<dyn EntityExtractor>,
) -> Collaborators {
    Collaborators {
        embedder,
        ann: Arc::new(FlatIndexBuilder),
        lexical: Arc::new(Bm25Builder::default()),
        extractor,
    }
}

/// Fully local collaborators: hashing embedder, flat index, BM25.
pub fn local_collaborators(extractor: Arc<dyn EntityExtractor>) -> Collaborators {
    collaborators(Arc::new(HashingEmbedder::default()), extractor)
}
