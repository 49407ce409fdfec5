//! chatsroute routing kernel.
//!
//! Application code registers natural-language trigger phrases, each bound
//! to a handler and an optional parameter schema.  At runtime a free-text
//! utterance is matched against the triggers and the best handler is
//! invoked with typed parameters pulled from the utterance.
//!
//! - **[`registry`]** -- Append-only trigger registry with deferred schema
//!   attachment, frozen by the first index build.
//! - **[`index`]** -- One-shot construction of route embeddings, the ANN
//!   index and the lexical index.
//! - **[`matcher`]** -- Nearest-neighbour and lexical-prefilter/semantic-
//!   rerank strategies behind one similarity threshold.
//! - **[`extract`]** -- Schema-driven parameter extraction.
//! - **[`coerce`]** -- Always-succeeding type coercion with defaults.
//! - **[`engine`]** -- The [`Engine`] facade with lazy, race-free index
//!   initialization.
//! - **[`traits`]** -- Contracts for the embedding provider, ANN index,
//!   lexical scorer and entity extractor the kernel consumes.
//! - **[`error`]** -- Kernel error types via [`thiserror`].

pub mod coerce;
pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod handler;
pub mod index;
pub mod matcher;
pub mod registry;
pub mod traits;

pub use coerce::{coerce, DataType, TypedValue};
pub use config::{EngineConfig, DEFAULT_CANDIDATE_COUNT, DEFAULT_SIMILARITY_THRESHOLD};
pub use engine::{Collaborators, Engine, EngineState, RunOutcome};
pub use error::{Collaborator, Result, RouterError};
pub use extract::ParameterExtractor;
pub use handler::{handler_fn, Handler, HandlerId, Params};
pub use index::{tokenize, IndexBuilder, IndexSnapshot};
pub use matcher::{Candidate, HybridMatcher, MatchOutcome, RouteMatch, Strategy};
pub use registry::{ExtractionField, Route, TriggerRegistry};
pub use traits::{
    AnnIndex, AnnIndexBuilder, EmbeddingProvider, EntityExtractor, LexicalIndex,
    LexicalIndexBuilder, Neighbor,
};
