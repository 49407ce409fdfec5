//! The routing engine.
//!
//! [`Engine`] ties the pieces together:
//!
//! 1. Routes and schemas accumulate in the [`TriggerRegistry`].
//! 2. The first match (or an explicit [`Engine::build_index`]) freezes the
//!    registry and builds the [`IndexSnapshot`] exactly once, even when many
//!    callers race for it.
//! 3. The [`HybridMatcher`] resolves an utterance to a route.
//! 4. The [`ParameterExtractor`] builds the route's arguments and the
//!    route's handler is invoked with them.
//!
//! An engine is explicitly constructed and owned; share it with `Arc`.
//!
//! # Lifecycle
//!
//! ```text
//! Empty --first match--> Building --snapshot stored--> Ready
//! ```
//!
//! Registration is only possible while `Empty`.  A build that fails leaves
//! the engine in `Building`; the next match retries it over the same routes.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::OnceCell;

use crate::config::EngineConfig;
use crate::error::{Result, RouterError};
use crate::extract::ParameterExtractor;
use crate::handler::{Handler, HandlerId, Params};
use crate::index::{IndexBuilder, IndexSnapshot};
use crate::matcher::{HybridMatcher, MatchOutcome, Strategy};
use crate::registry::{ExtractionField, TriggerRegistry};
use crate::traits::{AnnIndexBuilder, EmbeddingProvider, EntityExtractor, LexicalIndexBuilder};

/// The external collaborators an engine is built from.
#[derive(Clone)]
pub struct Collaborators {
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub ann: Arc<dyn AnnIndexBuilder>,
    pub lexical: Arc<dyn LexicalIndexBuilder>,
    pub extractor: Arc<dyn EntityExtractor>,
}

/// Index lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// Accepting registrations; no index yet.
    Empty,
    /// Registry frozen, index not yet available.
    Building,
    /// Index built and serving.
    Ready,
}

/// Outcome of running the full pipeline on an utterance.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Handled {
        phrase: String,
        handler: HandlerId,
        score: f32,
        params: Params,
        output: Value,
    },
    NoMatch {
        best_score: Option<f32>,
    },
}

/// Intent-routing engine.
pub struct Engine {
    config: EngineConfig,
    registry: TriggerRegistry,
    builder: IndexBuilder,
    matcher: HybridMatcher,
    extractor: ParameterExtractor,
    snapshot: OnceCell<IndexSnapshot>,
}

impl Engine {
    /// Create an engine with no routes.
    pub fn new(config: EngineConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;

        let Collaborators {
            embedder,
            ann,
            lexical,
            extractor,
        } = collaborators;

        Ok(Self {
            builder: IndexBuilder::new(Arc::clone(&embedder), ann, lexical),
            matcher: HybridMatcher::new(embedder, &config),
            extractor: ParameterExtractor::new(extractor),
            registry: TriggerRegistry::new(),
            snapshot: OnceCell::new(),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &TriggerRegistry {
        &self.registry
    }

    // -- Registration -------------------------------------------------------

    /// Bind a trigger phrase to a handler.  See [`TriggerRegistry::register`].
    pub fn register_route(
        &self,
        phrase: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> Result<HandlerId> {
        self.registry.register(phrase, handler)
    }

    /// Attach extraction fields to a handler, before or after its route is
    /// registered.  See [`TriggerRegistry::declare_schema`].
    pub fn declare_schema(
        &self,
        handler: impl Into<HandlerId>,
        fields: Vec<ExtractionField>,
    ) -> Result<HandlerId> {
        self.registry.declare_schema(handler, fields)
    }

    // -- Index lifecycle ----------------------------------------------------

    pub fn state(&self) -> EngineState {
        if self.snapshot.initialized() {
            EngineState::Ready
        } else if self.registry.is_frozen() {
            EngineState::Building
        } else {
            EngineState::Empty
        }
    }

    /// Build the index now instead of on the first match.  A no-op once
    /// `Ready`.
    pub async fn build_index(&self) -> Result<&IndexSnapshot> {
        self.snapshot
            .get_or_try_init(|| async {
                let routes = self.registry.freeze()?;
                tracing::info!(routes = routes.len(), "building route index");
                self.builder.build(routes).await
            })
            .await
    }

    // -- Matching -----------------------------------------------------------

    /// Resolve `utterance` to a route without extracting parameters or
    /// invoking the handler.
    pub async fn match_utterance(&self, utterance: &str, strategy: Strategy) -> Result<MatchOutcome> {
        let snapshot = self.build_index().await?;
        self.matcher.find(snapshot, utterance, strategy).await
    }

    /// Match, extract parameters and invoke the matched handler.
    ///
    /// `None` selects the configured default strategy.
    pub async fn run(&self, utterance: &str, strategy: Option<Strategy>) -> Result<RunOutcome> {
        let strategy = strategy.unwrap_or(self.config.default_strategy);

        let route_match = match self.match_utterance(utterance, strategy).await? {
            MatchOutcome::Matched(m) => m,
            MatchOutcome::NoMatch { best_score, .. } => {
                return Ok(RunOutcome::NoMatch { best_score });
            }
        };

        let route = route_match.route;
        let params = self.extractor.extract(&route, utterance).await?;

        tracing::info!(
            phrase = %route.phrase,
            handler = %route.handler_id,
            score = route_match.score,
            params = params.len(),
            "invoking handler"
        );

        let output = route
            .handler
            .call(utterance, &params)
            .await
            .map_err(|e| match e {
                handler_err @ RouterError::Handler { .. } => handler_err,
                other => RouterError::Handler {
                    handler: route.handler_id.to_string(),
                    reason: other.to_string(),
                },
            })?;

        Ok(RunOutcome::Handled {
            phrase: route.phrase.clone(),
            handler: route.handler_id.clone(),
            score: route_match.score,
            params,
            output,
        })
    }
}
