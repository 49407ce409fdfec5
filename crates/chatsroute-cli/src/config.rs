//! Routes file loading and engine assembly.
//!
//! The routes file is TOML:
//!
//! ```toml
//! [engine]
//! similarity_threshold = 0.5
//! default_strategy = "hybrid"
//!
//! [embedding]
//! provider = "hashing"
//! dimension = 512
//!
//! [[routes]]
//! phrase = "Want to cancel a credit card."
//! handler = "cancel_card"
//! reply = "Cancelling card {card_number}."
//!
//! [[schemas]]
//! handler = "cancel_card"
//! key = "card_number"
//! type = "string"
//!
//! [[extractors]]
//! key = "card_number"
//! pattern = '(\d[\d\- ]{10,}\d)'
//! ```

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use chatsroute_kernel::{
    EmbeddingProvider, Engine, EngineConfig, ExtractionField, Handler, Params,
    Result as RouterResult,
};
use chatsroute_providers::{
    collaborators, HashingEmbedder, OpenAiConfig, OpenAiEmbedder, PatternExtractor,
};

/// Default location of the routes file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/routes.toml";

// ---------------------------------------------------------------------------
// File model
// ---------------------------------------------------------------------------

/// Top-level contents of the routes file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub routes: Vec<RouteEntry>,
    #[serde(default)]
    pub schemas: Vec<SchemaEntry>,
    #[serde(default)]
    pub extractors: Vec<ExtractorEntry>,
}

/// Which embedding provider backs the engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum EmbeddingConfig {
    /// Local feature-hashing embeddings.
    Hashing {
        #[serde(default = "default_hashing_dimension")]
        dimension: usize,
    },
    /// An OpenAI-compatible `/embeddings` endpoint.
    Openai {
        model: String,
        dimension: usize,
        #[serde(default = "default_base_url")]
        base_url: String,
        /// Environment variable holding the API key.
        #[serde(default = "default_api_key_env")]
        api_key_env: String,
    },
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self::Hashing {
            dimension: default_hashing_dimension(),
        }
    }
}

fn default_hashing_dimension() -> usize {
    HashingEmbedder::default().dimension()
}

fn default_base_url() -> String {
    chatsroute_providers::openai::DEFAULT_BASE_URL.to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

/// One `[[routes]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteEntry {
    pub phrase: String,
    pub handler: String,
    /// Reply template; `{key}` is replaced with the extracted value.
    #[serde(default)]
    pub reply: Option<String>,
}

/// One `[[schemas]]` entry: an extraction field for a handler.
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaEntry {
    pub handler: String,
    #[serde(flatten)]
    pub field: ExtractionField,
}

/// One `[[extractors]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractorEntry {
    pub key: String,
    pub pattern: String,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Read and parse the routes file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read routes file {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse routes file {}", path.display()))?;

        info!(
            path = %path.display(),
            routes = config.routes.len(),
            schemas = config.schemas.len(),
            "routes file loaded"
        );
        Ok(config)
    }

    /// Build an engine with every route and schema of this file registered.
    ///
    /// Schemas are declared first, in file order, so each handler's fields
    /// are waiting when its first route is registered.
    pub fn build_engine(&self) -> Result<Engine> {
        let embedder = self.embedder()?;

        let mut extractor = PatternExtractor::new();
        for entry in &self.extractors {
            extractor
                .add_pattern(&entry.key, &entry.pattern)
                .with_context(|| format!("invalid extractor for `{}`", entry.key))?;
        }

        let engine = Engine::new(
            self.engine.clone(),
            collaborators(embedder, Arc::new(extractor)),
        )
        .context("invalid engine configuration")?;

        for entry in &self.schemas {
            engine
                .declare_schema(entry.handler.as_str(), vec![entry.field.clone()])
                .with_context(|| {
                    format!("invalid schema `{}` for `{}`", entry.field.key, entry.handler)
                })?;
        }

        for entry in &self.routes {
            let handler = Arc::new(ReplyHandler::new(&entry.handler, entry.reply.clone()));
            engine
                .register_route(entry.phrase.as_str(), handler)
                .with_context(|| format!("invalid route `{}`", entry.phrase))?;
        }

        Ok(engine)
    }

    fn embedder(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        match &self.embedding {
            EmbeddingConfig::Hashing { dimension } => {
                anyhow::ensure!(*dimension > 0, "hashing dimension must be positive");
                Ok(Arc::new(HashingEmbedder::new(*dimension)))
            }
            EmbeddingConfig::Openai {
                model,
                dimension,
                base_url,
                api_key_env,
            } => {
                let embedder = OpenAiEmbedder::new(OpenAiConfig {
                    base_url: base_url.clone(),
                    model: model.clone(),
                    dimension: *dimension,
                    api_key: std::env::var(api_key_env).ok(),
                })
                .context("failed to set up remote embeddings")?;
                info!(endpoint = embedder.endpoint(), model = %model, "using remote embeddings");
                Ok(Arc::new(embedder))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Reply handler
// ---------------------------------------------------------------------------

/// Handler defined in the routes file: renders its reply template.
#[derive(Debug, Clone)]
pub struct ReplyHandler {
    name: String,
    reply: Option<String>,
}

impl ReplyHandler {
    pub fn new(name: impl Into<String>, reply: Option<String>) -> Self {
        Self {
            name: name.into(),
            reply,
        }
    }
}

#[async_trait]
impl Handler for ReplyHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, _utterance: &str, params: &Params) -> RouterResult<Value> {
        let reply = self
            .reply
            .as_deref()
            .map(|template| render_reply(template, params));

        Ok(json!({
            "handler": self.name,
            "reply": reply,
            "params": params,
        }))
    }
}

/// Substitute every `{key}` in `template` with the parameter's text form.
/// Placeholders without a parameter are left as they are.
pub fn render_reply(template: &str, params: &Params) -> String {
    params.iter().fold(template.to_string(), |text, (key, value)| {
        text.replace(&format!("{{{key}}}"), &value.to_string())
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::Write;

    use chatsroute_kernel::{DataType, EngineState, RunOutcome, Strategy, TypedValue};

    use super::*;

    const ROUTES: &str = r#"
[engine]
similarity_threshold = 0.5
default_strategy = "bm25_hybrid"

[embedding]
provider = "hashing"
dimension = 256

[[routes]]
phrase = "Want to cancel a credit card."
handler = "cancel_card"
reply = "Cancelling card {card_number}."

[[routes]]
phrase = "Want to know the account balance."
handler = "balance"

[[schemas]]
handler = "cancel_card"
key = "card_number"
description = "the card to cancel"
type = "string"

[[schemas]]
handler = "balance"
key = "limit"
type = "int"
default = 10

[[extractors]]
key = "card_number"
pattern = '(\d{4})'
"#;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn parses_every_section() {
        let file = write_config(ROUTES);
        let config = AppConfig::load(file.path()).unwrap();

        assert_eq!(config.engine.default_strategy, Strategy::Hybrid);
        assert!(matches!(config.embedding, EmbeddingConfig::Hashing { dimension: 256 }));
        assert_eq!(config.routes.len(), 2);
        assert_eq!(config.routes[1].reply, None);
        assert_eq!(config.schemas[0].field.data_type, DataType::String);
        assert_eq!(config.schemas[0].field.default, TypedValue::Null);
        assert_eq!(config.schemas[1].field.default, TypedValue::Int(10));
        assert_eq!(config.extractors[0].key, "card_number");
    }

    #[test]
    fn shipped_routes_file_builds() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_CONFIG_PATH);
        let engine = AppConfig::load(&path).unwrap().build_engine().unwrap();
        assert_eq!(engine.registry().len(), 4);
        assert_eq!(engine.registry().pending_count(), 0);
        assert_eq!(
            engine.registry().fields_for("Please block my credit card.").unwrap().len(),
            1
        );
    }

    #[test]
    fn empty_file_uses_defaults() {
        let file = write_config("");
        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.engine, EngineConfig::default());
        assert!(matches!(config.embedding, EmbeddingConfig::Hashing { .. }));
        assert!(config.routes.is_empty());
    }

    #[test]
    fn openai_section_parses() {
        let config: AppConfig = toml::from_str(
            r#"
[embedding]
provider = "openai"
model = "text-embedding-3-small"
dimension = 1536
"#,
        )
        .unwrap();
        match config.embedding {
            EmbeddingConfig::Openai {
                base_url,
                api_key_env,
                ..
            } => {
                assert_eq!(base_url, "https://api.openai.com/v1");
                assert_eq!(api_key_env, "OPENAI_API_KEY");
            }
            other => panic!("expected openai, got {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read routes file"));
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        let file = write_config("[engine]\ndefault_strategy = \"fuzzy\"\n");
        assert!(AppConfig::load(file.path()).is_err());
    }

    #[test]
    fn mistyped_default_is_rejected_at_build() {
        let file = write_config(
            r#"
[[routes]]
phrase = "x"
handler = "h"

[[schemas]]
handler = "h"
key = "n"
type = "int"
default = "many"
"#,
        );
        let config = AppConfig::load(file.path()).unwrap();
        assert!(config.build_engine().is_err());
    }

    #[test]
    fn reply_template_substitutes_params() {
        let mut params = Params::new();
        params.insert("card_number".into(), TypedValue::Str("4111".into()));
        params.insert("amount".into(), TypedValue::Int(3));

        assert_eq!(
            render_reply("Card {card_number}, {amount} times, {missing}", &params),
            "Card 4111, 3 times, {missing}"
        );
    }

    #[tokio::test]
    async fn built_engine_runs_routes_from_file() {
        let file = write_config(ROUTES);
        let engine = AppConfig::load(file.path()).unwrap().build_engine().unwrap();
        assert_eq!(engine.registry().len(), 2);
        assert_eq!(engine.registry().pending_count(), 0);
        assert_eq!(engine.state(), EngineState::Empty);

        let outcome = engine
            .run("Want to cancel a credit card. 4111", Some(Strategy::Nearest))
            .await
            .unwrap();
        match outcome {
            RunOutcome::Handled { output, .. } => {
                assert_eq!(output["handler"], "cancel_card");
                assert_eq!(output["reply"], "Cancelling card 4111.");
                assert_eq!(output["params"]["card_number"], "4111");
            }
            other => panic!("expected Handled, got {other:?}"),
        }

        let outcome = engine
            .run("Want to know the account balance.", None)
            .await
            .unwrap();
        match outcome {
            RunOutcome::Handled { output, .. } => {
                assert_eq!(output["reply"], Value::Null);
                assert_eq!(output["params"]["limit"], 10);
            }
            other => panic!("expected Handled, got {other:?}"),
        }
        assert_eq!(engine.state(), EngineState::Ready);
    }
}
