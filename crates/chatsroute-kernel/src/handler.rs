//! Route handlers.
//!
//! A [`Handler`] is the application code bound to one or more trigger
//! phrases.  Its [`Handler::name`] is its identity: extraction schemas are
//! declared against that name, possibly before the handler is registered.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::coerce::TypedValue;
use crate::error::Result;

/// Extracted parameters passed to a handler, keyed by field key.
pub type Params = BTreeMap<String, TypedValue>;

/// Identity of a handler, used to attach extraction schemas.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandlerId(String);

impl HandlerId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HandlerId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for HandlerId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl From<&HandlerId> for HandlerId {
    fn from(id: &HandlerId) -> Self {
        id.clone()
    }
}

/// Application code invoked when a route matches.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Stable identity of this handler.
    fn name(&self) -> &str;

    /// Handle `utterance` with the parameters extracted for the matched
    /// route.
    async fn call(&self, utterance: &str, params: &Params) -> Result<Value>;
}

/// A [`Handler`] backed by an async closure.  Built with [`handler_fn`].
pub struct FnHandler<F> {
    name: String,
    func: F,
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(String, Params) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, utterance: &str, params: &Params) -> Result<Value> {
        (self.func)(utterance.to_string(), params.clone()).await
    }
}

/// Wrap an async closure as a shareable handler.
///
/// ```rust
/// # use chatsroute_kernel::handler::{handler_fn, Handler};
/// let greet = handler_fn("greet", |utterance, _params| async move {
///     Ok(serde_json::json!({ "echo": utterance }))
/// });
/// assert_eq!(greet.name(), "greet");
/// ```
pub fn handler_fn<F, Fut>(name: impl Into<String>, func: F) -> Arc<dyn Handler>
where
    F: Fn(String, Params) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(FnHandler {
        name: name.into(),
        func,
    })
}
