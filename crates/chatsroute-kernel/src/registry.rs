//! Trigger registry.
//!
//! The registry accumulates routes (a trigger phrase bound to a handler and
//! its extraction schema) until the index is built, at which point it is
//! frozen and every further mutation fails with
//! [`RouterError::Configuration`].
//!
//! Extraction schemas may be declared before or after the handler's route
//! is registered.  A declaration for a handler with no route yet is parked
//! in a pending side-table keyed by [`HandlerId`] and consumed when the
//! route arrives; a declaration for a handler that already owns routes is
//! appended to them directly.  Both orders yield the same field list.
//!
//! # Example
//!
//! ```rust
//! # use chatsroute_kernel::coerce::{DataType, TypedValue};
//! # use chatsroute_kernel::handler::handler_fn;
//! # use chatsroute_kernel::registry::{ExtractionField, TriggerRegistry};
//! let registry = TriggerRegistry::new();
//! let cancel = handler_fn("cancel_card", |_, _| async { Ok(serde_json::Value::Null) });
//!
//! registry
//!     .declare_schema("cancel_card", vec![ExtractionField::new(
//!         "card_number",
//!         DataType::String,
//!         TypedValue::Null,
//!     )])
//!     .unwrap();
//! registry.register("Want to cancel a credit card.", cancel).unwrap();
//!
//! let routes = registry.routes();
//! assert_eq!(routes[0].fields.len(), 1);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::coerce::{DataType, TypedValue};
use crate::error::{RouterError, Result};
use crate::handler::{Handler, HandlerId};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// One parameter declaration of a route's extraction schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionField {
    /// Key under which the value is passed to the handler.
    pub key: String,
    /// Optional hint forwarded to the entity extractor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Semantic type the extracted value is coerced to.
    #[serde(rename = "type")]
    pub data_type: DataType,
    /// Value used when nothing is extracted or coercion fails.
    #[serde(default = "null_default")]
    pub default: TypedValue,
}

fn null_default() -> TypedValue {
    TypedValue::Null
}

impl ExtractionField {
    pub fn new(key: impl Into<String>, data_type: DataType, default: impl Into<TypedValue>) -> Self {
        Self {
            key: key.into(),
            description: None,
            data_type,
            default: default.into(),
        }
    }

    /// Attach an extraction hint.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Check the declaration and widen an integer default on a `Float`
    /// field.
    fn validated(mut self) -> Result<Self> {
        if self.key.trim().is_empty() {
            return Err(RouterError::config("extraction field has an empty key"));
        }
        if !self.default.is_representable_as(self.data_type) {
            return Err(RouterError::config(format!(
                "default {:?} of field `{}` is not representable as {}",
                self.default, self.key, self.data_type
            )));
        }
        if let (DataType::Float, TypedValue::Int(i)) = (self.data_type, &self.default) {
            self.default = TypedValue::Float(*i as f64);
        }
        Ok(self)
    }
}

/// A trigger phrase bound to its handler and extraction schema.
#[derive(Clone)]
pub struct Route {
    /// The canonical utterance of this intent.  Unique within a registry.
    pub phrase: String,
    pub handler_id: HandlerId,
    pub handler: Arc<dyn Handler>,
    /// Extraction schema, in declaration order.
    pub fields: Vec<ExtractionField>,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("phrase", &self.phrase)
            .field("handler_id", &self.handler_id)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RegistryState {
    /// Routes in registration order; this order is the index order.
    routes: Vec<Route>,
    /// Schemas declared for handlers that have no route yet.
    pending: HashMap<HandlerId, Vec<ExtractionField>>,
    /// Set once the index build starts.  Never cleared.
    frozen: bool,
}

/// Append-only route registry, frozen by the first index build.
///
/// All methods take `&self`; the registry is `Send + Sync` and lives inside
/// the engine.  Locks are never held across an `.await`.
#[derive(Default)]
pub struct TriggerRegistry {
    state: RwLock<RegistryState>,
}

impl TriggerRegistry {
    /// Create an empty, unfrozen registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `phrase` to `handler`.
    ///
    /// Any schema pending for the handler is consumed; if the handler
    /// already owns a route, the new route copies that route's fields.
    /// Registering a phrase that already exists replaces the earlier route
    /// in place (last registration wins).
    pub fn register(&self, phrase: impl Into<String>, handler: Arc<dyn Handler>) -> Result<HandlerId> {
        let phrase = phrase.into();
        if phrase.trim().is_empty() {
            return Err(RouterError::config("trigger phrase must not be empty"));
        }
        let handler_id = HandlerId::new(handler.name());
        if handler_id.as_str().is_empty() {
            return Err(RouterError::config(format!(
                "handler for phrase `{phrase}` has an empty name"
            )));
        }

        let mut state = self.write();
        if state.frozen {
            return Err(RouterError::config(format!(
                "cannot register `{phrase}`: the index has already been built"
            )));
        }

        let fields = match state.pending.remove(&handler_id) {
            Some(fields) => fields,
            None => state
                .routes
                .iter()
                .find(|r| r.handler_id == handler_id)
                .map(|r| r.fields.clone())
                .unwrap_or_default(),
        };

        let route = Route {
            phrase: phrase.clone(),
            handler_id: handler_id.clone(),
            handler,
            fields,
        };

        if let Some(existing) = state.routes.iter_mut().find(|r| r.phrase == phrase) {
            tracing::warn!(
                phrase = %phrase,
                previous = %existing.handler_id,
                handler = %handler_id,
                "duplicate trigger phrase, replacing earlier route"
            );
            *existing = route;
        } else {
            tracing::info!(phrase = %phrase, handler = %handler_id, "route registered");
            state.routes.push(route);
        }

        Ok(handler_id)
    }

    /// Declare extraction fields for a handler.
    ///
    /// Repeated declarations accumulate in call order.
    pub fn declare_schema(
        &self,
        handler: impl Into<HandlerId>,
        fields: Vec<ExtractionField>,
    ) -> Result<HandlerId> {
        let handler_id = handler.into();
        if handler_id.as_str().is_empty() {
            return Err(RouterError::config("schema declared without a handler"));
        }
        let fields = fields
            .into_iter()
            .map(ExtractionField::validated)
            .collect::<Result<Vec<_>>>()?;

        let mut state = self.write();
        if state.frozen {
            return Err(RouterError::config(format!(
                "cannot declare schema for `{handler_id}`: the index has already been built"
            )));
        }

        let mut attached = 0usize;
        for route in state.routes.iter_mut().filter(|r| r.handler_id == handler_id) {
            route.fields.extend(fields.iter().cloned());
            attached += 1;
        }

        if attached > 0 {
            tracing::debug!(handler = %handler_id, routes = attached, fields = fields.len(), "schema attached");
        } else {
            tracing::debug!(handler = %handler_id, fields = fields.len(), "schema pending route registration");
            state.pending.entry(handler_id.clone()).or_default().extend(fields);
        }

        Ok(handler_id)
    }

    /// Freeze the registry and return its routes in index order.
    ///
    /// Freezing is one-way.  Calling this again on a frozen registry returns
    /// the same routes.  Fails without freezing if no route is registered.
    pub fn freeze(&self) -> Result<Vec<Route>> {
        let mut state = self.write();
        if state.routes.is_empty() {
            return Err(RouterError::config("no routes have been registered"));
        }
        if !state.frozen {
            state.frozen = true;
            for handler in state.pending.keys() {
                tracing::warn!(handler = %handler, "schema declared for a handler that was never registered");
            }
            tracing::debug!(routes = state.routes.len(), "registry frozen");
        }
        Ok(state.routes.clone())
    }

    /// Snapshot of the registered routes in index order.
    pub fn routes(&self) -> Vec<Route> {
        self.read().routes.clone()
    }

    /// Fields currently attached to the route for `phrase`, if any.
    pub fn fields_for(&self, phrase: &str) -> Option<Vec<ExtractionField>> {
        self.read()
            .routes
            .iter()
            .find(|r| r.phrase == phrase)
            .map(|r| r.fields.clone())
    }

    pub fn len(&self) -> usize {
        self.read().routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().routes.is_empty()
    }

    pub fn is_frozen(&self) -> bool {
        self.read().frozen
    }

    /// Number of handlers with a schema but no route yet.
    pub fn pending_count(&self) -> usize {
        self.read().pending.len()
    }

    // -- Private helpers ----------------------------------------------------

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use serde_json::Value;

    fn noop(name: &str) -> Arc<dyn Handler> {
        handler_fn(name, |_, _| async { Ok(Value::Null) })
    }

    fn card_field() -> ExtractionField {
        ExtractionField::new("card_number", DataType::String, TypedValue::Null)
            .with_description("the credit card number")
    }

    #[test]
    fn schema_before_and_after_registration_converge() {
        let before = TriggerRegistry::new();
        before.declare_schema("cancel", vec![card_field()]).unwrap();
        assert_eq!(before.pending_count(), 1);
        before.register("cancel my card", noop("cancel")).unwrap();
        assert_eq!(before.pending_count(), 0);

        let after = TriggerRegistry::new();
        after.register("cancel my card", noop("cancel")).unwrap();
        after.declare_schema("cancel", vec![card_field()]).unwrap();

        assert_eq!(
            before.fields_for("cancel my card"),
            after.fields_for("cancel my card")
        );
    }

    #[test]
    fn schema_declarations_accumulate() {
        let registry = TriggerRegistry::new();
        registry.register("transfer money", noop("transfer")).unwrap();
        registry
            .declare_schema("transfer", vec![ExtractionField::new("amount", DataType::Float, 0.0)])
            .unwrap();
        registry
            .declare_schema("transfer", vec![ExtractionField::new("to", DataType::String, "")])
            .unwrap();

        let fields = registry.fields_for("transfer money").unwrap();
        let keys: Vec<_> = fields.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, ["amount", "to"]);
    }

    #[test]
    fn second_route_for_same_handler_shares_schema() {
        let registry = TriggerRegistry::new();
        registry.declare_schema("cancel", vec![card_field()]).unwrap();
        registry.register("cancel my card", noop("cancel")).unwrap();
        registry.register("block my card", noop("cancel")).unwrap();

        assert_eq!(registry.fields_for("block my card").unwrap().len(), 1);
    }

    #[test]
    fn duplicate_phrase_last_registration_wins() {
        let registry = TriggerRegistry::new();
        registry.register("check balance", noop("first")).unwrap();
        registry.register("other", noop("other")).unwrap();
        registry.register("check balance", noop("second")).unwrap();

        let routes = registry.routes();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].phrase, "check balance");
        assert_eq!(routes[0].handler_id.as_str(), "second");
    }

    #[test]
    fn empty_phrase_is_rejected() {
        let registry = TriggerRegistry::new();
        let err = registry.register("   ", noop("h")).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn schema_without_handler_is_rejected() {
        let registry = TriggerRegistry::new();
        let err = registry.declare_schema("", vec![card_field()]).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn malformed_fields_are_rejected() {
        let registry = TriggerRegistry::new();

        let empty_key = ExtractionField::new(" ", DataType::Int, TypedValue::Null);
        assert!(registry.declare_schema("h", vec![empty_key]).is_err());

        let bad_default = ExtractionField::new("n", DataType::Int, "seven");
        assert!(registry.declare_schema("h", vec![bad_default]).is_err());

        assert_eq!(registry.pending_count(), 0);
    }

    #[test]
    fn integer_default_on_float_field_is_widened() {
        let registry = TriggerRegistry::new();
        registry
            .declare_schema("h", vec![ExtractionField::new("ratio", DataType::Float, 2_i64)])
            .unwrap();
        registry.register("set ratio", noop("h")).unwrap();

        let fields = registry.fields_for("set ratio").unwrap();
        assert_eq!(fields[0].default, TypedValue::Float(2.0));
    }

    #[test]
    fn freeze_is_one_way() {
        let registry = TriggerRegistry::new();
        assert!(registry.freeze().unwrap_err().is_configuration());
        assert!(!registry.is_frozen());

        registry.register("hello", noop("greet")).unwrap();
        let routes = registry.freeze().unwrap();
        assert_eq!(routes.len(), 1);
        assert!(registry.is_frozen());

        assert!(registry.register("bye", noop("bye")).unwrap_err().is_configuration());
        assert!(registry.declare_schema("greet", vec![card_field()]).is_err());

        // Re-freezing returns the same routes.
        assert_eq!(registry.freeze().unwrap().len(), 1);
    }
}
