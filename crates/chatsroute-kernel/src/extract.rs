//! Parameter extraction for matched routes.
//!
//! For every field of a route's schema, the entity extractor proposes a raw
//! value, the field's default stands in when it proposes none, and the
//! result is coerced to the field's declared type.  Coercion never fails,
//! so extraction only errors when the extractor itself does.

use std::sync::Arc;

use crate::coerce::coerce;
use crate::error::Result;
use crate::handler::Params;
use crate::registry::Route;
use crate::traits::EntityExtractor;

/// Resolves a route's extraction schema against an utterance.
#[derive(Clone)]
pub struct ParameterExtractor {
    extractor: Arc<dyn EntityExtractor>,
}

impl ParameterExtractor {
    pub fn new(extractor: Arc<dyn EntityExtractor>) -> Self {
        Self { extractor }
    }

    /// Build the argument map for `route`.
    ///
    /// Fields are resolved in declaration order; a later field with the
    /// same key overwrites an earlier one.
    pub async fn extract(&self, route: &Route, utterance: &str) -> Result<Params> {
        let mut params = Params::new();

        for field in &route.fields {
            let raw = self
                .extractor
                .extract(utterance, &field.key, field.description.as_deref())
                .await?;

            let value = match raw {
                Some(raw) => {
                    let value = coerce(&raw, field.data_type, &field.default);
                    tracing::trace!(key = %field.key, raw = %raw, value = ?value, "parameter extracted");
                    value
                }
                None => {
                    tracing::debug!(key = %field.key, "no entity found, using default");
                    coerce(&field.default.to_json(), field.data_type, &field.default)
                }
            };

            params.insert(field.key.clone(), value);
        }

        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coerce::{DataType, TypedValue};
    use crate::handler::handler_fn;
    use crate::registry::ExtractionField;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    /// Returns `value` for `key` and nothing for anything else.
    struct OneKey {
        key: &'static str,
        value: Value,
    }

    #[async_trait]
    impl EntityExtractor for OneKey {
        async fn extract(&self, _utterance: &str, key: &str, _hint: Option<&str>) -> Result<Option<Value>> {
            Ok((key == self.key).then(|| self.value.clone()))
        }
    }

    fn route(fields: Vec<ExtractionField>) -> Route {
        Route {
            phrase: "Want to cancel a credit card.".into(),
            handler_id: "cancel".into(),
            handler: handler_fn("cancel", |_, _| async { Ok(Value::Null) }),
            fields,
        }
    }

    #[tokio::test]
    async fn found_values_are_coerced() {
        let extractor = ParameterExtractor::new(Arc::new(OneKey {
            key: "card_number",
            value: json!("card 4111111111111111"),
        }));
        let route = route(vec![ExtractionField::new("card_number", DataType::Int, TypedValue::Null)]);

        let params = extractor.extract(&route, "cancel card 4111111111111111").await.unwrap();
        assert_eq!(params["card_number"], TypedValue::Int(4_111_111_111_111_111));
    }

    #[tokio::test]
    async fn missing_values_use_default() {
        let extractor = ParameterExtractor::new(Arc::new(OneKey {
            key: "other",
            value: json!("x"),
        }));
        let route = route(vec![
            ExtractionField::new("card_number", DataType::String, TypedValue::Null),
            ExtractionField::new("retries", DataType::Int, 3_i64),
            ExtractionField::new("delta", DataType::Float, -1.5),
        ]);

        let params = extractor.extract(&route, "CANCEL").await.unwrap();
        assert_eq!(params["card_number"], TypedValue::Str(String::new()));
        assert_eq!(params["retries"], TypedValue::Int(3));
        assert_eq!(params["delta"], TypedValue::Float(-1.5));
    }

    #[tokio::test]
    async fn later_duplicate_key_wins() {
        let extractor = ParameterExtractor::new(Arc::new(OneKey {
            key: "flag",
            value: json!("yes"),
        }));
        let route = route(vec![
            ExtractionField::new("flag", DataType::String, TypedValue::Null),
            ExtractionField::new("flag", DataType::Bool, false),
        ]);

        let params = extractor.extract(&route, "flag it").await.unwrap();
        assert_eq!(params.len(), 1);
        assert_eq!(params["flag"], TypedValue::Bool(true));
    }
}
