//! Filter translation into MongoDB query documents.

use recordstore_core::{CompareOp, Error, FilterExpr, FilterValue, RecordModel, Result};
use serde_json::{Value, json};

use crate::TRACING_TARGET_SEARCH;
use crate::client::Document;

/// Translates filter expressions into MongoDB filter documents.
///
/// The same document serves `find` requests and the `filter` of a
/// `cosmosSearch` stage.
#[derive(Debug, Clone, Copy)]
pub struct MongoFilterTranslator<'a> {
    model: &'a RecordModel,
}

impl<'a> MongoFilterTranslator<'a> {
    /// Creates a translator for a record model.
    pub fn new(model: &'a RecordModel) -> Self {
        Self { model }
    }

    /// Translates an optional expression.
    pub fn translate_optional(&self, expr: Option<&FilterExpr>) -> Result<Option<Document>> {
        expr.map(|expr| self.translate(expr)).transpose()
    }

    /// Translates an expression into a filter document.
    pub fn translate(&self, expr: &FilterExpr) -> Result<Document> {
        let filter = self.document(expr)?;

        tracing::debug!(
            target: TRACING_TARGET_SEARCH,
            filter = %serde_json::Value::Object(filter.clone()),
            "Translated filter"
        );

        Ok(filter)
    }

    fn document(&self, expr: &FilterExpr) -> Result<Document> {
        match expr {
            FilterExpr::Comparison { field, op, value } => {
                let operator = match op {
                    CompareOp::Eq => "$eq",
                    CompareOp::Ne => "$ne",
                    CompareOp::Gt => "$gt",
                    CompareOp::Ge => "$gte",
                    CompareOp::Lt => "$lt",
                    CompareOp::Le => "$lte",
                };
                self.field_condition(field, operator, value.to_json())
            }
            FilterExpr::In { field, values } => {
                if values.is_empty() {
                    return Err(Error::configuration(format!(
                        "in-list filter on '{field}' must have at least one value"
                    )));
                }
                let values = values.iter().map(FilterValue::to_json).collect();
                self.field_condition(field, "$in", Value::Array(values))
            }
            // Equality on an array field matches any element.
            FilterExpr::Contains { field, value } => {
                self.field_condition(field, "$eq", value.to_json())
            }
            FilterExpr::And(items) => self.junction("$and", items),
            FilterExpr::Or(items) => self.junction("$or", items),
            FilterExpr::Not(inner) => {
                let inner = self.document(inner)?;
                Ok(single("$nor", json!([inner])))
            }
        }
    }

    fn field_condition(&self, field: &str, operator: &str, value: Value) -> Result<Document> {
        let storage_name = self.model.filterable_storage_name(field)?;
        Ok(single(storage_name, Value::Object(single(operator, value))))
    }

    fn junction(&self, operator: &str, items: &[FilterExpr]) -> Result<Document> {
        let items = items
            .iter()
            .map(|item| self.document(item).map(Value::Object))
            .collect::<Result<Vec<_>>>()?;
        Ok(single(operator, Value::Array(items)))
    }
}

fn single(key: &str, value: Value) -> Document {
    let mut document = Document::new();
    document.insert(key.to_owned(), value);
    document
}

#[cfg(test)]
mod tests {
    use recordstore_core::{
        DataProperty, KeyProperty, PropertyType, RecordDefinition, RecordModelBuilder,
    };

    use super::*;
    use crate::options::MongoCollectionOptions;

    fn model() -> RecordModel {
        let definition = RecordDefinition::new()
            .key(KeyProperty::new("key", PropertyType::String))
            .data(DataProperty::new("tenant", PropertyType::String).indexed())
            .data(DataProperty::new("score", PropertyType::Int64).indexed())
            .data(DataProperty::new("tags", PropertyType::StringArray).indexed());
        RecordModelBuilder::new(MongoCollectionOptions::default().model_building_options())
            .build_dynamic(&definition, None)
            .unwrap()
    }

    fn translate(expr: &FilterExpr) -> Value {
        let model = model();
        Value::Object(MongoFilterTranslator::new(&model).translate(expr).unwrap())
    }

    #[test]
    fn translates_comparisons_and_junctions() {
        let expr = FilterExpr::eq("tenant", "acme").and(FilterExpr::gt("score", 10));
        assert_eq!(
            translate(&expr),
            json!({ "$and": [
                { "tenant": { "$eq": "acme" } },
                { "score": { "$gt": 10 } },
            ]})
        );
        assert_eq!(translate(&expr), translate(&expr));
    }

    #[test]
    fn key_resolves_to_underscore_id() {
        assert_eq!(
            translate(&FilterExpr::in_list("key", ["a", "b"])),
            json!({ "_id": { "$in": ["a", "b"] } })
        );
    }

    #[test]
    fn negation_uses_nor() {
        let expr = FilterExpr::contains("tags", "pool")
            .or(FilterExpr::le("score", 3))
            .negate();
        assert_eq!(
            translate(&expr),
            json!({ "$nor": [{ "$or": [
                { "tags": { "$eq": "pool" } },
                { "score": { "$lte": 3 } },
            ]}]})
        );
    }

    #[test]
    fn rejects_unknown_fields_and_empty_lists() {
        let model = model();
        let translator = MongoFilterTranslator::new(&model);
        for expr in [
            FilterExpr::eq("missing", 1),
            FilterExpr::in_list::<&str>("tenant", []),
        ] {
            assert!(matches!(
                translator.translate(&expr),
                Err(Error::Configuration(_))
            ));
        }
    }
}
