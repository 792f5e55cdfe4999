//! Filter translation into Cosmos SQL predicates.

use recordstore_core::{CompareOp, Error, FilterExpr, FilterValue, RecordModel, Result};
use serde_json::Value;

use crate::TRACING_TARGET_QUERY;
use crate::client::QueryParameter;

/// Alias of the item in generated queries.
pub(crate) const ITEM_ALIAS: &str = "x";

/// Prefix of filter parameter names.
const PARAMETER_PREFIX: &str = "@cv";

/// Property reference in bracket notation, safe for any storage name.
pub(crate) fn field_ref(storage_name: &str) -> String {
    format!("{ITEM_ALIAS}[{}]", Value::from(storage_name))
}

/// Translates filter expressions into a `WHERE` predicate.
///
/// Literals never appear in the text; each becomes a parameter named
/// `@cv0`, `@cv1`, ... in the order the expression is walked, so equal
/// expressions always produce equal queries.
#[derive(Debug, Clone)]
pub struct CosmosFilterTranslator<'a> {
    model: &'a RecordModel,
    parameters: Vec<QueryParameter>,
}

impl<'a> CosmosFilterTranslator<'a> {
    /// Creates a translator for a record model.
    pub fn new(model: &'a RecordModel) -> Self {
        Self {
            model,
            parameters: Vec::new(),
        }
    }

    /// Translates an expression into predicate text.
    pub fn translate(&mut self, expr: &FilterExpr) -> Result<String> {
        let predicate = self.predicate(expr)?;

        tracing::debug!(
            target: TRACING_TARGET_QUERY,
            predicate = %predicate,
            parameters = self.parameters.len(),
            "Translated filter"
        );

        Ok(predicate)
    }

    /// Returns the parameters bound so far.
    pub fn parameters(&self) -> &[QueryParameter] {
        &self.parameters
    }

    /// Consumes the translator, returning its parameters.
    pub fn into_parameters(self) -> Vec<QueryParameter> {
        self.parameters
    }

    fn predicate(&mut self, expr: &FilterExpr) -> Result<String> {
        match expr {
            FilterExpr::Comparison { field, op, value } => {
                let field = self.field(field)?;
                Ok(self.comparison(&field, *op, value))
            }
            FilterExpr::In { field, values } => {
                if values.is_empty() {
                    return Err(Error::configuration(format!(
                        "in-list filter on '{field}' must have at least one value"
                    )));
                }
                let field = self.field(field)?;
                let list = Value::Array(values.iter().map(FilterValue::to_json).collect());
                let parameter = self.bind(list);
                Ok(format!("ARRAY_CONTAINS({parameter}, {field})"))
            }
            FilterExpr::Contains { field, value } => {
                let field = self.field(field)?;
                let parameter = self.bind(value.to_json());
                Ok(format!("ARRAY_CONTAINS({field}, {parameter})"))
            }
            FilterExpr::And(items) => self.junction(items, " AND ", "true"),
            FilterExpr::Or(items) => self.junction(items, " OR ", "false"),
            FilterExpr::Not(inner) => Ok(format!("(NOT {})", self.predicate(inner)?)),
        }
    }

    fn comparison(&mut self, field: &str, op: CompareOp, value: &FilterValue) -> String {
        if value.is_null() {
            let missing = format!("(NOT IS_DEFINED({field}) OR IS_NULL({field}))");
            return match op {
                CompareOp::Ne => format!("(NOT {missing})"),
                _ => missing,
            };
        }

        let operator = match op {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
        };
        let parameter = self.bind(value.to_json());
        format!("{field} {operator} {parameter}")
    }

    fn junction(&mut self, items: &[FilterExpr], separator: &str, empty: &str) -> Result<String> {
        if items.is_empty() {
            return Ok(empty.to_owned());
        }

        let parts = items
            .iter()
            .map(|item| self.predicate(item))
            .collect::<Result<Vec<_>>>()?;
        Ok(format!("({})", parts.join(separator)))
    }

    fn field(&self, name: &str) -> Result<String> {
        self.model.filterable_storage_name(name).map(field_ref)
    }

    fn bind(&mut self, value: Value) -> String {
        let name = format!("{PARAMETER_PREFIX}{}", self.parameters.len());
        self.parameters.push(QueryParameter {
            name: name.clone(),
            value,
        });
        name
    }
}

#[cfg(test)]
mod tests {
    use recordstore_core::{
        DataProperty, KeyProperty, PropertyType, RecordDefinition, RecordModelBuilder,
        VectorProperty,
    };
    use serde_json::json;

    use super::*;
    use crate::options::CosmosCollectionOptions;

    fn model() -> RecordModel {
        let definition = RecordDefinition::new()
            .key(KeyProperty::new("hotel_id", PropertyType::String))
            .data(DataProperty::new("tenant", PropertyType::String).indexed())
            .data(DataProperty::new("score", PropertyType::Int64).indexed())
            .data(DataProperty::new("tags", PropertyType::StringArray).indexed())
            .vector(VectorProperty::float32("embedding", 2));
        RecordModelBuilder::new(CosmosCollectionOptions::default().model_building_options())
            .build_dynamic(&definition, None)
            .unwrap()
    }

    fn translate(expr: &FilterExpr) -> (String, Vec<QueryParameter>) {
        let model = model();
        let mut translator = CosmosFilterTranslator::new(&model);
        let text = translator.translate(expr).unwrap();
        (text, translator.into_parameters())
    }

    #[test]
    fn translation_is_deterministic() {
        let expr = FilterExpr::eq("tenant", "acme").and(FilterExpr::gt("score", 10));

        let first = translate(&expr);
        let second = translate(&expr);

        assert_eq!(first, second);
        assert_eq!(first.0, r#"(x["tenant"] = @cv0 AND x["score"] > @cv1)"#);
        assert_eq!(first.1[0].value, json!("acme"));
        assert_eq!(first.1[1].value, json!(10));
    }

    #[test]
    fn key_resolves_to_id() {
        let (text, _) = translate(&FilterExpr::eq("hotel_id", "h1"));
        assert_eq!(text, r#"x["id"] = @cv0"#);
    }

    #[test]
    fn null_comparisons_use_definedness() {
        let (eq, params) = translate(&FilterExpr::eq("tenant", FilterValue::Null));
        assert_eq!(eq, r#"(NOT IS_DEFINED(x["tenant"]) OR IS_NULL(x["tenant"]))"#);
        assert!(params.is_empty());

        let (ne, _) = translate(&FilterExpr::ne("tenant", FilterValue::Null));
        assert!(ne.starts_with("(NOT (NOT IS_DEFINED"));
    }

    #[test]
    fn in_and_contains_use_array_functions() {
        let (text, params) = translate(
            &FilterExpr::in_list("tenant", ["acme", "globex"])
                .or(FilterExpr::contains("tags", "pool"))
                .negate(),
        );

        assert_eq!(
            text,
            r#"(NOT (ARRAY_CONTAINS(@cv0, x["tenant"]) OR ARRAY_CONTAINS(x["tags"], @cv1)))"#
        );
        assert_eq!(params[0].value, json!(["acme", "globex"]));
    }

    #[test]
    fn rejects_unknown_vector_and_empty_in() {
        let model = model();
        let mut translator = CosmosFilterTranslator::new(&model);

        for expr in [
            FilterExpr::eq("missing", 1),
            FilterExpr::eq("embedding", 1),
            FilterExpr::in_list::<i64>("score", []),
        ] {
            let err = translator.translate(&expr).unwrap_err();
            assert!(matches!(err, Error::Configuration(_)));
        }
    }
}
