//! Filter translation into Qdrant conditions.

use qdrant_client::qdrant::condition::ConditionOneOf;
use qdrant_client::qdrant::{Condition, Filter, PointId, Range};
use recordstore_core::model::PropertyRef;
use recordstore_core::{CompareOp, Error, FilterExpr, FilterValue, RecordModel, Result};

use crate::TRACING_TARGET_SEARCH;

/// Translates filter expressions into Qdrant filters.
///
/// Field references resolve to payload keys through the record model; the
/// key property resolves to point id conditions.
#[derive(Debug, Clone, Copy)]
pub struct QdrantFilterTranslator<'a> {
    model: &'a RecordModel,
}

impl<'a> QdrantFilterTranslator<'a> {
    /// Creates a translator for a record model.
    pub fn new(model: &'a RecordModel) -> Self {
        Self { model }
    }

    /// Translates an optional expression.
    pub fn translate_optional(&self, expr: Option<&FilterExpr>) -> Result<Option<Filter>> {
        expr.map(|expr| self.translate(expr)).transpose()
    }

    /// Translates an expression into a filter.
    pub fn translate(&self, expr: &FilterExpr) -> Result<Filter> {
        let filter = match expr {
            FilterExpr::And(items) => Filter::must(self.conditions(items)?),
            FilterExpr::Or(items) => Filter::should(self.conditions(items)?),
            FilterExpr::Not(inner) => Filter::must_not([self.condition(inner)?]),
            other => Filter::must([self.condition(other)?]),
        };

        tracing::debug!(
            target: TRACING_TARGET_SEARCH,
            filter = ?filter,
            "Translated filter"
        );

        Ok(filter)
    }

    fn conditions(&self, items: &[FilterExpr]) -> Result<Vec<Condition>> {
        items.iter().map(|item| self.condition(item)).collect()
    }

    fn condition(&self, expr: &FilterExpr) -> Result<Condition> {
        match expr {
            FilterExpr::Comparison { field, op, value } => self.comparison(field, *op, value),
            FilterExpr::In { field, values } => self.in_list(field, values),
            FilterExpr::Contains { field, value } => {
                let key = self.payload_key(field)?;
                equality(key, value)
            }
            FilterExpr::And(items) => Ok(nested(Filter::must(self.conditions(items)?))),
            FilterExpr::Or(items) => Ok(nested(Filter::should(self.conditions(items)?))),
            FilterExpr::Not(inner) => Ok(nested(Filter::must_not([self.condition(inner)?]))),
        }
    }

    fn comparison(&self, field: &str, op: CompareOp, value: &FilterValue) -> Result<Condition> {
        if self.is_key(field)? {
            let id = point_id(field, value)?;
            return match op {
                CompareOp::Eq => Ok(Condition::has_id([id])),
                CompareOp::Ne => Ok(nested(Filter::must_not([Condition::has_id([id])]))),
                _ => Err(Error::configuration(format!(
                    "key property '{field}' only supports equality filters"
                ))),
            };
        }

        let key = self.payload_key(field)?;
        match op {
            CompareOp::Eq => equality(key, value),
            CompareOp::Ne => Ok(nested(Filter::must_not([equality(key, value)?]))),
            CompareOp::Gt | CompareOp::Ge | CompareOp::Lt | CompareOp::Le => {
                let bound = numeric(field, value)?;
                let range = match op {
                    CompareOp::Gt => Range {
                        gt: Some(bound),
                        ..Default::default()
                    },
                    CompareOp::Ge => Range {
                        gte: Some(bound),
                        ..Default::default()
                    },
                    CompareOp::Lt => Range {
                        lt: Some(bound),
                        ..Default::default()
                    },
                    _ => Range {
                        lte: Some(bound),
                        ..Default::default()
                    },
                };
                Ok(Condition::range(key, range))
            }
        }
    }

    fn in_list(&self, field: &str, values: &[FilterValue]) -> Result<Condition> {
        if values.is_empty() {
            return Err(Error::configuration(format!(
                "in-list filter on '{field}' must have at least one value"
            )));
        }

        if self.is_key(field)? {
            let ids = values
                .iter()
                .map(|v| point_id(field, v))
                .collect::<Result<Vec<_>>>()?;
            return Ok(Condition::has_id(ids));
        }

        let key = self.payload_key(field)?;

        let strings: Option<Vec<String>> = values
            .iter()
            .map(|v| match v {
                FilterValue::String(s) => Some(s.clone()),
                _ => None,
            })
            .collect();
        if let Some(strings) = strings {
            return Ok(Condition::matches(key, strings));
        }

        let integers: Option<Vec<i64>> = values
            .iter()
            .map(|v| match v {
                FilterValue::Int(i) => Some(*i),
                _ => None,
            })
            .collect();
        if let Some(integers) = integers {
            return Ok(Condition::matches(key, integers));
        }

        let alternatives = values
            .iter()
            .map(|v| equality(key, v))
            .collect::<Result<Vec<_>>>()?;
        Ok(nested(Filter::should(alternatives)))
    }

    fn is_key(&self, field: &str) -> Result<bool> {
        match self.model.property(field) {
            Some(PropertyRef::Key(_)) => Ok(true),
            _ => self.model.filterable_storage_name(field).map(|_| false),
        }
    }

    fn payload_key(&self, field: &str) -> Result<&'a str> {
        if let Some(PropertyRef::Key(_)) = self.model.property(field) {
            return Err(Error::configuration(format!(
                "key property '{field}' is not part of the payload"
            )));
        }
        self.model.filterable_storage_name(field)
    }
}

fn nested(filter: Filter) -> Condition {
    Condition {
        condition_one_of: Some(ConditionOneOf::Filter(filter)),
    }
}

/// Null equality holds for explicit nulls and for absent fields alike.
fn equality(key: &str, value: &FilterValue) -> Result<Condition> {
    Ok(match value {
        FilterValue::Null => nested(Filter::should([
            Condition::is_null(key),
            Condition::is_empty(key),
        ])),
        FilterValue::Bool(b) => Condition::matches(key, *b),
        FilterValue::Int(i) => Condition::matches(key, *i),
        FilterValue::String(s) => Condition::matches(key, s.clone()),
        FilterValue::Float(f) => Condition::range(
            key,
            Range {
                gte: Some(*f),
                lte: Some(*f),
                ..Default::default()
            },
        ),
    })
}

fn numeric(field: &str, value: &FilterValue) -> Result<f64> {
    match value {
        FilterValue::Int(i) => Ok(*i as f64),
        FilterValue::Float(f) => Ok(*f),
        other => Err(Error::configuration(format!(
            "range filter on '{field}' requires a numeric value, found {other:?}"
        ))),
    }
}

fn point_id(field: &str, value: &FilterValue) -> Result<PointId> {
    match value {
        FilterValue::Int(i) => u64::try_from(*i).map(PointId::from).map_err(|_| {
            Error::configuration(format!("key filter on '{field}' needs a non-negative id"))
        }),
        FilterValue::String(s) => Ok(PointId::from(s.clone())),
        other => Err(Error::configuration(format!(
            "key filter on '{field}' requires an integer or UUID, found {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use qdrant_client::qdrant::r#match::MatchValue;
    use qdrant_client::qdrant::{FieldCondition, Match};
    use recordstore_core::{
        DataProperty, KeyProperty, PropertyType, RecordDefinition, RecordModelBuilder,
        VectorProperty,
    };

    use super::*;
    use crate::options::QdrantCollectionOptions;

    fn model() -> RecordModel {
        let definition = RecordDefinition::new()
            .key(KeyProperty::new("id", PropertyType::UInt64))
            .data(DataProperty::new("tenant", PropertyType::String).indexed())
            .data(DataProperty::new("rating", PropertyType::Float64))
            .data(DataProperty::new("tags", PropertyType::StringArray))
            .vector(VectorProperty::float32("embedding", 3));

        RecordModelBuilder::new(QdrantCollectionOptions::default().model_building_options())
            .build_dynamic(&definition, None)
            .unwrap()
    }

    fn field(condition: &Condition) -> &FieldCondition {
        match &condition.condition_one_of {
            Some(ConditionOneOf::Field(field)) => field,
            other => panic!("expected a field condition, found {other:?}"),
        }
    }

    #[test]
    fn conjunction_becomes_must() {
        let model = model();
        let expr = FilterExpr::eq("tenant", "acme").and(FilterExpr::ge("rating", 4));
        let filter = QdrantFilterTranslator::new(&model).translate(&expr).unwrap();

        assert_eq!(filter.must.len(), 2);
        let tenant = field(&filter.must[0]);
        assert_eq!(tenant.key, "tenant");
        assert_eq!(
            tenant.r#match,
            Some(Match {
                match_value: Some(MatchValue::Keyword("acme".into()))
            })
        );

        let rating = field(&filter.must[1]);
        assert_eq!(rating.range.as_ref().and_then(|r| r.gte), Some(4.0));
    }

    #[test]
    fn disjunction_and_negation_nest() {
        let model = model();
        let expr = FilterExpr::eq("tenant", "acme").or(!FilterExpr::contains("tags", "spa"));
        let filter = QdrantFilterTranslator::new(&model).translate(&expr).unwrap();

        assert_eq!(filter.should.len(), 2);
        let Some(ConditionOneOf::Filter(negated)) = &filter.should[1].condition_one_of else {
            panic!("expected a nested filter");
        };
        assert_eq!(negated.must_not.len(), 1);
    }

    #[test]
    fn key_filters_use_point_ids() {
        let model = model();
        let expr = FilterExpr::in_list("id", [1, 2]);
        let filter = QdrantFilterTranslator::new(&model).translate(&expr).unwrap();

        let Some(ConditionOneOf::HasId(has_id)) = &filter.must[0].condition_one_of else {
            panic!("expected a has-id condition");
        };
        assert_eq!(has_id.has_id, vec![PointId::from(1u64), PointId::from(2u64)]);
    }

    #[test]
    fn string_lists_match_keywords() {
        let model = model();
        let expr = FilterExpr::in_list("tenant", ["acme", "globex"]);
        let filter = QdrantFilterTranslator::new(&model).translate(&expr).unwrap();

        assert_eq!(
            field(&filter.must[0]).r#match.as_ref().and_then(|m| m.match_value.clone()),
            Some(MatchValue::Keywords(qdrant_client::qdrant::RepeatedStrings {
                strings: vec!["acme".into(), "globex".into()]
            }))
        );
    }

    #[test]
    fn rejects_unknown_and_vector_fields() {
        let model = model();
        let translator = QdrantFilterTranslator::new(&model);

        let unknown = translator.translate(&FilterExpr::eq("missing", 1));
        assert!(matches!(unknown, Err(Error::Configuration(_))));

        let vector = translator.translate(&FilterExpr::eq("embedding", 1));
        assert!(matches!(vector, Err(Error::Configuration(_))));

        let range = translator.translate(&FilterExpr::gt("tenant", "a"));
        assert!(matches!(range, Err(Error::Configuration(_))));
    }

    #[test]
    fn null_equality_covers_missing_fields() {
        let model = model();
        let translator = QdrantFilterTranslator::new(&model);

        let eq = translator
            .translate(&FilterExpr::eq("tenant", FilterValue::Null))
            .unwrap();
        let Some(ConditionOneOf::Filter(either)) = &eq.must[0].condition_one_of else {
            panic!("expected a nested filter");
        };
        assert!(matches!(
            either.should.as_slice(),
            [
                Condition { condition_one_of: Some(ConditionOneOf::IsNull(null)) },
                Condition { condition_one_of: Some(ConditionOneOf::IsEmpty(empty)) },
            ] if null.key == "tenant" && empty.key == "tenant"
        ));

        let ne = translator
            .translate(&FilterExpr::ne("tenant", FilterValue::Null))
            .unwrap();
        let Some(ConditionOneOf::Filter(negated)) = &ne.must[0].condition_one_of else {
            panic!("expected a nested filter");
        };
        assert_eq!(negated.must_not.len(), 1);
        assert!(matches!(
            negated.must_not[0].condition_one_of,
            Some(ConditionOneOf::Filter(_))
        ));
    }
}
