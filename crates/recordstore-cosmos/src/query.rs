//! Cosmos SQL query construction.
//!
//! Every query selects explicit fields from the item alias `x`, so vectors are
//! only transferred when asked for and the score column can be told apart
//! from record fields.

use recordstore_core::{CompositeKey, FilterExpr, OrderBy, RecordModel, Result};
use serde_json::Value;

use crate::TRACING_TARGET_QUERY;
use crate::client::QueryDefinition;
use crate::filter::{CosmosFilterTranslator, ITEM_ALIAS, field_ref};

/// Preferred alias of the similarity score column.
const SCORE_ALIAS: &str = "SimilarityScore";

/// Inputs of a vector or hybrid search query.
#[derive(Debug, Clone)]
pub struct VectorQuery<'q> {
    /// Storage name of the searched vector field.
    pub vector_field: &'q str,
    /// Query vector as a JSON array.
    pub vector: Value,
    /// Optional structured filter.
    pub filter: Option<&'q FilterExpr>,
    /// Number of results.
    pub top: usize,
    /// Number of leading results to skip.
    pub skip: usize,
    /// Whether vector fields are selected.
    pub include_vectors: bool,
}

/// Builds parameterized SQL queries for one record model.
#[derive(Debug, Clone)]
pub struct CosmosQueryBuilder<'a> {
    model: &'a RecordModel,
    score_alias: String,
}

impl<'a> CosmosQueryBuilder<'a> {
    /// Creates a builder and allocates the score alias for the model.
    pub fn new(model: &'a RecordModel) -> Self {
        Self {
            model,
            score_alias: model.unique_alias(SCORE_ALIAS),
        }
    }

    /// Alias of the score column in search results.
    pub fn score_alias(&self) -> &str {
        &self.score_alias
    }

    /// Builds a nearest-neighbour query ordered by vector distance.
    pub fn vector_search(&self, query: VectorQuery<'_>) -> Result<QueryDefinition> {
        let distance = format!(
            "VectorDistance({}, @vector)",
            field_ref(query.vector_field)
        );
        self.ranked(query, distance, Vec::new())
    }

    /// Builds a hybrid query fusing vector distance and full-text score.
    pub fn hybrid_search(
        &self,
        query: VectorQuery<'_>,
        text_field: &str,
        keywords: &[String],
    ) -> Result<QueryDefinition> {
        let mut bindings = Vec::with_capacity(keywords.len());
        let mut names = Vec::with_capacity(keywords.len());
        for (i, keyword) in keywords.iter().enumerate() {
            let name = format!("@keyword{i}");
            names.push(name.clone());
            bindings.push((name, Value::from(keyword.as_str())));
        }

        let rank = format!(
            "RANK RRF(VectorDistance({vector}, @vector), FullTextScore({text}, {keywords}))",
            vector = field_ref(query.vector_field),
            text = field_ref(text_field),
            keywords = names.join(", "),
        );
        self.ranked(query, rank, bindings)
    }

    /// Builds a filtered enumeration with optional ordering.
    pub fn filtered(
        &self,
        filter: &FilterExpr,
        order_by: &[OrderBy],
        top: usize,
        skip: usize,
        include_vectors: bool,
    ) -> Result<QueryDefinition> {
        let mut translator = CosmosFilterTranslator::new(self.model);
        let predicate = translator.translate(filter)?;

        let mut ordering = Vec::with_capacity(order_by.len());
        for order in order_by {
            let field = field_ref(self.model.filterable_storage_name(&order.property)?);
            let direction = if order.ascending { "ASC" } else { "DESC" };
            ordering.push(format!("{field} {direction}"));
        }

        let (head, tail) = window(top, skip);
        let mut text = format!(
            "SELECT {head}{} FROM {ITEM_ALIAS} WHERE {predicate}",
            self.projection(include_vectors)
        );
        if !ordering.is_empty() {
            text.push_str(" ORDER BY ");
            text.push_str(&ordering.join(", "));
        }
        text.push_str(tail);

        let mut definition = QueryDefinition::new(text);
        definition.parameters = translator.into_parameters();
        Ok(self.finish(bind_window(definition, top, skip)))
    }

    /// Builds one query reading every item addressed by `keys`.
    ///
    /// Each key becomes an `id` and partition equality pair; pairs are joined
    /// with `OR`. Callers pass deduplicated, non-empty keys.
    pub fn get_by_keys(&self, keys: &[CompositeKey], include_vectors: bool) -> QueryDefinition {
        let id = field_ref(&self.model.key.storage_name);
        let partition = self.model.partition_key_storage_name().map(field_ref);

        let mut definition = QueryDefinition::default();
        let mut clauses = Vec::with_capacity(keys.len());
        for (i, key) in keys.iter().enumerate() {
            let record = format!("@rk{i}");
            definition = definition.with_parameter(&record, key.record_key.as_str());

            match &partition {
                Some(partition) => {
                    let token = format!("@pk{i}");
                    definition = definition.with_parameter(&token, key.partition_key.as_str());
                    clauses.push(format!("({id} = {record} AND {partition} = {token})"));
                }
                None => clauses.push(format!("{id} = {record}")),
            }
        }

        definition.query = format!(
            "SELECT {} FROM {ITEM_ALIAS} WHERE {}",
            self.projection(include_vectors),
            clauses.join(" OR ")
        );
        self.finish(definition)
    }

    fn ranked(
        &self,
        query: VectorQuery<'_>,
        order: String,
        bindings: Vec<(String, Value)>,
    ) -> Result<QueryDefinition> {
        let mut definition = QueryDefinition::default().with_parameter("@vector", query.vector);

        let predicate = match query.filter {
            Some(filter) => {
                let mut translator = CosmosFilterTranslator::new(self.model);
                let predicate = translator.translate(filter)?;
                definition.parameters.extend(translator.into_parameters());
                Some(predicate)
            }
            None => None,
        };

        for (name, value) in bindings {
            definition = definition.with_parameter(name, value);
        }

        let (head, tail) = window(query.top, query.skip);
        let mut text = format!(
            "SELECT {head}{}, VectorDistance({}, @vector) AS {} FROM {ITEM_ALIAS}",
            self.projection(query.include_vectors),
            field_ref(query.vector_field),
            self.score_alias,
        );
        if let Some(predicate) = predicate {
            text.push_str(" WHERE ");
            text.push_str(&predicate);
        }
        text.push_str(" ORDER BY ");
        text.push_str(&order);
        text.push_str(tail);

        definition.query = text;
        Ok(self.finish(bind_window(definition, query.top, query.skip)))
    }

    fn projection(&self, include_vectors: bool) -> String {
        let data = self.model.data.iter().map(|p| p.storage_name.as_str());
        let vectors = self
            .model
            .vectors
            .iter()
            .filter(|_| include_vectors)
            .map(|p| p.storage_name.as_str());

        std::iter::once(self.model.key.storage_name.as_str())
            .chain(data)
            .chain(vectors)
            .map(field_ref)
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn finish(&self, definition: QueryDefinition) -> QueryDefinition {
        tracing::debug!(
            target: TRACING_TARGET_QUERY,
            query = %definition.query,
            parameters = definition.parameters.len(),
            "Built query"
        );
        definition
    }
}

/// `TOP` prefix or `OFFSET ... LIMIT` suffix for a result window.
fn window(top: usize, skip: usize) -> (&'static str, &'static str) {
    if skip == 0 {
        ("TOP @top ", "")
    } else {
        ("", " OFFSET @offset LIMIT @limit")
    }
}

fn bind_window(definition: QueryDefinition, top: usize, skip: usize) -> QueryDefinition {
    if skip == 0 {
        definition.with_parameter("@top", top)
    } else {
        definition
            .with_parameter("@offset", skip)
            .with_parameter("@limit", top)
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

    fn model(partition: Option<&str>) -> RecordModel {
        let definition = RecordDefinition::new()
            .key(KeyProperty::new("hotel_id", PropertyType::String))
            .data(DataProperty::new("tenant", PropertyType::String).indexed())
            .data(DataProperty::new("description", PropertyType::String).full_text_indexed())
            .vector(VectorProperty::float32("embedding", 2));
        let mut builder =
            RecordModelBuilder::new(CosmosCollectionOptions::default().model_building_options());
        if let Some(partition) = partition {
            builder = builder.with_partition_key(partition);
        }
        builder.build_dynamic(&definition, None).unwrap()
    }

    fn query(filter: Option<&FilterExpr>, skip: usize) -> VectorQuery<'_> {
        VectorQuery {
            vector_field: "embedding",
            vector: json!([0.1, 0.2]),
            filter,
            top: 3,
            skip,
            include_vectors: false,
        }
    }

    #[test]
    fn vector_search_excludes_vectors_and_aliases_score() {
        let model = model(None);
        let filter = FilterExpr::eq("tenant", "acme");
        let definition = CosmosQueryBuilder::new(&model)
            .vector_search(query(Some(&filter), 0))
            .unwrap();

        assert_eq!(
            definition.query,
            r#"SELECT TOP @top x["id"], x["tenant"], x["description"], VectorDistance(x["embedding"], @vector) AS SimilarityScore FROM x WHERE x["tenant"] = @cv0 ORDER BY VectorDistance(x["embedding"], @vector)"#
        );
        assert_eq!(definition.parameter("@top"), Some(&json!(3)));
        assert_eq!(definition.parameter("@cv0"), Some(&json!("acme")));
    }

    #[test]
    fn skip_switches_to_offset_limit() {
        let model = model(None);
        let definition = CosmosQueryBuilder::new(&model)
            .vector_search(query(None, 2))
            .unwrap();

        assert!(definition.query.starts_with(r#"SELECT x["id"]"#));
        assert!(definition.query.ends_with(" OFFSET @offset LIMIT @limit"));
        assert_eq!(definition.parameter("@offset"), Some(&json!(2)));
        assert_eq!(definition.parameter("@limit"), Some(&json!(3)));
    }

    #[test]
    fn score_alias_avoids_record_fields() {
        let definition = RecordDefinition::new()
            .key(KeyProperty::new("id", PropertyType::String))
            .data(DataProperty::new("SimilarityScore", PropertyType::Float64))
            .vector(VectorProperty::float32("embedding", 2));
        let model =
            RecordModelBuilder::new(CosmosCollectionOptions::default().model_building_options())
                .build_dynamic(&definition, None)
                .unwrap();

        assert_eq!(
            CosmosQueryBuilder::new(&model).score_alias(),
            "SimilarityScore_1"
        );
    }

    #[test]
    fn hybrid_ranks_with_rrf() {
        let model = model(None);
        let keywords = vec!["pool".to_owned(), "view".to_owned()];
        let definition = CosmosQueryBuilder::new(&model)
            .hybrid_search(query(None, 0), "description", &keywords)
            .unwrap();

        assert!(definition.query.contains(
            r#"ORDER BY RANK RRF(VectorDistance(x["embedding"], @vector), FullTextScore(x["description"], @keyword0, @keyword1))"#
        ));
        assert_eq!(definition.parameter("@keyword1"), Some(&json!("view")));
    }

    #[test]
    fn batched_get_is_or_of_ands() {
        let model = model(Some("tenant"));
        let keys = [CompositeKey::new("h1", "acme"), CompositeKey::new("h2", "globex")];
        let definition = CosmosQueryBuilder::new(&model).get_by_keys(&keys, true);

        assert_eq!(
            definition.query,
            r#"SELECT x["id"], x["tenant"], x["description"], x["embedding"] FROM x WHERE (x["id"] = @rk0 AND x["tenant"] = @pk0) OR (x["id"] = @rk1 AND x["tenant"] = @pk1)"#
        );
        assert_eq!(definition.parameter("@pk1"), Some(&json!("globex")));
    }

    #[test]
    fn batched_get_without_partition_matches_ids() {
        let model = model(None);
        let keys = [CompositeKey::single("h1")];
        let definition = CosmosQueryBuilder::new(&model).get_by_keys(&keys, false);

        assert!(definition.query.ends_with(r#"WHERE x["id"] = @rk0"#));
        assert_eq!(definition.parameters.len(), 1);
    }

    #[test]
    fn filtered_orders_and_windows() {
        let model = model(None);
        let definition = CosmosQueryBuilder::new(&model)
            .filtered(
                &FilterExpr::eq("tenant", "acme"),
                &[OrderBy::descending("tenant")],
                5,
                0,
                false,
            )
            .unwrap();

        assert_eq!(
            definition.query,
            r#"SELECT TOP @top x["id"], x["tenant"], x["description"] FROM x WHERE x["tenant"] = @cv0 ORDER BY x["tenant"] DESC"#
        );
    }
}
