//! Aggregation pipelines, find requests and index commands.

use recordstore_core::{
    DistanceFunction, Error, IndexKind, OrderBy, RecordModel, Result, VectorPropertyModel,
};
use serde_json::{Value, json};

use crate::TRACING_TARGET_SEARCH;
use crate::client::{Document, FindRequest};
use crate::mapper::DOCUMENT_FIELD;
use crate::options::{ID_FIELD, MongoCollectionOptions};

/// Preferred alias of the similarity score field.
const SCORE_ALIAS: &str = "similarityScore";

/// Name of the text index covering every full-text property.
const TEXT_INDEX_NAME: &str = "full_text_index";

/// Inputs of the vector search stage.
#[derive(Debug, Clone)]
pub struct SearchStageParams<'q> {
    /// Searched vector property.
    pub property: &'q VectorPropertyModel,
    /// Query vector as a JSON array.
    pub vector: Value,
    /// Optional filter document.
    pub filter: Option<Document>,
    /// Number of results.
    pub top: usize,
    /// Number of leading results to skip.
    pub skip: usize,
    /// Whether vector fields are returned.
    pub include_vectors: bool,
}

/// Builds pipelines, find requests and commands for one record model.
#[derive(Debug, Clone)]
pub struct MongoPipelineBuilder<'a> {
    model: &'a RecordModel,
    score_alias: String,
}

impl<'a> MongoPipelineBuilder<'a> {
    /// Creates a builder and allocates the score alias for the model.
    pub fn new(model: &'a RecordModel) -> Self {
        Self {
            model,
            score_alias: model.unique_alias(SCORE_ALIAS),
        }
    }

    /// Alias of the score field in search results.
    pub fn score_alias(&self) -> &str {
        &self.score_alias
    }

    /// Builds a vector search pipeline.
    ///
    /// The search stage asks for `top + skip` neighbours; the window is cut
    /// by the trailing `$skip` and `$limit` stages.
    pub fn search(
        &self,
        params: SearchStageParams<'_>,
        options: &MongoCollectionOptions,
    ) -> Vec<Document> {
        let mut cosmos_search = json!({
            "vector": params.vector,
            "path": params.property.storage_name,
            "k": params.top + params.skip,
        });
        if let Some(filter) = params.filter {
            cosmos_search["filter"] = Value::Object(filter);
        }
        if params.property.index_kind == IndexKind::Hnsw {
            cosmos_search["efSearch"] = json!(options.ef_search);
        }

        let mut pipeline = vec![
            stage(json!({
                "$search": {
                    "cosmosSearch": cosmos_search,
                    "returnStoredSource": true,
                }
            })),
            stage(json!({
                "$project": {
                    self.score_alias.as_str(): { "$meta": "searchScore" },
                    DOCUMENT_FIELD: "$$ROOT",
                }
            })),
        ];

        if !params.include_vectors && !self.model.vectors.is_empty() {
            let excluded: Document = self
                .model
                .vectors
                .iter()
                .map(|p| (format!("{DOCUMENT_FIELD}.{}", p.storage_name), json!(0)))
                .collect();
            pipeline.push(stage(json!({ "$project": excluded })));
        }
        if params.skip > 0 {
            pipeline.push(stage(json!({ "$skip": params.skip })));
        }
        pipeline.push(stage(json!({ "$limit": params.top })));

        tracing::debug!(
            target: TRACING_TARGET_SEARCH,
            stages = pipeline.len(),
            path = %params.property.storage_name,
            "Built search pipeline"
        );

        pipeline
    }

    /// Builds a request reading the documents with the given keys.
    pub fn find_by_keys(&self, keys: &[String], include_vectors: bool) -> FindRequest {
        let filter = match keys {
            [key] => json!({ ID_FIELD: key }),
            keys => json!({ ID_FIELD: { "$in": keys } }),
        };

        FindRequest {
            filter: into_document(filter),
            projection: self.projection(include_vectors),
            ..Default::default()
        }
    }

    /// Builds a filtered, ordered and windowed request.
    pub fn filtered(
        &self,
        filter: Document,
        order_by: &[OrderBy],
        top: usize,
        skip: usize,
        include_vectors: bool,
    ) -> Result<FindRequest> {
        let mut sort = Document::new();
        for order in order_by {
            let field = self.model.filterable_storage_name(&order.property)?;
            sort.insert(field.to_owned(), json!(if order.ascending { 1 } else { -1 }));
        }

        Ok(FindRequest {
            filter,
            projection: self.projection(include_vectors),
            sort: (!sort.is_empty()).then_some(sort),
            skip: skip as u64,
            limit: Some(top as u64),
        })
    }

    /// Builds the `createIndexes` command of a collection.
    ///
    /// Returns `None` when the model needs no index.
    pub fn create_indexes(
        &self,
        collection: &str,
        options: &MongoCollectionOptions,
    ) -> Result<Option<Document>> {
        let mut indexes = Vec::new();

        for property in &self.model.vectors {
            indexes.push(json!({
                "name": format!("{}_vector_index", property.storage_name),
                "key": { property.storage_name.as_str(): "cosmosSearch" },
                "cosmosSearchOptions": vector_index_options(property, options)?,
            }));
        }

        for property in self.model.data.iter().filter(|p| p.is_indexed) {
            indexes.push(json!({
                "name": format!("{}_1", property.storage_name),
                "key": { property.storage_name.as_str(): 1 },
            }));
        }

        let text: Document = self
            .model
            .data
            .iter()
            .filter(|p| p.is_full_text_indexed)
            .map(|p| (p.storage_name.clone(), json!("text")))
            .collect();
        if !text.is_empty() {
            indexes.push(json!({ "name": TEXT_INDEX_NAME, "key": text }));
        }

        if indexes.is_empty() {
            return Ok(None);
        }

        Ok(Some(into_document(json!({
            "createIndexes": collection,
            "indexes": indexes,
        }))))
    }

    fn projection(&self, include_vectors: bool) -> Option<Document> {
        if include_vectors || self.model.vectors.is_empty() {
            return None;
        }

        Some(
            self.model
                .vectors
                .iter()
                .map(|p| (p.storage_name.clone(), json!(0)))
                .collect(),
        )
    }
}

fn vector_index_options(
    property: &VectorPropertyModel,
    options: &MongoCollectionOptions,
) -> Result<Value> {
    let similarity = match property.distance_function {
        DistanceFunction::Cosine => "COS",
        DistanceFunction::DotProduct => "IP",
        DistanceFunction::Euclidean => "L2",
    };

    let mut index = json!({
        "similarity": similarity,
        "dimensions": property.dimensions,
    });
    match property.index_kind {
        IndexKind::IvfFlat => {
            index["kind"] = json!("vector-ivf");
            index["numLists"] = json!(options.num_lists);
        }
        IndexKind::Hnsw => {
            index["kind"] = json!("vector-hnsw");
            index["m"] = json!(options.max_connections);
            index["efConstruction"] = json!(options.ef_construction);
        }
        IndexKind::DiskAnn => {
            index["kind"] = json!("vector-diskann");
            index["maxDegree"] = json!(options.max_degree);
            index["lBuild"] = json!(options.l_build);
        }
        other => {
            return Err(Error::configuration(format!(
                "index kind {other} is not supported by MongoDB vCore"
            )));
        }
    }

    Ok(index)
}

fn stage(value: Value) -> Document {
    into_document(value)
}

fn into_document(value: Value) -> Document {
    match value {
        Value::Object(document) => document,
        _ => Document::new(),
    }
}

#[cfg(test)]
mod tests {
    use recordstore_core::{
        DataProperty, KeyProperty, PropertyType, RecordDefinition, RecordModelBuilder,
        VectorProperty,
    };

    use super::*;

    fn model(index_kind: IndexKind) -> RecordModel {
        let definition = RecordDefinition::new()
            .key(KeyProperty::new("key", PropertyType::String))
            .data(DataProperty::new("tenant", PropertyType::String).indexed())
            .data(DataProperty::new("body", PropertyType::String).full_text_indexed())
            .vector(
                VectorProperty::float32("embedding", 3)
                    .with_distance_function(DistanceFunction::DotProduct)
                    .with_index_kind(index_kind),
            );
        RecordModelBuilder::new(MongoCollectionOptions::default().model_building_options())
            .build_dynamic(&definition, None)
            .unwrap()
    }

    fn params(model: &RecordModel, skip: usize) -> SearchStageParams<'_> {
        SearchStageParams {
            property: &model.vectors[0],
            vector: json!([1.0, 0.0, 0.0]),
            filter: Some(into_document(json!({ "tenant": { "$eq": "acme" } }))),
            top: 2,
            skip,
            include_vectors: false,
        }
    }

    #[test]
    fn search_pipeline_windows_results() {
        let model = model(IndexKind::Hnsw);
        let options = MongoCollectionOptions::default();
        let pipeline = MongoPipelineBuilder::new(&model).search(params(&model, 1), &options);

        let pipeline = Value::Array(pipeline.into_iter().map(Value::Object).collect());
        assert_eq!(
            pipeline,
            json!([
                { "$search": {
                    "cosmosSearch": {
                        "vector": [1.0, 0.0, 0.0],
                        "path": "embedding",
                        "k": 3,
                        "filter": { "tenant": { "$eq": "acme" } },
                        "efSearch": 40,
                    },
                    "returnStoredSource": true,
                }},
                { "$project": {
                    "similarityScore": { "$meta": "searchScore" },
                    "document": "$$ROOT",
                }},
                { "$project": { "document.embedding": 0 } },
                { "$skip": 1 },
                { "$limit": 2 },
            ])
        );
    }

    #[test]
    fn creates_vector_regular_and_text_indexes() {
        let model = model(IndexKind::IvfFlat);
        let command = MongoPipelineBuilder::new(&model)
            .create_indexes("articles", &MongoCollectionOptions::default().with_num_lists(4))
            .unwrap()
            .unwrap();

        assert_eq!(command["createIndexes"], json!("articles"));
        assert_eq!(
            command["indexes"],
            json!([
                {
                    "name": "embedding_vector_index",
                    "key": { "embedding": "cosmosSearch" },
                    "cosmosSearchOptions": {
                        "kind": "vector-ivf",
                        "numLists": 4,
                        "similarity": "IP",
                        "dimensions": 3,
                    },
                },
                { "name": "tenant_1", "key": { "tenant": 1 } },
                { "name": "full_text_index", "key": { "body": "text" } },
            ])
        );
    }

    #[test]
    fn diskann_index_options() {
        let model = model(IndexKind::DiskAnn);
        let command = MongoPipelineBuilder::new(&model)
            .create_indexes("articles", &MongoCollectionOptions::default())
            .unwrap()
            .unwrap();
        let options = &command["indexes"][0]["cosmosSearchOptions"];
        assert_eq!(options["kind"], json!("vector-diskann"));
        assert_eq!(options["maxDegree"], json!(32));
    }

    #[test]
    fn find_requests_project_out_vectors() {
        let model = model(IndexKind::IvfFlat);
        let builder = MongoPipelineBuilder::new(&model);

        let single = builder.find_by_keys(&["a".to_owned()], false);
        assert_eq!(Value::Object(single.filter), json!({ "_id": "a" }));
        assert_eq!(
            single.projection.map(Value::Object),
            Some(json!({ "embedding": 0 }))
        );

        let many = builder.find_by_keys(&["a".to_owned(), "b".to_owned()], true);
        assert_eq!(Value::Object(many.filter), json!({ "_id": { "$in": ["a", "b"] } }));
        assert!(many.projection.is_none());

        let filtered = builder
            .filtered(Document::new(), &[OrderBy::descending("tenant")], 5, 2, true)
            .unwrap();
        assert_eq!(filtered.sort.map(Value::Object), Some(json!({ "tenant": -1 })));
        assert_eq!((filtered.skip, filtered.limit), (2, Some(5)));
    }
}
