//! Container properties sent when a collection is created.
//!
//! The types serialize to the JSON shape of the Cosmos container resource.

use recordstore_core::{
    DistanceFunction, Error, IndexKind, RecordModel, Result, VectorElementType,
};
use serde::{Deserialize, Serialize};

/// Properties of a container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerProperties {
    /// Container name.
    pub id: String,
    /// Partition key definition.
    pub partition_key: PartitionKeyDefinition,
    /// Indexing policy.
    pub indexing_policy: IndexingPolicy,
    /// Vector embedding policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_embedding_policy: Option<VectorEmbeddingPolicy>,
    /// Full-text policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_text_policy: Option<FullTextPolicy>,
}

/// Partition key paths of a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionKeyDefinition {
    /// Partition key paths, such as `/tenant`.
    pub paths: Vec<String>,
    /// Partitioning kind.
    pub kind: String,
    /// Definition version.
    pub version: u8,
}

impl PartitionKeyDefinition {
    /// Hash partitioning on a single path.
    pub fn hash(path: impl Into<String>) -> Self {
        Self {
            paths: vec![path.into()],
            kind: "Hash".to_owned(),
            version: 2,
        }
    }
}

/// Indexing mode of a container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[derive(Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum IndexingMode {
    /// The index is updated synchronously with writes.
    #[default]
    Consistent,
    /// No index is maintained.
    None,
}

/// Indexing policy of a container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexingPolicy {
    /// Indexing mode.
    pub indexing_mode: IndexingMode,
    /// Whether items are indexed automatically.
    pub automatic: bool,
    /// Paths included in the range index.
    pub included_paths: Vec<IncludedPath>,
    /// Paths excluded from the range index.
    pub excluded_paths: Vec<ExcludedPath>,
    /// Vector indexes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vector_indexes: Vec<VectorIndex>,
    /// Full-text indexes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub full_text_indexes: Vec<FullTextIndex>,
}

/// A path included in the range index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludedPath {
    /// Index path.
    pub path: String,
}

/// A path excluded from the range index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedPath {
    /// Index path.
    pub path: String,
}

/// A vector index on one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorIndex {
    /// Path of the vector field.
    pub path: String,
    /// Index type: `flat`, `quantizedFlat` or `diskANN`.
    #[serde(rename = "type")]
    pub index_type: String,
}

/// A full-text index on one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullTextIndex {
    /// Path of the text field.
    pub path: String,
}

/// Vector embedding policy of a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorEmbeddingPolicy {
    /// One entry per vector field.
    pub vector_embeddings: Vec<VectorEmbedding>,
}

/// Description of one vector field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorEmbedding {
    /// Path of the vector field.
    pub path: String,
    /// Element type: `float32`, `uint8` or `int8`.
    pub data_type: String,
    /// Distance function: `cosine`, `dotproduct` or `euclidean`.
    pub distance_function: String,
    /// Number of dimensions.
    pub dimensions: usize,
}

/// Full-text policy of a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullTextPolicy {
    /// Language used when a path does not declare one.
    pub default_language: String,
    /// Full-text searchable paths.
    pub full_text_paths: Vec<FullTextPath>,
}

/// A full-text searchable path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullTextPath {
    /// Path of the text field.
    pub path: String,
    /// Language of the text.
    pub language: String,
}

/// Language of full-text indexed fields.
const FULL_TEXT_LANGUAGE: &str = "en-US";

impl ContainerProperties {
    /// Derives the container properties of a record model.
    ///
    /// Vector fields are excluded from the range index; each gets a vector
    /// index and an embedding policy entry. Full-text indexed data properties
    /// get a full-text index and policy entry.
    pub fn for_model(name: &str, model: &RecordModel, partition_key_path: &str) -> Result<Self> {
        let mut excluded_paths = vec![ExcludedPath {
            path: "/\"_etag\"/?".to_owned(),
        }];
        let mut vector_indexes = Vec::new();
        let mut vector_embeddings = Vec::new();

        for property in &model.vectors {
            let path = format!("/{}", property.storage_name);

            excluded_paths.push(ExcludedPath {
                path: format!("{path}/*"),
            });
            vector_indexes.push(VectorIndex {
                path: path.clone(),
                index_type: index_type(property.index_kind)?.to_owned(),
            });
            vector_embeddings.push(VectorEmbedding {
                path,
                data_type: data_type(property.element_type).to_owned(),
                distance_function: distance_function(property.distance_function).to_owned(),
                dimensions: property.dimensions,
            });
        }

        let full_text_paths: Vec<_> = model
            .data
            .iter()
            .filter(|p| p.is_full_text_indexed)
            .map(|p| format!("/{}", p.storage_name))
            .collect();

        let full_text_policy = (!full_text_paths.is_empty()).then(|| FullTextPolicy {
            default_language: FULL_TEXT_LANGUAGE.to_owned(),
            full_text_paths: full_text_paths
                .iter()
                .map(|path| FullTextPath {
                    path: path.clone(),
                    language: FULL_TEXT_LANGUAGE.to_owned(),
                })
                .collect(),
        });

        Ok(Self {
            id: name.to_owned(),
            partition_key: PartitionKeyDefinition::hash(partition_key_path),
            indexing_policy: IndexingPolicy {
                indexing_mode: IndexingMode::Consistent,
                automatic: true,
                included_paths: vec![IncludedPath {
                    path: "/*".to_owned(),
                }],
                excluded_paths,
                vector_indexes,
                full_text_indexes: full_text_paths
                    .into_iter()
                    .map(|path| FullTextIndex { path })
                    .collect(),
            },
            vector_embedding_policy: (!vector_embeddings.is_empty())
                .then_some(VectorEmbeddingPolicy { vector_embeddings }),
            full_text_policy,
        })
    }
}

fn index_type(kind: IndexKind) -> Result<&'static str> {
    match kind {
        IndexKind::Flat => Ok("flat"),
        IndexKind::QuantizedFlat => Ok("quantizedFlat"),
        IndexKind::DiskAnn => Ok("diskANN"),
        other => Err(Error::configuration(format!(
            "index kind {other} is not supported by Cosmos DB"
        ))),
    }
}

fn data_type(element_type: VectorElementType) -> &'static str {
    match element_type {
        VectorElementType::Float32 => "float32",
        VectorElementType::UInt8 => "uint8",
        VectorElementType::Int8 => "int8",
    }
}

/// Name of a distance function in container policies.
pub(crate) fn distance_function(distance: DistanceFunction) -> &'static str {
    match distance {
        DistanceFunction::Cosine => "cosine",
        DistanceFunction::DotProduct => "dotproduct",
        DistanceFunction::Euclidean => "euclidean",
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

    #[test]
    fn derives_policies_from_model() {
        let definition = RecordDefinition::new()
            .key(KeyProperty::new("id", PropertyType::String))
            .data(DataProperty::new("tenant", PropertyType::String).indexed())
            .data(DataProperty::new("description", PropertyType::String).full_text_indexed())
            .vector(
                VectorProperty::new("embedding", VectorElementType::UInt8, 4)
                    .with_distance_function(DistanceFunction::DotProduct)
                    .with_index_kind(IndexKind::QuantizedFlat),
            );
        let model = RecordModelBuilder::new(CosmosCollectionOptions::default().model_building_options())
            .build_dynamic(&definition, None)
            .unwrap();

        let properties = ContainerProperties::for_model("hotels", &model, "/tenant").unwrap();
        let json = serde_json::to_value(&properties).unwrap();

        assert_eq!(json["partitionKey"]["paths"], json!(["/tenant"]));
        assert_eq!(json["indexingPolicy"]["indexingMode"], json!("consistent"));
        assert_eq!(
            json["indexingPolicy"]["excludedPaths"][1],
            json!({ "path": "/embedding/*" })
        );
        assert_eq!(
            json["indexingPolicy"]["vectorIndexes"],
            json!([{ "path": "/embedding", "type": "quantizedFlat" }])
        );
        assert_eq!(
            json["vectorEmbeddingPolicy"]["vectorEmbeddings"],
            json!([{
                "path": "/embedding",
                "dataType": "uint8",
                "distanceFunction": "dotproduct",
                "dimensions": 4,
            }])
        );
        assert_eq!(
            json["fullTextPolicy"]["fullTextPaths"],
            json!([{ "path": "/description", "language": "en-US" }])
        );
    }
}
