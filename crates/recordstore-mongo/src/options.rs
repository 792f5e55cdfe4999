//! MongoDB collection options.

use recordstore_core::{
    DistanceFunction, Error, IndexKind, ModelBuildingOptions, PropertyType, RecordDefinition,
    Result, SerializerOptions, SharedEmbeddingGenerator, VectorElementType,
};
use serde::{Deserialize, Serialize};

use crate::STORE_SYSTEM;

/// Storage name MongoDB requires for the document key.
pub(crate) const ID_FIELD: &str = "_id";

/// Options for a [`MongoCollection`].
///
/// Index tuning values apply to the vector indexes created with the
/// collection; `ef_search` applies to searches over HNSW indexes.
///
/// [`MongoCollection`]: crate::MongoCollection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MongoCollectionOptions {
    /// Naming convention of the record serializer.
    pub serializer_options: SerializerOptions,

    /// Number of clusters of IVF indexes.
    pub num_lists: u32,

    /// Maximum number of connections per node of HNSW indexes.
    pub max_connections: u32,

    /// Candidate list size while building HNSW indexes.
    pub ef_construction: u32,

    /// Candidate list size while searching HNSW indexes.
    pub ef_search: u32,

    /// Maximum out-degree of DiskANN graph nodes.
    pub max_degree: u32,

    /// Candidate list size while building DiskANN indexes.
    pub l_build: u32,

    /// Record definition replacing the record type's own.
    #[serde(skip)]
    pub definition: Option<RecordDefinition>,

    /// Generator used for vector properties without their own.
    #[serde(skip)]
    pub embedding_generator: Option<SharedEmbeddingGenerator>,
}

impl Default for MongoCollectionOptions {
    fn default() -> Self {
        Self {
            serializer_options: SerializerOptions::default(),
            num_lists: 1,
            max_connections: 16,
            ef_construction: 64,
            ef_search: 40,
            max_degree: 32,
            l_build: 50,
            definition: None,
            embedding_generator: None,
        }
    }
}

impl MongoCollectionOptions {
    /// Sets the serializer options.
    pub fn with_serializer_options(mut self, serializer_options: SerializerOptions) -> Self {
        self.serializer_options = serializer_options;
        self
    }

    /// Sets the number of IVF clusters.
    pub fn with_num_lists(mut self, num_lists: u32) -> Self {
        self.num_lists = num_lists;
        self
    }

    /// Sets the HNSW build parameters.
    pub fn with_hnsw(mut self, max_connections: u32, ef_construction: u32) -> Self {
        self.max_connections = max_connections;
        self.ef_construction = ef_construction;
        self
    }

    /// Sets the HNSW search candidate list size.
    pub fn with_ef_search(mut self, ef_search: u32) -> Self {
        self.ef_search = ef_search;
        self
    }

    /// Sets an explicit record definition.
    pub fn with_definition(mut self, definition: RecordDefinition) -> Self {
        self.definition = Some(definition);
        self
    }

    /// Sets the default embedding generator.
    pub fn with_embedding_generator(mut self, generator: SharedEmbeddingGenerator) -> Self {
        self.embedding_generator = Some(generator);
        self
    }

    /// Validates the index tuning values.
    pub fn validate(&self) -> Result<()> {
        let values = [
            ("num_lists", self.num_lists),
            ("max_connections", self.max_connections),
            ("ef_construction", self.ef_construction),
            ("ef_search", self.ef_search),
            ("max_degree", self.max_degree),
            ("l_build", self.l_build),
        ];

        match values.iter().find(|(_, value)| *value == 0) {
            Some((name, _)) => Err(Error::configuration(format!(
                "{name} must be greater than zero"
            ))),
            None => Ok(()),
        }
    }

    /// Returns the capabilities record models are validated against.
    pub fn model_building_options(&self) -> ModelBuildingOptions {
        ModelBuildingOptions {
            store_system: STORE_SYSTEM,
            supported_key_types: &[PropertyType::String],
            supported_vector_types: &[VectorElementType::Float32],
            supports_multiple_vectors: true,
            requires_at_least_one_vector: false,
            reserved_key_storage_name: Some(ID_FIELD),
            reserved_storage_names: &[ID_FIELD],
            supported_index_kinds: &[IndexKind::IvfFlat, IndexKind::Hnsw, IndexKind::DiskAnn],
            default_index_kind: IndexKind::IvfFlat,
            supported_distance_functions: &[
                DistanceFunction::Cosine,
                DistanceFunction::DotProduct,
                DistanceFunction::Euclidean,
            ],
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let options = MongoCollectionOptions::default();
        assert!(options.validate().is_ok());
        assert_eq!(options.model_building_options().default_index_kind, IndexKind::IvfFlat);
    }

    #[test]
    fn rejects_zero_tuning_values() {
        let err = MongoCollectionOptions::default()
            .with_num_lists(0)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("num_lists"));
    }

    #[test]
    fn deserializes_partial_json() {
        let options: MongoCollectionOptions =
            serde_json::from_str(r#"{ "ef_search": 100 }"#).unwrap();
        assert_eq!(options.ef_search, 100);
        assert_eq!(options.num_lists, 1);
    }
}
