//! Cosmos collection options.

use recordstore_core::{
    DistanceFunction, Error, IndexKind, ModelBuildingOptions, PropertyType, RecordDefinition,
    Result, SerializerOptions, SharedEmbeddingGenerator, VectorElementType,
};
use serde::{Deserialize, Serialize};

use crate::STORE_SYSTEM;

/// Storage name Cosmos requires for the item id.
pub(crate) const ID_FIELD: &str = "id";

/// System properties Cosmos adds to every item.
pub(crate) const SYSTEM_FIELDS: &[&str] = &["_rid", "_self", "_etag", "_attachments", "_ts"];

/// Options for a [`CosmosCollection`].
///
/// [`CosmosCollection`]: crate::CosmosCollection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CosmosCollectionOptions {
    /// Property whose value is the partition token of an item.
    ///
    /// Defaults to the key property, making every item its own partition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_key_property: Option<String>,

    /// Naming convention of the record serializer.
    #[serde(default)]
    pub serializer_options: SerializerOptions,

    /// Record definition replacing the record type's own.
    #[serde(skip)]
    pub definition: Option<RecordDefinition>,

    /// Generator used for vector properties without their own.
    #[serde(skip)]
    pub embedding_generator: Option<SharedEmbeddingGenerator>,
}

impl CosmosCollectionOptions {
    /// Sets the partition key property.
    pub fn with_partition_key_property(mut self, name: impl Into<String>) -> Self {
        self.partition_key_property = Some(name.into());
        self
    }

    /// Sets the serializer options.
    pub fn with_serializer_options(mut self, serializer_options: SerializerOptions) -> Self {
        self.serializer_options = serializer_options;
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

    /// Validates the options.
    pub fn validate(&self) -> Result<()> {
        if self
            .partition_key_property
            .as_deref()
            .is_some_and(|name| name.trim().is_empty())
        {
            return Err(Error::configuration(
                "partition key property cannot be empty",
            ));
        }
        Ok(())
    }

    /// Returns the capabilities record models are validated against.
    pub fn model_building_options(&self) -> ModelBuildingOptions {
        ModelBuildingOptions {
            store_system: STORE_SYSTEM,
            supported_key_types: &[PropertyType::String],
            supported_vector_types: &[
                VectorElementType::Float32,
                VectorElementType::UInt8,
                VectorElementType::Int8,
            ],
            supports_multiple_vectors: true,
            requires_at_least_one_vector: false,
            reserved_key_storage_name: Some(ID_FIELD),
            reserved_storage_names: SYSTEM_FIELDS,
            supported_index_kinds: &[IndexKind::Flat, IndexKind::QuantizedFlat, IndexKind::DiskAnn],
            default_index_kind: IndexKind::DiskAnn,
            supported_distance_functions: &[
                DistanceFunction::Cosine,
                DistanceFunction::DotProduct,
                DistanceFunction::Euclidean,
            ],
            ..Default::default()
        }
    }
}
