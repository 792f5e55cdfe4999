//! Qdrant collection options.

use recordstore_core::{
    IndexKind, ModelBuildingOptions, PropertyType, RecordDefinition, SerializerOptions,
    SharedEmbeddingGenerator, VectorElementType,
};
use serde::{Deserialize, Serialize};

use crate::STORE_SYSTEM;

/// Options for a [`QdrantCollection`].
///
/// [`QdrantCollection`]: crate::QdrantCollection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QdrantCollectionOptions {
    /// Store vectors as named vectors, one per vector property.
    ///
    /// Without named vectors the record must declare exactly one vector
    /// property, stored as the point's single unnamed vector.
    #[serde(default = "default_named_vectors")]
    pub has_named_vectors: bool,

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

fn default_named_vectors() -> bool {
    true
}

impl Default for QdrantCollectionOptions {
    fn default() -> Self {
        Self {
            has_named_vectors: default_named_vectors(),
            serializer_options: SerializerOptions::default(),
            definition: None,
            embedding_generator: None,
        }
    }
}

impl QdrantCollectionOptions {
    /// Sets whether vectors are stored as named vectors.
    pub fn with_named_vectors(mut self, has_named_vectors: bool) -> Self {
        self.has_named_vectors = has_named_vectors;
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

    /// Returns the capabilities record models are validated against.
    pub fn model_building_options(&self) -> ModelBuildingOptions {
        ModelBuildingOptions {
            store_system: STORE_SYSTEM,
            supported_key_types: &[PropertyType::UInt64, PropertyType::Uuid],
            supported_vector_types: &[VectorElementType::Float32],
            supports_multiple_vectors: self.has_named_vectors,
            requires_at_least_one_vector: !self.has_named_vectors,
            supported_index_kinds: &[IndexKind::Hnsw],
            default_index_kind: IndexKind::Hnsw,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_vectors_by_default() {
        let options = QdrantCollectionOptions::default();
        assert!(options.has_named_vectors);
        assert!(options.model_building_options().supports_multiple_vectors);

        let parsed: QdrantCollectionOptions = serde_json::from_str("{}").unwrap();
        assert!(parsed.has_named_vectors);
    }

    #[test]
    fn unnamed_vectors_require_exactly_one() {
        let options = QdrantCollectionOptions::default()
            .with_named_vectors(false)
            .model_building_options();
        assert!(!options.supports_multiple_vectors);
        assert!(options.requires_at_least_one_vector);
    }
}
