//! Declarative record definitions.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::embedding::{SharedEmbeddingGenerator, VectorElementType};

/// Native type of a key or data property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PropertyType {
    /// UTF-8 string.
    String,
    /// Boolean.
    Bool,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 64-bit unsigned integer.
    UInt64,
    /// 32-bit float.
    Float32,
    /// 64-bit float.
    Float64,
    /// UUID, serialized as a string.
    Uuid,
    /// RFC 3339 timestamp, serialized as a string.
    DateTime,
    /// Array of strings.
    StringArray,
    /// Array of 64-bit signed integers.
    Int64Array,
    /// Array of 64-bit floats.
    Float64Array,
    /// Nested object.
    Object,
}

impl PropertyType {
    /// Returns true for numeric scalar types.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Int32 | Self::Int64 | Self::UInt64 | Self::Float32 | Self::Float64
        )
    }

    /// Returns true for array types.
    pub fn is_array(&self) -> bool {
        matches!(
            self,
            Self::StringArray | Self::Int64Array | Self::Float64Array
        )
    }
}

/// Similarity function used to compare vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[derive(Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DistanceFunction {
    /// Cosine similarity; higher is more similar.
    #[default]
    Cosine,
    /// Dot product similarity; higher is more similar.
    DotProduct,
    /// Euclidean distance; lower is more similar.
    Euclidean,
}

/// Kind of vector index maintained by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IndexKind {
    /// Brute-force index over full-precision vectors.
    Flat,
    /// Brute-force index over quantized vectors.
    QuantizedFlat,
    /// Disk-based approximate nearest neighbour index.
    DiskAnn,
    /// Hierarchical navigable small world graph.
    Hnsw,
    /// Inverted file index with flat lists.
    IvfFlat,
}

/// Definition of the key property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyProperty {
    /// Name of the property on the record type.
    pub name: String,
    /// Native type of the key.
    pub property_type: PropertyType,
    /// Explicit storage name, overriding the naming policy.
    pub storage_name: Option<String>,
}

impl KeyProperty {
    /// Creates a key property definition.
    pub fn new(name: impl Into<String>, property_type: PropertyType) -> Self {
        Self {
            name: name.into(),
            property_type,
            storage_name: None,
        }
    }

    /// Sets an explicit storage name.
    pub fn with_storage_name(mut self, storage_name: impl Into<String>) -> Self {
        self.storage_name = Some(storage_name.into());
        self
    }
}

/// Definition of a data property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataProperty {
    /// Name of the property on the record type.
    pub name: String,
    /// Native type of the property.
    pub property_type: PropertyType,
    /// Explicit storage name, overriding the naming policy.
    pub storage_name: Option<String>,
    /// Whether the store should index the property for filtering.
    pub is_indexed: bool,
    /// Whether the store should index the property for full-text search.
    pub is_full_text_indexed: bool,
}

impl DataProperty {
    /// Creates a data property definition.
    pub fn new(name: impl Into<String>, property_type: PropertyType) -> Self {
        Self {
            name: name.into(),
            property_type,
            storage_name: None,
            is_indexed: false,
            is_full_text_indexed: false,
        }
    }

    /// Sets an explicit storage name.
    pub fn with_storage_name(mut self, storage_name: impl Into<String>) -> Self {
        self.storage_name = Some(storage_name.into());
        self
    }

    /// Marks the property as indexed for filtering.
    pub fn indexed(mut self) -> Self {
        self.is_indexed = true;
        self
    }

    /// Marks the property as indexed for full-text search.
    pub fn full_text_indexed(mut self) -> Self {
        self.is_full_text_indexed = true;
        self
    }
}

/// Definition of a vector property.
#[derive(Debug, Clone)]
pub struct VectorProperty {
    /// Name of the property on the record type.
    pub name: String,
    /// Element type of the stored vector.
    pub element_type: VectorElementType,
    /// Explicit storage name, overriding the naming policy.
    pub storage_name: Option<String>,
    /// Number of dimensions.
    pub dimensions: usize,
    /// Similarity function; the builder defaults it to cosine.
    pub distance_function: Option<DistanceFunction>,
    /// Index kind; the builder defaults it to the store's default.
    pub index_kind: Option<IndexKind>,
    /// Generator used when the record or query supplies text.
    pub embedding_generator: Option<SharedEmbeddingGenerator>,
}

impl VectorProperty {
    /// Creates a vector property definition.
    pub fn new(name: impl Into<String>, element_type: VectorElementType, dimensions: usize) -> Self {
        Self {
            name: name.into(),
            element_type,
            storage_name: None,
            dimensions,
            distance_function: None,
            index_kind: None,
            embedding_generator: None,
        }
    }

    /// Creates a 32-bit float vector property definition.
    pub fn float32(name: impl Into<String>, dimensions: usize) -> Self {
        Self::new(name, VectorElementType::Float32, dimensions)
    }

    /// Sets an explicit storage name.
    pub fn with_storage_name(mut self, storage_name: impl Into<String>) -> Self {
        self.storage_name = Some(storage_name.into());
        self
    }

    /// Sets the distance function.
    pub fn with_distance_function(mut self, distance_function: DistanceFunction) -> Self {
        self.distance_function = Some(distance_function);
        self
    }

    /// Sets the index kind.
    pub fn with_index_kind(mut self, index_kind: IndexKind) -> Self {
        self.index_kind = Some(index_kind);
        self
    }

    /// Sets the embedding generator.
    pub fn with_embedding_generator(mut self, generator: SharedEmbeddingGenerator) -> Self {
        self.embedding_generator = Some(generator);
        self
    }
}

/// A single property of a record definition.
#[derive(Debug, Clone)]
pub enum PropertyDefinition {
    /// The record key.
    Key(KeyProperty),
    /// A data property.
    Data(DataProperty),
    /// A vector property.
    Vector(VectorProperty),
}

impl PropertyDefinition {
    /// Returns the property name.
    pub fn name(&self) -> &str {
        match self {
            Self::Key(p) => &p.name,
            Self::Data(p) => &p.name,
            Self::Vector(p) => &p.name,
        }
    }

    /// Returns a human readable role name.
    pub fn role(&self) -> &'static str {
        match self {
            Self::Key(_) => "key",
            Self::Data(_) => "data",
            Self::Vector(_) => "vector",
        }
    }
}

/// Declarative description of a record type.
#[derive(Debug, Clone, Default)]
pub struct RecordDefinition {
    /// Properties, in declaration order.
    pub properties: Vec<PropertyDefinition>,
}

impl RecordDefinition {
    /// Creates an empty definition.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the key property.
    pub fn key(mut self, property: KeyProperty) -> Self {
        self.properties.push(PropertyDefinition::Key(property));
        self
    }

    /// Adds a data property.
    pub fn data(mut self, property: DataProperty) -> Self {
        self.properties.push(PropertyDefinition::Data(property));
        self
    }

    /// Adds a vector property.
    pub fn vector(mut self, property: VectorProperty) -> Self {
        self.properties.push(PropertyDefinition::Vector(property));
        self
    }
}

/// A record type that can be stored in a collection.
///
/// Implementations describe their own schema; a definition passed explicitly
/// to a collection replaces it entirely.
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Returns the intrinsic definition of the record type, if it has one.
    fn definition() -> Option<RecordDefinition>;
}

/// A schemaless record, described only by an explicit definition.
pub type DynamicRecord = serde_json::Map<String, serde_json::Value>;

impl Record for DynamicRecord {
    fn definition() -> Option<RecordDefinition> {
        None
    }
}
