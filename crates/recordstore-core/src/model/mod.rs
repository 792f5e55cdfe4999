//! Normalized, store-agnostic record models.
//!
//! A [`RecordModel`] is derived once per record type (or per explicit
//! [`RecordDefinition`]) by [`RecordModelBuilder`] and is immutable afterwards.
//! Collections share it read-only with their mapper and query translator.

mod builder;
mod definition;
mod naming;

pub use builder::{ModelBuildingOptions, RecordModelBuilder};
pub use definition::{
    DataProperty, DistanceFunction, DynamicRecord, IndexKind, KeyProperty, PropertyDefinition,
    PropertyType, Record, RecordDefinition, VectorProperty,
};
pub use naming::{NamingPolicy, SerializerOptions};

use crate::embedding::{SharedEmbeddingGenerator, VectorElementType};
use crate::error::{Error, Result};

/// Resolved key property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPropertyModel {
    /// Name of the property in the record definition.
    pub name: String,
    /// Native type of the key.
    pub property_type: PropertyType,
    /// Field name emitted by the record serializer.
    pub serialized_name: String,
    /// Field name in the store.
    pub storage_name: String,
    /// Serializer field name that was displaced by a reserved storage name.
    ///
    /// Set only when the store mandates a fixed key name; the mapper moves
    /// the serializer's field to and from the reserved slot using it.
    pub temporary_storage_name: Option<String>,
}

/// Resolved data property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPropertyModel {
    /// Name of the property in the record definition.
    pub name: String,
    /// Native type of the property.
    pub property_type: PropertyType,
    /// Field name emitted by the record serializer.
    pub serialized_name: String,
    /// Field name in the store.
    pub storage_name: String,
    /// Whether the property is indexed for filtering.
    pub is_indexed: bool,
    /// Whether the property is indexed for full-text search.
    pub is_full_text_indexed: bool,
}

/// Resolved vector property.
#[derive(Debug, Clone)]
pub struct VectorPropertyModel {
    /// Name of the property in the record definition.
    pub name: String,
    /// Element type of the stored vector.
    pub element_type: VectorElementType,
    /// Field name emitted by the record serializer.
    pub serialized_name: String,
    /// Field or named-vector name in the store.
    pub storage_name: String,
    /// Number of dimensions.
    pub dimensions: usize,
    /// Similarity function used for search.
    pub distance_function: DistanceFunction,
    /// Index kind used by the store.
    pub index_kind: IndexKind,
    /// Generator used when text is supplied instead of a vector.
    pub embedding_generator: Option<SharedEmbeddingGenerator>,
}

/// Normalized, store-agnostic schema of a record type.
#[derive(Debug, Clone)]
pub struct RecordModel {
    /// The single key property.
    pub key: KeyPropertyModel,
    /// Data properties, in declaration order.
    pub data: Vec<DataPropertyModel>,
    /// Vector properties, in declaration order.
    pub vectors: Vec<VectorPropertyModel>,
    /// Name of the property whose value is the partition token, if any.
    pub partition_key: Option<String>,
}

/// Role of a property referenced by name.
#[derive(Debug, Clone, Copy)]
pub enum PropertyRef<'a> {
    /// The key property.
    Key(&'a KeyPropertyModel),
    /// A data property.
    Data(&'a DataPropertyModel),
    /// A vector property.
    Vector(&'a VectorPropertyModel),
}

impl PropertyRef<'_> {
    /// Returns the storage name of the referenced property.
    pub fn storage_name(&self) -> &str {
        match self {
            Self::Key(p) => &p.storage_name,
            Self::Data(p) => &p.storage_name,
            Self::Vector(p) => &p.storage_name,
        }
    }
}

impl RecordModel {
    /// Looks up a property by its model name.
    pub fn property(&self, name: &str) -> Option<PropertyRef<'_>> {
        if self.key.name == name {
            return Some(PropertyRef::Key(&self.key));
        }

        if let Some(p) = self.data.iter().find(|p| p.name == name) {
            return Some(PropertyRef::Data(p));
        }

        self.vectors
            .iter()
            .find(|p| p.name == name)
            .map(PropertyRef::Vector)
    }

    /// Looks up a data property by its model name.
    pub fn data_property(&self, name: &str) -> Option<&DataPropertyModel> {
        self.data.iter().find(|p| p.name == name)
    }

    /// Looks up a vector property by its model name.
    pub fn vector_property(&self, name: &str) -> Option<&VectorPropertyModel> {
        self.vectors.iter().find(|p| p.name == name)
    }

    /// Resolves a filter field reference to its storage name.
    ///
    /// Only key and data properties can be filtered on.
    pub fn filterable_storage_name(&self, name: &str) -> Result<&str> {
        match self.property(name) {
            Some(PropertyRef::Key(p)) => Ok(&p.storage_name),
            Some(PropertyRef::Data(p)) => Ok(&p.storage_name),
            Some(PropertyRef::Vector(_)) => Err(Error::configuration(format!(
                "vector property '{name}' cannot be used in a filter"
            ))),
            None => Err(Error::configuration(format!(
                "filter references unknown property '{name}'"
            ))),
        }
    }

    /// Resolves the vector property a search targets.
    ///
    /// Without an explicit name the model must declare exactly one vector property.
    pub fn resolve_vector_property(&self, name: Option<&str>) -> Result<&VectorPropertyModel> {
        match name {
            Some(name) => self.vector_property(name).ok_or_else(|| {
                Error::configuration(format!(
                    "'{name}' is not a vector property of the record model"
                ))
            }),
            None => match self.vectors.as_slice() {
                [only] => Ok(only),
                [] => Err(Error::configuration(
                    "the record model declares no vector property to search",
                )),
                _ => Err(Error::configuration(
                    "ambiguous vector target: the record model declares multiple vector properties, \
                     specify which one to search",
                )),
            },
        }
    }

    /// Resolves the full-text data property used by hybrid search.
    pub fn resolve_full_text_property(&self, name: Option<&str>) -> Result<&DataPropertyModel> {
        match name {
            Some(name) => {
                let property = self.data_property(name).ok_or_else(|| {
                    Error::configuration(format!(
                        "'{name}' is not a data property of the record model"
                    ))
                })?;

                if property.property_type != PropertyType::String {
                    return Err(Error::configuration(format!(
                        "hybrid search text property '{name}' must be a string"
                    )));
                }

                Ok(property)
            }
            None => {
                let mut candidates = self.data.iter().filter(|p| p.is_full_text_indexed);
                match (candidates.next(), candidates.next()) {
                    (Some(only), None) => Ok(only),
                    (None, _) => Err(Error::configuration(
                        "hybrid search requires a full-text indexed data property",
                    )),
                    (Some(_), Some(_)) => Err(Error::configuration(
                        "the record model declares multiple full-text indexed properties, \
                         specify which one to search",
                    )),
                }
            }
        }
    }

    /// Returns the storage name of the partition key property, if one is declared.
    pub fn partition_key_storage_name(&self) -> Option<&str> {
        let name = self.partition_key.as_deref()?;
        self.property(name).map(|p| match p {
            PropertyRef::Key(k) => k.storage_name.as_str(),
            PropertyRef::Data(d) => d.storage_name.as_str(),
            PropertyRef::Vector(v) => v.storage_name.as_str(),
        })
    }

    /// Iterates over all storage names of the model.
    pub fn storage_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.key.storage_name.as_str())
            .chain(self.data.iter().map(|p| p.storage_name.as_str()))
            .chain(self.vectors.iter().map(|p| p.storage_name.as_str()))
    }

    /// Allocates a field alias that collides with no storage name of the model.
    ///
    /// The result is deterministic for a given model and preferred name.
    pub fn unique_alias(&self, preferred: &str) -> String {
        let taken = |candidate: &str| self.storage_names().any(|name| name == candidate);

        if !taken(preferred) {
            return preferred.to_owned();
        }

        (1..)
            .map(|n| format!("{preferred}_{n}"))
            .find(|candidate| !taken(candidate))
            .unwrap_or_else(|| preferred.to_owned())
    }
}
