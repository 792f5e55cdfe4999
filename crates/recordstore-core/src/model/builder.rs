//! Record model construction and validation.

use std::collections::{HashMap, HashSet};

use super::definition::{
    DataProperty, DistanceFunction, IndexKind, KeyProperty, PropertyDefinition, PropertyType,
    Record, RecordDefinition, VectorProperty,
};
use super::naming::SerializerOptions;
use super::{DataPropertyModel, KeyPropertyModel, RecordModel, VectorPropertyModel};
use crate::TRACING_TARGET_MODEL;
use crate::embedding::{SharedEmbeddingGenerator, VectorElementType};
use crate::error::{Error, Result};

/// Scalar and array types most document stores accept for data properties.
const DEFAULT_DATA_TYPES: &[PropertyType] = &[
    PropertyType::String,
    PropertyType::Bool,
    PropertyType::Int32,
    PropertyType::Int64,
    PropertyType::UInt64,
    PropertyType::Float32,
    PropertyType::Float64,
    PropertyType::Uuid,
    PropertyType::DateTime,
    PropertyType::StringArray,
    PropertyType::Int64Array,
    PropertyType::Float64Array,
];

/// Capability table of a store, consulted while building a record model.
#[derive(Debug, Clone)]
pub struct ModelBuildingOptions {
    /// Name of the store system, used in diagnostics.
    pub store_system: &'static str,
    /// Native types accepted for the key property.
    pub supported_key_types: &'static [PropertyType],
    /// Native types accepted for data properties.
    pub supported_data_types: &'static [PropertyType],
    /// Element types accepted for vector properties.
    pub supported_vector_types: &'static [VectorElementType],
    /// Whether a record may declare more than one vector property.
    pub supports_multiple_vectors: bool,
    /// Whether a record must declare at least one vector property.
    pub requires_at_least_one_vector: bool,
    /// Fixed storage name the store mandates for the key, if any.
    pub reserved_key_storage_name: Option<&'static str>,
    /// Storage names data and vector properties may not use.
    pub reserved_storage_names: &'static [&'static str],
    /// Vector index kinds the store can build.
    pub supported_index_kinds: &'static [IndexKind],
    /// Index kind used when a vector property does not declare one.
    pub default_index_kind: IndexKind,
    /// Distance functions the store can evaluate.
    pub supported_distance_functions: &'static [DistanceFunction],
}

impl Default for ModelBuildingOptions {
    fn default() -> Self {
        Self {
            store_system: "generic",
            supported_key_types: &[PropertyType::String],
            supported_data_types: DEFAULT_DATA_TYPES,
            supported_vector_types: &[VectorElementType::Float32],
            supports_multiple_vectors: true,
            requires_at_least_one_vector: false,
            reserved_key_storage_name: None,
            reserved_storage_names: &[],
            supported_index_kinds: &[IndexKind::Flat, IndexKind::Hnsw],
            default_index_kind: IndexKind::Hnsw,
            supported_distance_functions: &[
                DistanceFunction::Cosine,
                DistanceFunction::DotProduct,
                DistanceFunction::Euclidean,
            ],
        }
    }
}

/// Builds validated [`RecordModel`]s for a store.
#[derive(Debug, Clone)]
pub struct RecordModelBuilder {
    options: ModelBuildingOptions,
    serializer: SerializerOptions,
    partition_key: Option<String>,
}

impl RecordModelBuilder {
    /// Creates a builder for the given store capabilities.
    pub fn new(options: ModelBuildingOptions) -> Self {
        Self {
            options,
            serializer: SerializerOptions::default(),
            partition_key: None,
        }
    }

    /// Sets the serializer options used to predict serialized field names.
    pub fn with_serializer_options(mut self, serializer: SerializerOptions) -> Self {
        self.serializer = serializer;
        self
    }

    /// Designates the property whose value is the partition token.
    pub fn with_partition_key(mut self, name: impl Into<String>) -> Self {
        self.partition_key = Some(name.into());
        self
    }

    /// Returns the store capabilities the builder validates against.
    pub fn options(&self) -> &ModelBuildingOptions {
        &self.options
    }

    /// Builds the model of a record type.
    ///
    /// An explicit definition replaces the type's intrinsic one entirely.
    /// The embedding generator becomes the fallback for every vector property
    /// that does not declare its own.
    pub fn build<R: Record>(
        &self,
        explicit: Option<&RecordDefinition>,
        embedding_generator: Option<SharedEmbeddingGenerator>,
    ) -> Result<RecordModel> {
        let definition = match explicit {
            Some(definition) => definition.clone(),
            None => R::definition().ok_or_else(|| {
                Error::model_validation(format!(
                    "record type '{}' has no intrinsic definition and none was supplied",
                    std::any::type_name::<R>()
                ))
            })?,
        };

        self.build_definition(&definition, embedding_generator)
    }

    /// Builds a model from a definition alone, for schemaless records.
    pub fn build_dynamic(
        &self,
        definition: &RecordDefinition,
        embedding_generator: Option<SharedEmbeddingGenerator>,
    ) -> Result<RecordModel> {
        self.build_definition(definition, embedding_generator)
    }

    fn build_definition(
        &self,
        definition: &RecordDefinition,
        embedding_generator: Option<SharedEmbeddingGenerator>,
    ) -> Result<RecordModel> {
        let store = self.options.store_system;
        check_roles(&definition.properties)?;

        let mut keys = Vec::new();
        let mut data = Vec::new();
        let mut vectors = Vec::new();

        for property in &definition.properties {
            match property {
                PropertyDefinition::Key(p) => keys.push(self.key_model(p)?),
                PropertyDefinition::Data(p) => data.push(self.data_model(p)?),
                PropertyDefinition::Vector(p) => {
                    vectors.push(self.vector_model(p, embedding_generator.as_ref())?)
                }
            }
        }

        let key = match <[KeyPropertyModel; 1]>::try_from(keys) {
            Ok([key]) => key,
            Err(keys) => {
                return Err(Error::model_validation(format!(
                    "a record must declare exactly one key property, found {}",
                    keys.len()
                )));
            }
        };

        if vectors.len() > 1 && !self.options.supports_multiple_vectors {
            return Err(Error::model_validation(format!(
                "{store} supports a single vector property, found {}",
                vectors.len()
            )));
        }

        if vectors.is_empty() && self.options.requires_at_least_one_vector {
            return Err(Error::model_validation(format!(
                "{store} requires at least one vector property"
            )));
        }

        let model = RecordModel {
            key,
            data,
            vectors,
            partition_key: self.partition_key.clone(),
        };

        self.check_storage_names(&model)?;
        self.check_partition_key(&model)?;

        tracing::debug!(
            target: TRACING_TARGET_MODEL,
            store = store,
            key = %model.key.storage_name,
            data_properties = model.data.len(),
            vector_properties = model.vectors.len(),
            "Built record model"
        );

        Ok(model)
    }

    fn key_model(&self, property: &KeyProperty) -> Result<KeyPropertyModel> {
        if !self.options.supported_key_types.contains(&property.property_type) {
            return Err(Error::model_validation(format!(
                "key property '{}' has type {} which {} does not support as a key",
                property.name, property.property_type, self.options.store_system
            )));
        }

        let serialized_name = self.serializer.naming_policy.apply(&property.name);
        let preferred = property
            .storage_name
            .clone()
            .unwrap_or_else(|| serialized_name.clone());

        let (storage_name, temporary_storage_name) = match self.options.reserved_key_storage_name {
            Some(reserved) if reserved != serialized_name => {
                (reserved.to_owned(), Some(serialized_name.clone()))
            }
            Some(reserved) => (reserved.to_owned(), None),
            None => (preferred, None),
        };

        Ok(KeyPropertyModel {
            name: property.name.clone(),
            property_type: property.property_type,
            serialized_name,
            storage_name,
            temporary_storage_name,
        })
    }

    fn data_model(&self, property: &DataProperty) -> Result<DataPropertyModel> {
        if !self.options.supported_data_types.contains(&property.property_type) {
            return Err(Error::model_validation(format!(
                "data property '{}' has type {} which {} does not support",
                property.name, property.property_type, self.options.store_system
            )));
        }

        if property.is_full_text_indexed && property.property_type != PropertyType::String {
            return Err(Error::model_validation(format!(
                "full-text indexed property '{}' must be a string",
                property.name
            )));
        }

        let serialized_name = self.serializer.naming_policy.apply(&property.name);
        let storage_name = property
            .storage_name
            .clone()
            .unwrap_or_else(|| serialized_name.clone());

        Ok(DataPropertyModel {
            name: property.name.clone(),
            property_type: property.property_type,
            serialized_name,
            storage_name,
            is_indexed: property.is_indexed,
            is_full_text_indexed: property.is_full_text_indexed,
        })
    }

    fn vector_model(
        &self,
        property: &VectorProperty,
        fallback_generator: Option<&SharedEmbeddingGenerator>,
    ) -> Result<VectorPropertyModel> {
        let store = self.options.store_system;

        if !self.options.supported_vector_types.contains(&property.element_type) {
            return Err(Error::model_validation(format!(
                "vector property '{}' has element type {} which {store} does not support",
                property.name, property.element_type
            )));
        }

        if property.dimensions == 0 {
            return Err(Error::model_validation(format!(
                "vector property '{}' must declare a positive number of dimensions",
                property.name
            )));
        }

        let distance_function = property.distance_function.unwrap_or_default();
        if !self
            .options
            .supported_distance_functions
            .contains(&distance_function)
        {
            return Err(Error::model_validation(format!(
                "vector property '{}' uses distance function {distance_function} which {store} does not support",
                property.name
            )));
        }

        let index_kind = property.index_kind.unwrap_or(self.options.default_index_kind);
        if !self.options.supported_index_kinds.contains(&index_kind) {
            return Err(Error::model_validation(format!(
                "vector property '{}' uses index kind {index_kind} which {store} does not support",
                property.name
            )));
        }

        let serialized_name = self.serializer.naming_policy.apply(&property.name);
        let storage_name = property
            .storage_name
            .clone()
            .unwrap_or_else(|| serialized_name.clone());

        Ok(VectorPropertyModel {
            name: property.name.clone(),
            element_type: property.element_type,
            serialized_name,
            storage_name,
            dimensions: property.dimensions,
            distance_function,
            index_kind,
            embedding_generator: property
                .embedding_generator
                .clone()
                .or_else(|| fallback_generator.cloned()),
        })
    }

    fn check_storage_names(&self, model: &RecordModel) -> Result<()> {
        let reserved = self.options.reserved_storage_names;
        let non_key = model
            .data
            .iter()
            .map(|p| (&p.name, &p.storage_name))
            .chain(model.vectors.iter().map(|p| (&p.name, &p.storage_name)));

        let mut seen = HashSet::new();
        seen.insert(model.key.storage_name.as_str());

        for (name, storage_name) in non_key {
            if reserved.contains(&storage_name.as_str()) {
                return Err(Error::model_validation(format!(
                    "property '{name}' uses storage name '{storage_name}' which {} reserves",
                    self.options.store_system
                )));
            }

            if !seen.insert(storage_name.as_str()) {
                return Err(Error::model_validation(format!(
                    "property '{name}' collides with another property on storage name '{storage_name}'"
                )));
            }
        }

        Ok(())
    }

    fn check_partition_key(&self, model: &RecordModel) -> Result<()> {
        let Some(name) = model.partition_key.as_deref() else {
            return Ok(());
        };

        let property_type = if model.key.name == name {
            model.key.property_type
        } else if let Some(p) = model.data_property(name) {
            p.property_type
        } else {
            return Err(Error::model_validation(format!(
                "partition key '{name}' is not a key or data property of the record"
            )));
        };

        if property_type != PropertyType::String {
            return Err(Error::model_validation(format!(
                "partition key '{name}' must be a string property, found {property_type}"
            )));
        }

        Ok(())
    }
}

/// Rejects properties declared twice, whether with the same or a different role.
fn check_roles(properties: &[PropertyDefinition]) -> Result<()> {
    let mut roles: HashMap<&str, &'static str> = HashMap::new();

    for property in properties {
        let name = property.name();
        if let Some(previous) = roles.insert(name, property.role()) {
            return Err(if previous == property.role() {
                Error::model_validation(format!("property '{name}' is declared more than once"))
            } else {
                Error::model_validation(format!(
                    "property '{name}' has an ambiguous role: declared as both {previous} and {}",
                    property.role()
                ))
            });
        }
    }

    Ok(())
}
