//! Generic storage mapping helpers.
//!
//! Records are serialized once into a generic JSON object with their own
//! serde conventions, then fields are moved between serialized names and
//! storage names. Back-ends build their native documents from the storage
//! form and feed native documents back through [`from_storage`].

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::TRACING_TARGET_MAPPER;
use crate::collection::SearchInput;
use crate::embedding::{Embedding, EmbeddingOptions};
use crate::error::{Error, Result};
use crate::model::{RecordModel, VectorPropertyModel};

/// Generic structured form of a record: field name to value.
pub type GenericRecord = Map<String, Value>;

/// Serializes a record into its generic structured form.
pub fn to_generic<R: Serialize>(record: &R) -> Result<GenericRecord> {
    match serde_json::to_value(record)? {
        Value::Object(map) => Ok(map),
        other => Err(Error::mapping(format!(
            "records must serialize to an object, found {}",
            json_kind(&other)
        ))),
    }
}

/// Deserializes a record from its generic structured form.
pub fn from_generic<R: DeserializeOwned>(generic: GenericRecord) -> Result<R> {
    serde_json::from_value(Value::Object(generic)).map_err(|e| {
        Error::mapping(format!("stored document does not match the record type: {e}"))
    })
}

/// Moves the key from its serialized name into the store's key slot.
pub fn rename_key_for_storage(model: &RecordModel, generic: &mut GenericRecord) {
    let key = &model.key;
    let from = key
        .temporary_storage_name
        .as_deref()
        .unwrap_or(&key.serialized_name);
    move_fields(generic, [(from, key.storage_name.as_str())]);
}

/// Moves the key from the store's key slot back to its serialized name.
pub fn restore_key_from_storage(model: &RecordModel, generic: &mut GenericRecord) {
    let key = &model.key;
    let to = key
        .temporary_storage_name
        .as_deref()
        .unwrap_or(&key.serialized_name);
    move_fields(generic, [(key.storage_name.as_str(), to)]);
}

/// Renames every declared field from its serialized name to its storage name.
pub fn rename_for_storage(model: &RecordModel, generic: &mut GenericRecord) {
    let key = &model.key;
    let key_from = key
        .temporary_storage_name
        .as_deref()
        .unwrap_or(&key.serialized_name);

    let pairs = std::iter::once((key_from, key.storage_name.as_str()))
        .chain(
            model
                .data
                .iter()
                .map(|p| (p.serialized_name.as_str(), p.storage_name.as_str())),
        )
        .chain(
            model
                .vectors
                .iter()
                .map(|p| (p.serialized_name.as_str(), p.storage_name.as_str())),
        );

    move_fields(generic, pairs);
}

/// Renames every declared field from its storage name back to its serialized name.
pub fn restore_from_storage(model: &RecordModel, generic: &mut GenericRecord) {
    let key = &model.key;
    let key_to = key
        .temporary_storage_name
        .as_deref()
        .unwrap_or(&key.serialized_name);

    let pairs = std::iter::once((key.storage_name.as_str(), key_to))
        .chain(
            model
                .data
                .iter()
                .map(|p| (p.storage_name.as_str(), p.serialized_name.as_str())),
        )
        .chain(
            model
                .vectors
                .iter()
                .map(|p| (p.storage_name.as_str(), p.serialized_name.as_str())),
        );

    move_fields(generic, pairs);
}

/// Removes all vector fields, addressed by storage name.
pub fn strip_vectors(model: &RecordModel, document: &mut GenericRecord) {
    for property in &model.vectors {
        document.remove(&property.storage_name);
    }
}

/// Removes a synthetic score field from a document and returns its value.
pub fn take_score(document: &mut GenericRecord, alias: &str) -> Option<f64> {
    document.remove(alias).and_then(|v| v.as_f64())
}

/// Converts a record into its storage form.
///
/// Text supplied for a vector property is embedded with the property's
/// generator before fields are renamed to their storage names.
pub async fn to_storage<R: Serialize>(model: &RecordModel, record: &R) -> Result<GenericRecord> {
    let mut generic = to_generic(record)?;
    resolve_embeddings(model, &mut generic).await?;
    rename_for_storage(model, &mut generic);
    extract_key(model, &generic)?;
    Ok(generic)
}

/// Converts a storage document back into a record.
///
/// Vector fields are removed first when `include_vectors` is false, so they
/// are absent from the record rather than null.
pub fn from_storage<R: DeserializeOwned>(
    model: &RecordModel,
    mut document: GenericRecord,
    include_vectors: bool,
) -> Result<R> {
    extract_key(model, &document)?;

    if !include_vectors {
        strip_vectors(model, &mut document);
    }

    restore_from_storage(model, &mut document);
    from_generic(document)
}

/// Returns the key value of a storage document.
pub fn extract_key<'a>(model: &RecordModel, document: &'a GenericRecord) -> Result<&'a Value> {
    let name = &model.key.storage_name;
    match document.get(name) {
        Some(Value::Null) | None => Err(Error::mapping(format!(
            "document is missing key field '{name}'"
        ))),
        Some(Value::String(s)) if s.is_empty() => Err(Error::mapping(format!(
            "document has an empty key field '{name}'"
        ))),
        Some(value) => Ok(value),
    }
}

/// Returns the key of a storage document as a string.
pub fn extract_string_key(model: &RecordModel, document: &GenericRecord) -> Result<String> {
    match extract_key(model, document)? {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(Error::mapping(format!(
            "key field '{}' must be a string or number, found {}",
            model.key.storage_name,
            json_kind(other)
        ))),
    }
}

/// Reads the partition token from a storage document.
///
/// Returns `None` when the model declares no partition key. A declared
/// partition key must hold a non-empty string.
pub fn extract_partition_key(
    model: &RecordModel,
    document: &GenericRecord,
) -> Result<Option<String>> {
    let Some(name) = model.partition_key_storage_name() else {
        return Ok(None);
    };

    match document.get(name) {
        Some(Value::String(s)) if !s.is_empty() => Ok(Some(s.clone())),
        Some(Value::String(_)) => Err(Error::mapping(format!(
            "partition key field '{name}' is empty"
        ))),
        Some(other) => Err(Error::mapping(format!(
            "partition key field '{name}' must be a string, found {}",
            json_kind(other)
        ))),
        None => Err(Error::mapping(format!(
            "document is missing partition key field '{name}'"
        ))),
    }
}

/// Replaces text in vector fields with generated embeddings.
///
/// Operates on serialized names and returns the number of generated embeddings.
pub async fn resolve_embeddings(model: &RecordModel, generic: &mut GenericRecord) -> Result<usize> {
    let mut generated = 0;

    for property in &model.vectors {
        let Some(Value::String(text)) = generic.get(&property.serialized_name) else {
            continue;
        };

        let embedding = generate(property, text).await?;
        generic.insert(property.serialized_name.clone(), embedding.to_json());
        generated += 1;
    }

    if generated > 0 {
        tracing::debug!(
            target: TRACING_TARGET_MAPPER,
            generated,
            "Generated embeddings for record"
        );
    }

    Ok(generated)
}

/// Resolves a search input into a query vector for the target property.
pub async fn resolve_search_vector(
    property: &VectorPropertyModel,
    input: SearchInput,
) -> Result<Embedding> {
    match input {
        SearchInput::Vector(embedding) => accept_embedding(property, embedding),
        SearchInput::Text(text) => generate(property, &text).await,
    }
}

/// Checks an embedding against the element type and dimensions of a property.
///
/// This is the single place generator output and caller-supplied vectors are
/// matched to a vector property.
pub fn accept_embedding(property: &VectorPropertyModel, embedding: Embedding) -> Result<Embedding> {
    let actual = embedding.element_type();
    if actual != property.element_type {
        return Err(Error::unsupported_embedding_type(
            &property.name,
            actual,
            property.element_type,
        ));
    }

    if embedding.len() != property.dimensions {
        return Err(Error::mapping(format!(
            "vector property '{}' expects {} dimensions, got {}",
            property.name,
            property.dimensions,
            embedding.len()
        )));
    }

    Ok(embedding)
}

async fn generate(property: &VectorPropertyModel, text: &str) -> Result<Embedding> {
    let generator = property
        .embedding_generator
        .as_ref()
        .ok_or_else(|| Error::no_embedding_generator(&property.name))?;

    let options = EmbeddingOptions::with_dimensions(property.dimensions);
    let embedding = generator
        .generate(text, &options)
        .await
        .map_err(|e| Error::embedding_generation(&property.name, e))?;

    accept_embedding(property, embedding)
}

/// Moves fields between names without clobbering fields that are renamed in the same pass.
fn move_fields<'a>(generic: &mut GenericRecord, pairs: impl IntoIterator<Item = (&'a str, &'a str)>) {
    let taken: Vec<(&str, Value)> = pairs
        .into_iter()
        .filter(|(from, to)| from != to)
        .filter_map(|(from, to)| generic.remove(from).map(|value| (to, value)))
        .collect();

    for (to, value) in taken {
        generic.insert(to.to_owned(), value);
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde::{Deserialize, Serialize};
    use serde_json::json;

    use super::*;
    use crate::embedding::{Embeddable, VectorElementType};
    use crate::mock::MockEmbeddingGenerator;
    use crate::model::{
        DataProperty, KeyProperty, ModelBuildingOptions, NamingPolicy, PropertyType, Record,
        RecordDefinition, RecordModelBuilder, SerializerOptions, VectorProperty,
    };

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Hotel {
        hotel_id: String,
        hotel_name: String,
        tenant: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description_embedding: Option<Embeddable>,
    }

    impl Record for Hotel {
        fn definition() -> Option<RecordDefinition> {
            Some(
                RecordDefinition::new()
                    .key(KeyProperty::new("hotel_id", PropertyType::String))
                    .data(DataProperty::new("hotel_name", PropertyType::String))
                    .data(DataProperty::new("tenant", PropertyType::String))
                    .vector(VectorProperty::float32("description_embedding", 4)),
            )
        }
    }

    fn model(generator: Option<MockEmbeddingGenerator>) -> RecordModel {
        RecordModelBuilder::new(ModelBuildingOptions {
            reserved_key_storage_name: Some("id"),
            ..Default::default()
        })
        .with_serializer_options(SerializerOptions::new(NamingPolicy::CamelCase))
        .with_partition_key("tenant")
        .build::<Hotel>(None, generator.map(|g| Arc::new(g) as _))
        .unwrap()
    }

    fn hotel(embedding: Option<Embeddable>) -> Hotel {
        Hotel {
            hotel_id: "h1".into(),
            hotel_name: "Grand".into(),
            tenant: "acme".into(),
            description_embedding: embedding,
        }
    }

    #[tokio::test]
    async fn round_trip_with_reserved_key() {
        let model = model(None);
        let record = hotel(Some(Embeddable::Vector(vec![0.5, 0.25, 0.125, 1.0])));

        let document = to_storage(&model, &record).await.unwrap();
        assert_eq!(document["id"], json!("h1"));
        assert!(!document.contains_key("hotelId"));

        let back: Hotel = from_storage(&model, document, true).unwrap();
        assert_eq!(back, record);
    }

    #[tokio::test]
    async fn omits_vectors_when_not_requested() {
        let model = model(None);
        let record = hotel(Some(Embeddable::Vector(vec![0.1, 0.2, 0.3, 0.4])));

        let document = to_storage(&model, &record).await.unwrap();
        assert!(document.contains_key("descriptionEmbedding"));

        let back: Hotel = from_storage(&model, document, false).unwrap();
        assert_eq!(back.description_embedding, None);
    }

    #[tokio::test]
    async fn generates_embedding_for_text() {
        let generator = MockEmbeddingGenerator::float32(4);
        let model = model(Some(generator.clone()));
        let record = hotel(Some(Embeddable::Text("sea view".into())));

        let document = to_storage(&model, &record).await.unwrap();
        assert_eq!(document["descriptionEmbedding"].as_array().unwrap().len(), 4);
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn text_without_generator_fails() {
        let model = model(None);
        let record = hotel(Some(Embeddable::Text("sea view".into())));

        let err = to_storage(&model, &record).await.unwrap_err();
        assert!(matches!(err, Error::NoEmbeddingGenerator { .. }));
    }

    #[tokio::test]
    async fn rejects_mismatched_element_type() {
        let model = model(Some(MockEmbeddingGenerator::uint8(4)));
        let record = hotel(Some(Embeddable::Text("sea view".into())));

        let err = to_storage(&model, &record).await.unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedEmbeddingType {
                actual: VectorElementType::UInt8,
                expected: VectorElementType::Float32,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn wraps_generator_failure() {
        let model = model(Some(MockEmbeddingGenerator::failing()));
        let record = hotel(Some(Embeddable::Text("sea view".into())));

        let err = to_storage(&model, &record).await.unwrap_err();
        assert!(matches!(err, Error::EmbeddingGeneration { .. }));
    }

    #[tokio::test]
    async fn partition_key_must_be_non_empty() {
        let model = model(None);

        let document = to_storage(&model, &hotel(None)).await.unwrap();
        assert_eq!(
            extract_partition_key(&model, &document).unwrap().as_deref(),
            Some("acme")
        );

        let mut empty = hotel(None);
        empty.tenant = String::new();
        let document = to_storage(&model, &empty).await.unwrap();
        assert!(matches!(
            extract_partition_key(&model, &document),
            Err(Error::Mapping(_))
        ));
    }

    #[test]
    fn missing_key_is_a_mapping_error() {
        let model = model(None);
        let document = json!({ "hotelName": "Grand", "tenant": "acme" });
        let Value::Object(document) = document else {
            unreachable!()
        };

        let result: Result<Hotel> = from_storage(&model, document, true);
        assert!(matches!(result, Err(Error::Mapping(_))));
    }

    #[test]
    fn renames_do_not_clobber_each_other() {
        let definition = RecordDefinition::new()
            .key(KeyProperty::new("a", PropertyType::String).with_storage_name("b"))
            .data(DataProperty::new("b", PropertyType::String).with_storage_name("a"));
        let model = RecordModelBuilder::new(ModelBuildingOptions::default())
            .build_dynamic(&definition, None)
            .unwrap();

        let Value::Object(mut generic) = json!({ "a": "key", "b": "data" }) else {
            unreachable!()
        };
        rename_for_storage(&model, &mut generic);
        assert_eq!(generic["b"], json!("key"));
        assert_eq!(generic["a"], json!("data"));

        restore_from_storage(&model, &mut generic);
        assert_eq!(generic["a"], json!("key"));
    }

    #[test]
    fn take_score_strips_alias() {
        let Value::Object(mut document) = json!({ "id": "1", "score_1": 0.75 }) else {
            unreachable!()
        };
        assert_eq!(take_score(&mut document, "score_1"), Some(0.75));
        assert!(!document.contains_key("score_1"));
    }
}
