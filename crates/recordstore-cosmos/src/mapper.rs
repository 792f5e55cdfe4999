//! Record to item mapping.
//!
//! Items are flat JSON objects. The key always lives under `id`, whatever the
//! record calls it, and the partition token is read back from the stored
//! item rather than from the record.

use std::sync::Arc;

use recordstore_core::mapper::{self, GenericRecord};
use recordstore_core::{CompositeKey, Error, Record, RecordModel, Result};
use serde_json::Value;

use crate::TRACING_TARGET_ITEMS;
use crate::options::SYSTEM_FIELDS;

/// Maps records to and from Cosmos items.
#[derive(Debug, Clone)]
pub struct CosmosMapper {
    model: Arc<RecordModel>,
}

impl CosmosMapper {
    /// Creates a mapper for a record model.
    pub fn new(model: Arc<RecordModel>) -> Self {
        Self { model }
    }

    /// Returns the record model.
    pub fn model(&self) -> &RecordModel {
        &self.model
    }

    /// Storage name of the field holding the partition token.
    pub fn partition_field(&self) -> &str {
        self.model
            .partition_key_storage_name()
            .unwrap_or(&self.model.key.storage_name)
    }

    /// Converts a record into an item and the composite key addressing it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Mapping`] when the key is not a non-empty string or
    /// the partition key field is missing or empty.
    pub async fn to_item<R: Record>(&self, record: &R) -> Result<(CompositeKey, Value)> {
        let document = mapper::to_storage(&self.model, record).await?;

        let id = match mapper::extract_key(&self.model, &document)? {
            Value::String(id) => id.clone(),
            other => {
                return Err(Error::mapping(format!(
                    "item id must be a string, found {other}"
                )));
            }
        };
        let partition_key = mapper::extract_partition_key(&self.model, &document)?
            .unwrap_or_else(|| id.clone());

        let key = CompositeKey::new(id, partition_key);
        key.validate()?;

        tracing::trace!(
            target: TRACING_TARGET_ITEMS,
            key = %key,
            fields = document.len(),
            "Mapped record to item"
        );

        Ok((key, Value::Object(document)))
    }

    /// Converts an item back into a record.
    ///
    /// System properties are dropped. When `score_alias` is given, the score
    /// column is removed from the item and returned alongside the record.
    pub fn from_item<R: Record>(
        &self,
        item: Value,
        score_alias: Option<&str>,
        include_vectors: bool,
    ) -> Result<(R, Option<f64>)> {
        let mut document = into_document(item)?;

        for field in SYSTEM_FIELDS {
            document.remove(*field);
        }
        let score = score_alias.and_then(|alias| mapper::take_score(&mut document, alias));

        let record = mapper::from_storage(&self.model, document, include_vectors)?;
        Ok((record, score))
    }
}

fn into_document(item: Value) -> Result<GenericRecord> {
    match item {
        Value::Object(document) => Ok(document),
        other => Err(Error::mapping(format!(
            "expected a JSON object item, found {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use recordstore_core::{
        DataProperty, DynamicRecord, KeyProperty, PropertyType, RecordDefinition,
        RecordModelBuilder, VectorProperty,
    };
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    use super::*;
    use crate::options::CosmosCollectionOptions;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        note_id: String,
        tenant: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        embedding: Option<Vec<f32>>,
    }

    impl Record for Note {
        fn definition() -> Option<RecordDefinition> {
            Some(
                RecordDefinition::new()
                    .key(KeyProperty::new("note_id", PropertyType::String))
                    .data(DataProperty::new("tenant", PropertyType::String).indexed())
                    .vector(VectorProperty::float32("embedding", 2)),
            )
        }
    }

    fn mapper(partition: Option<&str>) -> CosmosMapper {
        let options = CosmosCollectionOptions::default();
        let mut builder = RecordModelBuilder::new(options.model_building_options());
        if let Some(partition) = partition {
            builder = builder.with_partition_key(partition);
        }
        CosmosMapper::new(Arc::new(builder.build::<Note>(None, None).unwrap()))
    }

    fn note() -> Note {
        Note {
            note_id: "k1".to_owned(),
            tenant: "acme".to_owned(),
            embedding: Some(vec![0.5, 0.5]),
        }
    }

    #[tokio::test]
    async fn stores_key_under_id() {
        let (key, item) = mapper(Some("tenant")).to_item(&note()).await.unwrap();

        assert_eq!(key, CompositeKey::new("k1", "acme"));
        assert_eq!(
            item,
            json!({ "id": "k1", "tenant": "acme", "embedding": [0.5, 0.5] })
        );
    }

    #[tokio::test]
    async fn key_is_its_own_partition_by_default() {
        let mapper = mapper(None);
        let (key, _) = mapper.to_item(&note()).await.unwrap();

        assert_eq!(key, CompositeKey::single("k1"));
        assert_eq!(mapper.partition_field(), "id");
    }

    #[tokio::test]
    async fn empty_partition_token_fails() {
        let record = Note {
            tenant: String::new(),
            ..note()
        };
        let err = mapper(Some("tenant")).to_item(&record).await.unwrap_err();
        assert!(matches!(err, Error::Mapping(_)));
    }

    #[test]
    fn strips_system_fields_score_and_vectors() {
        let item = json!({
            "id": "k1",
            "tenant": "acme",
            "embedding": [0.5, 0.5],
            "SimilarityScore": 0.75,
            "_etag": "\"0000\"",
            "_ts": 1700000000,
        });

        let (record, score): (Note, _) = mapper(None)
            .from_item(item, Some("SimilarityScore"), false)
            .unwrap();

        assert_eq!(score, Some(0.75));
        assert_eq!(
            record,
            Note {
                embedding: None,
                ..note()
            }
        );
    }

    #[test]
    fn missing_id_fails() {
        let err = mapper(None)
            .from_item::<Note>(json!({ "tenant": "acme" }), None, true)
            .unwrap_err();
        assert!(matches!(err, Error::Mapping(_)));
    }

    #[tokio::test]
    async fn dynamic_records_round_trip() {
        let definition = RecordDefinition::new()
            .key(KeyProperty::new("Key", PropertyType::String))
            .data(DataProperty::new("Title", PropertyType::String));
        let model = RecordModelBuilder::new(CosmosCollectionOptions::default().model_building_options())
            .build_dynamic(&definition, None)
            .unwrap();
        let mapper = CosmosMapper::new(Arc::new(model));

        let record: DynamicRecord = serde_json::from_value(json!({ "Key": "a", "Title": "t" })).unwrap();
        let (key, item) = mapper.to_item(&record).await.unwrap();
        assert_eq!(key.record_key, "a");
        assert_eq!(item, json!({ "id": "a", "Title": "t" }));

        let (back, _): (DynamicRecord, _) = mapper.from_item(item, None, true).unwrap();
        assert_eq!(back, record);
    }
}
