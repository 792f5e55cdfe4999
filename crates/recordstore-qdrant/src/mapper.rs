//! Record to point mapping.
//!
//! A point groups three things the record keeps flat: the key becomes the
//! point id, vector properties become the point's vectors and every other
//! field becomes the payload.

use std::collections::HashMap;
use std::sync::Arc;

use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    ListValue, NamedVectors, PointId, PointStruct, RetrievedPoint, ScoredPoint, Struct, Value,
    Vector, Vectors, VectorsOutput, vectors, vectors_output,
};
use recordstore_core::mapper::{self, GenericRecord};
use recordstore_core::{Embedding, Error, RecordModel, Result, SearchResult, VectorElementType};
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::TRACING_TARGET_POINTS;

/// Key types Qdrant accepts as point ids.
pub trait QdrantKey: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Converts the key into a point id.
    fn to_point_id(&self) -> PointId;

    /// Reads the key back from a point id.
    fn from_point_id(id: &PointId) -> Result<Self>;
}

impl QdrantKey for u64 {
    fn to_point_id(&self) -> PointId {
        PointId::from(*self)
    }

    fn from_point_id(id: &PointId) -> Result<Self> {
        match &id.point_id_options {
            Some(PointIdOptions::Num(n)) => Ok(*n),
            other => Err(Error::mapping(format!(
                "expected a numeric point id, found {other:?}"
            ))),
        }
    }
}

impl QdrantKey for Uuid {
    fn to_point_id(&self) -> PointId {
        PointId::from(self.to_string())
    }

    fn from_point_id(id: &PointId) -> Result<Self> {
        match &id.point_id_options {
            Some(PointIdOptions::Uuid(s)) => Uuid::parse_str(s)
                .map_err(|e| Error::mapping(format!("invalid point id '{s}': {e}"))),
            other => Err(Error::mapping(format!(
                "expected a UUID point id, found {other:?}"
            ))),
        }
    }
}

/// Maps records to and from Qdrant points.
#[derive(Debug, Clone)]
pub struct QdrantMapper {
    model: Arc<RecordModel>,
    has_named_vectors: bool,
}

impl QdrantMapper {
    /// Creates a mapper for a record model.
    pub fn new(model: Arc<RecordModel>, has_named_vectors: bool) -> Self {
        Self {
            model,
            has_named_vectors,
        }
    }

    /// Returns the record model.
    pub fn model(&self) -> &RecordModel {
        &self.model
    }

    /// Returns true when vectors are stored under their storage names.
    pub fn has_named_vectors(&self) -> bool {
        self.has_named_vectors
    }

    /// Name of the vector a search targets, `None` for the unnamed vector.
    pub fn vector_name<'a>(&self, storage_name: &'a str) -> Option<&'a str> {
        self.has_named_vectors.then_some(storage_name)
    }

    /// Converts a record into a point, generating embeddings for text vectors.
    pub async fn to_point<K, R>(&self, record: &R) -> Result<(K, PointStruct)>
    where
        K: QdrantKey,
        R: Serialize,
    {
        let mut document = mapper::to_storage(&self.model, record).await?;

        let key_value = document
            .remove(&self.model.key.storage_name)
            .ok_or_else(|| Error::mapping("record is missing its key"))?;
        let key: K = serde_json::from_value(key_value).map_err(|e| {
            Error::mapping(format!(
                "key '{}' is not a valid point id: {e}",
                self.model.key.name
            ))
        })?;

        let vectors = self.take_vectors(&mut document)?;
        let payload = document
            .into_iter()
            .map(|(name, value)| Ok((name, json_to_qdrant_value(value)?)))
            .collect::<Result<_>>()?;

        tracing::trace!(
            target: TRACING_TARGET_POINTS,
            named_vectors = self.has_named_vectors,
            "Mapped record to point"
        );

        let point = PointStruct {
            id: Some(key.to_point_id()),
            payload,
            vectors: Some(vectors),
        };

        Ok((key, point))
    }

    /// Converts a point returned by a get or scroll request into a record.
    pub fn from_retrieved<K, R>(&self, point: RetrievedPoint, include_vectors: bool) -> Result<R>
    where
        K: QdrantKey,
        R: DeserializeOwned,
    {
        self.from_parts::<K, R>(point.id, point.payload, point.vectors, include_vectors)
    }

    /// Converts a point returned by a search into a scored record.
    pub fn from_scored<K, R>(
        &self,
        point: ScoredPoint,
        include_vectors: bool,
    ) -> Result<SearchResult<R>>
    where
        K: QdrantKey,
        R: DeserializeOwned,
    {
        let score = f64::from(point.score);
        let record =
            self.from_parts::<K, R>(point.id, point.payload, point.vectors, include_vectors)?;
        Ok(SearchResult::new(record, Some(score)))
    }

    fn from_parts<K, R>(
        &self,
        id: Option<PointId>,
        payload: HashMap<String, Value>,
        vectors: Option<VectorsOutput>,
        include_vectors: bool,
    ) -> Result<R>
    where
        K: QdrantKey,
        R: DeserializeOwned,
    {
        let id = id.ok_or_else(|| Error::mapping("point has no id"))?;
        let key = serde_json::to_value(K::from_point_id(&id)?)?;

        let mut document: GenericRecord = payload
            .into_iter()
            .map(|(name, value)| (name, qdrant_value_to_json(value)))
            .collect();
        document.insert(self.model.key.storage_name.clone(), key);

        if include_vectors {
            self.put_vectors(&mut document, vectors);
        }

        mapper::from_storage(&self.model, document, include_vectors)
    }

    /// Moves vector fields out of a storage document.
    fn take_vectors(&self, document: &mut GenericRecord) -> Result<Vectors> {
        let mut named = HashMap::new();

        for property in &self.model.vectors {
            let value = match document.remove(&property.storage_name) {
                Some(serde_json::Value::Null) | None => continue,
                Some(value) => value,
            };

            let embedding = Embedding::from_json(VectorElementType::Float32, &value)?;
            named.insert(
                property.storage_name.clone(),
                Vector::from(embedding.to_f32_vec()),
            );
        }

        if self.has_named_vectors {
            return Ok(Vectors {
                vectors_options: Some(vectors::VectorsOptions::Vectors(NamedVectors {
                    vectors: named,
                })),
            });
        }

        let property = self
            .model
            .vectors
            .first()
            .ok_or_else(|| Error::mapping("collection without named vectors needs a vector"))?;
        let vector = named.remove(&property.storage_name).ok_or_else(|| {
            Error::mapping(format!(
                "vector property '{}' must have a value in a collection without named vectors",
                property.name
            ))
        })?;

        Ok(Vectors {
            vectors_options: Some(vectors::VectorsOptions::Vector(vector)),
        })
    }

    /// Puts the vectors of a point back into a storage document.
    fn put_vectors(&self, document: &mut GenericRecord, vectors: Option<VectorsOutput>) {
        let Some(options) = vectors.and_then(|v| v.vectors_options) else {
            return;
        };

        match options {
            vectors_output::VectorsOptions::Vector(vector) => {
                if let Some(property) = self.model.vectors.first() {
                    #[allow(deprecated)]
                    let data = vector.data;
                    document.insert(property.storage_name.clone(), f32_array(data));
                }
            }
            vectors_output::VectorsOptions::Vectors(named) => {
                let mut named = named.vectors;
                for property in &self.model.vectors {
                    if let Some(vector) = named.remove(&property.storage_name) {
                        #[allow(deprecated)]
                        let data = vector.data;
                        document.insert(property.storage_name.clone(), f32_array(data));
                    }
                }
            }
        }
    }
}

fn f32_array(data: Vec<f32>) -> serde_json::Value {
    serde_json::Value::Array(data.into_iter().map(serde_json::Value::from).collect())
}

/// Converts a JSON value into a payload value.
///
/// Payload integers are signed 64-bit; larger integers are rejected rather
/// than stored as lossy doubles.
pub(crate) fn json_to_qdrant_value(value: serde_json::Value) -> Result<Value> {
    let kind = match value {
        serde_json::Value::Null => Kind::NullValue(0),
        serde_json::Value::Bool(b) => Kind::BoolValue(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Kind::IntegerValue(i)
            } else if n.is_u64() {
                return Err(Error::mapping(format!(
                    "integer {n} does not fit a signed 64-bit payload value"
                )));
            } else if let Some(f) = n.as_f64() {
                Kind::DoubleValue(f)
            } else {
                Kind::StringValue(n.to_string())
            }
        }
        serde_json::Value::String(s) => Kind::StringValue(s),
        serde_json::Value::Array(arr) => Kind::ListValue(ListValue {
            values: arr
                .into_iter()
                .map(json_to_qdrant_value)
                .collect::<Result<_>>()?,
        }),
        serde_json::Value::Object(obj) => Kind::StructValue(Struct {
            fields: obj
                .into_iter()
                .map(|(k, v)| Ok((k, json_to_qdrant_value(v)?)))
                .collect::<Result<_>>()?,
        }),
    };

    Ok(Value { kind: Some(kind) })
}

/// Converts a payload value into JSON.
pub(crate) fn qdrant_value_to_json(value: Value) -> serde_json::Value {
    match value.kind {
        Some(Kind::NullValue(_)) | None => serde_json::Value::Null,
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(b),
        Some(Kind::IntegerValue(i)) => serde_json::Value::from(i),
        Some(Kind::DoubleValue(f)) => serde_json::Value::from(f),
        Some(Kind::StringValue(s)) => serde_json::Value::String(s),
        Some(Kind::ListValue(list)) => serde_json::Value::Array(
            list.values.into_iter().map(qdrant_value_to_json).collect(),
        ),
        Some(Kind::StructValue(obj)) => serde_json::Value::Object(
            obj.fields
                .into_iter()
                .map(|(k, v)| (k, qdrant_value_to_json(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use recordstore_core::{
        DataProperty, Embeddable, KeyProperty, NamingPolicy, PropertyType, Record,
        RecordDefinition, RecordModelBuilder, SerializerOptions, VectorProperty,
    };
    use serde::Deserialize;

    use super::*;
    use crate::options::QdrantCollectionOptions;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Hotel {
        hotel_id: u64,
        hotel_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description_embedding: Option<Embeddable>,
    }

    impl Record for Hotel {
        fn definition() -> Option<RecordDefinition> {
            Some(
                RecordDefinition::new()
                    .key(KeyProperty::new("hotel_id", PropertyType::UInt64))
                    .data(DataProperty::new("hotel_name", PropertyType::String))
                    .vector(VectorProperty::float32("description_embedding", 3)),
            )
        }
    }

    fn mapper(has_named_vectors: bool) -> QdrantMapper {
        let options = QdrantCollectionOptions::default().with_named_vectors(has_named_vectors);
        let model = RecordModelBuilder::new(options.model_building_options())
            .with_serializer_options(SerializerOptions::new(NamingPolicy::CamelCase))
            .build::<Hotel>(None, None)
            .unwrap();
        QdrantMapper::new(Arc::new(model), has_named_vectors)
    }

    fn hotel() -> Hotel {
        Hotel {
            hotel_id: 5,
            hotel_name: "Grand".into(),
            description_embedding: Some(Embeddable::Vector(vec![0.5, 0.25, 1.0])),
        }
    }

    fn retrieved(point: PointStruct) -> RetrievedPoint {
        let vectors = point.vectors.and_then(|v| v.vectors_options).map(|options| {
            #[allow(deprecated)]
            let output = |vector: Vector| qdrant_client::qdrant::VectorOutput {
                data: vector.data,
                ..Default::default()
            };
            let options = match options {
                vectors::VectorsOptions::Vector(v) => {
                    vectors_output::VectorsOptions::Vector(output(v))
                }
                vectors::VectorsOptions::Vectors(named) => {
                    vectors_output::VectorsOptions::Vectors(
                        qdrant_client::qdrant::NamedVectorsOutput {
                            vectors: named
                                .vectors
                                .into_iter()
                                .map(|(k, v)| (k, output(v)))
                                .collect(),
                        },
                    )
                }
            };
            VectorsOutput {
                vectors_options: Some(options),
            }
        });

        RetrievedPoint {
            id: point.id,
            payload: point.payload,
            vectors,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn groups_key_payload_and_named_vectors() {
        let mapper = mapper(true);
        let (key, point) = mapper.to_point::<u64, _>(&hotel()).await.unwrap();

        assert_eq!(key, 5);
        assert_eq!(point.id, Some(PointId::from(5u64)));
        assert!(point.payload.contains_key("hotelName"));
        assert!(!point.payload.contains_key("hotelId"));
        assert!(!point.payload.contains_key("descriptionEmbedding"));

        let Some(vectors::VectorsOptions::Vectors(named)) =
            point.vectors.as_ref().and_then(|v| v.vectors_options.clone())
        else {
            panic!("expected named vectors");
        };
        assert!(named.vectors.contains_key("descriptionEmbedding"));
    }

    #[tokio::test]
    async fn round_trips_unnamed_vector() {
        let mapper = mapper(false);
        let (_, point) = mapper.to_point::<u64, _>(&hotel()).await.unwrap();
        assert!(matches!(
            point.vectors.as_ref().and_then(|v| v.vectors_options.as_ref()),
            Some(vectors::VectorsOptions::Vector(_))
        ));

        let back: Hotel = mapper.from_retrieved::<u64, _>(retrieved(point), true).unwrap();
        assert_eq!(back, hotel());
    }

    #[tokio::test]
    async fn omits_vectors_when_not_requested() {
        let mapper = mapper(true);
        let (_, point) = mapper.to_point::<u64, _>(&hotel()).await.unwrap();

        let back: Hotel = mapper.from_retrieved::<u64, _>(retrieved(point), false).unwrap();
        assert_eq!(back.description_embedding, None);
        assert_eq!(back.hotel_name, "Grand");
    }

    #[tokio::test]
    async fn unnamed_vector_is_required() {
        let mapper = mapper(false);
        let mut record = hotel();
        record.description_embedding = None;

        let err = mapper.to_point::<u64, _>(&record).await.unwrap_err();
        assert!(matches!(err, Error::Mapping(_)));
    }

    #[test]
    fn uuid_keys_round_trip() {
        let key = Uuid::new_v4();
        let id = key.to_point_id();
        assert_eq!(Uuid::from_point_id(&id).unwrap(), key);
        assert!(u64::from_point_id(&id).is_err());
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Counter {
        id: u64,
        total: u64,
    }

    impl Record for Counter {
        fn definition() -> Option<RecordDefinition> {
            Some(
                RecordDefinition::new()
                    .key(KeyProperty::new("id", PropertyType::UInt64))
                    .data(DataProperty::new("total", PropertyType::UInt64)),
            )
        }
    }

    fn counter_mapper() -> QdrantMapper {
        let options = QdrantCollectionOptions::default().with_named_vectors(true);
        let model = RecordModelBuilder::new(options.model_building_options())
            .build::<Counter>(None, None)
            .unwrap();
        QdrantMapper::new(Arc::new(model), true)
    }

    #[tokio::test]
    async fn unsigned_payload_round_trips_within_i64() {
        let mapper = counter_mapper();
        let record = Counter {
            id: 1,
            total: i64::MAX as u64,
        };

        let (_, point) = mapper.to_point::<u64, _>(&record).await.unwrap();
        let back: Counter = mapper.from_retrieved::<u64, _>(retrieved(point), true).unwrap();
        assert_eq!(back, record);
    }

    #[tokio::test]
    async fn rejects_unsigned_payload_beyond_i64() {
        let mapper = counter_mapper();
        let record = Counter {
            id: 1,
            total: u64::MAX - 1,
        };

        let err = mapper.to_point::<u64, _>(&record).await.unwrap_err();
        assert!(matches!(err, Error::Mapping(_)));
    }

    #[test]
    fn payload_values_round_trip() {
        let json = serde_json::json!({
            "name": "Grand",
            "rating": 4.5,
            "rooms": 120,
            "tags": ["pool", "spa"],
            "address": { "city": "Lisbon" },
            "closed": null,
        });
        assert_eq!(qdrant_value_to_json(json_to_qdrant_value(json.clone()).unwrap()), json);
    }
}
