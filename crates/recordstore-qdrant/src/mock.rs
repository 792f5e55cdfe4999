//! In-memory Qdrant client for testing.
//!
//! Collections live in a shared map behind a [`tokio::sync::RwLock`]. Search
//! ranks points by cosine similarity and evaluates the filter conditions the
//! collection layer emits; hybrid queries fuse their prefetches with
//! reciprocal rank fusion.
//!
//! # Feature Flag
//!
//! This module is only available when the `test-utils` feature is enabled:
//!
//! ```toml
//! [dev-dependencies]
//! recordstore-qdrant = { version = "...", features = ["test-utils"] }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use qdrant_client::qdrant::condition::ConditionOneOf;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::points_selector::PointsSelectorOneOf;
use qdrant_client::qdrant::r#match::MatchValue;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::with_vectors_selector::SelectorOptions;
use qdrant_client::qdrant::{
    Condition, CreateCollection, CreateFieldIndexCollection, DeletePoints, FieldCondition, Filter,
    GetPoints, NamedVectorsOutput, PointId, PointStruct, QueryPoints, RetrievedPoint, ScoredPoint,
    ScrollPoints, SearchPoints, UpsertPoints, Value, VectorOutput, VectorsOutput,
    WithVectorsSelector, query, vector_input, vectors, vectors_output,
};
use recordstore_core::{ClientError, ClientResult};
use tokio::sync::RwLock;

use crate::client::QdrantClient;

/// Name under which the unnamed vector of a point is kept.
const UNNAMED: &str = "";

/// Rank constant of reciprocal rank fusion.
const RRF_K: f32 = 60.0;

#[derive(Debug, Clone)]
struct StoredPoint {
    id: PointId,
    payload: HashMap<String, Value>,
    vectors: HashMap<String, Vec<f32>>,
}

#[derive(Debug, Default)]
struct MockCollection {
    points: BTreeMap<String, StoredPoint>,
    indexed_fields: Vec<String>,
}

/// Number of calls per client method.
#[derive(Debug, Default)]
struct Calls {
    total: AtomicUsize,
    upsert: AtomicUsize,
    get: AtomicUsize,
    delete: AtomicUsize,
    search: AtomicUsize,
    scroll: AtomicUsize,
    query: AtomicUsize,
}

/// In-memory implementation of [`QdrantClient`].
#[derive(Debug, Clone, Default)]
pub struct MockQdrantClient {
    collections: Arc<RwLock<HashMap<String, MockCollection>>>,
    calls: Arc<Calls>,
    last_get: Arc<RwLock<Option<GetPoints>>>,
    last_search: Arc<RwLock<Option<SearchPoints>>>,
    last_query: Arc<RwLock<Option<QueryPoints>>>,
}

impl MockQdrantClient {
    /// Creates an empty client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of calls made to the client.
    pub fn calls(&self) -> usize {
        self.calls.total.load(Ordering::SeqCst)
    }

    /// Number of upsert calls.
    pub fn upsert_calls(&self) -> usize {
        self.calls.upsert.load(Ordering::SeqCst)
    }

    /// Number of get calls.
    pub fn get_calls(&self) -> usize {
        self.calls.get.load(Ordering::SeqCst)
    }

    /// Number of delete calls.
    pub fn delete_calls(&self) -> usize {
        self.calls.delete.load(Ordering::SeqCst)
    }

    /// Number of search calls.
    pub fn search_calls(&self) -> usize {
        self.calls.search.load(Ordering::SeqCst)
    }

    /// Number of scroll calls.
    pub fn scroll_calls(&self) -> usize {
        self.calls.scroll.load(Ordering::SeqCst)
    }

    /// Number of query calls.
    pub fn query_calls(&self) -> usize {
        self.calls.query.load(Ordering::SeqCst)
    }

    /// The most recent get request.
    pub async fn last_get(&self) -> Option<GetPoints> {
        self.last_get.read().await.clone()
    }

    /// The most recent search request.
    pub async fn last_search(&self) -> Option<SearchPoints> {
        self.last_search.read().await.clone()
    }

    /// The most recent query request.
    pub async fn last_query(&self) -> Option<QueryPoints> {
        self.last_query.read().await.clone()
    }

    /// Payload fields indexed in a collection.
    pub async fn indexed_fields(&self, collection: &str) -> Vec<String> {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|c| c.indexed_fields.clone())
            .unwrap_or_default()
    }

    /// Number of points stored in a collection.
    pub async fn point_count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, |c| c.points.len())
    }

    fn record(&self, counter: &AtomicUsize) {
        self.calls.total.fetch_add(1, Ordering::SeqCst);
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl QdrantClient for MockQdrantClient {
    async fn list_collections(&self) -> ClientResult<Vec<String>> {
        self.calls.total.fetch_add(1, Ordering::SeqCst);
        let mut names: Vec<_> = self.collections.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn collection_exists(&self, name: &str) -> ClientResult<bool> {
        self.calls.total.fetch_add(1, Ordering::SeqCst);
        Ok(self.collections.read().await.contains_key(name))
    }

    async fn create_collection(&self, request: CreateCollection) -> ClientResult<()> {
        self.calls.total.fetch_add(1, Ordering::SeqCst);
        let mut collections = self.collections.write().await;
        if collections.contains_key(&request.collection_name) {
            return Err(ClientError::already_exists(format!(
                "Collection `{}` already exists!",
                request.collection_name
            )));
        }
        collections.insert(request.collection_name, MockCollection::default());
        Ok(())
    }

    async fn create_field_index(&self, request: CreateFieldIndexCollection) -> ClientResult<()> {
        self.calls.total.fetch_add(1, Ordering::SeqCst);
        let mut collections = self.collections.write().await;
        let collection = collection_mut(&mut collections, &request.collection_name)?;
        collection.indexed_fields.push(request.field_name);
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> ClientResult<()> {
        self.calls.total.fetch_add(1, Ordering::SeqCst);
        self.collections.write().await.remove(name);
        Ok(())
    }

    async fn upsert_points(&self, request: UpsertPoints) -> ClientResult<()> {
        self.record(&self.calls.upsert);
        let mut collections = self.collections.write().await;
        let collection = collection_mut(&mut collections, &request.collection_name)?;

        for point in request.points {
            let stored = stored_point(point)?;
            collection.points.insert(id_key(&stored.id), stored);
        }
        Ok(())
    }

    async fn get_points(&self, request: GetPoints) -> ClientResult<Vec<RetrievedPoint>> {
        self.record(&self.calls.get);
        *self.last_get.write().await = Some(request.clone());

        let collections = self.collections.read().await;
        let collection = collection_ref(&collections, &request.collection_name)?;
        let with_vectors = wants_vectors(request.with_vectors.as_ref());

        Ok(request
            .ids
            .iter()
            .filter_map(|id| collection.points.get(&id_key(id)))
            .map(|point| retrieved(point, with_vectors))
            .collect())
    }

    async fn delete_points(&self, request: DeletePoints) -> ClientResult<()> {
        self.record(&self.calls.delete);
        let mut collections = self.collections.write().await;
        let collection = collection_mut(&mut collections, &request.collection_name)?;

        match request.points.and_then(|p| p.points_selector_one_of) {
            Some(PointsSelectorOneOf::Points(list)) => {
                for id in &list.ids {
                    collection.points.remove(&id_key(id));
                }
            }
            Some(PointsSelectorOneOf::Filter(filter)) => {
                collection
                    .points
                    .retain(|_, point| !matches_filter(&filter, point));
            }
            None => {}
        }
        Ok(())
    }

    async fn search_points(&self, request: SearchPoints) -> ClientResult<Vec<ScoredPoint>> {
        self.record(&self.calls.search);
        *self.last_search.write().await = Some(request.clone());

        let collections = self.collections.read().await;
        let collection = collection_ref(&collections, &request.collection_name)?;
        let name = request.vector_name.as_deref().unwrap_or(UNNAMED);

        let ranked = rank(
            collection,
            name,
            &request.vector,
            request.filter.as_ref(),
        );
        let with_vectors = wants_vectors(request.with_vectors.as_ref());

        Ok(ranked
            .into_iter()
            .filter(|(_, score)| request.score_threshold.is_none_or(|t| *score >= t))
            .skip(request.offset.unwrap_or(0) as usize)
            .take(request.limit as usize)
            .map(|(point, score)| scored(point, score, with_vectors))
            .collect())
    }

    async fn scroll_points(
        &self,
        request: ScrollPoints,
    ) -> ClientResult<(Vec<RetrievedPoint>, Option<PointId>)> {
        self.record(&self.calls.scroll);

        let collections = self.collections.read().await;
        let collection = collection_ref(&collections, &request.collection_name)?;
        let with_vectors = wants_vectors(request.with_vectors.as_ref());
        let limit = request.limit.unwrap_or(10) as usize;

        let mut matching: Vec<&StoredPoint> = collection
            .points
            .values()
            .filter(|p| request.filter.as_ref().is_none_or(|f| matches_filter(f, p)))
            .collect();

        if let Some(order_by) = &request.order_by {
            let ascending = order_by.direction.is_none_or(|d| d == 0);
            matching.sort_by(|a, b| {
                let a = number_of(a.payload.get(&order_by.key));
                let b = number_of(b.payload.get(&order_by.key));
                let ordering = a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal);
                if ascending { ordering } else { ordering.reverse() }
            });

            // Ordered scrolls are not paginated by offset.
            let points = matching
                .into_iter()
                .take(limit)
                .map(|p| retrieved(p, with_vectors))
                .collect();
            return Ok((points, None));
        }

        let start = request.offset.as_ref().map(id_key);
        let mut remaining = matching
            .into_iter()
            .filter(|p| start.as_ref().is_none_or(|s| id_key(&p.id) >= *s));

        let points: Vec<_> = remaining
            .by_ref()
            .take(limit)
            .map(|p| retrieved(p, with_vectors))
            .collect();
        let next = remaining.next().map(|p| p.id.clone());

        Ok((points, next))
    }

    async fn query_points(&self, request: QueryPoints) -> ClientResult<Vec<ScoredPoint>> {
        self.record(&self.calls.query);
        *self.last_query.write().await = Some(request.clone());

        let collections = self.collections.read().await;
        let collection = collection_ref(&collections, &request.collection_name)?;
        let with_vectors = wants_vectors(request.with_vectors.as_ref());

        let mut fused: HashMap<String, (&StoredPoint, f32)> = HashMap::new();
        for prefetch in &request.prefetch {
            let vector = prefetch
                .query
                .as_ref()
                .and_then(nearest_vector)
                .ok_or_else(|| ClientError::other("prefetch must be a dense nearest query"))?;
            let name = prefetch.using.as_deref().unwrap_or(UNNAMED);

            let ranked = rank(collection, name, &vector, prefetch.filter.as_ref());
            let limit = prefetch.limit.unwrap_or(10) as usize;
            for (position, (point, _)) in ranked.into_iter().take(limit).enumerate() {
                let entry = fused.entry(id_key(&point.id)).or_insert((point, 0.0));
                entry.1 += 1.0 / (RRF_K + position as f32 + 1.0);
            }
        }

        let mut fused: Vec<_> = fused.into_values().collect();
        fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        Ok(fused
            .into_iter()
            .skip(request.offset.unwrap_or(0) as usize)
            .take(request.limit.unwrap_or(10) as usize)
            .map(|(point, score)| scored(point, score, with_vectors))
            .collect())
    }
}

fn collection_ref<'a>(
    collections: &'a HashMap<String, MockCollection>,
    name: &str,
) -> ClientResult<&'a MockCollection> {
    collections
        .get(name)
        .ok_or_else(|| ClientError::not_found(format!("Collection `{name}` doesn't exist!")))
}

fn collection_mut<'a>(
    collections: &'a mut HashMap<String, MockCollection>,
    name: &str,
) -> ClientResult<&'a mut MockCollection> {
    collections
        .get_mut(name)
        .ok_or_else(|| ClientError::not_found(format!("Collection `{name}` doesn't exist!")))
}

fn stored_point(point: PointStruct) -> ClientResult<StoredPoint> {
    let id = point
        .id
        .ok_or_else(|| ClientError::other("point has no id"))?;

    let vectors = match point.vectors.and_then(|v| v.vectors_options) {
        Some(vectors::VectorsOptions::Vector(vector)) => {
            #[allow(deprecated)]
            let data = vector.data;
            HashMap::from([(UNNAMED.to_owned(), data)])
        }
        Some(vectors::VectorsOptions::Vectors(named)) => named
            .vectors
            .into_iter()
            .map(|(name, vector)| {
                #[allow(deprecated)]
                let data = vector.data;
                (name, data)
            })
            .collect(),
        None => HashMap::new(),
    };

    Ok(StoredPoint {
        id,
        payload: point.payload,
        vectors,
    })
}

fn retrieved(point: &StoredPoint, with_vectors: bool) -> RetrievedPoint {
    RetrievedPoint {
        id: Some(point.id.clone()),
        payload: point.payload.clone(),
        vectors: with_vectors.then(|| vectors_output(point)),
        ..Default::default()
    }
}

fn scored(point: &StoredPoint, score: f32, with_vectors: bool) -> ScoredPoint {
    ScoredPoint {
        id: Some(point.id.clone()),
        payload: point.payload.clone(),
        score,
        vectors: with_vectors.then(|| vectors_output(point)),
        ..Default::default()
    }
}

fn vectors_output(point: &StoredPoint) -> VectorsOutput {
    #[allow(deprecated)]
    let output = |data: &Vec<f32>| VectorOutput {
        data: data.clone(),
        ..Default::default()
    };

    let options = match point.vectors.get(UNNAMED) {
        Some(data) => vectors_output::VectorsOptions::Vector(output(data)),
        None => vectors_output::VectorsOptions::Vectors(NamedVectorsOutput {
            vectors: point
                .vectors
                .iter()
                .map(|(name, data)| (name.clone(), output(data)))
                .collect(),
        }),
    };

    VectorsOutput {
        vectors_options: Some(options),
    }
}

fn wants_vectors(selector: Option<&WithVectorsSelector>) -> bool {
    match selector.and_then(|s| s.selector_options.as_ref()) {
        Some(SelectorOptions::Enable(enabled)) => *enabled,
        Some(SelectorOptions::Include(_)) => true,
        None => false,
    }
}

fn nearest_vector(query: &qdrant_client::qdrant::Query) -> Option<Vec<f32>> {
    match &query.variant {
        Some(query::Variant::Nearest(input)) => match &input.variant {
            Some(vector_input::Variant::Dense(dense)) => Some(dense.data.clone()),
            _ => None,
        },
        _ => None,
    }
}

/// Ranks the points holding the named vector by cosine similarity.
fn rank<'a>(
    collection: &'a MockCollection,
    name: &str,
    query: &[f32],
    filter: Option<&Filter>,
) -> Vec<(&'a StoredPoint, f32)> {
    let mut ranked: Vec<_> = collection
        .points
        .values()
        .filter(|p| filter.is_none_or(|f| matches_filter(f, p)))
        .filter_map(|p| p.vectors.get(name).map(|v| (p, cosine(query, v))))
        .collect();

    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    ranked
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Orders numeric and UUID ids in a stable, comparable form.
fn id_key(id: &PointId) -> String {
    match &id.point_id_options {
        Some(PointIdOptions::Num(n)) => format!("n:{n:020}"),
        Some(PointIdOptions::Uuid(s)) => format!("u:{s}"),
        None => String::new(),
    }
}

fn matches_filter(filter: &Filter, point: &StoredPoint) -> bool {
    filter.must.iter().all(|c| matches_condition(c, point))
        && (filter.should.is_empty() || filter.should.iter().any(|c| matches_condition(c, point)))
        && !filter.must_not.iter().any(|c| matches_condition(c, point))
}

fn matches_condition(condition: &Condition, point: &StoredPoint) -> bool {
    match &condition.condition_one_of {
        Some(ConditionOneOf::Field(field)) => matches_field(field, point),
        Some(ConditionOneOf::IsNull(is_null)) => point
            .payload
            .get(&is_null.key)
            .is_some_and(|v| matches!(v.kind, Some(Kind::NullValue(_)) | None)),
        // Missing, null and empty-array values all count as empty.
        Some(ConditionOneOf::IsEmpty(is_empty)) => {
            point.payload.get(&is_empty.key).is_none_or(|v| match &v.kind {
                Some(Kind::NullValue(_)) | None => true,
                Some(Kind::ListValue(list)) => list.values.is_empty(),
                _ => false,
            })
        }
        Some(ConditionOneOf::HasId(has_id)) => has_id.has_id.contains(&point.id),
        Some(ConditionOneOf::Filter(filter)) => matches_filter(filter, point),
        _ => false,
    }
}

fn matches_field(field: &FieldCondition, point: &StoredPoint) -> bool {
    let Some(value) = point.payload.get(&field.key) else {
        return false;
    };

    // Conditions on arrays hold when any element satisfies them.
    let values: Vec<&Value> = match &value.kind {
        Some(Kind::ListValue(list)) => list.values.iter().collect(),
        _ => vec![value],
    };

    if let Some(match_value) = field.r#match.as_ref().and_then(|m| m.match_value.as_ref()) {
        return values.iter().any(|v| matches_value(match_value, v));
    }

    if let Some(range) = &field.range {
        return values.iter().any(|v| {
            let Some(x) = number_of(Some(v)) else {
                return false;
            };
            range.gt.is_none_or(|b| x > b)
                && range.gte.is_none_or(|b| x >= b)
                && range.lt.is_none_or(|b| x < b)
                && range.lte.is_none_or(|b| x <= b)
        });
    }

    false
}

fn matches_value(match_value: &MatchValue, value: &Value) -> bool {
    match (match_value, &value.kind) {
        (MatchValue::Keyword(expected), Some(Kind::StringValue(s))) => s == expected,
        (MatchValue::Integer(expected), Some(Kind::IntegerValue(i))) => i == expected,
        (MatchValue::Boolean(expected), Some(Kind::BoolValue(b))) => b == expected,
        (MatchValue::Text(text), Some(Kind::StringValue(s))) => {
            s.to_lowercase().contains(&text.to_lowercase())
        }
        (MatchValue::Keywords(expected), Some(Kind::StringValue(s))) => {
            expected.strings.contains(s)
        }
        (MatchValue::Integers(expected), Some(Kind::IntegerValue(i))) => {
            expected.integers.contains(i)
        }
        _ => false,
    }
}

fn number_of(value: Option<&Value>) -> Option<f64> {
    match value.and_then(|v| v.kind.as_ref()) {
        Some(Kind::IntegerValue(i)) => Some(*i as f64),
        Some(Kind::DoubleValue(f)) => Some(*f),
        _ => None,
    }
}
