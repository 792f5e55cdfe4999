//! In-memory MongoDB client for testing.
//!
//! Documents live in a shared map behind a [`tokio::sync::Mutex`]. The client
//! evaluates the filter operators the collection layer emits and runs search
//! pipelines by ranking documents with cosine similarity, whatever similarity
//! the index declares. Cursors return batches of a configurable size.
//!
//! # Feature Flag
//!
//! This module is only available when the `test-utils` feature is enabled:
//!
//! ```toml
//! [dev-dependencies]
//! recordstore-mongo = { version = "...", features = ["test-utils"] }
//! ```

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use recordstore_core::{ClientError, ClientResult, Page};
use serde_json::{Value, json};
use tokio::sync::Mutex;

use crate::client::{Document, FindRequest, MongoClient};

#[derive(Debug, Default)]
struct State {
    collections: BTreeMap<String, BTreeMap<String, Document>>,
    commands: Vec<Document>,
    finds: Vec<FindRequest>,
    pipelines: Vec<Vec<Document>>,
    cursors: HashMap<String, VecDeque<Document>>,
    next_cursor: usize,
}

impl State {
    /// Returns the first batch and parks the rest behind a cursor id.
    fn batch(&mut self, results: Vec<Document>, batch_size: usize) -> Page<Document> {
        let mut results: VecDeque<_> = results.into();
        let first: Vec<_> = results.drain(..batch_size.min(results.len())).collect();
        if results.is_empty() {
            return Page::last(first);
        }

        self.next_cursor += 1;
        let id = format!("cursor-{}", self.next_cursor);
        self.cursors.insert(id.clone(), results);
        Page::new(first, Some(id))
    }

    fn resume(&mut self, id: &str, batch_size: usize) -> ClientResult<Page<Document>> {
        let mut remaining = self
            .cursors
            .remove(id)
            .ok_or_else(|| ClientError::not_found(format!("cursor '{id}' does not exist")))?;

        let batch: Vec<_> = remaining.drain(..batch_size.min(remaining.len())).collect();
        if remaining.is_empty() {
            return Ok(Page::last(batch));
        }
        self.cursors.insert(id.to_owned(), remaining);
        Ok(Page::new(batch, Some(id.to_owned())))
    }
}

/// In-memory implementation of [`MongoClient`].
#[derive(Debug, Clone)]
pub struct MockMongoClient {
    database: String,
    batch_size: usize,
    state: Arc<Mutex<State>>,
    calls: Arc<AtomicUsize>,
}

impl Default for MockMongoClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMongoClient {
    /// Creates a client bound to the `test` database.
    pub fn new() -> Self {
        Self {
            database: "test".to_owned(),
            batch_size: 101,
            state: Arc::default(),
            calls: Arc::default(),
        }
    }

    /// Sets the number of documents per cursor batch.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Returns every command received so far.
    pub async fn commands(&self) -> Vec<Document> {
        self.state.lock().await.commands.clone()
    }

    /// Returns every find request received so far.
    pub async fn finds(&self) -> Vec<FindRequest> {
        self.state.lock().await.finds.clone()
    }

    /// Returns every pipeline received so far.
    pub async fn pipelines(&self) -> Vec<Vec<Document>> {
        self.state.lock().await.pipelines.clone()
    }

    /// Returns a stored document by key.
    pub async fn document(&self, collection: &str, id: &str) -> Option<Document> {
        let state = self.state.lock().await;
        state.collections.get(collection)?.get(id).cloned()
    }

    /// Total number of client calls.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn count(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MongoClient for MockMongoClient {
    fn database_name(&self) -> &str {
        &self.database
    }

    async fn list_collection_names(&self) -> ClientResult<Vec<String>> {
        self.count();
        Ok(self.state.lock().await.collections.keys().cloned().collect())
    }

    async fn create_collection(&self, collection: &str) -> ClientResult<()> {
        self.count();
        let mut state = self.state.lock().await;
        if state.collections.contains_key(collection) {
            return Err(ClientError::already_exists(format!(
                "collection '{collection}' already exists"
            )));
        }
        state.collections.insert(collection.to_owned(), BTreeMap::new());
        Ok(())
    }

    async fn run_command(&self, command: Document) -> ClientResult<Document> {
        self.count();
        self.state.lock().await.commands.push(command);
        Ok(as_document(json!({ "ok": 1 })))
    }

    async fn drop_collection(&self, collection: &str) -> ClientResult<()> {
        self.count();
        let mut state = self.state.lock().await;
        state
            .collections
            .remove(collection)
            .map(|_| ())
            .ok_or_else(|| ClientError::not_found(format!("ns not found: {collection}")))
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: Document,
        replacement: Document,
        upsert: bool,
    ) -> ClientResult<()> {
        self.count();
        let id = filter
            .get("_id")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::other("replace filter must select a string _id"))?
            .to_owned();

        let mut state = self.state.lock().await;
        let documents = state.collections.entry(collection.to_owned()).or_default();
        if !upsert && !documents.contains_key(&id) {
            return Ok(());
        }
        documents.insert(id, replacement);
        Ok(())
    }

    async fn find(
        &self,
        collection: &str,
        request: FindRequest,
        continuation: Option<String>,
    ) -> ClientResult<Page<Document>> {
        self.count();
        let mut state = self.state.lock().await;
        if let Some(cursor) = continuation {
            return state.resume(&cursor, self.batch_size);
        }
        state.finds.push(request.clone());

        let mut results: Vec<Document> = state
            .collections
            .get(collection)
            .map(|documents| {
                documents
                    .values()
                    .filter(|document| matches(document, &request.filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(sort) = &request.sort {
            results.sort_by(|a, b| compare_by(a, b, sort));
        }

        let limit = request.limit.map_or(usize::MAX, |limit| limit as usize);
        let results = results
            .into_iter()
            .skip(request.skip as usize)
            .take(limit)
            .map(|mut document| {
                if let Some(projection) = &request.projection {
                    exclude(&mut document, projection);
                }
                document
            })
            .collect();

        Ok(state.batch(results, self.batch_size))
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> ClientResult<u64> {
        self.count();
        let mut state = self.state.lock().await;
        let Some(documents) = state.collections.get_mut(collection) else {
            return Ok(0);
        };

        let before = documents.len();
        documents.retain(|_, document| !matches(document, &filter));
        Ok((before - documents.len()) as u64)
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
        continuation: Option<String>,
    ) -> ClientResult<Page<Document>> {
        self.count();
        let mut state = self.state.lock().await;
        if let Some(cursor) = continuation {
            return state.resume(&cursor, self.batch_size);
        }
        state.pipelines.push(pipeline.clone());

        let documents: Vec<Document> = state
            .collections
            .get(collection)
            .map(|documents| documents.values().cloned().collect())
            .unwrap_or_default();

        let mut rows: Vec<(Option<f64>, Document)> =
            documents.into_iter().map(|d| (None, d)).collect();
        for stage in &pipeline {
            rows = apply_stage(rows, stage)?;
        }

        let results = rows.into_iter().map(|(_, document)| document).collect();
        Ok(state.batch(results, self.batch_size))
    }
}

fn apply_stage(
    rows: Vec<(Option<f64>, Document)>,
    stage: &Document,
) -> ClientResult<Vec<(Option<f64>, Document)>> {
    let Some((name, body)) = stage.iter().next() else {
        return Err(ClientError::other("empty pipeline stage"));
    };

    match name.as_str() {
        "$search" => {
            let search = &body["cosmosSearch"];
            let path = search["path"].as_str().unwrap_or_default();
            let query = as_vector(&search["vector"]);
            let k = search["k"].as_u64().unwrap_or(0) as usize;
            let filter = search.get("filter").and_then(Value::as_object);

            let mut scored: Vec<_> = rows
                .into_iter()
                .filter(|(_, d)| filter.is_none_or(|f| matches(d, f)))
                .filter_map(|(_, d)| {
                    let vector = as_vector(d.get(path)?);
                    Some((Some(cosine(&query, &vector)), d))
                })
                .collect();
            scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(CmpOrdering::Equal));
            scored.truncate(k);
            Ok(scored)
        }
        "$project" => {
            let Some(body) = body.as_object() else {
                return Err(ClientError::other("$project requires a document"));
            };
            Ok(rows
                .into_iter()
                .map(|(score, mut document)| {
                    if body.values().all(|v| v == &json!(0)) {
                        exclude(&mut document, body);
                        return (score, document);
                    }

                    let projected = body
                        .iter()
                        .map(|(field, value)| {
                            let value = match value {
                                Value::String(s) if s == "$$ROOT" => Value::Object(document.clone()),
                                Value::Object(meta) if meta.contains_key("$meta") => {
                                    score.map_or(Value::Null, Value::from)
                                }
                                _ => document.get(field).cloned().unwrap_or(Value::Null),
                            };
                            (field.clone(), value)
                        })
                        .collect();
                    (score, projected)
                })
                .collect())
        }
        "$skip" => Ok(rows
            .into_iter()
            .skip(body.as_u64().unwrap_or(0) as usize)
            .collect()),
        "$limit" => Ok(rows
            .into_iter()
            .take(body.as_u64().unwrap_or(0) as usize)
            .collect()),
        other => Err(ClientError::other(format!("unsupported stage {other}"))),
    }
}

/// Evaluates a filter document against a stored document.
fn matches(document: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, condition)| match key.as_str() {
        "$and" => each(condition).all(|f| matches(document, f)),
        "$or" => each(condition).any(|f| matches(document, f)),
        "$nor" => !each(condition).any(|f| matches(document, f)),
        field => {
            let value = document.get(field);
            match condition {
                Value::Object(ops) if ops.keys().all(|k| k.starts_with('$')) => ops
                    .iter()
                    .all(|(op, argument)| operator(value, op, argument)),
                other => equals(value, other),
            }
        }
    })
}

fn each(condition: &Value) -> impl Iterator<Item = &Document> {
    condition
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

fn operator(value: Option<&Value>, op: &str, argument: &Value) -> bool {
    match op {
        "$eq" => equals(value, argument),
        "$ne" => !equals(value, argument),
        "$in" => argument
            .as_array()
            .is_some_and(|items| items.iter().any(|item| equals(value, item))),
        "$gt" => compare(value, argument) == Some(CmpOrdering::Greater),
        "$gte" => matches!(
            compare(value, argument),
            Some(CmpOrdering::Greater | CmpOrdering::Equal)
        ),
        "$lt" => compare(value, argument) == Some(CmpOrdering::Less),
        "$lte" => matches!(
            compare(value, argument),
            Some(CmpOrdering::Less | CmpOrdering::Equal)
        ),
        _ => false,
    }
}

/// Equality with array element matching and null matching missing fields.
fn equals(value: Option<&Value>, argument: &Value) -> bool {
    match value {
        None | Some(Value::Null) => argument.is_null(),
        Some(Value::Array(items)) if !argument.is_array() => {
            items.iter().any(|item| scalar_eq(item, argument))
        }
        Some(value) => scalar_eq(value, argument),
    }
}

fn scalar_eq(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    }
}

fn compare(value: Option<&Value>, argument: &Value) -> Option<CmpOrdering> {
    let value = value?;
    match (value.as_f64(), argument.as_f64()) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => match (value.as_str(), argument.as_str()) {
            (Some(a), Some(b)) => Some(a.cmp(b)),
            _ => None,
        },
    }
}

fn compare_by(a: &Document, b: &Document, sort: &Document) -> CmpOrdering {
    for (field, direction) in sort {
        let ordering = match (a.get(field), b.get(field)) {
            (Some(x), Some(y)) => compare(Some(x), y).unwrap_or(CmpOrdering::Equal),
            (None, Some(_)) => CmpOrdering::Less,
            (Some(_), None) => CmpOrdering::Greater,
            (None, None) => CmpOrdering::Equal,
        };
        let ordering = if direction.as_i64() == Some(-1) {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering != CmpOrdering::Equal {
            return ordering;
        }
    }
    CmpOrdering::Equal
}

/// Removes the fields of an exclusion projection, following one level of dots.
fn exclude(document: &mut Document, projection: &Document) {
    for field in projection.keys() {
        match field.split_once('.') {
            Some((parent, child)) => {
                if let Some(Value::Object(nested)) = document.get_mut(parent) {
                    nested.remove(child);
                }
            }
            None => {
                document.remove(field);
            }
        }
    }
}

fn as_vector(value: &Value) -> Vec<f64> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(Value::as_f64).collect())
        .unwrap_or_default()
}

fn cosine(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm = |v: &[f64]| v.iter().map(|x| x * x).sum::<f64>().sqrt();
    let denominator = norm(a) * norm(b);
    if denominator == 0.0 { 0.0 } else { dot / denominator }
}

fn as_document(value: Value) -> Document {
    match value {
        Value::Object(document) => document,
        _ => Document::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(value: Value) -> Document {
        as_document(value)
    }

    #[test]
    fn evaluates_filter_operators() {
        let document = doc(json!({ "_id": "a", "tenant": "acme", "rating": 4, "tags": ["pool"] }));

        assert!(matches(&document, &doc(json!({ "tenant": { "$eq": "acme" } }))));
        assert!(matches(&document, &doc(json!({ "tags": { "$eq": "pool" } }))));
        assert!(matches(&document, &doc(json!({ "rating": { "$gte": 4.0 } }))));
        assert!(matches(&document, &doc(json!({ "missing": { "$eq": null } }))));
        assert!(matches(
            &document,
            &doc(json!({ "$nor": [{ "_id": { "$in": ["b", "c"] } }] }))
        ));
        assert!(!matches(
            &document,
            &doc(json!({ "$and": [{ "tenant": "acme" }, { "rating": { "$lt": 4 } }] }))
        ));
    }

    #[tokio::test]
    async fn pages_find_results() {
        let client = MockMongoClient::new().with_batch_size(2);
        for id in ["a", "b", "c"] {
            client
                .replace_one("c", doc(json!({ "_id": id })), doc(json!({ "_id": id })), true)
                .await
                .unwrap();
        }

        let first = client.find("c", FindRequest::default(), None).await.unwrap();
        assert_eq!(first.items.len(), 2);

        let second = client
            .find("c", FindRequest::default(), first.continuation)
            .await
            .unwrap();
        assert_eq!(second.items.len(), 1);
        assert!(second.continuation.is_none());
    }

    #[tokio::test]
    async fn drop_of_missing_collection_is_not_found() {
        let client = MockMongoClient::new();
        assert!(client.drop_collection("c").await.unwrap_err().is_not_found());
        assert_eq!(client.delete_many("c", Document::new()).await.unwrap(), 0);
    }
}
