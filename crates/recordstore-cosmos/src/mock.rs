//! Scripted in-memory Cosmos client for testing.
//!
//! Point operations (upsert, read, delete) work against an in-memory map
//! keyed by partition token and id. Queries are not executed: each call is
//! recorded and answered with the next scripted page, or an empty last page
//! when nothing is scripted.
//!
//! # Feature Flag
//!
//! This module is only available when the `test-utils` feature is enabled:
//!
//! ```toml
//! [dev-dependencies]
//! recordstore-cosmos = { version = "...", features = ["test-utils"] }
//! ```

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use recordstore_core::{ClientError, ClientResult, Page};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::client::{CosmosClient, QueryDefinition};
use crate::container::ContainerProperties;

#[derive(Debug)]
struct MockContainer {
    properties: ContainerProperties,
    /// Items by `(partition key, id)`.
    items: BTreeMap<(String, String), Value>,
}

#[derive(Debug, Default)]
struct State {
    containers: HashMap<String, MockContainer>,
    queries: Vec<QueryDefinition>,
    continuations: Vec<Option<String>>,
    pages: VecDeque<ClientResult<Page<Value>>>,
    upsert_partitions: Vec<String>,
}

/// Number of calls per client method.
#[derive(Debug, Default)]
struct Calls {
    total: AtomicUsize,
    read: AtomicUsize,
    delete: AtomicUsize,
    query: AtomicUsize,
}

/// In-memory implementation of [`CosmosClient`].
#[derive(Debug, Clone)]
pub struct MockCosmosClient {
    database: String,
    state: Arc<Mutex<State>>,
    calls: Arc<Calls>,
}

impl Default for MockCosmosClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCosmosClient {
    /// Creates a client bound to the `test` database.
    pub fn new() -> Self {
        Self {
            database: "test".to_owned(),
            state: Arc::default(),
            calls: Arc::default(),
        }
    }

    /// Queues a page returned by the next query.
    pub async fn push_page(&self, items: Vec<Value>, continuation: Option<&str>) {
        let page = Page::new(items, continuation.map(str::to_owned));
        self.state.lock().await.pages.push_back(Ok(page));
    }

    /// Queues a failure returned by the next query.
    pub async fn push_error(&self, error: ClientError) {
        self.state.lock().await.pages.push_back(Err(error));
    }

    /// Returns every query received so far.
    pub async fn queries(&self) -> Vec<QueryDefinition> {
        self.state.lock().await.queries.clone()
    }

    /// Returns the continuation token sent with each query.
    pub async fn continuations(&self) -> Vec<Option<String>> {
        self.state.lock().await.continuations.clone()
    }

    /// Returns the partition token of every upsert, in call order.
    pub async fn upsert_partitions(&self) -> Vec<String> {
        self.state.lock().await.upsert_partitions.clone()
    }

    /// Returns the stored item, if any.
    pub async fn item(&self, container: &str, id: &str, partition_key: &str) -> Option<Value> {
        let state = self.state.lock().await;
        state
            .containers
            .get(container)?
            .items
            .get(&(partition_key.to_owned(), id.to_owned()))
            .cloned()
    }

    /// Returns the properties a container was created with.
    pub async fn container(&self, container: &str) -> Option<ContainerProperties> {
        let state = self.state.lock().await;
        state.containers.get(container).map(|c| c.properties.clone())
    }

    /// Total number of client calls.
    pub fn calls(&self) -> usize {
        self.calls.total.load(Ordering::SeqCst)
    }

    /// Number of point reads.
    pub fn read_calls(&self) -> usize {
        self.calls.read.load(Ordering::SeqCst)
    }

    /// Number of point deletes.
    pub fn delete_calls(&self) -> usize {
        self.calls.delete.load(Ordering::SeqCst)
    }

    /// Number of queries.
    pub fn query_calls(&self) -> usize {
        self.calls.query.load(Ordering::SeqCst)
    }

    fn count(&self, counter: Option<&AtomicUsize>) {
        self.calls.total.fetch_add(1, Ordering::SeqCst);
        if let Some(counter) = counter {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn missing_container(container: &str) -> ClientError {
    ClientError::not_found(format!("container '{container}' does not exist"))
}

#[async_trait]
impl CosmosClient for MockCosmosClient {
    fn database_name(&self) -> &str {
        &self.database
    }

    async fn list_containers(&self) -> ClientResult<Vec<String>> {
        self.count(None);
        let state = self.state.lock().await;
        let mut names: Vec<_> = state.containers.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn container_exists(&self, container: &str) -> ClientResult<bool> {
        self.count(None);
        Ok(self.state.lock().await.containers.contains_key(container))
    }

    async fn create_container(&self, properties: ContainerProperties) -> ClientResult<()> {
        self.count(None);
        let mut state = self.state.lock().await;
        if state.containers.contains_key(&properties.id) {
            return Err(ClientError::already_exists(format!(
                "container '{}' already exists",
                properties.id
            )));
        }

        state.containers.insert(
            properties.id.clone(),
            MockContainer {
                properties,
                items: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn delete_container(&self, container: &str) -> ClientResult<()> {
        self.count(None);
        let mut state = self.state.lock().await;
        state
            .containers
            .remove(container)
            .map(|_| ())
            .ok_or_else(|| missing_container(container))
    }

    async fn upsert_item(
        &self,
        container: &str,
        partition_key: &str,
        item: Value,
    ) -> ClientResult<()> {
        self.count(None);
        let id = item
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::other("item has no string id"))?
            .to_owned();

        let mut state = self.state.lock().await;
        state.upsert_partitions.push(partition_key.to_owned());
        let stored = state
            .containers
            .get_mut(container)
            .ok_or_else(|| missing_container(container))?;
        stored.items.insert((partition_key.to_owned(), id), item);
        Ok(())
    }

    async fn read_item(&self, container: &str, id: &str, partition_key: &str) -> ClientResult<Value> {
        self.count(Some(&self.calls.read));
        let state = self.state.lock().await;
        let stored = state
            .containers
            .get(container)
            .ok_or_else(|| missing_container(container))?;

        let mut item = stored
            .items
            .get(&(partition_key.to_owned(), id.to_owned()))
            .cloned()
            .ok_or_else(|| ClientError::not_found(format!("item '{id}' does not exist")))?;
        if let Value::Object(fields) = &mut item {
            fields.insert("_etag".to_owned(), Value::from("\"00000000\""));
            fields.insert("_ts".to_owned(), Value::from(1_700_000_000));
        }
        Ok(item)
    }

    async fn delete_item(&self, container: &str, id: &str, partition_key: &str) -> ClientResult<()> {
        self.count(Some(&self.calls.delete));
        let mut state = self.state.lock().await;
        let stored = state
            .containers
            .get_mut(container)
            .ok_or_else(|| missing_container(container))?;

        stored
            .items
            .remove(&(partition_key.to_owned(), id.to_owned()))
            .map(|_| ())
            .ok_or_else(|| ClientError::not_found(format!("item '{id}' does not exist")))
    }

    async fn query_items(
        &self,
        container: &str,
        query: QueryDefinition,
        continuation: Option<String>,
    ) -> ClientResult<Page<Value>> {
        self.count(Some(&self.calls.query));
        let mut state = self.state.lock().await;
        if !state.containers.contains_key(container) {
            return Err(missing_container(container));
        }

        state.queries.push(query);
        state.continuations.push(continuation);
        state
            .pages
            .pop_front()
            .unwrap_or_else(|| Ok(Page::last(Vec::new())))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::container::{IndexingPolicy, PartitionKeyDefinition};

    fn properties(id: &str) -> ContainerProperties {
        ContainerProperties {
            id: id.to_owned(),
            partition_key: PartitionKeyDefinition::hash("/id"),
            indexing_policy: IndexingPolicy {
                indexing_mode: Default::default(),
                automatic: true,
                included_paths: Vec::new(),
                excluded_paths: Vec::new(),
                vector_indexes: Vec::new(),
                full_text_indexes: Vec::new(),
            },
            vector_embedding_policy: None,
            full_text_policy: None,
        }
    }

    #[tokio::test]
    async fn stores_items_by_partition() {
        let client = MockCosmosClient::new();
        client.create_container(properties("c")).await.unwrap();

        client
            .upsert_item("c", "acme", json!({ "id": "k1" }))
            .await
            .unwrap();

        assert!(client.read_item("c", "k1", "acme").await.is_ok());
        assert!(client.read_item("c", "k1", "globex").await.unwrap_err().is_not_found());
        assert_eq!(client.upsert_partitions().await, ["acme"]);
    }

    #[tokio::test]
    async fn replays_scripted_pages() {
        let client = MockCosmosClient::new();
        client.create_container(properties("c")).await.unwrap();
        client.push_page(vec![json!({ "id": "a" })], Some("next")).await;

        let first = client
            .query_items("c", QueryDefinition::new("SELECT * FROM x"), None)
            .await
            .unwrap();
        assert_eq!(first.continuation.as_deref(), Some("next"));

        let second = client
            .query_items("c", QueryDefinition::new("SELECT * FROM x"), Some("next".to_owned()))
            .await
            .unwrap();
        assert!(second.items.is_empty());
        assert_eq!(client.continuations().await, [None, Some("next".to_owned())]);
    }

    #[tokio::test]
    async fn reports_missing_containers() {
        let client = MockCosmosClient::new();
        assert!(client.delete_container("c").await.unwrap_err().is_not_found());
        client.create_container(properties("c")).await.unwrap();
        let err = client.create_container(properties("c")).await.unwrap_err();
        assert_eq!(err.kind(), recordstore_core::ClientErrorKind::AlreadyExists);
    }
}
