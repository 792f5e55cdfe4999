//! Collection and store contracts shared by all back-ends.

use std::future::Future;

use async_trait::async_trait;
use futures::StreamExt;
use futures::future::join_all;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::TRACING_TARGET_COLLECTION;
use crate::embedding::Embedding;
use crate::error::{BoxedError, Error, Result, VectorStoreOperationError};
use crate::filter::FilterExpr;
use crate::model::{DistanceFunction, Record, RecordModel};
use crate::options::{
    FilteredRecordOptions, GetRecordOptions, HybridSearchOptions, VectorSearchOptions,
};

/// Stream of results produced by searches and filtered reads.
pub type ResultStream<T> = BoxStream<'static, Result<T>>;

/// A record returned by a search, with the store-reported score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult<R> {
    /// The matching record.
    pub record: R,
    /// Similarity or ranking score, when the store reports one.
    pub score: Option<f64>,
}

impl<R> SearchResult<R> {
    /// Creates a search result.
    pub fn new(record: R, score: Option<f64>) -> Self {
        Self { record, score }
    }
}

/// Query input of a vector search.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchInput {
    /// A precomputed query vector.
    Vector(Embedding),
    /// Text to embed with the target property's generator.
    Text(String),
}

impl From<Embedding> for SearchInput {
    fn from(value: Embedding) -> Self {
        Self::Vector(value)
    }
}

impl From<Vec<f32>> for SearchInput {
    fn from(value: Vec<f32>) -> Self {
        Self::Vector(Embedding::Float32(value))
    }
}

impl From<&str> for SearchInput {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for SearchInput {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// One page of a paged store response.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Items of the page.
    pub items: Vec<T>,
    /// Token for the next page, absent on the last page.
    pub continuation: Option<String>,
}

impl<T> Page<T> {
    /// Creates a page.
    pub fn new(items: Vec<T>, continuation: Option<String>) -> Self {
        Self {
            items,
            continuation,
        }
    }

    /// Creates the last page of a response.
    pub fn last(items: Vec<T>) -> Self {
        Self::new(items, None)
    }
}

/// Turns a page fetcher into a stream of items.
///
/// `fetch` receives the continuation token of the previous page and is
/// awaited once per page, only when the consumer asks for more items.
pub fn paged<T, F, Fut>(mut fetch: F) -> ResultStream<T>
where
    T: Send + 'static,
    F: FnMut(Option<String>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Page<T>>> + Send + 'static,
{
    Box::pin(async_stream::try_stream! {
        let mut continuation = None;
        loop {
            let page = fetch(continuation.take()).await?;
            for item in page.items {
                yield item;
            }

            match page.continuation {
                Some(next) => continuation = Some(next),
                None => break,
            }
        }
    })
}

/// Rejects a zero result count before any request is made.
pub fn validate_top(top: usize) -> Result<()> {
    if top == 0 {
        return Err(Error::configuration("top must be at least 1"));
    }
    Ok(())
}

/// Returns true when a score satisfies a threshold for the distance function.
///
/// Euclidean distances pass when at most the threshold, similarities when at least it.
pub fn score_passes(
    distance_function: DistanceFunction,
    score: Option<f64>,
    threshold: Option<f64>,
) -> bool {
    match (score, threshold) {
        (Some(score), Some(threshold)) => match distance_function {
            DistanceFunction::Euclidean => score <= threshold,
            DistanceFunction::Cosine | DistanceFunction::DotProduct => score >= threshold,
        },
        _ => true,
    }
}

/// Passes a mapped record through, or logs and drops a mapping failure.
///
/// Any other error is returned.
pub fn skip_unmapped<T>(collection: &str, result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(record) => Ok(Some(record)),
        Err(e @ Error::Mapping(_)) => {
            tracing::warn!(
                target: TRACING_TARGET_COLLECTION,
                collection = %collection,
                error = %e,
                "Skipping stored document that failed to map"
            );
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Collects a batch read, skipping records that fail to map.
pub async fn collect_mapped<T>(collection: &str, mut results: ResultStream<T>) -> Result<Vec<T>> {
    let mut records = Vec::new();
    while let Some(result) = results.next().await {
        if let Some(record) = skip_unmapped(collection, result)? {
            records.push(record);
        }
    }
    Ok(records)
}

/// Identifies the collection a store call belongs to and wraps its failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationContext {
    /// Name of the store system.
    pub store_system: &'static str,
    /// Name of the database, account or instance, when known.
    pub store_name: Option<String>,
    /// Name of the collection.
    pub collection: String,
}

impl OperationContext {
    /// Creates a context for a collection.
    pub fn new(store_system: &'static str, collection: impl Into<String>) -> Self {
        Self {
            store_system,
            store_name: None,
            collection: collection.into(),
        }
    }

    /// Sets the store name.
    pub fn with_store_name(mut self, store_name: impl Into<String>) -> Self {
        self.store_name = Some(store_name.into());
        self
    }

    /// Wraps a client failure into [`Error::Operation`].
    pub fn wrap(&self, operation: &'static str, err: impl Into<BoxedError>) -> Error {
        let source = err.into();

        tracing::error!(
            target: TRACING_TARGET_COLLECTION,
            store = self.store_system,
            collection = %self.collection,
            operation = operation,
            error = %source,
            "Store operation failed"
        );

        Error::Operation(VectorStoreOperationError {
            store_system: self.store_system,
            store_name: self.store_name.clone(),
            collection: self.collection.clone(),
            operation,
            source,
        })
    }

    /// Awaits a client call, wrapping its failure.
    pub async fn run<T, E, F>(&self, operation: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, E>>,
        E: Into<BoxedError>,
    {
        call.await.map_err(|e| self.wrap(operation, e))
    }
}

/// A named collection of records bound to one record model.
///
/// Native client failures surface as [`Error::Operation`]; validation and
/// configuration errors are raised before any request is made.
#[async_trait]
pub trait VectorStoreCollection<K, R>: Send + Sync
where
    K: Send + Sync + 'static,
    R: Record,
{
    /// Returns the collection name.
    fn name(&self) -> &str;

    /// Returns the record model the collection is bound to.
    fn model(&self) -> &RecordModel;

    /// Returns true if the collection exists in the store.
    async fn collection_exists(&self) -> Result<bool>;

    /// Creates the collection; fails if it already exists.
    async fn create_collection(&self) -> Result<()>;

    /// Creates the collection unless it already exists.
    async fn create_collection_if_not_exists(&self) -> Result<()> {
        if !self.collection_exists().await? {
            self.create_collection().await?;
        }
        Ok(())
    }

    /// Deletes the collection; a missing collection is not an error.
    async fn delete_collection(&self) -> Result<()>;

    /// Inserts or replaces a record and returns its key.
    async fn upsert(&self, record: &R) -> Result<K>;

    /// Upserts records concurrently.
    ///
    /// Each record succeeds or fails on its own; results follow input order.
    async fn upsert_many(&self, records: &[R]) -> Vec<Result<K>> {
        join_all(records.iter().map(|record| self.upsert(record))).await
    }

    /// Reads a record; a missing record is `None`.
    async fn get(&self, key: &K, options: GetRecordOptions) -> Result<Option<R>>;

    /// Reads the records that exist among `keys`, without duplicates.
    ///
    /// The order of the returned records is unspecified. A stored document
    /// that fails to map is logged and left out; it does not discard the
    /// other records. Store failures fail the whole read.
    async fn get_many(&self, keys: &[K], options: GetRecordOptions) -> Result<Vec<R>>;

    /// Deletes a record; a missing record is not an error.
    async fn delete(&self, key: &K) -> Result<()>;

    /// Deletes records; missing records are not an error.
    async fn delete_many(&self, keys: &[K]) -> Result<()>;

    /// Searches for the records closest to the input.
    async fn search(
        &self,
        input: SearchInput,
        top: usize,
        options: VectorSearchOptions,
    ) -> Result<ResultStream<SearchResult<R>>>;

    /// Reads up to `top` records matching a filter.
    async fn get_filtered(
        &self,
        filter: FilterExpr,
        top: usize,
        options: FilteredRecordOptions,
    ) -> Result<ResultStream<R>>;
}

/// Collections that combine vector similarity with keyword matching.
#[async_trait]
pub trait KeywordHybridSearch<R: Record>: Send + Sync {
    /// Ranks records by vector similarity fused with keyword relevance.
    async fn hybrid_search(
        &self,
        input: SearchInput,
        keywords: Vec<String>,
        top: usize,
        options: HybridSearchOptions,
    ) -> Result<ResultStream<SearchResult<R>>>;
}

/// A store holding many collections.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Returns the name of the store system.
    fn store_system(&self) -> &'static str;

    /// Lists the names of all collections.
    async fn list_collection_names(&self) -> Result<Vec<String>>;

    /// Returns true if the named collection exists.
    async fn collection_exists(&self, name: &str) -> Result<bool>;

    /// Deletes the named collection; a missing collection is not an error.
    async fn delete_collection(&self, name: &str) -> Result<()>;
}
