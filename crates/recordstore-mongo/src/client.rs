//! MongoDB client interface.

use async_trait::async_trait;
use recordstore_core::{ClientResult, Page};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A MongoDB document in its extended JSON form.
pub type Document = Map<String, Value>;

/// Arguments of a `find` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindRequest {
    /// Query filter.
    pub filter: Document,
    /// Fields to exclude or include.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection: Option<Document>,
    /// Sort specification, `1` ascending and `-1` descending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<Document>,
    /// Number of documents to skip.
    #[serde(default)]
    pub skip: u64,
    /// Maximum number of documents, unlimited when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

/// Operations the MongoDB back-end needs from a connected database client.
///
/// The client is bound to one database and owned by the caller. Cursors are
/// exposed as pages: the continuation token identifies the open cursor.
#[async_trait]
pub trait MongoClient: Send + Sync + 'static {
    /// Name of the database the client is bound to.
    fn database_name(&self) -> &str;

    /// Lists the collection names of the database.
    async fn list_collection_names(&self) -> ClientResult<Vec<String>>;

    /// Creates a collection.
    async fn create_collection(&self, collection: &str) -> ClientResult<()>;

    /// Runs a database command such as `createIndexes`.
    async fn run_command(&self, command: Document) -> ClientResult<Document>;

    /// Drops a collection.
    async fn drop_collection(&self, collection: &str) -> ClientResult<()>;

    /// Replaces the document matching `filter`, inserting it when `upsert` is set.
    async fn replace_one(
        &self,
        collection: &str,
        filter: Document,
        replacement: Document,
        upsert: bool,
    ) -> ClientResult<()>;

    /// Runs a `find` and returns one batch of its cursor.
    async fn find(
        &self,
        collection: &str,
        request: FindRequest,
        continuation: Option<String>,
    ) -> ClientResult<Page<Document>>;

    /// Deletes every document matching `filter` and returns the count.
    async fn delete_many(&self, collection: &str, filter: Document) -> ClientResult<u64>;

    /// Runs an aggregation pipeline and returns one batch of its cursor.
    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
        continuation: Option<String>,
    ) -> ClientResult<Page<Document>>;
}
