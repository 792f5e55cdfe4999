//! Cosmos client interface.

use async_trait::async_trait;
use recordstore_core::{ClientResult, Page};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::container::ContainerProperties;

/// A named query parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryParameter {
    /// Parameter name including the leading `@`.
    pub name: String,
    /// Bound value.
    pub value: Value,
}

/// Parameterized SQL query text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryDefinition {
    /// Query text; literals only appear as parameter references.
    pub query: String,
    /// Bound parameters.
    pub parameters: Vec<QueryParameter>,
}

impl QueryDefinition {
    /// Creates a query without parameters.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            parameters: Vec::new(),
        }
    }

    /// Binds a parameter.
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.push(QueryParameter {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Looks up a bound parameter by name.
    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }
}

/// Operations the Cosmos back-end needs from a connected database client.
///
/// The client is bound to one database and owned by the caller. Missing
/// containers and items are reported with [`ClientErrorKind::NotFound`].
///
/// [`ClientErrorKind::NotFound`]: recordstore_core::ClientErrorKind::NotFound
#[async_trait]
pub trait CosmosClient: Send + Sync + 'static {
    /// Name of the database the client is bound to.
    fn database_name(&self) -> &str;

    /// Lists the container names of the database.
    async fn list_containers(&self) -> ClientResult<Vec<String>>;

    /// Returns true if the container exists.
    async fn container_exists(&self, container: &str) -> ClientResult<bool>;

    /// Creates a container.
    async fn create_container(&self, properties: ContainerProperties) -> ClientResult<()>;

    /// Deletes a container.
    async fn delete_container(&self, container: &str) -> ClientResult<()>;

    /// Inserts or replaces an item in a partition.
    async fn upsert_item(&self, container: &str, partition_key: &str, item: Value)
    -> ClientResult<()>;

    /// Reads an item by id and partition key.
    async fn read_item(&self, container: &str, id: &str, partition_key: &str)
    -> ClientResult<Value>;

    /// Deletes an item by id and partition key.
    async fn delete_item(&self, container: &str, id: &str, partition_key: &str)
    -> ClientResult<()>;

    /// Runs a cross-partition query and returns one page of results.
    async fn query_items(
        &self,
        container: &str,
        query: QueryDefinition,
        continuation: Option<String>,
    ) -> ClientResult<Page<Value>>;
}
