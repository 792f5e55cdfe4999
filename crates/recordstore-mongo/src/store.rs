//! MongoDB vector store.

use std::sync::Arc;

use async_trait::async_trait;
use recordstore_core::{OperationContext, Record, Result, VectorStore};

use crate::client::MongoClient;
use crate::collection::MongoCollection;
use crate::options::MongoCollectionOptions;
use crate::{STORE_SYSTEM, TRACING_TARGET_COLLECTIONS};

/// Entry point for the collections of one MongoDB database.
#[derive(Debug)]
pub struct MongoVectorStore<C> {
    client: Arc<C>,
}

impl<C> Clone for MongoVectorStore<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
        }
    }
}

impl<C: MongoClient> MongoVectorStore<C> {
    /// Creates a store over a shared client.
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    /// Returns a typed collection handle.
    pub fn collection<R: Record>(
        &self,
        name: impl Into<String>,
        options: MongoCollectionOptions,
    ) -> Result<MongoCollection<R, C>> {
        MongoCollection::new(Arc::clone(&self.client), name, options)
    }

    fn context(&self, collection: &str) -> OperationContext {
        OperationContext::new(STORE_SYSTEM, collection).with_store_name(self.client.database_name())
    }
}

#[async_trait]
impl<C: MongoClient> VectorStore for MongoVectorStore<C> {
    fn store_system(&self) -> &'static str {
        STORE_SYSTEM
    }

    async fn list_collection_names(&self) -> Result<Vec<String>> {
        let names = self
            .context("")
            .run("list_collection_names", self.client.list_collection_names())
            .await?;

        tracing::debug!(
            target: TRACING_TARGET_COLLECTIONS,
            database = self.client.database_name(),
            count = names.len(),
            "Listed collections"
        );

        Ok(names)
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        let names = self
            .context(name)
            .run("collection_exists", self.client.list_collection_names())
            .await?;
        Ok(names.iter().any(|n| n == name))
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        match self.client.drop_collection(name).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(self.context(name).wrap("delete_collection", e)),
        }
    }
}
