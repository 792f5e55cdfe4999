//! Cosmos vector store.

use std::sync::Arc;

use async_trait::async_trait;
use recordstore_core::{OperationContext, Record, Result, VectorStore};

use crate::client::CosmosClient;
use crate::collection::CosmosCollection;
use crate::key::CosmosKey;
use crate::options::CosmosCollectionOptions;
use crate::{STORE_SYSTEM, TRACING_TARGET_COLLECTIONS};

/// Entry point for the containers of one Cosmos database.
#[derive(Debug)]
pub struct CosmosVectorStore<C> {
    client: Arc<C>,
}

impl<C> Clone for CosmosVectorStore<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
        }
    }
}

impl<C: CosmosClient> CosmosVectorStore<C> {
    /// Creates a store over a shared client.
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    /// Returns a typed collection handle.
    pub fn collection<K, R>(
        &self,
        name: impl Into<String>,
        options: CosmosCollectionOptions,
    ) -> Result<CosmosCollection<K, R, C>>
    where
        K: CosmosKey,
        R: Record,
    {
        CosmosCollection::new(Arc::clone(&self.client), name, options)
    }

    fn context(&self, container: &str) -> OperationContext {
        OperationContext::new(STORE_SYSTEM, container).with_store_name(self.client.database_name())
    }
}

#[async_trait]
impl<C: CosmosClient> VectorStore for CosmosVectorStore<C> {
    fn store_system(&self) -> &'static str {
        STORE_SYSTEM
    }

    async fn list_collection_names(&self) -> Result<Vec<String>> {
        let names = self
            .context("")
            .run("list_collection_names", self.client.list_containers())
            .await?;

        tracing::debug!(
            target: TRACING_TARGET_COLLECTIONS,
            database = self.client.database_name(),
            count = names.len(),
            "Listed containers"
        );

        Ok(names)
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        self.context(name)
            .run("collection_exists", self.client.container_exists(name))
            .await
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        match self.client.delete_container(name).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(self.context(name).wrap("delete_collection", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use recordstore_core::{
        DynamicRecord, KeyProperty, PropertyType, RecordDefinition, VectorStoreCollection,
    };

    use super::*;
    use crate::mock::MockCosmosClient;

    #[tokio::test]
    async fn lists_and_deletes_containers() {
        let store = CosmosVectorStore::new(Arc::new(MockCosmosClient::new()));
        let options = CosmosCollectionOptions::default().with_definition(
            RecordDefinition::new().key(KeyProperty::new("id", PropertyType::String)),
        );

        for name in ["notes", "hotels"] {
            store
                .collection::<String, DynamicRecord>(name, options.clone())
                .unwrap()
                .create_collection()
                .await
                .unwrap();
        }

        assert_eq!(store.list_collection_names().await.unwrap(), ["hotels", "notes"]);

        store.delete_collection("notes").await.unwrap();
        store.delete_collection("notes").await.unwrap();
        assert!(!store.collection_exists("notes").await.unwrap());
        assert_eq!(store.store_system(), "azure_cosmosdb_nosql");
    }
}
