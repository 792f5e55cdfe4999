//! Qdrant vector store.

use std::sync::Arc;

use async_trait::async_trait;
use qdrant_client::Qdrant;
use recordstore_core::{OperationContext, Record, Result, VectorStore};

use crate::client::QdrantClient;
use crate::collection::QdrantCollection;
use crate::mapper::QdrantKey;
use crate::options::QdrantCollectionOptions;
use crate::{STORE_SYSTEM, TRACING_TARGET_COLLECTIONS};

/// Entry point for the collections of one Qdrant instance.
#[derive(Debug)]
pub struct QdrantVectorStore<C = Qdrant> {
    client: Arc<C>,
}

impl<C> Clone for QdrantVectorStore<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
        }
    }
}

impl<C: QdrantClient> QdrantVectorStore<C> {
    /// Creates a store over a shared client.
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    /// Returns a typed collection handle.
    ///
    /// No request is made; the collection may or may not exist yet.
    pub fn collection<K, R>(
        &self,
        name: impl Into<String>,
        options: QdrantCollectionOptions,
    ) -> Result<QdrantCollection<K, R, C>>
    where
        K: QdrantKey,
        R: Record,
    {
        QdrantCollection::new(Arc::clone(&self.client), name, options)
    }

    fn context(&self, collection: &str) -> OperationContext {
        OperationContext::new(STORE_SYSTEM, collection)
    }
}

#[async_trait]
impl<C: QdrantClient> VectorStore for QdrantVectorStore<C> {
    fn store_system(&self) -> &'static str {
        STORE_SYSTEM
    }

    async fn list_collection_names(&self) -> Result<Vec<String>> {
        let names = self
            .context("")
            .run("list_collection_names", self.client.list_collections())
            .await?;

        tracing::debug!(
            target: TRACING_TARGET_COLLECTIONS,
            count = names.len(),
            "Listed collections"
        );

        Ok(names)
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        self.context(name)
            .run("collection_exists", self.client.collection_exists(name))
            .await
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        match self.client.delete_collection(name).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(self.context(name).wrap("delete_collection", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use recordstore_core::{DynamicRecord, KeyProperty, PropertyType, RecordDefinition, VectorProperty};

    use super::*;
    use crate::mock::MockQdrantClient;

    fn options() -> QdrantCollectionOptions {
        QdrantCollectionOptions::default().with_definition(
            RecordDefinition::new()
                .key(KeyProperty::new("id", PropertyType::UInt64))
                .vector(VectorProperty::float32("embedding", 2)),
        )
    }

    #[tokio::test]
    async fn lists_and_deletes_collections() {
        use recordstore_core::VectorStoreCollection;

        let store = QdrantVectorStore::new(Arc::new(MockQdrantClient::new()));
        for name in ["b", "a"] {
            store
                .collection::<u64, DynamicRecord>(name, options())
                .unwrap()
                .create_collection()
                .await
                .unwrap();
        }

        assert_eq!(store.list_collection_names().await.unwrap(), ["a", "b"]);
        assert!(store.collection_exists("a").await.unwrap());

        store.delete_collection("a").await.unwrap();
        store.delete_collection("a").await.unwrap();
        assert!(!store.collection_exists("a").await.unwrap());
    }

    #[test]
    fn dynamic_records_need_a_definition() {
        let store = QdrantVectorStore::new(Arc::new(MockQdrantClient::new()));
        let result =
            store.collection::<u64, DynamicRecord>("a", QdrantCollectionOptions::default());
        assert!(matches!(result, Err(recordstore_core::Error::ModelValidation(_))));
    }
}
