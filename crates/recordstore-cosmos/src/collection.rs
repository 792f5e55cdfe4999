//! Cosmos record collection.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use futures::{StreamExt, TryStreamExt, future};
use recordstore_core::cancel::{cancellable, cancellable_stream};
use recordstore_core::mapper::resolve_search_vector;
use recordstore_core::{
    ClientResult, CompositeKey, Error, FilterExpr, FilteredRecordOptions, GetRecordOptions,
    HybridSearchOptions, KeywordHybridSearch, OperationContext, Record, RecordModel,
    RecordModelBuilder, Result, ResultStream, SearchInput, SearchResult, VectorSearchOptions,
    VectorStoreCollection, collect_mapped, paged, score_passes, validate_top,
};
use serde_json::Value;

use crate::client::{CosmosClient, QueryDefinition};
use crate::container::ContainerProperties;
use crate::key::CosmosKey;
use crate::mapper::CosmosMapper;
use crate::options::CosmosCollectionOptions;
use crate::query::{CosmosQueryBuilder, VectorQuery};
use crate::{STORE_SYSTEM, TRACING_TARGET_COLLECTIONS, TRACING_TARGET_ITEMS, TRACING_TARGET_QUERY};

/// A collection of records stored as items of a Cosmos container.
///
/// Keys are item ids (`String`) or [`CompositeKey`]s when the partition key
/// is a property other than the key. The client is shared with the caller.
pub struct CosmosCollection<K, R, C> {
    client: Arc<C>,
    name: String,
    mapper: CosmosMapper,
    context: OperationContext,
    _marker: PhantomData<fn() -> (K, R)>,
}

impl<K, R, C> std::fmt::Debug for CosmosCollection<K, R, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CosmosCollection")
            .field("name", &self.name)
            .field("partition_field", &self.mapper.partition_field())
            .finish_non_exhaustive()
    }
}

impl<K, R, C> CosmosCollection<K, R, C>
where
    K: CosmosKey,
    R: Record,
    C: CosmosClient,
{
    /// Creates a collection handle and builds its record model.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for an empty name, or when a `String`
    /// key is combined with a partition key other than the key itself, and
    /// [`Error::ModelValidation`] when the record model is invalid for Cosmos.
    pub fn new(
        client: Arc<C>,
        name: impl Into<String>,
        options: CosmosCollectionOptions,
    ) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::configuration("collection name cannot be empty"));
        }
        options.validate()?;

        let mut builder = RecordModelBuilder::new(options.model_building_options())
            .with_serializer_options(options.serializer_options.clone());
        if let Some(partition) = &options.partition_key_property {
            builder = builder.with_partition_key(partition.clone());
        }
        let model = builder.build::<R>(
            options.definition.as_ref(),
            options.embedding_generator.clone(),
        )?;

        let partitioned = model
            .partition_key
            .as_deref()
            .is_some_and(|partition| partition != model.key.name);
        if partitioned && !K::HAS_PARTITION {
            return Err(Error::configuration(format!(
                "collection '{name}' is partitioned by a property other than its key, \
                 use CompositeKey keys to address its items"
            )));
        }

        let context =
            OperationContext::new(STORE_SYSTEM, name.clone()).with_store_name(client.database_name());
        let mapper = CosmosMapper::new(Arc::new(model));

        tracing::debug!(
            target: TRACING_TARGET_COLLECTIONS,
            collection = %name,
            partition_field = mapper.partition_field(),
            "Created collection handle"
        );

        Ok(Self {
            client,
            name,
            mapper,
            context,
            _marker: PhantomData,
        })
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    fn composite(key: &K) -> Result<CompositeKey> {
        let key = key.to_composite();
        key.validate()?;
        Ok(key)
    }

    fn composites(keys: &[K]) -> Result<Vec<CompositeKey>> {
        let mut composites = Vec::with_capacity(keys.len());
        for key in keys {
            let key = Self::composite(key)?;
            if !composites.contains(&key) {
                composites.push(key);
            }
        }
        Ok(composites)
    }

    /// Treats a missing container or item as success for idempotent removals.
    fn ignore_not_found(&self, operation: &'static str, result: ClientResult<()>) -> Result<()> {
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                tracing::debug!(
                    target: TRACING_TARGET_ITEMS,
                    collection = %self.name,
                    operation = operation,
                    "Target does not exist, nothing to remove"
                );
                Ok(())
            }
            Err(e) => Err(self.context.wrap(operation, e)),
        }
    }

    async fn delete_item(&self, key: &CompositeKey) -> Result<()> {
        let result = self
            .client
            .delete_item(&self.name, &key.record_key, &key.partition_key)
            .await;
        self.ignore_not_found("delete", result)
    }

    /// Streams every item a query returns, following continuations.
    fn items(&self, query: QueryDefinition, operation: &'static str) -> ResultStream<Value> {
        let client = Arc::clone(&self.client);
        let context = self.context.clone();
        let name = self.name.clone();

        paged(move |continuation| {
            let client = Arc::clone(&client);
            let context = context.clone();
            let name = name.clone();
            let query = query.clone();
            async move {
                context
                    .run(operation, client.query_items(&name, query, continuation))
                    .await
            }
        })
    }

    fn scored(
        &self,
        items: ResultStream<Value>,
        score_alias: String,
        include_vectors: bool,
    ) -> ResultStream<SearchResult<R>> {
        let mapper = self.mapper.clone();
        items
            .map(move |item| {
                let (record, score) =
                    mapper.from_item::<R>(item?, Some(score_alias.as_str()), include_vectors)?;
                Ok(SearchResult::new(record, score))
            })
            .boxed()
    }
}

#[async_trait]
impl<K, R, C> VectorStoreCollection<K, R> for CosmosCollection<K, R, C>
where
    K: CosmosKey,
    R: Record,
    C: CosmosClient,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &RecordModel {
        self.mapper.model()
    }

    async fn collection_exists(&self) -> Result<bool> {
        self.context
            .run("collection_exists", self.client.container_exists(&self.name))
            .await
    }

    #[tracing::instrument(skip_all, target = TRACING_TARGET_COLLECTIONS, fields(collection = %self.name))]
    async fn create_collection(&self) -> Result<()> {
        let partition_path = format!("/{}", self.mapper.partition_field());
        let properties =
            ContainerProperties::for_model(&self.name, self.mapper.model(), &partition_path)?;

        self.context
            .run("create_collection", self.client.create_container(properties))
            .await?;

        tracing::info!(
            target: TRACING_TARGET_COLLECTIONS,
            collection = %self.name,
            partition_path = %partition_path,
            "Container created"
        );

        Ok(())
    }

    #[tracing::instrument(skip_all, target = TRACING_TARGET_COLLECTIONS, fields(collection = %self.name))]
    async fn delete_collection(&self) -> Result<()> {
        let result = self.client.delete_container(&self.name).await;
        self.ignore_not_found("delete_collection", result)
    }

    #[tracing::instrument(skip_all, target = TRACING_TARGET_ITEMS, fields(collection = %self.name))]
    async fn upsert(&self, record: &R) -> Result<K> {
        let (key, item) = self.mapper.to_item(record).await?;

        self.context
            .run(
                "upsert",
                self.client.upsert_item(&self.name, &key.partition_key, item),
            )
            .await?;

        tracing::debug!(
            target: TRACING_TARGET_ITEMS,
            collection = %self.name,
            key = %key,
            "Upserted item"
        );

        Ok(K::from_composite(key))
    }

    async fn get(&self, key: &K, options: GetRecordOptions) -> Result<Option<R>> {
        let key = Self::composite(key)?;
        let result = self
            .client
            .read_item(&self.name, &key.record_key, &key.partition_key)
            .await;

        match result {
            Ok(item) => {
                let (record, _) = self
                    .mapper
                    .from_item::<R>(item, None, options.include_vectors)?;
                Ok(Some(record))
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(self.context.wrap("get", e)),
        }
    }

    #[tracing::instrument(skip_all, target = TRACING_TARGET_ITEMS, fields(collection = %self.name, keys = keys.len()))]
    async fn get_many(&self, keys: &[K], options: GetRecordOptions) -> Result<Vec<R>> {
        let keys = Self::composites(keys)?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let query = CosmosQueryBuilder::new(self.mapper.model())
            .get_by_keys(&keys, options.include_vectors);
        let mapper = self.mapper.clone();
        let include_vectors = options.include_vectors;
        let records = self
            .items(query, "get_many")
            .map(move |item| {
                let (record, _) = mapper.from_item::<R>(item?, None, include_vectors)?;
                Ok(record)
            })
            .boxed();

        collect_mapped(&self.name, records).await
    }

    async fn delete(&self, key: &K) -> Result<()> {
        let key = Self::composite(key)?;
        self.delete_item(&key).await
    }

    #[tracing::instrument(skip_all, target = TRACING_TARGET_ITEMS, fields(collection = %self.name, keys = keys.len()))]
    async fn delete_many(&self, keys: &[K]) -> Result<()> {
        let keys = Self::composites(keys)?;
        try_join_all(keys.iter().map(|key| self.delete_item(key))).await?;
        Ok(())
    }

    #[tracing::instrument(skip_all, target = TRACING_TARGET_QUERY, fields(collection = %self.name, top = top))]
    async fn search(
        &self,
        input: SearchInput,
        top: usize,
        options: VectorSearchOptions,
    ) -> Result<ResultStream<SearchResult<R>>> {
        validate_top(top)?;

        let model = self.mapper.model();
        let property = model.resolve_vector_property(options.vector_property.as_deref())?;
        let filter = options.effective_filter();
        let vector = cancellable(
            options.cancellation.as_ref(),
            "search",
            resolve_search_vector(property, input),
        )
        .await?;

        let builder = CosmosQueryBuilder::new(model);
        let query = builder.vector_search(VectorQuery {
            vector_field: &property.storage_name,
            vector: vector.to_json(),
            filter: filter.as_deref(),
            top,
            skip: options.skip,
            include_vectors: options.include_vectors,
        })?;

        let distance_function = property.distance_function;
        let threshold = options.score_threshold;
        let stream = self
            .scored(
                self.items(query, "search"),
                builder.score_alias().to_owned(),
                options.include_vectors,
            )
            .try_filter(move |result| {
                future::ready(score_passes(distance_function, result.score, threshold))
            })
            .boxed();

        Ok(cancellable_stream(stream, options.cancellation, "search"))
    }

    #[tracing::instrument(skip_all, target = TRACING_TARGET_QUERY, fields(collection = %self.name, top = top))]
    async fn get_filtered(
        &self,
        filter: FilterExpr,
        top: usize,
        options: FilteredRecordOptions,
    ) -> Result<ResultStream<R>> {
        validate_top(top)?;

        let query = CosmosQueryBuilder::new(self.mapper.model()).filtered(
            &filter,
            &options.order_by,
            top,
            options.skip,
            options.include_vectors,
        )?;

        let mapper = self.mapper.clone();
        let include_vectors = options.include_vectors;
        let stream = self
            .items(query, "get_filtered")
            .map(move |item| {
                let (record, _) = mapper.from_item::<R>(item?, None, include_vectors)?;
                Ok(record)
            })
            .boxed();

        Ok(cancellable_stream(stream, options.cancellation, "get_filtered"))
    }
}

#[async_trait]
impl<K, R, C> KeywordHybridSearch<R> for CosmosCollection<K, R, C>
where
    K: CosmosKey,
    R: Record,
    C: CosmosClient,
{
    #[tracing::instrument(skip_all, target = TRACING_TARGET_QUERY, fields(collection = %self.name, top = top))]
    async fn hybrid_search(
        &self,
        input: SearchInput,
        keywords: Vec<String>,
        top: usize,
        options: HybridSearchOptions,
    ) -> Result<ResultStream<SearchResult<R>>> {
        validate_top(top)?;
        if keywords.is_empty() {
            return Err(Error::configuration(
                "hybrid search requires at least one keyword",
            ));
        }

        let model = self.mapper.model();
        let property = model.resolve_vector_property(options.vector_property.as_deref())?;
        let text = model.resolve_full_text_property(options.additional_property.as_deref())?;
        let filter = options.effective_filter();
        let vector = cancellable(
            options.cancellation.as_ref(),
            "hybrid_search",
            resolve_search_vector(property, input),
        )
        .await?;

        let builder = CosmosQueryBuilder::new(model);
        let query = builder.hybrid_search(
            VectorQuery {
                vector_field: &property.storage_name,
                vector: vector.to_json(),
                filter: filter.as_deref(),
                top,
                skip: options.skip,
                include_vectors: options.include_vectors,
            },
            &text.storage_name,
            &keywords,
        )?;

        let stream = self.scored(
            self.items(query, "hybrid_search"),
            builder.score_alias().to_owned(),
            options.include_vectors,
        );
        Ok(cancellable_stream(stream, options.cancellation, "hybrid_search"))
    }
}
