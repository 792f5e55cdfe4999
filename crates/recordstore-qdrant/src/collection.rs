//! Qdrant record collection.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::{Filter, PointId};
use recordstore_core::cancel::{cancellable, cancellable_stream};
use recordstore_core::mapper::resolve_search_vector;
use recordstore_core::{
    ClientResult, Error, FilterExpr, FilteredRecordOptions, GetRecordOptions, HybridSearchOptions,
    KeywordHybridSearch, OperationContext, Record, RecordModel, RecordModelBuilder, Result,
    ResultStream, SearchInput, SearchResult, VectorSearchOptions, VectorStoreCollection,
    skip_unmapped, validate_top,
};

use crate::client::QdrantClient;
use crate::filter::QdrantFilterTranslator;
use crate::mapper::{QdrantKey, QdrantMapper};
use crate::options::QdrantCollectionOptions;
use crate::query::{self, SearchParams};
use crate::{STORE_SYSTEM, TRACING_TARGET_COLLECTIONS, TRACING_TARGET_POINTS, TRACING_TARGET_SEARCH};

/// Largest page requested per scroll call.
const SCROLL_PAGE_SIZE: usize = 256;

/// A collection of records stored as Qdrant points.
///
/// Keys are `u64` or [`uuid::Uuid`] point ids. The client is shared with the
/// caller and never closed by the collection.
pub struct QdrantCollection<K, R, C = Qdrant> {
    client: Arc<C>,
    name: String,
    mapper: QdrantMapper,
    context: OperationContext,
    _marker: PhantomData<fn() -> (K, R)>,
}

impl<K, R, C> std::fmt::Debug for QdrantCollection<K, R, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantCollection")
            .field("name", &self.name)
            .field("has_named_vectors", &self.mapper.has_named_vectors())
            .finish_non_exhaustive()
    }
}

impl<K, R, C> QdrantCollection<K, R, C>
where
    K: QdrantKey,
    R: Record,
    C: QdrantClient,
{
    /// Creates a collection handle and builds its record model.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for an empty name and
    /// [`Error::ModelValidation`] when the record model is invalid for Qdrant.
    pub fn new(
        client: Arc<C>,
        name: impl Into<String>,
        options: QdrantCollectionOptions,
    ) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::configuration("collection name cannot be empty"));
        }

        let model = RecordModelBuilder::new(options.model_building_options())
            .with_serializer_options(options.serializer_options.clone())
            .build::<R>(
                options.definition.as_ref(),
                options.embedding_generator.clone(),
            )?;

        tracing::debug!(
            target: TRACING_TARGET_COLLECTIONS,
            collection = %name,
            vectors = model.vectors.len(),
            named_vectors = options.has_named_vectors,
            "Created collection handle"
        );

        Ok(Self {
            client,
            mapper: QdrantMapper::new(Arc::new(model), options.has_named_vectors),
            context: OperationContext::new(STORE_SYSTEM, name.clone()),
            name,
            _marker: PhantomData,
        })
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    fn filter(&self, expr: Option<&FilterExpr>) -> Result<Option<Filter>> {
        QdrantFilterTranslator::new(self.mapper.model()).translate_optional(expr)
    }

    fn point_ids(keys: &[K]) -> Vec<PointId> {
        let mut ids = Vec::with_capacity(keys.len());
        for key in keys {
            let id = key.to_point_id();
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }

    /// Treats a missing collection as success for idempotent removals.
    fn ignore_not_found(&self, operation: &'static str, result: ClientResult<()>) -> Result<()> {
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                tracing::debug!(
                    target: TRACING_TARGET_COLLECTIONS,
                    collection = %self.name,
                    operation = operation,
                    "Collection does not exist, nothing to remove"
                );
                Ok(())
            }
            Err(e) => Err(self.context.wrap(operation, e)),
        }
    }

    fn scored_stream(
        &self,
        points: Vec<qdrant_client::qdrant::ScoredPoint>,
        include_vectors: bool,
    ) -> ResultStream<SearchResult<R>> {
        let mapper = self.mapper.clone();
        futures::stream::iter(points)
            .map(move |point| mapper.from_scored::<K, R>(point, include_vectors))
            .boxed()
    }
}

#[async_trait]
impl<K, R, C> VectorStoreCollection<K, R> for QdrantCollection<K, R, C>
where
    K: QdrantKey,
    R: Record,
    C: QdrantClient,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &RecordModel {
        self.mapper.model()
    }

    async fn collection_exists(&self) -> Result<bool> {
        self.context
            .run("collection_exists", self.client.collection_exists(&self.name))
            .await
    }

    #[tracing::instrument(skip_all, target = TRACING_TARGET_COLLECTIONS, fields(collection = %self.name))]
    async fn create_collection(&self) -> Result<()> {
        let model = self.mapper.model();
        let request =
            query::create_collection_request(&self.name, model, self.mapper.has_named_vectors());

        self.context
            .run("create_collection", self.client.create_collection(request))
            .await?;

        let indexes = query::field_index_requests(&self.name, model);
        let index_count = indexes.len();
        for request in indexes {
            self.context
                .run("create_field_index", self.client.create_field_index(request))
                .await?;
        }

        tracing::info!(
            target: TRACING_TARGET_COLLECTIONS,
            collection = %self.name,
            payload_indexes = index_count,
            "Collection created"
        );

        Ok(())
    }

    #[tracing::instrument(skip_all, target = TRACING_TARGET_COLLECTIONS, fields(collection = %self.name))]
    async fn delete_collection(&self) -> Result<()> {
        let result = self.client.delete_collection(&self.name).await;
        self.ignore_not_found("delete_collection", result)
    }

    #[tracing::instrument(skip_all, target = TRACING_TARGET_POINTS, fields(collection = %self.name))]
    async fn upsert(&self, record: &R) -> Result<K> {
        let (key, point) = self.mapper.to_point::<K, R>(record).await?;
        let request = query::upsert_request(&self.name, vec![point]);

        self.context
            .run("upsert", self.client.upsert_points(request))
            .await?;

        tracing::debug!(
            target: TRACING_TARGET_POINTS,
            collection = %self.name,
            "Upserted point"
        );

        Ok(key)
    }

    async fn get(&self, key: &K, options: GetRecordOptions) -> Result<Option<R>> {
        let request = query::get_request(
            &self.name,
            vec![key.to_point_id()],
            options.include_vectors,
        );

        let points = self
            .context
            .run("get", self.client.get_points(request))
            .await?;

        points
            .into_iter()
            .next()
            .map(|point| {
                self.mapper
                    .from_retrieved::<K, R>(point, options.include_vectors)
            })
            .transpose()
    }

    #[tracing::instrument(skip_all, target = TRACING_TARGET_POINTS, fields(collection = %self.name, keys = keys.len()))]
    async fn get_many(&self, keys: &[K], options: GetRecordOptions) -> Result<Vec<R>> {
        let ids = Self::point_ids(keys);
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let request = query::get_request(&self.name, ids, options.include_vectors);
        let points = self
            .context
            .run("get_many", self.client.get_points(request))
            .await?;

        let mut records = Vec::with_capacity(points.len());
        for point in points {
            let result = self
                .mapper
                .from_retrieved::<K, R>(point, options.include_vectors);
            if let Some(record) = skip_unmapped(&self.name, result)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn delete(&self, key: &K) -> Result<()> {
        let request = query::delete_request(&self.name, vec![key.to_point_id()]);
        let result = self.client.delete_points(request).await;
        self.ignore_not_found("delete", result)
    }

    #[tracing::instrument(skip_all, target = TRACING_TARGET_POINTS, fields(collection = %self.name, keys = keys.len()))]
    async fn delete_many(&self, keys: &[K]) -> Result<()> {
        let ids = Self::point_ids(keys);
        if ids.is_empty() {
            return Ok(());
        }

        let request = query::delete_request(&self.name, ids);
        let result = self.client.delete_points(request).await;
        self.ignore_not_found("delete_many", result)
    }

    #[tracing::instrument(skip_all, target = TRACING_TARGET_SEARCH, fields(collection = %self.name, top = top))]
    async fn search(
        &self,
        input: SearchInput,
        top: usize,
        options: VectorSearchOptions,
    ) -> Result<ResultStream<SearchResult<R>>> {
        validate_top(top)?;

        let model = self.mapper.model();
        let property = model.resolve_vector_property(options.vector_property.as_deref())?;
        let filter = self.filter(options.effective_filter().as_deref())?;
        let vector = cancellable(
            options.cancellation.as_ref(),
            "search",
            resolve_search_vector(property, input),
        )
        .await?;

        let request = query::search_request(
            SearchParams {
                collection: &self.name,
                vector_name: self.mapper.vector_name(&property.storage_name),
                vector: vector.to_f32_vec(),
                top,
                skip: options.skip,
                filter,
                include_vectors: options.include_vectors,
            },
            options.score_threshold,
        );

        let call = self.context.run("search", self.client.search_points(request));
        let points = cancellable(options.cancellation.as_ref(), "search", call).await?;

        tracing::debug!(
            target: TRACING_TARGET_SEARCH,
            collection = %self.name,
            results = points.len(),
            "Vector search completed"
        );

        let stream = self.scored_stream(points, options.include_vectors);
        Ok(cancellable_stream(stream, options.cancellation, "search"))
    }

    #[tracing::instrument(skip_all, target = TRACING_TARGET_SEARCH, fields(collection = %self.name, top = top))]
    async fn get_filtered(
        &self,
        filter: FilterExpr,
        top: usize,
        options: FilteredRecordOptions,
    ) -> Result<ResultStream<R>> {
        validate_top(top)?;

        let model = self.mapper.model();
        let filter = QdrantFilterTranslator::new(model).translate(&filter)?;
        let order_by = match options.order_by.as_slice() {
            [] => None,
            [order] => {
                let storage_name = model.filterable_storage_name(&order.property)?;
                Some(query::order_by(storage_name, order.ascending))
            }
            _ => {
                return Err(Error::configuration(
                    "qdrant supports ordering by a single property",
                ));
            }
        };

        let client = Arc::clone(&self.client);
        let context = self.context.clone();
        let mapper = self.mapper.clone();
        let name = self.name.clone();
        let skip = options.skip;
        let include_vectors = options.include_vectors;

        let stream: ResultStream<R> = Box::pin(async_stream::try_stream! {
            let wanted = skip.saturating_add(top);
            let mut seen = 0;
            let mut offset = None;

            loop {
                let remaining = wanted - seen;
                // Ordered scrolls return a single page.
                let limit = if order_by.is_some() {
                    remaining
                } else {
                    remaining.min(SCROLL_PAGE_SIZE)
                };

                let request = query::scroll_request(
                    &name,
                    filter.clone(),
                    u32::try_from(limit).unwrap_or(u32::MAX),
                    offset.take(),
                    order_by.clone(),
                    include_vectors,
                );
                let (points, next) = context
                    .run("get_filtered", client.scroll_points(request))
                    .await?;

                for point in points {
                    seen += 1;
                    if seen <= skip {
                        continue;
                    }
                    yield mapper.from_retrieved::<K, R>(point, include_vectors)?;
                    if seen == wanted {
                        break;
                    }
                }

                match next {
                    Some(next) if seen < wanted => offset = Some(next),
                    _ => break,
                }
            }
        });

        Ok(cancellable_stream(stream, options.cancellation, "get_filtered"))
    }
}

#[async_trait]
impl<K, R, C> KeywordHybridSearch<R> for QdrantCollection<K, R, C>
where
    K: QdrantKey,
    R: Record,
    C: QdrantClient,
{
    #[tracing::instrument(skip_all, target = TRACING_TARGET_SEARCH, fields(collection = %self.name, top = top))]
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
        let filter = self.filter(options.effective_filter().as_deref())?;
        let vector = cancellable(
            options.cancellation.as_ref(),
            "hybrid_search",
            resolve_search_vector(property, input),
        )
        .await?;

        let request = query::hybrid_request(
            SearchParams {
                collection: &self.name,
                vector_name: self.mapper.vector_name(&property.storage_name),
                vector: vector.to_f32_vec(),
                top,
                skip: options.skip,
                filter,
                include_vectors: options.include_vectors,
            },
            &text.storage_name,
            &keywords,
        );

        let call = self
            .context
            .run("hybrid_search", self.client.query_points(request));
        let points = cancellable(options.cancellation.as_ref(), "hybrid_search", call).await?;

        let stream = self.scored_stream(points, options.include_vectors);
        Ok(cancellable_stream(stream, options.cancellation, "hybrid_search"))
    }
}
