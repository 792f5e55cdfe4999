//! MongoDB record collection.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, future};
use recordstore_core::cancel::{cancellable, cancellable_stream};
use recordstore_core::mapper::resolve_search_vector;
use recordstore_core::{
    ClientResult, Error, FilterExpr, FilteredRecordOptions, GetRecordOptions, OperationContext,
    Record, RecordModel, RecordModelBuilder, Result, ResultStream, SearchInput, SearchResult,
    VectorSearchOptions, VectorStoreCollection, collect_mapped, paged, score_passes, validate_top,
};

use crate::client::{Document, FindRequest, MongoClient};
use crate::filter::MongoFilterTranslator;
use crate::mapper::MongoMapper;
use crate::options::{ID_FIELD, MongoCollectionOptions};
use crate::pipeline::{MongoPipelineBuilder, SearchStageParams};
use crate::{STORE_SYSTEM, TRACING_TARGET_COLLECTIONS, TRACING_TARGET_DOCUMENTS, TRACING_TARGET_SEARCH};

/// A collection of records stored as MongoDB documents keyed by `_id`.
pub struct MongoCollection<R, C> {
    client: Arc<C>,
    name: String,
    options: MongoCollectionOptions,
    mapper: MongoMapper,
    context: OperationContext,
    _marker: PhantomData<fn() -> R>,
}

impl<R, C> std::fmt::Debug for MongoCollection<R, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoCollection")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<R, C> MongoCollection<R, C>
where
    R: Record,
    C: MongoClient,
{
    /// Creates a collection handle and builds its record model.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for an empty name or invalid index
    /// parameters, and [`Error::ModelValidation`] when the record model is
    /// invalid for MongoDB.
    pub fn new(
        client: Arc<C>,
        name: impl Into<String>,
        options: MongoCollectionOptions,
    ) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::configuration("collection name cannot be empty"));
        }
        options.validate()?;

        let model = RecordModelBuilder::new(options.model_building_options())
            .with_serializer_options(options.serializer_options.clone())
            .build::<R>(
                options.definition.as_ref(),
                options.embedding_generator.clone(),
            )?;

        let context =
            OperationContext::new(STORE_SYSTEM, name.clone()).with_store_name(client.database_name());

        tracing::debug!(
            target: TRACING_TARGET_COLLECTIONS,
            collection = %name,
            vectors = model.vectors.len(),
            "Created collection handle"
        );

        Ok(Self {
            client,
            name,
            options,
            mapper: MongoMapper::new(Arc::new(model)),
            context,
            _marker: PhantomData,
        })
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    fn distinct(keys: &[String]) -> Result<Vec<String>> {
        let mut distinct: Vec<String> = Vec::with_capacity(keys.len());
        for key in keys {
            if key.is_empty() {
                return Err(Error::mapping("record key cannot be empty"));
            }
            if !distinct.contains(key) {
                distinct.push(key.clone());
            }
        }
        Ok(distinct)
    }

    /// Streams every document a find request returns, following cursors.
    fn documents(&self, request: FindRequest, operation: &'static str) -> ResultStream<Document> {
        let client = Arc::clone(&self.client);
        let context = self.context.clone();
        let name = self.name.clone();

        paged(move |continuation| {
            let client = Arc::clone(&client);
            let context = context.clone();
            let name = name.clone();
            let request = request.clone();
            async move {
                context
                    .run(operation, client.find(&name, request, continuation))
                    .await
            }
        })
    }

    fn aggregated(&self, pipeline: Vec<Document>, operation: &'static str) -> ResultStream<Document> {
        let client = Arc::clone(&self.client);
        let context = self.context.clone();
        let name = self.name.clone();

        paged(move |continuation| {
            let client = Arc::clone(&client);
            let context = context.clone();
            let name = name.clone();
            let pipeline = pipeline.clone();
            async move {
                context
                    .run(operation, client.aggregate(&name, pipeline, continuation))
                    .await
            }
        })
    }

    fn records(&self, documents: ResultStream<Document>, include_vectors: bool) -> ResultStream<R> {
        let mapper = self.mapper.clone();
        documents
            .map(move |document| mapper.from_document::<R>(document?, include_vectors))
            .boxed()
    }

    async fn delete_matching(&self, filter: Document, operation: &'static str) -> Result<()> {
        let result: ClientResult<u64> = self.client.delete_many(&self.name, filter).await;
        match result {
            Ok(deleted) => {
                tracing::debug!(
                    target: TRACING_TARGET_DOCUMENTS,
                    collection = %self.name,
                    deleted = deleted,
                    "Deleted documents"
                );
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(self.context.wrap(operation, e)),
        }
    }
}

#[async_trait]
impl<R, C> VectorStoreCollection<String, R> for MongoCollection<R, C>
where
    R: Record,
    C: MongoClient,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &RecordModel {
        self.mapper.model()
    }

    async fn collection_exists(&self) -> Result<bool> {
        let names = self
            .context
            .run("collection_exists", self.client.list_collection_names())
            .await?;
        Ok(names.contains(&self.name))
    }

    #[tracing::instrument(skip_all, target = TRACING_TARGET_COLLECTIONS, fields(collection = %self.name))]
    async fn create_collection(&self) -> Result<()> {
        let command = MongoPipelineBuilder::new(self.mapper.model())
            .create_indexes(&self.name, &self.options)?;

        self.context
            .run("create_collection", self.client.create_collection(&self.name))
            .await?;

        if let Some(command) = command {
            self.context
                .run("create_collection", self.client.run_command(command))
                .await?;
        }

        tracing::info!(
            target: TRACING_TARGET_COLLECTIONS,
            collection = %self.name,
            "Collection created"
        );

        Ok(())
    }

    #[tracing::instrument(skip_all, target = TRACING_TARGET_COLLECTIONS, fields(collection = %self.name))]
    async fn delete_collection(&self) -> Result<()> {
        match self.client.drop_collection(&self.name).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(self.context.wrap("delete_collection", e)),
        }
    }

    #[tracing::instrument(skip_all, target = TRACING_TARGET_DOCUMENTS, fields(collection = %self.name))]
    async fn upsert(&self, record: &R) -> Result<String> {
        let (key, document) = self.mapper.to_document(record).await?;
        let mut filter = Document::new();
        filter.insert(ID_FIELD.to_owned(), key.clone().into());

        self.context
            .run(
                "upsert",
                self.client.replace_one(&self.name, filter, document, true),
            )
            .await?;

        Ok(key)
    }

    async fn get(&self, key: &String, options: GetRecordOptions) -> Result<Option<R>> {
        let keys = Self::distinct(std::slice::from_ref(key))?;
        let mut request =
            MongoPipelineBuilder::new(self.mapper.model()).find_by_keys(&keys, options.include_vectors);
        request.limit = Some(1);

        let page = self
            .context
            .run("get", self.client.find(&self.name, request, None))
            .await?;

        page.items
            .into_iter()
            .next()
            .map(|document| self.mapper.from_document(document, options.include_vectors))
            .transpose()
    }

    #[tracing::instrument(skip_all, target = TRACING_TARGET_DOCUMENTS, fields(collection = %self.name, keys = keys.len()))]
    async fn get_many(&self, keys: &[String], options: GetRecordOptions) -> Result<Vec<R>> {
        let keys = Self::distinct(keys)?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let request =
            MongoPipelineBuilder::new(self.mapper.model()).find_by_keys(&keys, options.include_vectors);
        let records = self.records(self.documents(request, "get_many"), options.include_vectors);
        collect_mapped(&self.name, records).await
    }

    async fn delete(&self, key: &String) -> Result<()> {
        self.delete_many(std::slice::from_ref(key)).await
    }

    #[tracing::instrument(skip_all, target = TRACING_TARGET_DOCUMENTS, fields(collection = %self.name, keys = keys.len()))]
    async fn delete_many(&self, keys: &[String]) -> Result<()> {
        let keys = Self::distinct(keys)?;
        if keys.is_empty() {
            return Ok(());
        }

        let request = MongoPipelineBuilder::new(self.mapper.model()).find_by_keys(&keys, true);
        self.delete_matching(request.filter, "delete").await
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
        let filter = MongoFilterTranslator::new(model)
            .translate_optional(options.effective_filter().as_deref())?;
        let vector = cancellable(
            options.cancellation.as_ref(),
            "search",
            resolve_search_vector(property, input),
        )
        .await?;

        let builder = MongoPipelineBuilder::new(model);
        let pipeline = builder.search(
            SearchStageParams {
                property,
                vector: vector.to_json(),
                filter,
                top,
                skip: options.skip,
                include_vectors: options.include_vectors,
            },
            &self.options,
        );

        let mapper = self.mapper.clone();
        let score_alias = builder.score_alias().to_owned();
        let include_vectors = options.include_vectors;
        let distance_function = property.distance_function;
        let threshold = options.score_threshold;

        let stream = self
            .aggregated(pipeline, "search")
            .map(move |result| mapper.from_search_result::<R>(result?, &score_alias, include_vectors))
            .try_filter(move |result| {
                future::ready(score_passes(distance_function, result.score, threshold))
            })
            .boxed();

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
        let filter = MongoFilterTranslator::new(model).translate(&filter)?;
        let request = MongoPipelineBuilder::new(model).filtered(
            filter,
            &options.order_by,
            top,
            options.skip,
            options.include_vectors,
        )?;

        let stream = self.records(
            self.documents(request, "get_filtered"),
            options.include_vectors,
        );
        Ok(cancellable_stream(stream, options.cancellation, "get_filtered"))
    }
}

#[cfg(test)]
mod tests {
    use recordstore_core::{
        DataProperty, DynamicRecord, Embeddable, KeyProperty, OrderBy, PropertyType,
        RecordDefinition, VectorProperty,
    };
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::mock::MockMongoClient;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Hotel {
        hotel_id: String,
        tenant: String,
        rating: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        embedding: Option<Embeddable>,
    }

    impl Record for Hotel {
        fn definition() -> Option<RecordDefinition> {
            Some(
                RecordDefinition::new()
                    .key(KeyProperty::new("hotel_id", PropertyType::String))
                    .data(DataProperty::new("tenant", PropertyType::String).indexed())
                    .data(DataProperty::new("rating", PropertyType::Int64).indexed())
                    .vector(VectorProperty::float32("embedding", 3)),
            )
        }
    }

    fn hotel(id: &str, tenant: &str, rating: i64, vector: [f32; 3]) -> Hotel {
        Hotel {
            hotel_id: id.to_owned(),
            tenant: tenant.to_owned(),
            rating,
            embedding: Some(Embeddable::Vector(vector.to_vec())),
        }
    }

    type Hotels = MongoCollection<Hotel, MockMongoClient>;

    async fn hotels(client: MockMongoClient) -> (Arc<MockMongoClient>, Hotels) {
        let client = Arc::new(client);
        let hotels =
            Hotels::new(Arc::clone(&client), "hotels", MongoCollectionOptions::default()).unwrap();
        hotels.create_collection().await.unwrap();
        for record in [
            hotel("a", "acme", 5, [1.0, 0.0, 0.0]),
            hotel("b", "acme", 3, [0.8, 0.6, 0.0]),
            hotel("c", "globex", 4, [0.0, 1.0, 0.0]),
        ] {
            hotels.upsert(&record).await.unwrap();
        }
        (client, hotels)
    }

    #[tokio::test]
    async fn creates_collection_with_indexes() {
        let (client, hotels) = hotels(MockMongoClient::new()).await;
        assert!(hotels.collection_exists().await.unwrap());

        let commands = client.commands().await;
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0]["createIndexes"], json!("hotels"));
        assert_eq!(commands[0]["indexes"].as_array().unwrap().len(), 3);

        let err = hotels.create_collection().await.unwrap_err();
        assert!(err.as_operation().is_some());
    }

    #[tokio::test]
    async fn upserts_under_id_and_reads_back() {
        let (client, hotels) = hotels(MockMongoClient::new()).await;

        let stored = client.document("hotels", "a").await.unwrap();
        assert_eq!(stored["_id"], json!("a"));
        assert!(!stored.contains_key("hotel_id"));

        let record = hotels
            .get(&"a".to_owned(), GetRecordOptions::with_vectors())
            .await
            .unwrap();
        assert_eq!(record, Some(hotel("a", "acme", 5, [1.0, 0.0, 0.0])));

        let record = hotels
            .get(&"a".to_owned(), GetRecordOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.embedding, None);

        assert!(
            hotels
                .get(&"zz".to_owned(), GetRecordOptions::default())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn get_many_deduplicates_keys() {
        let (client, hotels) = hotels(MockMongoClient::new()).await;
        let keys = ["a".to_owned(), "a".to_owned(), "c".to_owned(), "zz".to_owned()];

        let records = hotels.get_many(&keys, GetRecordOptions::default()).await.unwrap();
        assert_eq!(records.len(), 2);

        let finds = client.finds().await;
        assert_eq!(finds[0].filter["_id"], json!({ "$in": ["a", "c", "zz"] }));

        let calls = client.calls();
        assert!(hotels.get_many(&[], GetRecordOptions::default()).await.unwrap().is_empty());
        assert_eq!(client.calls(), calls);
    }

    #[tokio::test]
    async fn get_many_skips_documents_that_fail_to_map() {
        let (client, hotels) = hotels(MockMongoClient::new()).await;
        let malformed = json!({ "_id": "bad", "tenant": "acme", "rating": "not a number" });
        client
            .replace_one(
                "hotels",
                json!({ "_id": "bad" }).as_object().unwrap().clone(),
                malformed.as_object().unwrap().clone(),
                true,
            )
            .await
            .unwrap();

        let records = hotels
            .get_many(&["a".to_owned(), "bad".to_owned()], GetRecordOptions::default())
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].hotel_id, "a");
    }

    #[tokio::test]
    async fn search_ranks_by_similarity() {
        let (client, hotels) = hotels(MockMongoClient::new()).await;

        let results: Vec<_> = hotels
            .search(SearchInput::from(vec![1.0, 0.0, 0.0]), 2, VectorSearchOptions::default())
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].record.hotel_id, "a");
        assert!(results[0].score.unwrap() >= 0.99);
        assert_eq!(results[1].record.hotel_id, "b");
        assert_eq!(results[0].record.embedding, None);

        let pipeline = &client.pipelines().await[0];
        assert_eq!(pipeline[0]["$search"]["cosmosSearch"]["k"], json!(2));
    }

    #[tokio::test]
    async fn search_applies_filter_skip_and_threshold() {
        let (_, hotels) = hotels(MockMongoClient::new()).await;

        let options = VectorSearchOptions::default()
            .with_filter(FilterExpr::eq("tenant", "acme"))
            .with_skip(1);
        let results: Vec<_> = hotels
            .search(SearchInput::from(vec![1.0, 0.0, 0.0]), 5, options)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].record.hotel_id, "b");

        let options = VectorSearchOptions::default().with_score_threshold(0.9);
        let results: Vec<_> = hotels
            .search(SearchInput::from(vec![1.0, 0.0, 0.0]), 3, options)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn filtered_reads_sort_and_follow_cursors() {
        let (_, hotels) = hotels(MockMongoClient::new().with_batch_size(1)).await;

        let records: Vec<Hotel> = hotels
            .get_filtered(
                FilterExpr::ge("rating", 3),
                5,
                FilteredRecordOptions::default().order_by(OrderBy::descending("rating")),
            )
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        let ids: Vec<_> = records.iter().map(|r| r.hotel_id.as_str()).collect();
        assert_eq!(ids, ["a", "c", "b"]);
    }

    #[tokio::test]
    async fn ambiguous_vector_target_makes_no_calls() {
        let client = Arc::new(MockMongoClient::new());
        let definition = RecordDefinition::new()
            .key(KeyProperty::new("id", PropertyType::String))
            .vector(VectorProperty::float32("a", 2))
            .vector(VectorProperty::float32("b", 2));
        let options = MongoCollectionOptions::default().with_definition(definition);
        let collection =
            MongoCollection::<DynamicRecord, _>::new(Arc::clone(&client), "docs", options).unwrap();

        let err = collection
            .search(SearchInput::from(vec![1.0, 0.0]), 1, VectorSearchOptions::default())
            .await
            .err()
            .unwrap();

        assert!(matches!(err, Error::Configuration(_)));
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn deletes_are_idempotent() {
        let (client, hotels) = hotels(MockMongoClient::new()).await;

        hotels.delete(&"a".to_owned()).await.unwrap();
        hotels.delete(&"a".to_owned()).await.unwrap();
        hotels
            .delete_many(&["b".to_owned(), "b".to_owned(), "zz".to_owned()])
            .await
            .unwrap();
        assert!(client.document("hotels", "b").await.is_none());
        assert!(client.document("hotels", "c").await.is_some());

        hotels.delete_collection().await.unwrap();
        hotels.delete_collection().await.unwrap();
        assert!(!hotels.collection_exists().await.unwrap());
        hotels.delete(&"c".to_owned()).await.unwrap();
    }

    #[tokio::test]
    async fn empty_key_is_rejected_before_calls() {
        let client = Arc::new(MockMongoClient::new());
        let hotels =
            Hotels::new(Arc::clone(&client), "hotels", MongoCollectionOptions::default()).unwrap();

        let err = hotels.get(&String::new(), GetRecordOptions::default()).await.unwrap_err();
        assert!(matches!(err, Error::Mapping(_)));
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn cancelled_stream_ends_with_error() {
        let (client, hotels) = hotels(MockMongoClient::new().with_batch_size(1)).await;

        let token = CancellationToken::new();
        let mut stream = hotels
            .get_filtered(
                FilterExpr::eq("tenant", "acme"),
                5,
                FilteredRecordOptions::default().with_cancellation(token.clone()),
            )
            .await
            .unwrap();

        assert!(stream.try_next().await.unwrap().is_some());
        token.cancel();
        assert!(matches!(stream.try_next().await, Err(Error::Cancelled { .. })));
        assert_eq!(client.finds().await.len(), 1);
    }
}
