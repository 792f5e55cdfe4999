//! Record to document mapping.

use std::sync::Arc;

use recordstore_core::mapper;
use recordstore_core::{Error, Record, RecordModel, Result, SearchResult};
use serde_json::Value;

use crate::TRACING_TARGET_DOCUMENTS;
use crate::client::Document;

/// Field of a search result holding the matched document.
pub(crate) const DOCUMENT_FIELD: &str = "document";

/// Maps records to and from MongoDB documents.
///
/// The key is stored under `_id` whatever the record calls it.
#[derive(Debug, Clone)]
pub struct MongoMapper {
    model: Arc<RecordModel>,
}

impl MongoMapper {
    /// Creates a mapper for a record model.
    pub fn new(model: Arc<RecordModel>) -> Self {
        Self { model }
    }

    /// Returns the record model.
    pub fn model(&self) -> &RecordModel {
        &self.model
    }

    /// Converts a record into its key and document.
    pub async fn to_document<R: Record>(&self, record: &R) -> Result<(String, Document)> {
        let document = mapper::to_storage(&self.model, record).await?;
        let key = match mapper::extract_key(&self.model, &document)? {
            Value::String(key) => key.clone(),
            other => {
                return Err(Error::mapping(format!(
                    "document key must be a string, found {other}"
                )));
            }
        };

        tracing::trace!(
            target: TRACING_TARGET_DOCUMENTS,
            key = %key,
            fields = document.len(),
            "Mapped record to document"
        );

        Ok((key, document))
    }

    /// Converts a stored document back into a record.
    pub fn from_document<R: Record>(&self, document: Document, include_vectors: bool) -> Result<R> {
        mapper::from_storage(&self.model, document, include_vectors)
    }

    /// Converts a search result of the form `{ <score alias>, document }`.
    pub fn from_search_result<R: Record>(
        &self,
        mut result: Document,
        score_alias: &str,
        include_vectors: bool,
    ) -> Result<SearchResult<R>> {
        let score = mapper::take_score(&mut result, score_alias);
        let document = match result.remove(DOCUMENT_FIELD) {
            Some(Value::Object(document)) => document,
            _ => {
                return Err(Error::mapping(format!(
                    "search result has no '{DOCUMENT_FIELD}' object"
                )));
            }
        };

        let record = self.from_document(document, include_vectors)?;
        Ok(SearchResult::new(record, score))
    }
}

#[cfg(test)]
mod tests {
    use recordstore_core::{
        DataProperty, KeyProperty, NamingPolicy, PropertyType, RecordDefinition,
        RecordModelBuilder, SerializerOptions, VectorProperty,
    };
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    use super::*;
    use crate::options::MongoCollectionOptions;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Article {
        article_id: String,
        title_text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        embedding: Option<Vec<f32>>,
    }

    impl Record for Article {
        fn definition() -> Option<RecordDefinition> {
            Some(
                RecordDefinition::new()
                    .key(KeyProperty::new("article_id", PropertyType::String))
                    .data(DataProperty::new("title_text", PropertyType::String))
                    .vector(VectorProperty::float32("embedding", 2)),
            )
        }
    }

    fn mapper() -> MongoMapper {
        let model = RecordModelBuilder::new(MongoCollectionOptions::default().model_building_options())
            .with_serializer_options(SerializerOptions::new(NamingPolicy::CamelCase))
            .build::<Article>(None, None)
            .unwrap();
        MongoMapper::new(Arc::new(model))
    }

    fn article() -> Article {
        Article {
            article_id: "a1".to_owned(),
            title_text: "Rust".to_owned(),
            embedding: Some(vec![0.5, 0.25]),
        }
    }

    #[tokio::test]
    async fn stores_key_under_underscore_id() {
        let (key, document) = mapper().to_document(&article()).await.unwrap();

        assert_eq!(key, "a1");
        assert_eq!(
            Value::Object(document),
            json!({ "_id": "a1", "titleText": "Rust", "embedding": [0.5, 0.25] })
        );
    }

    #[tokio::test]
    async fn round_trips_with_and_without_vectors() {
        let mapper = mapper();
        let (_, document) = mapper.to_document(&article()).await.unwrap();

        let full: Article = mapper.from_document(document.clone(), true).unwrap();
        assert_eq!(full, article());

        let bare: Article = mapper.from_document(document, false).unwrap();
        assert_eq!(bare.embedding, None);
    }

    #[test]
    fn unwraps_search_results() {
        let result = json!({
            "similarityScore": 0.9,
            "document": { "_id": "a1", "titleText": "Rust", "embedding": [0.5, 0.25] },
        });
        let Value::Object(result) = result else {
            unreachable!()
        };

        let result: SearchResult<Article> = mapper()
            .from_search_result(result, "similarityScore", false)
            .unwrap();
        assert_eq!(result.score, Some(0.9));
        assert_eq!(result.record.title_text, "Rust");

        let err = mapper()
            .from_search_result::<Article>(Document::new(), "similarityScore", false)
            .unwrap_err();
        assert!(matches!(err, Error::Mapping(_)));
    }
}
