//! Qdrant client interface and connection configuration.

mod qdrant_config;

use async_trait::async_trait;
use qdrant_client::qdrant::{
    CreateCollection, CreateFieldIndexCollection, DeleteCollectionBuilder, DeletePoints,
    GetPoints, PointId, QueryPoints, RetrievedPoint, ScoredPoint, ScrollPoints, SearchPoints,
    UpsertPoints,
};
use qdrant_client::{Qdrant, QdrantError};
use recordstore_core::{ClientError, ClientErrorKind, ClientResult};

pub use self::qdrant_config::QdrantConfig;
use crate::TRACING_TARGET_CLIENT;

/// Operations the Qdrant back-end needs from a connected client.
///
/// Implemented for [`qdrant_client::Qdrant`]. The client is owned by the
/// caller; collections only borrow it through an `Arc`.
#[async_trait]
pub trait QdrantClient: Send + Sync + 'static {
    /// Lists the names of all collections.
    async fn list_collections(&self) -> ClientResult<Vec<String>>;

    /// Returns true if the collection exists.
    async fn collection_exists(&self, name: &str) -> ClientResult<bool>;

    /// Creates a collection.
    async fn create_collection(&self, request: CreateCollection) -> ClientResult<()>;

    /// Creates a payload index.
    async fn create_field_index(&self, request: CreateFieldIndexCollection) -> ClientResult<()>;

    /// Deletes a collection.
    async fn delete_collection(&self, name: &str) -> ClientResult<()>;

    /// Inserts or replaces points.
    async fn upsert_points(&self, request: UpsertPoints) -> ClientResult<()>;

    /// Reads points by id.
    async fn get_points(&self, request: GetPoints) -> ClientResult<Vec<RetrievedPoint>>;

    /// Deletes points.
    async fn delete_points(&self, request: DeletePoints) -> ClientResult<()>;

    /// Runs a nearest neighbour search.
    async fn search_points(&self, request: SearchPoints) -> ClientResult<Vec<ScoredPoint>>;

    /// Enumerates points matching a filter, returning the next page offset.
    async fn scroll_points(
        &self,
        request: ScrollPoints,
    ) -> ClientResult<(Vec<RetrievedPoint>, Option<PointId>)>;

    /// Runs a universal query, used for fused hybrid search.
    async fn query_points(&self, request: QueryPoints) -> ClientResult<Vec<ScoredPoint>>;
}

#[async_trait]
impl QdrantClient for Qdrant {
    async fn list_collections(&self) -> ClientResult<Vec<String>> {
        let response = Qdrant::list_collections(self)
            .await
            .map_err(client_error)?;
        Ok(response.collections.into_iter().map(|c| c.name).collect())
    }

    async fn collection_exists(&self, name: &str) -> ClientResult<bool> {
        Qdrant::collection_exists(self, name)
            .await
            .map_err(client_error)
    }

    async fn create_collection(&self, request: CreateCollection) -> ClientResult<()> {
        Qdrant::create_collection(self, request)
            .await
            .map(|_| ())
            .map_err(client_error)
    }

    async fn create_field_index(&self, request: CreateFieldIndexCollection) -> ClientResult<()> {
        Qdrant::create_field_index(self, request)
            .await
            .map(|_| ())
            .map_err(client_error)
    }

    async fn delete_collection(&self, name: &str) -> ClientResult<()> {
        Qdrant::delete_collection(self, DeleteCollectionBuilder::new(name))
            .await
            .map(|_| ())
            .map_err(client_error)
    }

    async fn upsert_points(&self, request: UpsertPoints) -> ClientResult<()> {
        Qdrant::upsert_points(self, request)
            .await
            .map(|_| ())
            .map_err(client_error)
    }

    async fn get_points(&self, request: GetPoints) -> ClientResult<Vec<RetrievedPoint>> {
        Qdrant::get_points(self, request)
            .await
            .map(|response| response.result)
            .map_err(client_error)
    }

    async fn delete_points(&self, request: DeletePoints) -> ClientResult<()> {
        Qdrant::delete_points(self, request)
            .await
            .map(|_| ())
            .map_err(client_error)
    }

    async fn search_points(&self, request: SearchPoints) -> ClientResult<Vec<ScoredPoint>> {
        Qdrant::search_points(self, request)
            .await
            .map(|response| response.result)
            .map_err(client_error)
    }

    async fn scroll_points(
        &self,
        request: ScrollPoints,
    ) -> ClientResult<(Vec<RetrievedPoint>, Option<PointId>)> {
        Qdrant::scroll(self, request)
            .await
            .map(|response| (response.result, response.next_page_offset))
            .map_err(client_error)
    }

    async fn query_points(&self, request: QueryPoints) -> ClientResult<Vec<ScoredPoint>> {
        Qdrant::query(self, request)
            .await
            .map(|response| response.result)
            .map_err(client_error)
    }
}

/// Classifies a native client failure.
fn client_error(err: QdrantError) -> ClientError {
    let kind = match &err {
        QdrantError::ResponseError { status } => match status.code() {
            tonic::Code::NotFound => ClientErrorKind::NotFound,
            tonic::Code::AlreadyExists => ClientErrorKind::AlreadyExists,
            _ if status.message().contains("doesn't exist") => ClientErrorKind::NotFound,
            _ if status.message().contains("already exists") => ClientErrorKind::AlreadyExists,
            _ => ClientErrorKind::Other,
        },
        _ => ClientErrorKind::Other,
    };

    tracing::debug!(
        target: TRACING_TARGET_CLIENT,
        kind = %kind,
        error = %err,
        "Qdrant request failed"
    );

    ClientError::new(kind, err.to_string()).with_source(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_response_codes() {
        let not_found = QdrantError::ResponseError {
            status: tonic::Status::not_found("Collection `hotels` doesn't exist!"),
        };
        assert!(client_error(not_found).is_not_found());

        let exists = QdrantError::ResponseError {
            status: tonic::Status::invalid_argument("Collection `hotels` already exists!"),
        };
        assert_eq!(client_error(exists).kind(), ClientErrorKind::AlreadyExists);

        let other = QdrantError::ResponseError {
            status: tonic::Status::internal("boom"),
        };
        assert_eq!(client_error(other).kind(), ClientErrorKind::Other);
    }
}
