#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for container management.
pub const TRACING_TARGET_COLLECTIONS: &str = "recordstore_cosmos::collections";

/// Tracing target for item upserts, reads and deletes.
pub const TRACING_TARGET_ITEMS: &str = "recordstore_cosmos::items";

/// Tracing target for query construction and execution.
///
/// Use this target for logging generated SQL text and parameter counts.
pub const TRACING_TARGET_QUERY: &str = "recordstore_cosmos::query";

/// Name of the store system reported in operation errors.
pub const STORE_SYSTEM: &str = "azure_cosmosdb_nosql";

mod client;
mod collection;
mod container;
mod filter;
mod key;
mod mapper;
#[cfg(any(test, feature = "test-utils"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-utils")))]
pub mod mock;
mod options;
#[doc(hidden)]
pub mod prelude;
mod query;
mod store;

pub use client::{CosmosClient, QueryDefinition, QueryParameter};
pub use collection::CosmosCollection;
pub use container::{
    ContainerProperties, ExcludedPath, FullTextIndex, FullTextPath, FullTextPolicy,
    IncludedPath, IndexingMode, IndexingPolicy, PartitionKeyDefinition, VectorEmbedding,
    VectorEmbeddingPolicy, VectorIndex,
};
pub use filter::CosmosFilterTranslator;
pub use key::CosmosKey;
pub use mapper::CosmosMapper;
pub use options::CosmosCollectionOptions;
pub use query::{CosmosQueryBuilder, VectorQuery};
pub use store::CosmosVectorStore;
