#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for collection and index management.
pub const TRACING_TARGET_COLLECTIONS: &str = "recordstore_mongo::collections";

/// Tracing target for document upserts, reads and deletes.
pub const TRACING_TARGET_DOCUMENTS: &str = "recordstore_mongo::documents";

/// Tracing target for aggregation pipelines and filtered reads.
pub const TRACING_TARGET_SEARCH: &str = "recordstore_mongo::search";

/// Name of the store system reported in operation errors.
pub const STORE_SYSTEM: &str = "azure_cosmosdb_mongodb";

mod client;
mod collection;
mod filter;
mod mapper;
#[cfg(any(test, feature = "test-utils"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-utils")))]
pub mod mock;
mod options;
mod pipeline;
#[doc(hidden)]
pub mod prelude;
mod store;

pub use client::{Document, FindRequest, MongoClient};
pub use collection::MongoCollection;
pub use filter::MongoFilterTranslator;
pub use mapper::MongoMapper;
pub use options::MongoCollectionOptions;
pub use pipeline::{MongoPipelineBuilder, SearchStageParams};
pub use store::MongoVectorStore;
