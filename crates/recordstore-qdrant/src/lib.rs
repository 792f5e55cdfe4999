#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for client construction and native request failures.
pub const TRACING_TARGET_CLIENT: &str = "recordstore_qdrant::client";

/// Tracing target for collection management.
///
/// Use this target for logging collection creation, deletion and payload indexes.
pub const TRACING_TARGET_COLLECTIONS: &str = "recordstore_qdrant::collections";

/// Tracing target for point upserts, reads and deletes.
pub const TRACING_TARGET_POINTS: &str = "recordstore_qdrant::points";

/// Tracing target for vector, filtered and hybrid searches.
pub const TRACING_TARGET_SEARCH: &str = "recordstore_qdrant::search";

/// Name of the store system reported in operation errors.
pub const STORE_SYSTEM: &str = "qdrant";

mod client;
mod collection;
mod filter;
mod mapper;
#[cfg(any(test, feature = "test-utils"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-utils")))]
pub mod mock;
mod options;
#[doc(hidden)]
pub mod prelude;
mod query;
mod store;

pub use client::{QdrantClient, QdrantConfig};
pub use collection::QdrantCollection;
pub use filter::QdrantFilterTranslator;
pub use mapper::{QdrantKey, QdrantMapper};
pub use options::QdrantCollectionOptions;
pub use store::QdrantVectorStore;
