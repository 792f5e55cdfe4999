#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for record model construction.
///
/// Use this target for logging definition resolution and model validation.
pub const TRACING_TARGET_MODEL: &str = "recordstore_core::model";

/// Tracing target for storage mapping.
///
/// Use this target for logging record conversion and embedding generation.
pub const TRACING_TARGET_MAPPER: &str = "recordstore_core::mapper";

/// Tracing target for query and filter translation.
pub const TRACING_TARGET_QUERY: &str = "recordstore_core::query";

/// Tracing target for collection operations and error wrapping.
pub const TRACING_TARGET_COLLECTION: &str = "recordstore_core::collection";

pub mod cancel;
pub mod collection;
pub mod embedding;
mod error;
pub mod filter;
mod key;
pub mod mapper;
#[cfg(any(test, feature = "test-utils"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-utils")))]
pub mod mock;
pub mod model;
pub mod options;
#[doc(hidden)]
pub mod prelude;

pub use collection::{
    KeywordHybridSearch, OperationContext, Page, ResultStream, SearchInput, SearchResult,
    VectorStore, VectorStoreCollection, collect_mapped, paged, score_passes, skip_unmapped,
    validate_top,
};
pub use embedding::{
    Embeddable, Embedding, EmbeddingGenerator, EmbeddingOptions, SharedEmbeddingGenerator,
    VectorElementType,
};
pub use error::{
    BoxedError, ClientError, ClientErrorKind, ClientResult, Error, Result,
    VectorStoreOperationError,
};
pub use filter::{
    CompareOp, FilterExpr, FilterValue, LegacyClause, LegacyFilter, SearchFilter, select_filter,
};
pub use key::CompositeKey;
pub use mapper::GenericRecord;
pub use model::{
    DataProperty, DistanceFunction, DynamicRecord, IndexKind, KeyProperty, ModelBuildingOptions,
    NamingPolicy, PropertyDefinition, PropertyType, Record, RecordDefinition, RecordModel,
    RecordModelBuilder, SerializerOptions, VectorProperty, VectorPropertyModel,
};
pub use options::{
    FilteredRecordOptions, GetRecordOptions, HybridSearchOptions, OrderBy, VectorSearchOptions,
};
