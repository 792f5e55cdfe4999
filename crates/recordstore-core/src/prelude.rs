//! Commonly used items from recordstore-core.

pub use crate::collection::{
    KeywordHybridSearch, ResultStream, SearchInput, SearchResult, VectorStore,
    VectorStoreCollection,
};
pub use crate::embedding::{Embeddable, Embedding, EmbeddingGenerator, SharedEmbeddingGenerator};
pub use crate::error::{Error, Result};
pub use crate::filter::{FilterExpr, LegacyFilter};
pub use crate::key::CompositeKey;
pub use crate::model::{
    DataProperty, DistanceFunction, IndexKind, KeyProperty, NamingPolicy, PropertyType, Record,
    RecordDefinition, SerializerOptions, VectorProperty,
};
pub use crate::options::{
    FilteredRecordOptions, GetRecordOptions, HybridSearchOptions, OrderBy, VectorSearchOptions,
};
