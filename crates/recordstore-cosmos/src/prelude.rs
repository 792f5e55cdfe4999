//! Prelude module for commonly used types.
//!
//! This module re-exports the most commonly used types from this crate.

pub use crate::{
    CosmosClient, CosmosCollection, CosmosCollectionOptions, CosmosKey, CosmosVectorStore,
    QueryDefinition,
};
