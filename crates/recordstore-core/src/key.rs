//! Composite keys for partition-aware stores.

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A `(record key, partition key)` pair addressing a stored item.
///
/// Stores whose native key is a single string use the record key as the
/// partition key as well.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(Serialize, Deserialize, Display)]
#[display("{record_key}@{partition_key}")]
pub struct CompositeKey {
    /// Key of the item inside its partition.
    pub record_key: String,
    /// Partition (shard) token.
    pub partition_key: String,
}

impl CompositeKey {
    /// Creates a composite key.
    pub fn new(record_key: impl Into<String>, partition_key: impl Into<String>) -> Self {
        Self {
            record_key: record_key.into(),
            partition_key: partition_key.into(),
        }
    }

    /// Creates a composite key for a store where the record key is its own partition.
    pub fn single(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            record_key: key.clone(),
            partition_key: key,
        }
    }

    /// Ensures both components are non-empty.
    pub fn validate(&self) -> Result<()> {
        if self.record_key.is_empty() {
            return Err(Error::mapping("composite key has an empty record key"));
        }

        if self.partition_key.is_empty() {
            return Err(Error::mapping(format!(
                "composite key for '{}' has an empty partition key",
                self.record_key
            )));
        }

        Ok(())
    }
}
