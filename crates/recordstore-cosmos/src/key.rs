//! Cosmos key types.

use recordstore_core::CompositeKey;

/// Key types that address Cosmos items.
pub trait CosmosKey: Clone + Send + Sync + 'static {
    /// Whether the key carries a partition token distinct from the id.
    const HAS_PARTITION: bool;

    /// Returns the `(id, partition key)` pair of the key.
    fn to_composite(&self) -> CompositeKey;

    /// Builds the key from an `(id, partition key)` pair.
    fn from_composite(key: CompositeKey) -> Self;
}

impl CosmosKey for String {
    const HAS_PARTITION: bool = false;

    fn to_composite(&self) -> CompositeKey {
        CompositeKey::single(self.clone())
    }

    fn from_composite(key: CompositeKey) -> Self {
        key.record_key
    }
}

impl CosmosKey for CompositeKey {
    const HAS_PARTITION: bool = true;

    fn to_composite(&self) -> CompositeKey {
        self.clone()
    }

    fn from_composite(key: CompositeKey) -> Self {
        key
    }
}
