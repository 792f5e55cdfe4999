//! Mock embedding generator for testing.
//!
//! The generator derives vectors deterministically from the input bytes, so
//! equal texts embed to equal vectors across calls and test runs.
//!
//! # Feature Flag
//!
//! This module is only available when the `test-utils` feature is enabled:
//!
//! ```toml
//! [dev-dependencies]
//! recordstore-core = { version = "...", features = ["test-utils"] }
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use recordstore_core::mock::MockEmbeddingGenerator;
//!
//! let generator = MockEmbeddingGenerator::float32(4);
//! let shared: recordstore_core::SharedEmbeddingGenerator = Arc::new(generator.clone());
//! assert_eq!(generator.calls(), 0);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::embedding::{Embedding, EmbeddingGenerator, EmbeddingOptions, VectorElementType};
use crate::error::BoxedError;

/// Deterministic embedding generator.
#[derive(Debug, Clone)]
pub struct MockEmbeddingGenerator {
    element_type: VectorElementType,
    dimensions: usize,
    fail: bool,
    calls: Arc<AtomicUsize>,
}

impl MockEmbeddingGenerator {
    /// Creates a generator of the given element type and dimensions.
    pub fn new(element_type: VectorElementType, dimensions: usize) -> Self {
        Self {
            element_type,
            dimensions,
            fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Generator of 32-bit float vectors.
    pub fn float32(dimensions: usize) -> Self {
        Self::new(VectorElementType::Float32, dimensions)
    }

    /// Generator of unsigned 8-bit vectors.
    pub fn uint8(dimensions: usize) -> Self {
        Self::new(VectorElementType::UInt8, dimensions)
    }

    /// Generator of signed 8-bit vectors.
    pub fn int8(dimensions: usize) -> Self {
        Self::new(VectorElementType::Int8, dimensions)
    }

    /// Generator that fails every call.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::float32(1)
        }
    }

    /// Returns the number of `generate` calls so far, shared across clones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Returns the vector the generator produces for `input`.
    pub fn embed(&self, input: &str) -> Embedding {
        let seed = input
            .bytes()
            .fold(7u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)));
        let raw = (0..self.dimensions).map(|i| {
            let mixed = seed.wrapping_add((i as u32).wrapping_mul(2_654_435_761));
            (mixed >> 8) % 251
        });

        match self.element_type {
            VectorElementType::Float32 => {
                Embedding::Float32(raw.map(|x| (x as f32 + 1.0) / 252.0).collect())
            }
            VectorElementType::UInt8 => Embedding::UInt8(raw.map(|x| x as u8).collect()),
            VectorElementType::Int8 => Embedding::Int8(raw.map(|x| (x as i32 - 125) as i8).collect()),
        }
    }
}

#[async_trait]
impl EmbeddingGenerator for MockEmbeddingGenerator {
    async fn generate(
        &self,
        input: &str,
        _options: &EmbeddingOptions,
    ) -> Result<Embedding, BoxedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.fail {
            return Err("mock embedding generator failure".into());
        }

        Ok(self.embed(input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deterministic_and_counted() {
        let generator = MockEmbeddingGenerator::float32(8);
        let options = EmbeddingOptions::with_dimensions(8);

        let a = generator.generate("hello", &options).await.unwrap();
        let b = generator.clone().generate("hello", &options).await.unwrap();
        let c = generator.generate("world", &options).await.unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 8);
        assert_eq!(generator.calls(), 3);
    }

    #[tokio::test]
    async fn produces_requested_element_type() {
        let options = EmbeddingOptions::default();
        let bytes = MockEmbeddingGenerator::uint8(4)
            .generate("x", &options)
            .await
            .unwrap();
        assert_eq!(bytes.element_type(), VectorElementType::UInt8);

        let signed = MockEmbeddingGenerator::int8(4)
            .generate("x", &options)
            .await
            .unwrap();
        assert_eq!(signed.element_type(), VectorElementType::Int8);
    }
}
