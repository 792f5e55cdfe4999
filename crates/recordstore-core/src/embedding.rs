//! Embedding types and the embedding generator contract.
//!
//! Generators may emit vectors with different element types. [`Embedding`] is
//! the closed set of supported outputs, so mapping code dispatches on a single
//! enum instead of repeating per-type branches in every back-end.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BoxedError, Error, Result};

/// Element type of a stored vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize, strum::Display, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VectorElementType {
    /// 32-bit floating point elements.
    Float32,
    /// Unsigned 8-bit integer elements.
    #[serde(rename = "uint8")]
    #[strum(serialize = "uint8")]
    UInt8,
    /// Signed 8-bit integer elements.
    Int8,
}

/// A generated or precomputed embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "snake_case")]
pub enum Embedding {
    /// 32-bit floating point vector.
    Float32(Vec<f32>),
    /// Unsigned 8-bit integer vector.
    #[serde(rename = "uint8")]
    UInt8(Vec<u8>),
    /// Signed 8-bit integer vector.
    Int8(Vec<i8>),
}

impl Embedding {
    /// Returns the element type of this embedding.
    pub fn element_type(&self) -> VectorElementType {
        match self {
            Self::Float32(_) => VectorElementType::Float32,
            Self::UInt8(_) => VectorElementType::UInt8,
            Self::Int8(_) => VectorElementType::Int8,
        }
    }

    /// Returns the number of dimensions.
    pub fn len(&self) -> usize {
        match self {
            Self::Float32(v) => v.len(),
            Self::UInt8(v) => v.len(),
            Self::Int8(v) => v.len(),
        }
    }

    /// Returns true if the embedding has no dimensions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Converts the embedding into its generic JSON array form.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Float32(v) => Value::Array(
                v.iter()
                    .map(|x| {
                        serde_json::Number::from_f64(f64::from(*x))
                            .map(Value::Number)
                            .unwrap_or(Value::Null)
                    })
                    .collect(),
            ),
            Self::UInt8(v) => Value::Array(v.iter().map(|x| Value::from(*x)).collect()),
            Self::Int8(v) => Value::Array(v.iter().map(|x| Value::from(*x)).collect()),
        }
    }

    /// Parses a generic JSON array into an embedding of the given element type.
    pub fn from_json(element_type: VectorElementType, value: &Value) -> Result<Self> {
        let items = value
            .as_array()
            .ok_or_else(|| Error::mapping(format!("expected a vector array, found {value}")))?;

        let out_of_range =
            |x: &Value| Error::mapping(format!("vector element {x} is not a valid {element_type}"));

        match element_type {
            VectorElementType::Float32 => items
                .iter()
                .map(|x| x.as_f64().map(|f| f as f32).ok_or_else(|| out_of_range(x)))
                .collect::<Result<Vec<_>>>()
                .map(Self::Float32),
            VectorElementType::UInt8 => items
                .iter()
                .map(|x| {
                    x.as_u64()
                        .and_then(|n| u8::try_from(n).ok())
                        .ok_or_else(|| out_of_range(x))
                })
                .collect::<Result<Vec<_>>>()
                .map(Self::UInt8),
            VectorElementType::Int8 => items
                .iter()
                .map(|x| {
                    x.as_i64()
                        .and_then(|n| i8::try_from(n).ok())
                        .ok_or_else(|| out_of_range(x))
                })
                .collect::<Result<Vec<_>>>()
                .map(Self::Int8),
        }
    }

    /// Widens the embedding into 32-bit floats, as required by float-only stores.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        match self {
            Self::Float32(v) => v.clone(),
            Self::UInt8(v) => v.iter().map(|x| f32::from(*x)).collect(),
            Self::Int8(v) => v.iter().map(|x| f32::from(*x)).collect(),
        }
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(value: Vec<f32>) -> Self {
        Self::Float32(value)
    }
}

impl From<Vec<u8>> for Embedding {
    fn from(value: Vec<u8>) -> Self {
        Self::UInt8(value)
    }
}

impl From<Vec<i8>> for Embedding {
    fn from(value: Vec<i8>) -> Self {
        Self::Int8(value)
    }
}

/// A record field that holds either a vector or the text it should be generated from.
///
/// Records declare vector fields of this type when the vector property has an
/// embedding generator. On upsert, text is replaced by the generated vector; on
/// read, the stored vector always comes back as [`Embeddable::Vector`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Embeddable<T = Vec<f32>> {
    /// A precomputed vector.
    Vector(T),
    /// Source text for the embedding generator.
    Text(String),
}

impl<T> Embeddable<T> {
    /// Returns the vector if one is present.
    pub fn as_vector(&self) -> Option<&T> {
        match self {
            Self::Vector(v) => Some(v),
            Self::Text(_) => None,
        }
    }
}

impl<T> From<&str> for Embeddable<T> {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

/// Options passed to an embedding generator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbeddingOptions {
    /// Requested number of dimensions, if the model supports truncation.
    pub dimensions: Option<usize>,
}

impl EmbeddingOptions {
    /// Creates options requesting the given number of dimensions.
    pub fn with_dimensions(dimensions: usize) -> Self {
        Self {
            dimensions: Some(dimensions),
        }
    }
}

/// Generates embeddings for text inputs.
///
/// Invoked per record during upsert and per query during search, for vector
/// properties that were configured with a generator.
#[async_trait]
pub trait EmbeddingGenerator: fmt::Debug + Send + Sync {
    /// Generates an embedding for the input text.
    async fn generate(
        &self,
        input: &str,
        options: &EmbeddingOptions,
    ) -> std::result::Result<Embedding, BoxedError>;
}

/// Shared handle to an embedding generator.
pub type SharedEmbeddingGenerator = Arc<dyn EmbeddingGenerator>;

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_element_type_names() {
        assert_eq!(VectorElementType::Float32.to_string(), "float32");
        assert_eq!(VectorElementType::UInt8.to_string(), "uint8");
        assert_eq!(VectorElementType::Int8.as_ref(), "int8");
    }

    #[test]
    fn test_from_json_rejects_out_of_range() {
        let value = json!([1, 300]);
        assert!(Embedding::from_json(VectorElementType::UInt8, &value).is_err());

        let value = json!([-5, 7]);
        let embedding = Embedding::from_json(VectorElementType::Int8, &value).unwrap();
        assert_eq!(embedding, Embedding::Int8(vec![-5, 7]));
    }

    #[test]
    fn test_from_json_requires_array() {
        let err = Embedding::from_json(VectorElementType::Float32, &json!("text")).unwrap_err();
        assert!(matches!(err, Error::Mapping(_)));
    }

    #[test]
    fn test_to_json_preserves_float_values() {
        let embedding = Embedding::Float32(vec![0.5, 0.25]);
        assert_eq!(embedding.to_json(), json!([0.5, 0.25]));
        assert_eq!(embedding.len(), 2);
    }

    #[test]
    fn test_embeddable_untagged() {
        let text: Embeddable = serde_json::from_value(json!("a sunny hotel")).unwrap();
        assert_eq!(text, Embeddable::Text("a sunny hotel".to_string()));

        let vector: Embeddable = serde_json::from_value(json!([0.5, 1.0])).unwrap();
        assert_eq!(vector.as_vector(), Some(&vec![0.5, 1.0]));
    }
}
