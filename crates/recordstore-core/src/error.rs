//! Error taxonomy for record collections.
//!
//! Every public operation reports failures through [`Error`]. Validation and
//! configuration problems are raised before any store I/O; failures of the
//! underlying store client only ever cross the collection boundary wrapped in
//! [`VectorStoreOperationError`].

use crate::embedding::VectorElementType;

/// Type-erased error used for sources coming from external collaborators.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for all record collection operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Result type returned by store client implementations.
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Unified error type for record collection operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The record definition is malformed or ambiguous.
    #[error("invalid record model: {0}")]
    ModelValidation(String),

    /// A record could not be converted to or from its storage form.
    #[error("mapping failed: {0}")]
    Mapping(String),

    /// An embedding generator produced an element type the vector property does not accept.
    #[error(
        "embedding generator produced {actual} elements for vector property '{property}', which accepts {expected}"
    )]
    UnsupportedEmbeddingType {
        property: String,
        actual: VectorElementType,
        expected: VectorElementType,
    },

    /// Text input was supplied for a vector property without an embedding generator.
    #[error("no embedding generator is configured for vector property '{property}'")]
    NoEmbeddingGenerator { property: String },

    /// The embedding generator failed.
    #[error("embedding generation failed for vector property '{property}'")]
    EmbeddingGeneration {
        property: String,
        #[source]
        source: BoxedError,
    },

    /// The request cannot be executed against this model or store.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The underlying store client failed.
    #[error(transparent)]
    Operation(#[from] VectorStoreOperationError),

    /// The caller cancelled the operation while results were being streamed.
    #[error("operation '{operation}' was cancelled")]
    Cancelled { operation: &'static str },
}

impl Error {
    /// Creates a model validation error.
    pub fn model_validation(message: impl Into<String>) -> Self {
        Self::ModelValidation(message.into())
    }

    /// Creates a mapping error.
    pub fn mapping(message: impl Into<String>) -> Self {
        Self::Mapping(message.into())
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Creates an unsupported embedding type error.
    pub fn unsupported_embedding_type(
        property: impl Into<String>,
        actual: VectorElementType,
        expected: VectorElementType,
    ) -> Self {
        Self::UnsupportedEmbeddingType {
            property: property.into(),
            actual,
            expected,
        }
    }

    /// Creates a missing embedding generator error.
    pub fn no_embedding_generator(property: impl Into<String>) -> Self {
        Self::NoEmbeddingGenerator {
            property: property.into(),
        }
    }

    /// Creates an embedding generation error.
    pub fn embedding_generation(property: impl Into<String>, source: BoxedError) -> Self {
        Self::EmbeddingGeneration {
            property: property.into(),
            source,
        }
    }

    /// Creates a cancellation error.
    pub fn cancelled(operation: &'static str) -> Self {
        Self::Cancelled { operation }
    }

    /// Returns the wrapped store failure, if this error carries one.
    pub fn as_operation(&self) -> Option<&VectorStoreOperationError> {
        match self {
            Self::Operation(err) => Some(err),
            _ => None,
        }
    }

    /// Returns true if the error was raised before any store I/O took place.
    pub fn is_pre_flight(&self) -> bool {
        matches!(
            self,
            Self::ModelValidation(_)
                | Self::Configuration(_)
                | Self::NoEmbeddingGenerator { .. }
                | Self::UnsupportedEmbeddingType { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::mapping(err.to_string())
    }
}

/// A store client failure enriched with the collection operation it belongs to.
#[derive(Debug, thiserror::Error)]
#[error("{store_system} operation '{operation}' failed on collection '{collection}'")]
pub struct VectorStoreOperationError {
    /// Name of the store system (e.g. `qdrant`).
    pub store_system: &'static str,
    /// Name of the database, account or instance, when known.
    pub store_name: Option<String>,
    /// Name of the collection the operation targeted.
    pub collection: String,
    /// Name of the collection operation.
    pub operation: &'static str,
    /// The native client failure.
    #[source]
    pub source: BoxedError,
}

/// Classification of store client failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ClientErrorKind {
    /// The collection or item does not exist.
    #[strum(to_string = "not found")]
    NotFound,
    /// The collection or item already exists.
    #[strum(to_string = "already exists")]
    AlreadyExists,
    /// Any other transport or server failure.
    #[strum(to_string = "client error")]
    Other,
}

/// Error reported by store client implementations.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ClientError {
    kind: ClientErrorKind,
    message: String,
    #[source]
    source: Option<BoxedError>,
}

impl ClientError {
    /// Creates a new client error.
    pub fn new(kind: ClientErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::NotFound, message)
    }

    /// Creates an already exists error.
    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::AlreadyExists, message)
    }

    /// Creates an error for any other failure.
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::Other, message)
    }

    /// Adds a source error.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the error kind.
    pub fn kind(&self) -> ClientErrorKind {
        self.kind
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true if the target collection or item does not exist.
    pub fn is_not_found(&self) -> bool {
        self.kind == ClientErrorKind::NotFound
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn test_operation_error_display() {
        let err = Error::from(VectorStoreOperationError {
            store_system: "qdrant",
            store_name: None,
            collection: "hotels".to_string(),
            operation: "upsert",
            source: Box::new(ClientError::other("connection reset")),
        });

        assert_eq!(
            err.to_string(),
            "qdrant operation 'upsert' failed on collection 'hotels'"
        );
        assert!(err.as_operation().is_some());
        assert!(err.source().is_some());
        assert!(!err.is_pre_flight());
    }

    #[test]
    fn test_client_error_kind() {
        let err = ClientError::not_found("collection missing");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "not found: collection missing");

        let err = ClientError::already_exists("collection exists");
        assert!(!err.is_not_found());
        assert_eq!(err.kind(), ClientErrorKind::AlreadyExists);
    }

    #[test]
    fn test_pre_flight_classification() {
        assert!(Error::configuration("ambiguous").is_pre_flight());
        assert!(Error::model_validation("no key").is_pre_flight());
        assert!(!Error::mapping("missing key").is_pre_flight());
        assert!(!Error::cancelled("search").is_pre_flight());
    }
}
