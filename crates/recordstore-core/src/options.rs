//! Per-request options for reads and searches.

use std::borrow::Cow;

use tokio_util::sync::CancellationToken;

use crate::filter::{FilterExpr, LegacyFilter, select_filter};

/// Options for point reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GetRecordOptions {
    /// Whether vector properties are returned.
    pub include_vectors: bool,
}

impl GetRecordOptions {
    /// Options that return vector properties.
    pub fn with_vectors() -> Self {
        Self {
            include_vectors: true,
        }
    }
}

/// Options for vector similarity search.
#[derive(Debug, Clone, Default)]
pub struct VectorSearchOptions {
    /// Structured filter.
    pub filter: Option<FilterExpr>,
    /// Legacy filter, ignored when a structured filter is present.
    pub legacy_filter: Option<LegacyFilter>,
    /// Vector property to search; required when the model has several.
    pub vector_property: Option<String>,
    /// Number of leading results to skip.
    pub skip: usize,
    /// Whether vector properties are returned.
    pub include_vectors: bool,
    /// Drops results scoring worse than this threshold.
    pub score_threshold: Option<f64>,
    /// Stops streaming results once cancelled.
    pub cancellation: Option<CancellationToken>,
}

impl VectorSearchOptions {
    /// Sets the structured filter.
    pub fn with_filter(mut self, filter: FilterExpr) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Sets the legacy filter.
    pub fn with_legacy_filter(mut self, filter: LegacyFilter) -> Self {
        self.legacy_filter = Some(filter);
        self
    }

    /// Sets the vector property to search.
    pub fn with_vector_property(mut self, name: impl Into<String>) -> Self {
        self.vector_property = Some(name.into());
        self
    }

    /// Sets the number of results to skip.
    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    /// Sets whether vector properties are returned.
    pub fn with_include_vectors(mut self, include_vectors: bool) -> Self {
        self.include_vectors = include_vectors;
        self
    }

    /// Sets the score threshold.
    pub fn with_score_threshold(mut self, threshold: f64) -> Self {
        self.score_threshold = Some(threshold);
        self
    }

    /// Sets the cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Returns the filter the search is evaluated with.
    pub fn effective_filter(&self) -> Option<Cow<'_, FilterExpr>> {
        select_filter(self.filter.as_ref(), self.legacy_filter.as_ref())
    }
}

/// Options for hybrid vector and keyword search.
#[derive(Debug, Clone, Default)]
pub struct HybridSearchOptions {
    /// Structured filter.
    pub filter: Option<FilterExpr>,
    /// Legacy filter, ignored when a structured filter is present.
    pub legacy_filter: Option<LegacyFilter>,
    /// Vector property to search; required when the model has several.
    pub vector_property: Option<String>,
    /// Full-text property the keywords are matched against.
    pub additional_property: Option<String>,
    /// Number of leading results to skip.
    pub skip: usize,
    /// Whether vector properties are returned.
    pub include_vectors: bool,
    /// Stops streaming results once cancelled.
    pub cancellation: Option<CancellationToken>,
}

impl HybridSearchOptions {
    /// Sets the structured filter.
    pub fn with_filter(mut self, filter: FilterExpr) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Sets the vector property to search.
    pub fn with_vector_property(mut self, name: impl Into<String>) -> Self {
        self.vector_property = Some(name.into());
        self
    }

    /// Sets the full-text property.
    pub fn with_additional_property(mut self, name: impl Into<String>) -> Self {
        self.additional_property = Some(name.into());
        self
    }

    /// Sets the number of results to skip.
    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    /// Sets whether vector properties are returned.
    pub fn with_include_vectors(mut self, include_vectors: bool) -> Self {
        self.include_vectors = include_vectors;
        self
    }

    /// Sets the cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Returns the filter the search is evaluated with.
    pub fn effective_filter(&self) -> Option<Cow<'_, FilterExpr>> {
        select_filter(self.filter.as_ref(), self.legacy_filter.as_ref())
    }
}

/// Sort key for filtered reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// Model name of the data property to sort on.
    pub property: String,
    /// Sort direction.
    pub ascending: bool,
}

impl OrderBy {
    /// Ascending order on a property.
    pub fn ascending(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            ascending: true,
        }
    }

    /// Descending order on a property.
    pub fn descending(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            ascending: false,
        }
    }
}

/// Options for filtered reads.
#[derive(Debug, Clone, Default)]
pub struct FilteredRecordOptions {
    /// Number of leading records to skip.
    pub skip: usize,
    /// Whether vector properties are returned.
    pub include_vectors: bool,
    /// Sort keys, applied in order.
    pub order_by: Vec<OrderBy>,
    /// Stops streaming results once cancelled.
    pub cancellation: Option<CancellationToken>,
}

impl FilteredRecordOptions {
    /// Sets the number of records to skip.
    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    /// Sets whether vector properties are returned.
    pub fn with_include_vectors(mut self, include_vectors: bool) -> Self {
        self.include_vectors = include_vectors;
        self
    }

    /// Appends a sort key.
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    /// Sets the cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}
