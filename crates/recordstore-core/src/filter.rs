//! Store-agnostic filter expressions.
//!
//! Field references use model property names. Back-end translators resolve
//! them to storage names through the [`RecordModel`] and emit one native
//! parameter per literal.
//!
//! [`RecordModel`]: crate::model::RecordModel

use std::borrow::Cow;
use std::ops;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::TRACING_TARGET_QUERY;

/// Literal value in a filter expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// Null literal; equality against null tests for absence.
    Null,
    /// Boolean literal.
    Bool(bool),
    /// Integer literal.
    Int(i64),
    /// Floating point literal.
    Float(f64),
    /// String literal.
    String(String),
}

impl FilterValue {
    /// Converts the literal into JSON.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::from(*i),
            Self::Float(f) => Value::from(*f),
            Self::String(s) => Value::String(s.clone()),
        }
    }

    /// Returns true for the null literal.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<i32> for FilterValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f32> for FilterValue {
    fn from(value: f32) -> Self {
        Self::Float(f64::from(value))
    }
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CompareOp {
    /// Equal to.
    Eq,
    /// Not equal to.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Ge,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Le,
}

/// Structured filter predicate over record properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterExpr {
    /// Compares a property with a literal.
    Comparison {
        field: String,
        op: CompareOp,
        value: FilterValue,
    },
    /// Property equals any of the literals.
    In {
        field: String,
        values: Vec<FilterValue>,
    },
    /// Array property contains the literal.
    Contains { field: String, value: FilterValue },
    /// All sub-expressions hold.
    And(Vec<FilterExpr>),
    /// Any sub-expression holds.
    Or(Vec<FilterExpr>),
    /// The sub-expression does not hold.
    Not(Box<FilterExpr>),
}

impl FilterExpr {
    /// Creates a comparison.
    pub fn compare(field: impl Into<String>, op: CompareOp, value: impl Into<FilterValue>) -> Self {
        Self::Comparison {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// `field == value`.
    pub fn eq(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::compare(field, CompareOp::Eq, value)
    }

    /// `field != value`.
    pub fn ne(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::compare(field, CompareOp::Ne, value)
    }

    /// `field > value`.
    pub fn gt(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::compare(field, CompareOp::Gt, value)
    }

    /// `field >= value`.
    pub fn ge(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::compare(field, CompareOp::Ge, value)
    }

    /// `field < value`.
    pub fn lt(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::compare(field, CompareOp::Lt, value)
    }

    /// `field <= value`.
    pub fn le(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::compare(field, CompareOp::Le, value)
    }

    /// `field` equals one of `values`.
    pub fn in_list<V: Into<FilterValue>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Array `field` contains `value`.
    pub fn contains(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::Contains {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Combines with another expression; nested conjunctions are flattened.
    pub fn and(self, other: FilterExpr) -> Self {
        match (self, other) {
            (Self::And(mut left), Self::And(right)) => {
                left.extend(right);
                Self::And(left)
            }
            (Self::And(mut left), right) => {
                left.push(right);
                Self::And(left)
            }
            (left, Self::And(mut right)) => {
                right.insert(0, left);
                Self::And(right)
            }
            (left, right) => Self::And(vec![left, right]),
        }
    }

    /// Combines with another expression; nested disjunctions are flattened.
    pub fn or(self, other: FilterExpr) -> Self {
        match (self, other) {
            (Self::Or(mut left), Self::Or(right)) => {
                left.extend(right);
                Self::Or(left)
            }
            (Self::Or(mut left), right) => {
                left.push(right);
                Self::Or(left)
            }
            (left, Self::Or(mut right)) => {
                right.insert(0, left);
                Self::Or(right)
            }
            (left, right) => Self::Or(vec![left, right]),
        }
    }

    /// Negates the expression.
    pub fn negate(self) -> Self {
        match self {
            Self::Not(inner) => *inner,
            other => Self::Not(Box::new(other)),
        }
    }

    /// Calls `f` with every field name the expression references.
    pub fn visit_fields<'a>(&'a self, f: &mut impl FnMut(&'a str)) {
        match self {
            Self::Comparison { field, .. } | Self::In { field, .. } | Self::Contains { field, .. } => {
                f(field)
            }
            Self::And(items) | Self::Or(items) => items.iter().for_each(|e| e.visit_fields(f)),
            Self::Not(inner) => inner.visit_fields(f),
        }
    }
}

impl ops::Not for FilterExpr {
    type Output = FilterExpr;

    fn not(self) -> Self::Output {
        self.negate()
    }
}

impl ops::BitAnd for FilterExpr {
    type Output = FilterExpr;

    fn bitand(self, rhs: Self) -> Self::Output {
        self.and(rhs)
    }
}

impl ops::BitOr for FilterExpr {
    type Output = FilterExpr;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.or(rhs)
    }
}

/// Clause of a legacy string-keyed filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegacyClause {
    /// Property equals the value.
    EqualTo { field: String, value: FilterValue },
    /// Array property contains the value.
    AnyTagEqualTo { field: String, value: String },
}

/// Deprecated conjunctive clause list, kept alongside [`FilterExpr`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegacyFilter {
    /// Clauses, all of which must hold.
    pub clauses: Vec<LegacyClause>,
}

impl LegacyFilter {
    /// Creates an empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an equality clause.
    pub fn equal_to(mut self, field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.clauses.push(LegacyClause::EqualTo {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Adds an array membership clause.
    pub fn any_tag_equal_to(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.clauses.push(LegacyClause::AnyTagEqualTo {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Converts the clauses into a structured conjunction.
    ///
    /// Returns `None` for an empty clause list.
    pub fn to_expr(&self) -> Option<FilterExpr> {
        let mut exprs = self.clauses.iter().map(|clause| match clause {
            LegacyClause::EqualTo { field, value } => FilterExpr::eq(field.clone(), value.clone()),
            LegacyClause::AnyTagEqualTo { field, value } => {
                FilterExpr::contains(field.clone(), value.as_str())
            }
        });

        let first = exprs.next()?;
        Some(exprs.fold(first, FilterExpr::and))
    }
}

/// The filter a request is evaluated with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchFilter<'a> {
    /// A structured expression.
    Structured(&'a FilterExpr),
    /// A legacy clause list.
    Legacy(&'a LegacyFilter),
}

impl<'a> SearchFilter<'a> {
    /// Chooses between a structured and a legacy filter.
    ///
    /// The structured filter takes precedence; supplying both logs a warning.
    pub fn select(
        structured: Option<&'a FilterExpr>,
        legacy: Option<&'a LegacyFilter>,
    ) -> Option<Self> {
        match (structured, legacy) {
            (Some(structured), Some(_)) => {
                tracing::warn!(
                    target: TRACING_TARGET_QUERY,
                    "Both a structured and a legacy filter were supplied, ignoring the legacy filter"
                );
                Some(Self::Structured(structured))
            }
            (Some(structured), None) => Some(Self::Structured(structured)),
            (None, Some(legacy)) => Some(Self::Legacy(legacy)),
            (None, None) => None,
        }
    }

    /// Returns the filter as a structured expression.
    pub fn to_expr(&self) -> Option<Cow<'a, FilterExpr>> {
        match self {
            Self::Structured(expr) => Some(Cow::Borrowed(*expr)),
            Self::Legacy(legacy) => legacy.to_expr().map(Cow::Owned),
        }
    }
}

/// Resolves the effective structured filter of a request.
pub fn select_filter<'a>(
    structured: Option<&'a FilterExpr>,
    legacy: Option<&'a LegacyFilter>,
) -> Option<Cow<'a, FilterExpr>> {
    SearchFilter::select(structured, legacy).and_then(|f| f.to_expr())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fluent_and_flattens() {
        let expr = FilterExpr::eq("tenant", "acme")
            .and(FilterExpr::gt("score", 10))
            .and(FilterExpr::lt("score", 20));

        let FilterExpr::And(items) = &expr else {
            panic!("expected a conjunction");
        };
        assert_eq!(items.len(), 3);
    }

    #[test]
    fn operators_build_trees() {
        let expr = !(FilterExpr::eq("a", 1) | FilterExpr::eq("b", true));
        assert!(matches!(expr, FilterExpr::Not(_)));
        assert_eq!(!expr.clone(), expr.negate());
    }

    #[test]
    fn value_conversions() {
        assert_eq!(FilterValue::from(3), FilterValue::Int(3));
        assert_eq!(FilterValue::from(2.5), FilterValue::Float(2.5));
        assert_eq!(FilterValue::from("x"), FilterValue::String("x".into()));
        assert_eq!(FilterValue::Null.to_json(), Value::Null);
    }

    #[test]
    fn legacy_converts_to_conjunction() {
        let legacy = LegacyFilter::new()
            .equal_to("tenant", "acme")
            .any_tag_equal_to("tags", "pool");

        let expr = legacy.to_expr().unwrap();
        assert_eq!(
            expr,
            FilterExpr::eq("tenant", "acme").and(FilterExpr::contains("tags", "pool"))
        );
        assert_eq!(LegacyFilter::new().to_expr(), None);
    }

    #[test]
    fn structured_filter_wins() {
        let structured = FilterExpr::eq("tenant", "acme");
        let legacy = LegacyFilter::new().equal_to("tenant", "other");

        let selected = select_filter(Some(&structured), Some(&legacy)).unwrap();
        assert_eq!(selected.as_ref(), &structured);

        let selected = select_filter(None, Some(&legacy)).unwrap();
        assert_eq!(selected.as_ref(), &FilterExpr::eq("tenant", "other"));

        assert!(select_filter(None, None).is_none());
    }

    #[test]
    fn visits_all_fields() {
        let expr = FilterExpr::eq("a", 1).and(!FilterExpr::in_list("b", ["x", "y"]));
        let mut fields = Vec::new();
        expr.visit_fields(&mut |f| fields.push(f));
        assert_eq!(fields, ["a", "b"]);
    }
}
