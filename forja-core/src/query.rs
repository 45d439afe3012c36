//! Immutable query specifications.
//!
//! A [`QuerySpec`] is a plain value: table, projection, filters, order,
//! and pagination. Wrapping a query (for tenant isolation or anything
//! else) produces a *new* spec via [`QuerySpec::with_filter`]; nothing is
//! ever mutated behind the caller's back, and re-running a spec is always
//! safe because the value cannot have drifted.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Comparison operators supported by [`Filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    In,
}

/// A single column predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn new(column: impl Into<String>, op: FilterOp, value: Value) -> Self {
        Self {
            column: column.into(),
            op,
            value,
        }
    }

    /// Equality filter. Non-serializable values degrade to `null`, which
    /// matches nothing.
    pub fn eq<V: Serialize>(column: impl Into<String>, value: V) -> Self {
        Self::new(
            column,
            FilterOp::Eq,
            serde_json::to_value(value).unwrap_or(Value::Null),
        )
    }

    pub fn neq<V: Serialize>(column: impl Into<String>, value: V) -> Self {
        Self::new(
            column,
            FilterOp::Neq,
            serde_json::to_value(value).unwrap_or(Value::Null),
        )
    }

    /// Membership filter: the column value must appear in `values`.
    pub fn is_in(column: impl Into<String>, values: Vec<Value>) -> Self {
        Self::new(column, FilterOp::In, Value::Array(values))
    }

    /// SQL-style `LIKE` with `%` wildcards.
    pub fn like(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(column, FilterOp::Like, Value::String(pattern.into()))
    }

    /// Evaluate this predicate against a row object.
    ///
    /// A missing column never matches: predicates only widen a result set
    /// when the data actually satisfies them.
    pub fn matches(&self, row: &Value) -> bool {
        let Some(field) = row.get(&self.column) else {
            return false;
        };

        match self.op {
            FilterOp::Eq => field == &self.value,
            FilterOp::Neq => field != &self.value,
            FilterOp::Gt => matches!(compare_values(field, &self.value), Some(Ordering::Greater)),
            FilterOp::Gte => matches!(
                compare_values(field, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOp::Lt => matches!(compare_values(field, &self.value), Some(Ordering::Less)),
            FilterOp::Lte => matches!(
                compare_values(field, &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FilterOp::Like => match (field.as_str(), self.value.as_str()) {
                (Some(text), Some(pattern)) => like_matches(text, pattern),
                _ => false,
            },
            FilterOp::In => match &self.value {
                Value::Array(values) => values.contains(field),
                _ => false,
            },
        }
    }
}

/// Ordering clause for a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    pub ascending: bool,
}

/// An immutable query specification.
///
/// Builder methods consume `self` and return the extended spec, so a
/// spec held by two parties can never be mutated by one of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub table: String,
    /// Columns to project; empty means all columns.
    pub select: Vec<String>,
    pub filters: Vec<Filter>,
    pub order: Option<OrderBy>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl QuerySpec {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            select: Vec::new(),
            filters: Vec::new(),
            order: None,
            limit: None,
            offset: None,
        }
    }

    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order = Some(OrderBy {
            column: column.into(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Return a new spec with `filter` appended. This is the operation
    /// isolation wrapping uses: the caller's spec is left untouched.
    pub fn with_filter(&self, filter: Filter) -> Self {
        let mut next = self.clone();
        next.filters.push(filter);
        next
    }

    pub fn has_filter_on(&self, column: &str) -> bool {
        self.filters.iter().any(|f| f.column == column)
    }

    /// Whether a row satisfies every filter of this spec.
    pub fn matches(&self, row: &Value) -> bool {
        self.filters.iter().all(|f| f.matches(row))
    }
}

/// Total-ish ordering over JSON scalars; `None` for incomparable types.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64().partial_cmp(&y.as_f64()),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Match `text` against a `%`-wildcard pattern.
fn like_matches(text: &str, pattern: &str) -> bool {
    if !pattern.contains('%') {
        return text == pattern;
    }

    let segments: Vec<&str> = pattern.split('%').collect();
    let mut rest = text;

    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        if i == 0 {
            // No leading wildcard: must match at the start.
            match rest.strip_prefix(segment) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == segments.len() - 1 {
            // No trailing wildcard: must match at the end.
            return rest.ends_with(segment);
        } else {
            match rest.find(segment) {
                Some(pos) => rest = &rest[pos + segment.len()..],
                None => return false,
            }
        }
    }

    true
}
