//! Collection queries: filters, ordering and limits.
//!
//! Semantics follow the remote engine: every filter must match, ordering is
//! by a single field, and documents that lack the order-by field are left
//! out of the result set entirely.

use std::cmp::Ordering;

use chrono::DateTime;
use serde_json::Value;

use crate::document::{CollectionPath, Document};

// ---------------------------------------------------------------------------
// Query model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// One predicate over a (possibly dotted) field path.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    ArrayContains(String, Value),
    In(String, Vec<Value>),
    Gte(String, Value),
    Lte(String, Value),
}

/// A filtered, optionally ordered and limited read of one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: CollectionPath,
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(collection: impl Into<CollectionPath>) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(field.into(), value.into()));
        self
    }

    pub fn where_array_contains(
        mut self,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.filters
            .push(Filter::ArrayContains(field.into(), value.into()));
        self
    }

    pub fn where_in(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.filters.push(Filter::In(field.into(), values));
        self
    }

    pub fn where_gte(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Gte(field.into(), value.into()));
        self
    }

    pub fn where_lte(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Lte(field.into(), value.into()));
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a document payload satisfies every filter.
    pub fn matches(&self, data: &Value) -> bool {
        self.filters.iter().all(|filter| filter_matches(filter, data))
    }

    /// Run the query over `(id, data)` pairs and produce the ordered,
    /// truncated snapshot.
    pub fn evaluate<'a, I>(&self, docs: I) -> Vec<Document>
    where
        I: IntoIterator<Item = (&'a String, &'a Value)>,
    {
        let mut hits: Vec<Document> = docs
            .into_iter()
            .filter(|(_, data)| self.matches(data))
            .map(|(id, data)| Document::new(id.clone(), data.clone()))
            .collect();

        if let Some((field, direction)) = &self.order_by {
            hits.retain(|doc| field_at(&doc.data, field).is_some());
            hits.sort_by(|a, b| {
                let left = field_at(&a.data, field).unwrap_or(&Value::Null);
                let right = field_at(&b.data, field).unwrap_or(&Value::Null);
                let ordering = value_cmp(left, right).then_with(|| a.id.cmp(&b.id));
                match direction {
                    Direction::Ascending => ordering,
                    Direction::Descending => ordering.reverse(),
                }
            });
        } else {
            hits.sort_by(|a, b| a.id.cmp(&b.id));
        }

        if let Some(limit) = self.limit {
            hits.truncate(limit);
        }
        hits
    }
}

fn filter_matches(filter: &Filter, data: &Value) -> bool {
    match filter {
        Filter::Eq(field, expected) => field_at(data, field) == Some(expected),
        Filter::ArrayContains(field, expected) => field_at(data, field)
            .and_then(Value::as_array)
            .is_some_and(|items| items.contains(expected)),
        Filter::In(field, candidates) => field_at(data, field)
            .is_some_and(|value| candidates.contains(value)),
        Filter::Gte(field, bound) => field_at(data, field)
            .is_some_and(|value| value_cmp(value, bound) != Ordering::Less),
        Filter::Lte(field, bound) => field_at(data, field)
            .is_some_and(|value| value_cmp(value, bound) != Ordering::Greater),
    }
}

/// Look up a dotted field path inside a JSON object.
pub fn field_at<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    let mut cursor = data;
    for segment in path.split('.') {
        cursor = cursor.as_object()?.get(segment)?;
    }
    Some(cursor)
}

// ---------------------------------------------------------------------------
// Value ordering
// ---------------------------------------------------------------------------

/// Total order over JSON values: null < bool < number < string < array
/// < object.  Strings that both parse as RFC 3339 timestamps compare as
/// instants, so mixed-precision stamps still order chronologically.
pub fn value_cmp(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => {
            if let (Some(tx), Some(ty)) = (parse_instant(x), parse_instant(y)) {
                tx.cmp(&ty)
            } else {
                x.cmp(y)
            }
        }
        (Value::Array(x), Value::Array(y)) => {
            for (left, right) in x.iter().zip(y.iter()) {
                let ordering = value_cmp(left, right);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => {
            // Rarely ordered on in practice; any deterministic order will do.
            let left = serde_json::to_string(x).unwrap_or_default();
            let right = serde_json::to_string(y).unwrap_or_default();
            left.cmp(&right)
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn parse_instant(text: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    let bytes = text.as_bytes();
    // Cheap shape check before paying for a full parse.
    if bytes.len() < 20 || bytes[4] != b'-' || bytes[7] != b'-' || bytes[10] != b'T' {
        return None;
    }
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|stamp| stamp.with_timezone(&chrono::Utc))
}
