//! Filter evaluation for query execution.
//!
//! This module provides the `FilterEvaluator` that evaluates filter
//! expressions from the query IR against stored JSON documents.

use std::cmp::Ordering;

use ruledao_proto::{FilterExpr, OrderDirection, OrderSpec, Value};
use serde_json::Value as JsonValue;

/// Evaluates filter expressions against entity documents.
///
/// Field names are dotted paths. A path ending on a nested object compares
/// as that object's `id`, so `country = :c` matches a reference by id.
/// Comparisons involving null never match; use `IsNull`/`IsNotNull`.
pub struct FilterEvaluator;

impl FilterEvaluator {
    /// Evaluate a filter expression against a document.
    pub fn evaluate(filter: &FilterExpr, doc: &JsonValue) -> bool {
        match filter {
            FilterExpr::Eq { field, value } => {
                Self::compare_field(doc, field, value, |ord| ord.is_eq())
            }
            FilterExpr::Ne { field, value } => {
                Self::compare_field(doc, field, value, |ord| ord.is_ne())
            }
            FilterExpr::Lt { field, value } => {
                Self::compare_field(doc, field, value, |ord| ord.is_lt())
            }
            FilterExpr::Le { field, value } => {
                Self::compare_field(doc, field, value, |ord| ord.is_le())
            }
            FilterExpr::Gt { field, value } => {
                Self::compare_field(doc, field, value, |ord| ord.is_gt())
            }
            FilterExpr::Ge { field, value } => {
                Self::compare_field(doc, field, value, |ord| ord.is_ge())
            }
            FilterExpr::In { field, values } => match Self::field_value(doc, field) {
                Some(fv) if !fv.is_null() => values.iter().any(|v| Self::values_equal(&fv, v)),
                _ => false,
            },
            FilterExpr::NotIn { field, values } => match Self::field_value(doc, field) {
                Some(fv) if !fv.is_null() => !values.iter().any(|v| Self::values_equal(&fv, v)),
                _ => false,
            },
            FilterExpr::IsNull { field } => {
                matches!(Self::field_value(doc, field), None | Some(Value::Null))
            }
            FilterExpr::IsNotNull { field } => {
                !matches!(Self::field_value(doc, field), None | Some(Value::Null))
            }
            FilterExpr::Like { field, pattern } => match Self::field_value(doc, field) {
                Some(Value::String(s)) => Self::like_match(&s, pattern),
                _ => false,
            },
            FilterExpr::NotLike { field, pattern } => match Self::field_value(doc, field) {
                Some(Value::String(s)) => !Self::like_match(&s, pattern),
                _ => false,
            },
            FilterExpr::And(filters) => filters.iter().all(|f| Self::evaluate(f, doc)),
            FilterExpr::Or(filters) => filters.iter().any(|f| Self::evaluate(f, doc)),
            FilterExpr::Not(inner) => !Self::evaluate(inner, doc),
        }
    }

    /// Read a dotted path off a document. `None` means the path is absent
    /// (or ends on an object without an `id`).
    pub fn field_value(doc: &JsonValue, path: &str) -> Option<Value> {
        let mut current = doc;
        for segment in path.split('.') {
            current = match current {
                JsonValue::Object(map) => map.get(segment)?,
                JsonValue::Null => return Some(Value::Null),
                _ => return None,
            };
        }
        Self::to_value(current)
    }

    fn to_value(json: &JsonValue) -> Option<Value> {
        match json {
            JsonValue::Object(map) => map.get("id").and_then(Self::to_value),
            JsonValue::Array(items) => items
                .iter()
                .map(Self::to_value)
                .collect::<Option<Vec<_>>>()
                .map(Value::List),
            other => Value::from_json(other).ok(),
        }
    }

    /// Compare a field value with a predicate on the ordering.
    fn compare_field<F>(doc: &JsonValue, field: &str, value: &Value, accept: F) -> bool
    where
        F: FnOnce(Ordering) -> bool,
    {
        if value.is_null() {
            return false;
        }
        match Self::field_value(doc, field) {
            Some(fv) if !fv.is_null() => fv.compare(value).map(accept).unwrap_or(false),
            _ => false, // Missing field doesn't match
        }
    }

    /// Check if two values are equal.
    fn values_equal(a: &Value, b: &Value) -> bool {
        a.compare(b) == Some(Ordering::Equal)
    }

    /// Order two documents by a list of order specs. Absent and null values
    /// sort first; incomparable values are treated as equal.
    pub fn compare_documents(a: &JsonValue, b: &JsonValue, order: &[OrderSpec]) -> Ordering {
        for spec in order {
            let left = Self::field_value(a, &spec.field).unwrap_or(Value::Null);
            let right = Self::field_value(b, &spec.field).unwrap_or(Value::Null);
            let ord = match (left.is_null(), right.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                (false, false) => left.compare(&right).unwrap_or(Ordering::Equal),
            };
            let ord = match spec.direction {
                OrderDirection::Asc => ord,
                OrderDirection::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Match a string against a SQL LIKE pattern.
    ///
    /// Supports:
    /// - `%` matches zero or more characters
    /// - `_` matches exactly one character
    /// - `\\%` matches literal `%`
    /// - `\\_` matches literal `_`
    pub fn like_match(value: &str, pattern: &str) -> bool {
        let mut chars = value.chars().peekable();
        let mut pattern_chars = pattern.chars().peekable();

        Self::like_match_recursive(&mut chars, &mut pattern_chars)
    }

    fn like_match_recursive(
        chars: &mut std::iter::Peekable<std::str::Chars>,
        pattern: &mut std::iter::Peekable<std::str::Chars>,
    ) -> bool {
        loop {
            match (pattern.peek().copied(), chars.peek().copied()) {
                (None, None) => return true,
                (None, Some(_)) => return false,
                (Some('%'), _) => {
                    pattern.next();

                    if pattern.peek().is_none() {
                        return true;
                    }

                    // Try matching % with 0, 1, 2, ... characters
                    loop {
                        let mut pattern_clone = pattern.clone();
                        let mut chars_clone = chars.clone();

                        if Self::like_match_recursive(&mut chars_clone, &mut pattern_clone) {
                            return true;
                        }

                        if chars.next().is_none() {
                            return false;
                        }
                    }
                }
                (Some('_'), Some(_)) => {
                    pattern.next();
                    chars.next();
                }
                (Some('_'), None) => return false,
                (Some('\\'), _) => {
                    pattern.next();
                    match (pattern.peek().copied(), chars.peek().copied()) {
                        (Some(p), Some(c)) if p == c => {
                            pattern.next();
                            chars.next();
                        }
                        _ => return false,
                    }
                }
                (Some(p), Some(c)) => {
                    if p == c {
                        pattern.next();
                        chars.next();
                    } else {
                        return false;
                    }
                }
                (Some(_), None) => return false,
            }
        }
    }
}
