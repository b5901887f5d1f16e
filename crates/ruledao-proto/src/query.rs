//! Query IR types.
//!
//! These are the structured predicates produced by the query text compiler
//! and consumed by the storage layer. The generic DAO surface also accepts
//! them directly for `filter` calls.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Kind of entity query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QueryKind {
    /// Return matching records.
    #[default]
    Find,
    /// Return the number of matching records.
    Count,
}

/// A query over the records of a single entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityQuery {
    /// Find or count.
    pub kind: QueryKind,
    /// The entity type to query.
    pub entity: String,
    /// Optional filter.
    pub filter: Option<FilterExpr>,
    /// Ordering specification.
    pub order_by: Vec<OrderSpec>,
    /// Pagination parameters.
    pub pagination: Option<Pagination>,
}

impl EntityQuery {
    /// Create a find query for an entity.
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            kind: QueryKind::Find,
            entity: entity.into(),
            filter: None,
            order_by: vec![],
            pagination: None,
        }
    }

    /// Create a count query for an entity.
    pub fn count(entity: impl Into<String>) -> Self {
        Self {
            kind: QueryKind::Count,
            ..Self::new(entity)
        }
    }

    /// Set the filter. An existing filter is AND-ed with the new one.
    pub fn with_filter(mut self, filter: FilterExpr) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and_also(filter),
            None => filter,
        });
        self
    }

    /// Add ordering.
    pub fn with_order(mut self, order: OrderSpec) -> Self {
        self.order_by.push(order);
        self
    }

    /// Set pagination.
    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }

    /// Check if this is a count query.
    pub fn is_count(&self) -> bool {
        self.kind == QueryKind::Count
    }
}

/// Filter expression for querying entities.
///
/// Field names are dot-separated property paths into the stored document
/// (`country.code`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterExpr {
    /// Field equals value.
    Eq { field: String, value: Value },
    /// Field not equals value.
    Ne { field: String, value: Value },
    /// Field less than value.
    Lt { field: String, value: Value },
    /// Field less than or equal to value.
    Le { field: String, value: Value },
    /// Field greater than value.
    Gt { field: String, value: Value },
    /// Field greater than or equal to value.
    Ge { field: String, value: Value },
    /// Field is in a set of values.
    In { field: String, values: Vec<Value> },
    /// Field is not in a set of values.
    NotIn { field: String, values: Vec<Value> },
    /// Field is null or absent.
    IsNull { field: String },
    /// Field is present and not null.
    IsNotNull { field: String },
    /// Field matches a LIKE pattern.
    Like { field: String, pattern: String },
    /// Field does not match a LIKE pattern.
    NotLike { field: String, pattern: String },
    /// All conditions must be true.
    And(Vec<FilterExpr>),
    /// At least one condition must be true.
    Or(Vec<FilterExpr>),
    /// Negation.
    Not(Box<FilterExpr>),
}

impl FilterExpr {
    /// Create an equality filter.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        FilterExpr::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a not-equal filter.
    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        FilterExpr::Ne {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a less-than filter.
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        FilterExpr::Lt {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a less-than-or-equal filter.
    pub fn le(field: impl Into<String>, value: impl Into<Value>) -> Self {
        FilterExpr::Le {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a greater-than filter.
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        FilterExpr::Gt {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a greater-than-or-equal filter.
    pub fn ge(field: impl Into<String>, value: impl Into<Value>) -> Self {
        FilterExpr::Ge {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create an IN filter.
    pub fn in_values(field: impl Into<String>, values: Vec<Value>) -> Self {
        FilterExpr::In {
            field: field.into(),
            values,
        }
    }

    /// Create a NOT IN filter.
    pub fn not_in_values(field: impl Into<String>, values: Vec<Value>) -> Self {
        FilterExpr::NotIn {
            field: field.into(),
            values,
        }
    }

    /// Create an IS NULL filter.
    pub fn is_null(field: impl Into<String>) -> Self {
        FilterExpr::IsNull {
            field: field.into(),
        }
    }

    /// Create an IS NOT NULL filter.
    pub fn is_not_null(field: impl Into<String>) -> Self {
        FilterExpr::IsNotNull {
            field: field.into(),
        }
    }

    /// Create a LIKE filter.
    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        FilterExpr::Like {
            field: field.into(),
            pattern: pattern.into(),
        }
    }

    /// Create a NOT LIKE filter.
    pub fn not_like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        FilterExpr::NotLike {
            field: field.into(),
            pattern: pattern.into(),
        }
    }

    /// Create an AND filter. A single expression is returned unwrapped.
    pub fn and(mut exprs: Vec<FilterExpr>) -> Self {
        if exprs.len() == 1 {
            exprs.remove(0)
        } else {
            FilterExpr::And(exprs)
        }
    }

    /// Create an OR filter. A single expression is returned unwrapped.
    pub fn or(mut exprs: Vec<FilterExpr>) -> Self {
        if exprs.len() == 1 {
            exprs.remove(0)
        } else {
            FilterExpr::Or(exprs)
        }
    }

    /// Negate an expression.
    pub fn negate(expr: FilterExpr) -> Self {
        FilterExpr::Not(Box::new(expr))
    }

    /// Combine with another expression under AND, flattening nested ANDs.
    pub fn and_also(self, other: FilterExpr) -> Self {
        match self {
            FilterExpr::And(mut exprs) => {
                exprs.push(other);
                FilterExpr::And(exprs)
            }
            expr => FilterExpr::And(vec![expr, other]),
        }
    }

    /// Collect every field path referenced by this expression.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            FilterExpr::Eq { field, .. }
            | FilterExpr::Ne { field, .. }
            | FilterExpr::Lt { field, .. }
            | FilterExpr::Le { field, .. }
            | FilterExpr::Gt { field, .. }
            | FilterExpr::Ge { field, .. }
            | FilterExpr::In { field, .. }
            | FilterExpr::NotIn { field, .. }
            | FilterExpr::IsNull { field }
            | FilterExpr::IsNotNull { field }
            | FilterExpr::Like { field, .. }
            | FilterExpr::NotLike { field, .. } => out.push(field),
            FilterExpr::And(exprs) | FilterExpr::Or(exprs) => {
                for expr in exprs {
                    expr.collect_fields(out);
                }
            }
            FilterExpr::Not(expr) => expr.collect_fields(out),
        }
    }
}

/// Order specification for sorting results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSpec {
    /// Field path to order by.
    pub field: String,
    /// Sort direction.
    pub direction: OrderDirection,
}

impl OrderSpec {
    /// Create an ascending order spec.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Asc,
        }
    }

    /// Create a descending order spec.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Desc,
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OrderDirection {
    /// Ascending order.
    #[default]
    Asc,
    /// Descending order.
    Desc,
}

/// Pagination parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum number of results.
    pub limit: u32,
    /// Number of results to skip.
    pub offset: u32,
}

impl Pagination {
    /// Create pagination with limit and offset.
    pub fn new(limit: u32, offset: u32) -> Self {
        Self { limit, offset }
    }

    /// Create pagination with only a limit.
    pub fn limit(limit: u32) -> Self {
        Self { limit, offset: 0 }
    }

    /// Create pagination with only an offset.
    pub fn offset(offset: u32) -> Self {
        Self {
            limit: u32::MAX,
            offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_builder() {
        let query = EntityQuery::new("Country")
            .with_filter(FilterExpr::eq("designation", "FRANCE"))
            .with_filter(FilterExpr::is_not_null("code"))
            .with_order(OrderSpec::desc("code"))
            .with_pagination(Pagination::new(10, 5));

        assert!(!query.is_count());
        assert!(matches!(query.filter, Some(FilterExpr::And(ref v)) if v.len() == 2));
        assert_eq!(query.order_by[0].direction, OrderDirection::Desc);
        assert_eq!(query.pagination, Some(Pagination::new(10, 5)));
    }

    #[test]
    fn test_and_single_unwraps() {
        let expr = FilterExpr::and(vec![FilterExpr::eq("a", 1)]);
        assert_eq!(expr, FilterExpr::eq("a", 1));
    }

    #[test]
    fn test_fields() {
        let expr = FilterExpr::or(vec![
            FilterExpr::eq("code", "FR"),
            FilterExpr::negate(FilterExpr::is_null("region.name")),
        ]);
        assert_eq!(expr.fields(), vec!["code", "region.name"]);
    }
}
