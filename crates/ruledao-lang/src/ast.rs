//! Abstract Syntax Tree types for the query text language.

use crate::span::{Span, Spanned};

/// A parsed query statement: `find`/`count` over one entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// Find or count.
    pub kind: StatementKind,
    /// The entity being queried.
    pub entity: Spanned<String>,
    /// The `where` condition, if any.
    pub condition: Option<Condition>,
    /// The `order by` items.
    pub order_by: Vec<OrderItem>,
    /// The `limit` clause.
    pub limit: Option<Spanned<u32>>,
    /// The `offset` clause.
    pub offset: Option<Spanned<u32>>,
    /// The full span of the statement.
    pub span: Span,
}

impl Statement {
    /// Names of every `:name` parameter referenced, in source order.
    pub fn parameters(&self) -> Vec<&str> {
        let mut out = Vec::new();
        if let Some(condition) = &self.condition {
            condition.collect_parameters(&mut out);
        }
        out
    }
}

/// Kind of query statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// Return matching records.
    Find,
    /// Return the number of matching records.
    Count,
}

/// A filter condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Comparison: path op operand.
    Comparison {
        field: Spanned<String>,
        op: ComparisonOp,
        operand: Spanned<Operand>,
    },
    /// Membership: path [not] in (operands).
    In {
        field: Spanned<String>,
        operands: Vec<Spanned<Operand>>,
        negated: bool,
    },
    /// Null check: path is [not] null.
    IsNull {
        field: Spanned<String>,
        negated: bool,
    },
    /// Pattern match: path [not] like operand.
    Like {
        field: Spanned<String>,
        pattern: Spanned<Operand>,
        negated: bool,
    },
    /// Logical AND of conditions.
    And(Vec<Condition>),
    /// Logical OR of conditions.
    Or(Vec<Condition>),
    /// Logical negation.
    Not(Box<Condition>),
}

impl Condition {
    fn collect_parameters<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Condition::Comparison { operand, .. } => operand.value.collect_parameter(out),
            Condition::In { operands, .. } => {
                for operand in operands {
                    operand.value.collect_parameter(out);
                }
            }
            Condition::IsNull { .. } => {}
            Condition::Like { pattern, .. } => pattern.value.collect_parameter(out),
            Condition::And(conditions) | Condition::Or(conditions) => {
                for condition in conditions {
                    condition.collect_parameters(out);
                }
            }
            Condition::Not(inner) => inner.collect_parameters(out),
        }
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    /// `=` or `==`
    Eq,
    /// `!=` or `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

/// The right-hand side of a predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// An inline literal.
    Literal(Literal),
    /// A named parameter supplied at execution time.
    Param(String),
}

impl Operand {
    fn collect_parameter<'a>(&'a self, out: &mut Vec<&'a str>) {
        if let Operand::Param(name) = self {
            out.push(name);
        }
    }
}

/// A literal value.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Float value.
    Float(f64),
    /// String value.
    String(String),
}

impl Literal {
    /// Get a description of the literal type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Literal::Null => "null",
            Literal::Bool(_) => "bool",
            Literal::Int(_) => "int",
            Literal::Float(_) => "float",
            Literal::String(_) => "string",
        }
    }
}

/// An `order by` item.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    /// Field path to order by.
    pub field: Spanned<String>,
    /// Sort direction.
    pub direction: SortDirection,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    /// Ascending (default).
    #[default]
    Asc,
    /// Descending.
    Desc,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameters_in_source_order() {
        let field = Spanned::new("code".to_string(), Span::new(0, 4));
        let stmt = Statement {
            kind: StatementKind::Find,
            entity: Spanned::new("Country".to_string(), Span::new(0, 7)),
            condition: Some(Condition::And(vec![
                Condition::Comparison {
                    field: field.clone(),
                    op: ComparisonOp::Eq,
                    operand: Spanned::new(Operand::Param("var1".into()), Span::default()),
                },
                Condition::In {
                    field,
                    operands: vec![
                        Spanned::new(Operand::Literal(Literal::Int(1)), Span::default()),
                        Spanned::new(Operand::Param("var0".into()), Span::default()),
                    ],
                    negated: false,
                },
            ])),
            order_by: vec![],
            limit: None,
            offset: None,
            span: Span::default(),
        };

        assert_eq!(stmt.parameters(), vec!["var1", "var0"]);
    }

    #[test]
    fn test_literal_type_names() {
        assert_eq!(Literal::Null.type_name(), "null");
        assert_eq!(Literal::Float(2.5).type_name(), "float");
        assert_eq!(Literal::String("x".into()).type_name(), "string");
    }
}
