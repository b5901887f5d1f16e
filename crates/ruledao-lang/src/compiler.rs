//! Compiler from AST plus parameter bindings to query IR.

use std::collections::HashMap;

use crate::ast::*;
use crate::error::{CompileError, CompileErrorKind};
use crate::span::{Span, Spanned};
use ruledao_proto::query::{EntityQuery, FilterExpr, OrderDirection, OrderSpec, Pagination, QueryKind};
use ruledao_proto::value::Value;

/// Compiler for the query language.
///
/// Parameters are substituted at compile time, so a statement parsed once can
/// be compiled repeatedly against different bindings.
pub struct Compiler<'a> {
    bindings: &'a HashMap<String, Value>,
}

impl<'a> Compiler<'a> {
    /// Create a compiler over a set of parameter bindings.
    pub fn new(bindings: &'a HashMap<String, Value>) -> Self {
        Self { bindings }
    }

    /// Compile a statement to IR.
    pub fn compile(&self, stmt: &Statement) -> Result<EntityQuery, CompileError> {
        let kind = match stmt.kind {
            StatementKind::Find => QueryKind::Find,
            StatementKind::Count => QueryKind::Count,
        };

        let mut query = EntityQuery {
            kind,
            entity: stmt.entity.value.clone(),
            filter: None,
            order_by: Vec::new(),
            pagination: None,
        };

        if let Some(condition) = &stmt.condition {
            query.filter = Some(self.compile_condition(condition)?);
        }

        query.order_by = stmt
            .order_by
            .iter()
            .map(|item| OrderSpec {
                field: item.field.value.clone(),
                direction: match item.direction {
                    SortDirection::Asc => OrderDirection::Asc,
                    SortDirection::Desc => OrderDirection::Desc,
                },
            })
            .collect();

        if stmt.limit.is_some() || stmt.offset.is_some() {
            query.pagination = Some(Pagination::new(
                stmt.limit.as_ref().map(|l| l.value).unwrap_or(u32::MAX),
                stmt.offset.as_ref().map(|o| o.value).unwrap_or(0),
            ));
        }

        Ok(query)
    }

    fn compile_condition(&self, condition: &Condition) -> Result<FilterExpr, CompileError> {
        match condition {
            Condition::Comparison { field, op, operand } => {
                let value = self.scalar_operand(operand)?;
                let field = field.value.clone();
                Ok(match op {
                    ComparisonOp::Eq => FilterExpr::Eq { field, value },
                    ComparisonOp::Ne => FilterExpr::Ne { field, value },
                    ComparisonOp::Lt => FilterExpr::Lt { field, value },
                    ComparisonOp::Le => FilterExpr::Le { field, value },
                    ComparisonOp::Gt => FilterExpr::Gt { field, value },
                    ComparisonOp::Ge => FilterExpr::Ge { field, value },
                })
            }

            Condition::In {
                field,
                operands,
                negated,
            } => {
                let mut values = Vec::with_capacity(operands.len());
                for operand in operands {
                    // A list-bound parameter splices its elements into the set.
                    match self.operand_value(operand)? {
                        Value::List(items) => values.extend(items),
                        value => values.push(value),
                    }
                }
                let field = field.value.clone();
                Ok(if *negated {
                    FilterExpr::NotIn { field, values }
                } else {
                    FilterExpr::In { field, values }
                })
            }

            Condition::IsNull { field, negated } => {
                let field = field.value.clone();
                Ok(if *negated {
                    FilterExpr::IsNotNull { field }
                } else {
                    FilterExpr::IsNull { field }
                })
            }

            Condition::Like {
                field,
                pattern,
                negated,
            } => {
                let pattern = match self.operand_value(pattern)? {
                    Value::String(s) => s,
                    other => {
                        return Err(CompileError::type_mismatch(
                            "string pattern",
                            other.type_name(),
                            pattern.span,
                        ))
                    }
                };
                let field = field.value.clone();
                Ok(if *negated {
                    FilterExpr::NotLike { field, pattern }
                } else {
                    FilterExpr::Like { field, pattern }
                })
            }

            Condition::And(conditions) => Ok(FilterExpr::And(
                conditions
                    .iter()
                    .map(|c| self.compile_condition(c))
                    .collect::<Result<_, _>>()?,
            )),

            Condition::Or(conditions) => Ok(FilterExpr::Or(
                conditions
                    .iter()
                    .map(|c| self.compile_condition(c))
                    .collect::<Result<_, _>>()?,
            )),

            Condition::Not(inner) => Ok(FilterExpr::Not(Box::new(self.compile_condition(inner)?))),
        }
    }

    /// Resolve an operand that must be a single value.
    fn scalar_operand(&self, operand: &Spanned<Operand>) -> Result<Value, CompileError> {
        if let Operand::Literal(Literal::Null) = operand.value {
            return Err(CompileError::new(
                "comparison with a null literal never matches",
                operand.span,
                CompileErrorKind::NullComparison,
            ));
        }
        match self.operand_value(operand)? {
            Value::List(_) => Err(CompileError::type_mismatch("scalar", "list", operand.span)),
            value => Ok(value),
        }
    }

    fn operand_value(&self, operand: &Spanned<Operand>) -> Result<Value, CompileError> {
        match &operand.value {
            Operand::Literal(literal) => Self::compile_literal(literal, operand.span),
            Operand::Param(name) => self
                .bindings
                .get(name)
                .cloned()
                .ok_or_else(|| CompileError::unbound_parameter(name, operand.span)),
        }
    }

    fn compile_literal(literal: &Literal, span: Span) -> Result<Value, CompileError> {
        Ok(match literal {
            Literal::Null => Value::Null,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Int(i) => Value::Int(*i),
            Literal::Float(f) if f.is_finite() => Value::Float(*f),
            Literal::Float(_) => {
                return Err(CompileError::new(
                    "float literal is not finite",
                    span,
                    CompileErrorKind::InvalidLiteral,
                ))
            }
            Literal::String(s) => Value::String(s.clone()),
        })
    }
}

/// Compile a statement against a set of bindings.
pub fn compile(
    stmt: &Statement,
    bindings: &HashMap<String, Value>,
) -> Result<EntityQuery, CompileError> {
    Compiler::new(bindings).compile(stmt)
}
