//! Recursive descent parser for the query text language.
//!
//! ```text
//! find Country where designation = :var0 and not (code is null) order by code desc limit 10
//! count Order where country.code in ('FR', 'DE')
//! ```

use crate::ast::*;
use crate::error::ParseError;
use crate::lexer::{tokenize, SpannedToken, Token};
use crate::span::{Span, Spanned};

/// Parser for the query text language.
pub struct Parser<'source> {
    tokens: Vec<SpannedToken>,
    pos: usize,
    source: &'source str,
}

impl<'source> Parser<'source> {
    /// Create a new parser, tokenizing the whole source up front.
    pub fn new(source: &'source str) -> Result<Self, ParseError> {
        Ok(Self {
            tokens: tokenize(source)?,
            pos: 0,
            source,
        })
    }

    /// Parse a complete statement.
    pub fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        let op = self.next_token()?;
        let kind = match op.token {
            Token::Find => StatementKind::Find,
            Token::Count => StatementKind::Count,
            other => {
                return Err(ParseError::new(
                    format!("expected 'find' or 'count', found {:?}", other),
                    op.span,
                )
                .with_hint("queries start with 'find <Entity>' or 'count <Entity>'"))
            }
        };

        let entity = self.expect_name()?;
        let mut end_span = entity.span;

        let condition = if self.eat(&Token::Where) {
            let condition = self.parse_or()?;
            end_span = self.prev_span();
            Some(condition)
        } else {
            None
        };

        let mut order_by = Vec::new();
        if self.eat(&Token::Order) {
            self.expect_token(Token::By)?;
            loop {
                let field = self.parse_path()?;
                let direction = if self.eat(&Token::Desc) {
                    SortDirection::Desc
                } else {
                    self.eat(&Token::Asc);
                    SortDirection::Asc
                };
                order_by.push(OrderItem { field, direction });
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            end_span = self.prev_span();
        }

        let limit = if self.eat(&Token::Limit) {
            let value = self.expect_count("limit")?;
            end_span = value.span;
            Some(value)
        } else {
            None
        };

        let offset = if self.eat(&Token::Offset) {
            let value = self.expect_count("offset")?;
            end_span = value.span;
            Some(value)
        } else {
            None
        };

        if let Some(extra) = self.tokens.get(self.pos) {
            return Err(ParseError::new(
                format!("unexpected trailing {:?}", extra.token),
                extra.span,
            ));
        }

        Ok(Statement {
            kind,
            entity,
            condition,
            order_by,
            limit,
            offset,
            span: op.span.merge(end_span),
        })
    }

    /// Parse OR conditions (lowest precedence).
    fn parse_or(&mut self) -> Result<Condition, ParseError> {
        let mut conditions = vec![self.parse_and()?];
        while self.eat(&Token::Or) {
            conditions.push(self.parse_and()?);
        }
        Ok(if conditions.len() == 1 {
            conditions.remove(0)
        } else {
            Condition::Or(conditions)
        })
    }

    /// Parse AND conditions.
    fn parse_and(&mut self) -> Result<Condition, ParseError> {
        let mut conditions = vec![self.parse_unary()?];
        while self.eat(&Token::And) {
            conditions.push(self.parse_unary()?);
        }
        Ok(if conditions.len() == 1 {
            conditions.remove(0)
        } else {
            Condition::And(conditions)
        })
    }

    /// Parse `not`, parenthesised groups and predicates.
    fn parse_unary(&mut self) -> Result<Condition, ParseError> {
        if self.eat(&Token::Not) {
            return Ok(Condition::Not(Box::new(self.parse_unary()?)));
        }
        if self.eat(&Token::LParen) {
            let inner = self.parse_or()?;
            self.expect_token(Token::RParen)?;
            return Ok(inner);
        }
        self.parse_predicate()
    }

    /// Parse a single predicate (comparison, is null, in, like).
    fn parse_predicate(&mut self) -> Result<Condition, ParseError> {
        let field = self.parse_path()?;
        let op_tok = self.next_token()?;

        match op_tok.token {
            Token::Eq | Token::Ne | Token::Lt | Token::Le | Token::Gt | Token::Ge => {
                let op = match op_tok.token {
                    Token::Eq => ComparisonOp::Eq,
                    Token::Ne => ComparisonOp::Ne,
                    Token::Lt => ComparisonOp::Lt,
                    Token::Le => ComparisonOp::Le,
                    Token::Gt => ComparisonOp::Gt,
                    _ => ComparisonOp::Ge,
                };
                let operand = self.parse_operand()?;
                Ok(Condition::Comparison { field, op, operand })
            }

            Token::Is => {
                let negated = self.eat(&Token::Not);
                self.expect_token(Token::Null)?;
                Ok(Condition::IsNull { field, negated })
            }

            Token::In => self.parse_in(field, false),

            Token::Like => {
                let pattern = self.parse_operand()?;
                Ok(Condition::Like {
                    field,
                    pattern,
                    negated: false,
                })
            }

            Token::Not => {
                let next = self.next_token()?;
                match next.token {
                    Token::In => self.parse_in(field, true),
                    Token::Like => {
                        let pattern = self.parse_operand()?;
                        Ok(Condition::Like {
                            field,
                            pattern,
                            negated: true,
                        })
                    }
                    other => Err(ParseError::new(
                        format!("expected 'in' or 'like' after 'not', found {:?}", other),
                        next.span,
                    )),
                }
            }

            other => Err(ParseError::new(
                format!("expected comparison operator, found {:?}", other),
                op_tok.span,
            )),
        }
    }

    /// Parse the parenthesised operand list of an `in` predicate.
    fn parse_in(&mut self, field: Spanned<String>, negated: bool) -> Result<Condition, ParseError> {
        self.expect_token(Token::LParen)?;
        let mut operands = Vec::new();

        if !self.eat(&Token::RParen) {
            loop {
                operands.push(self.parse_operand()?);
                if self.eat(&Token::RParen) {
                    break;
                }
                self.expect_token(Token::Comma)?;
            }
        }

        Ok(Condition::In {
            field,
            operands,
            negated,
        })
    }

    /// Parse a literal or `:name` parameter.
    fn parse_operand(&mut self) -> Result<Spanned<Operand>, ParseError> {
        let tok = self.next_token()?;
        let operand = match tok.token {
            Token::Param(name) => Operand::Param(name),
            Token::Null => Operand::Literal(Literal::Null),
            Token::True => Operand::Literal(Literal::Bool(true)),
            Token::False => Operand::Literal(Literal::Bool(false)),
            Token::Int(i) => Operand::Literal(Literal::Int(i)),
            Token::Float(f) => Operand::Literal(Literal::Float(f)),
            Token::String(s) => Operand::Literal(Literal::String(s)),
            other => {
                return Err(ParseError::new(
                    format!("expected literal or parameter, found {:?}", other),
                    tok.span,
                ))
            }
        };
        Ok(Spanned::new(operand, tok.span))
    }

    /// Parse a dotted property path. Keywords are accepted as segments.
    fn parse_path(&mut self) -> Result<Spanned<String>, ParseError> {
        let first = self.expect_name()?;
        let mut path = first.value;
        let mut span = first.span;

        while self.eat(&Token::Dot) {
            let segment = self.expect_name()?;
            path.push('.');
            path.push_str(&segment.value);
            span = span.merge(segment.span);
        }

        Ok(Spanned::new(path, span))
    }

    /// Expect an identifier (or a keyword usable as a name).
    fn expect_name(&mut self) -> Result<Spanned<String>, ParseError> {
        let tok = self.next_token()?;
        let name = match &tok.token {
            Token::Ident(name) => name.clone(),
            other => match other.keyword_text() {
                Some(text) => text.to_string(),
                None => {
                    return Err(ParseError::new(
                        format!("expected identifier, found {:?}", other),
                        tok.span,
                    ))
                }
            },
        };
        Ok(Spanned::new(name, tok.span))
    }

    /// Expect a non-negative integer for `limit`/`offset`.
    fn expect_count(&mut self, clause: &str) -> Result<Spanned<u32>, ParseError> {
        let tok = self.next_token()?;
        match tok.token {
            Token::Int(i) if i >= 0 => u32::try_from(i)
                .map(|v| Spanned::new(v, tok.span))
                .map_err(|_| ParseError::new(format!("{} is too large", clause), tok.span)),
            Token::Int(_) => Err(ParseError::new(
                format!("{} must be non-negative", clause),
                tok.span,
            )),
            other => Err(ParseError::new(
                format!("expected integer after '{}', found {:?}", clause, other),
                tok.span,
            )),
        }
    }

    /// Consume the next token if it matches.
    fn eat(&mut self, expected: &Token) -> bool {
        match self.tokens.get(self.pos) {
            Some(tok) if &tok.token == expected => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    /// Expect and consume a specific token.
    fn expect_token(&mut self, expected: Token) -> Result<SpannedToken, ParseError> {
        let tok = self.next_token()?;
        if std::mem::discriminant(&tok.token) == std::mem::discriminant(&expected) {
            Ok(tok)
        } else {
            Err(ParseError::new(
                format!("expected {:?}, found {:?}", expected, tok.token),
                tok.span,
            ))
        }
    }

    /// Get the next token or error if EOF.
    fn next_token(&mut self) -> Result<SpannedToken, ParseError> {
        let tok = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| ParseError::new("unexpected end of input", Span::eof(self.source)))?;
        self.pos += 1;
        Ok(tok)
    }

    /// Span of the most recently consumed token.
    fn prev_span(&self) -> Span {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map(|t| t.span)
            .unwrap_or_default()
    }
}

/// Parse a source string into a statement.
pub fn parse(source: &str) -> Result<Statement, ParseError> {
    Parser::new(source)?.parse_statement()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_simple_find() {
        let stmt = parse("find Country").unwrap();
        assert_eq!(stmt.kind, StatementKind::Find);
        assert_eq!(stmt.entity.value, "Country");
        assert!(stmt.condition.is_none());
    }

    #[test]
    fn test_parse_comparison_with_param() {
        let stmt = parse("find Country where designation = :var0").unwrap();
        match stmt.condition {
            Some(Condition::Comparison { field, op, operand }) => {
                assert_eq!(field.value, "designation");
                assert_eq!(op, ComparisonOp::Eq);
                assert_eq!(operand.value, Operand::Param("var0".to_string()));
            }
            other => panic!("expected Comparison, got {:?}", other),
        }
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let stmt = parse("find T where a = 1 or b = 2 and c = 3").unwrap();
        match stmt.condition {
            Some(Condition::Or(parts)) => {
                assert_eq!(parts.len(), 2);
                assert!(matches!(parts[1], Condition::And(ref inner) if inner.len() == 2));
            }
            other => panic!("expected Or, got {:?}", other),
        }
    }

    #[test]
    fn test_parentheses_and_not() {
        let stmt = parse("find T where not (a = 1 or b is not null)").unwrap();
        match stmt.condition {
            Some(Condition::Not(inner)) => assert!(matches!(*inner, Condition::Or(_))),
            other => panic!("expected Not, got {:?}", other),
        }
    }

    #[test]
    fn test_in_and_like() {
        let stmt = parse("count T where code not in ('FR', :var0) and name like 'Fr%'").unwrap();
        assert_eq!(stmt.kind, StatementKind::Count);
        match stmt.condition {
            Some(Condition::And(parts)) => {
                assert!(matches!(
                    parts[0],
                    Condition::In { ref operands, negated: true, .. } if operands.len() == 2
                ));
                assert!(matches!(parts[1], Condition::Like { negated: false, .. }));
            }
            other => panic!("expected And, got {:?}", other),
        }
    }

    #[test]
    fn test_dotted_path_with_keyword_segment() {
        let stmt = parse("find Line where order.country.code = 'FR'").unwrap();
        match stmt.condition {
            Some(Condition::Comparison { field, .. }) => {
                assert_eq!(field.value, "order.country.code")
            }
            other => panic!("expected Comparison, got {:?}", other),
        }
    }

    #[test]
    fn test_order_limit_offset() {
        let stmt = parse("find T order by code desc, name limit 10 offset 20").unwrap();
        assert_eq!(stmt.order_by.len(), 2);
        assert_eq!(stmt.order_by[0].direction, SortDirection::Desc);
        assert_eq!(stmt.order_by[1].direction, SortDirection::Asc);
        assert_eq!(stmt.limit.map(|l| l.value), Some(10));
        assert_eq!(stmt.offset.map(|o| o.value), Some(20));
    }

    #[test]
    fn test_negative_limit_rejected() {
        let err = parse("find T limit -1").unwrap_err();
        assert!(err.message.contains("non-negative"));
    }

    #[test]
    fn test_trailing_tokens_rejected() {
        let err = parse("find T where a = 1 )").unwrap_err();
        assert!(err.message.contains("trailing"));
    }

    #[test]
    fn test_missing_verb_has_hint() {
        let err = parse("Country where a = 1").unwrap_err();
        assert!(err.hint.is_some());
    }

    #[test]
    fn test_unexpected_eof() {
        let err = parse("find T where a =").unwrap_err();
        assert_eq!(err.message, "unexpected end of input");
    }
}
