//! Lexer for the query text language using logos.

use crate::error::ParseError;
use crate::span::Span;
use logos::Logos;

/// Token types for the query text language.
///
/// Keywords are ASCII case-insensitive: `FIND`, `find` and `Find` lex the same.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Token {
    // Statement keywords
    #[token("find", ignore(ascii_case))]
    Find,
    #[token("count", ignore(ascii_case))]
    Count,
    #[token("where", ignore(ascii_case))]
    Where,
    #[token("order", ignore(ascii_case))]
    Order,
    #[token("by", ignore(ascii_case))]
    By,
    #[token("asc", ignore(ascii_case))]
    Asc,
    #[token("desc", ignore(ascii_case))]
    Desc,
    #[token("limit", ignore(ascii_case))]
    Limit,
    #[token("offset", ignore(ascii_case))]
    Offset,

    // Logical operators
    #[token("and", ignore(ascii_case))]
    And,
    #[token("or", ignore(ascii_case))]
    Or,
    #[token("not", ignore(ascii_case))]
    Not,

    // Keyword operators
    #[token("is", ignore(ascii_case))]
    Is,
    #[token("in", ignore(ascii_case))]
    In,
    #[token("like", ignore(ascii_case))]
    Like,

    // Literals
    #[token("true", ignore(ascii_case))]
    True,
    #[token("false", ignore(ascii_case))]
    False,
    #[token("null", ignore(ascii_case))]
    Null,

    // Comparison operators
    #[token("=")]
    #[token("==")]
    Eq,
    #[token("!=")]
    #[token("<>")]
    Ne,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,

    // Named parameter (`:var0`)
    #[regex(r":[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice()[1..].to_string())]
    Param(String),

    // Identifier
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    // String literal (double-quoted)
    #[regex(r#""([^"\\]|\\.)*""#, |lex| {
        let s = lex.slice();
        unescape_string(&s[1..s.len() - 1])
    })]
    // String literal (single-quoted)
    #[regex(r#"'([^'\\]|\\.)*'"#, |lex| {
        let s = lex.slice();
        unescape_string(&s[1..s.len() - 1])
    })]
    String(String),

    // Integer literal
    #[regex(r"-?[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),

    // Float literal
    #[regex(r"-?[0-9]+\.[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),

    // Punctuation
    #[token(".")]
    Dot,
    #[token(",")]
    Comma,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
}

impl Token {
    /// The keyword text for tokens that can double as identifiers in a
    /// property path (`order.count`).
    pub fn keyword_text(&self) -> Option<&'static str> {
        Some(match self {
            Token::Find => "find",
            Token::Count => "count",
            Token::Where => "where",
            Token::Order => "order",
            Token::By => "by",
            Token::Asc => "asc",
            Token::Desc => "desc",
            Token::Limit => "limit",
            Token::Offset => "offset",
            Token::Is => "is",
            Token::In => "in",
            Token::Like => "like",
            _ => return None,
        })
    }
}

/// Unescape a string literal, handling common escape sequences.
fn unescape_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some(other @ ('\\' | '"' | '\'')) => result.push(other),
            Some(other) => {
                result.push('\\');
                result.push(other);
            }
            None => result.push('\\'),
        }
    }

    result
}

/// A token with its span in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

/// Lexer that produces spanned tokens, reporting unrecognised input.
pub struct Lexer<'source> {
    inner: logos::Lexer<'source, Token>,
}

impl<'source> Lexer<'source> {
    /// Create a new lexer for the given source.
    pub fn new(source: &'source str) -> Self {
        Self {
            inner: Token::lexer(source),
        }
    }

    /// Get the source string.
    pub fn source(&self) -> &'source str {
        self.inner.source()
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<SpannedToken, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        let result = self.inner.next()?;
        let span: Span = self.inner.span().into();
        Some(match result {
            Ok(token) => Ok(SpannedToken { token, span }),
            Err(()) => Err(ParseError::new(
                format!("unexpected character '{}'", self.inner.slice()),
                span,
            )),
        })
    }
}

/// Tokenize a source string, failing on the first unrecognised character.
pub fn tokenize(source: &str) -> Result<Vec<SpannedToken>, ParseError> {
    Lexer::new(source).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.token)
            .collect()
    }

    #[test]
    fn test_simple_query() {
        assert_eq!(
            kinds("find Country"),
            vec![Token::Find, Token::Ident("Country".to_string())]
        );
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        assert_eq!(kinds("FIND Country WHERE"), kinds("find Country where"));
    }

    #[test]
    fn test_parameter_and_operators() {
        let tokens = kinds("code = :var0 and size <> :var1");
        assert!(tokens.contains(&Token::Param("var0".to_string())));
        assert!(tokens.contains(&Token::Eq));
        assert!(tokens.contains(&Token::Ne));
        assert!(tokens.contains(&Token::And));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("123 -456 3.14 -2.5"),
            vec![
                Token::Int(123),
                Token::Int(-456),
                Token::Float(3.14),
                Token::Float(-2.5)
            ]
        );
    }

    #[test]
    fn test_string_quotes_and_escapes() {
        assert_eq!(
            kinds(r#"'it\'s' "tab\there""#),
            vec![
                Token::String("it's".to_string()),
                Token::String("tab\there".to_string())
            ]
        );
    }

    #[test]
    fn test_dotted_path() {
        assert_eq!(
            kinds("order.country.code"),
            vec![
                Token::Order,
                Token::Dot,
                Token::Ident("country".to_string()),
                Token::Dot,
                Token::Ident("code".to_string()),
            ]
        );
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokenize("find Country where code ~ 1").unwrap_err();
        assert_eq!(err.span, Span::new(24, 25));
        assert!(err.message.contains('~'));
    }
}
