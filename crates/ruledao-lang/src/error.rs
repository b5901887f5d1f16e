//! Error types for parsing, compilation and template resolution.

use crate::span::{render_snippet, Span};
use thiserror::Error;

/// Error during lexing/parsing of query text.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ParseError {
    /// The error message.
    pub message: String,
    /// Source span where the error occurred.
    pub span: Span,
    /// Optional hint for fixing the error.
    pub hint: Option<String>,
}

impl ParseError {
    /// Create a new parse error.
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            hint: None,
        }
    }

    /// Add a hint to the error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Format the error with source context.
    pub fn format_with_source(&self, source: &str) -> String {
        let mut result = format!("error: {}\n", self.message);
        result.push_str(&render_snippet(source, self.span));

        if let Some(hint) = &self.hint {
            result.push_str(&format!("   = hint: {}\n", hint));
        }

        result
    }
}

/// Kinds of compilation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileErrorKind {
    /// A `:name` parameter has no bound value.
    UnboundParameter,
    /// An operand has the wrong type for its position.
    TypeMismatch,
    /// Equality comparison against a null literal.
    NullComparison,
    /// Invalid literal value.
    InvalidLiteral,
}

/// Error during compilation (AST plus bindings to query IR).
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct CompileError {
    /// The error message.
    pub message: String,
    /// Source span where the error occurred.
    pub span: Span,
    /// Error kind for programmatic handling.
    pub kind: CompileErrorKind,
}

impl CompileError {
    /// Create a new compile error.
    pub fn new(message: impl Into<String>, span: Span, kind: CompileErrorKind) -> Self {
        Self {
            message: message.into(),
            span,
            kind,
        }
    }

    /// Create an unbound parameter error.
    pub fn unbound_parameter(name: &str, span: Span) -> Self {
        Self::new(
            format!("parameter ':{}' is not bound", name),
            span,
            CompileErrorKind::UnboundParameter,
        )
    }

    /// Create a type mismatch error.
    pub fn type_mismatch(expected: &str, got: &str, span: Span) -> Self {
        Self::new(
            format!("type mismatch: expected {}, got {}", expected, got),
            span,
            CompileErrorKind::TypeMismatch,
        )
    }

    /// Format the error with source context.
    pub fn format_with_source(&self, source: &str) -> String {
        let mut result = format!("error[{:?}]: {}\n", self.kind, self.message);
        result.push_str(&render_snippet(source, self.span));
        if self.kind == CompileErrorKind::NullComparison {
            result.push_str("   = hint: use 'is null' or 'is not null'\n");
        }
        result
    }
}

/// Kinds of template resolution errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveErrorKind {
    /// A function token's argument list never closes.
    UnterminatedFunction,
    /// A function token has no name after its prefix.
    MissingFunctionName,
}

/// Error while resolving a constraint query template.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ResolveError {
    /// The error message.
    pub message: String,
    /// Template span where the error occurred.
    pub span: Span,
    /// Error kind.
    pub kind: ResolveErrorKind,
}

impl ResolveError {
    /// Create a new resolve error.
    pub fn new(message: impl Into<String>, span: Span, kind: ResolveErrorKind) -> Self {
        Self {
            message: message.into(),
            span,
            kind,
        }
    }

    /// Format the error with template context.
    pub fn format_with_source(&self, template: &str) -> String {
        let mut result = format!("error[{:?}]: {}\n", self.kind, self.message);
        result.push_str(&render_snippet(template, self.span));
        result
    }
}

/// A combined error type for the public API.
#[derive(Debug, Clone, Error)]
pub enum LangError {
    /// Parse error.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    /// Compile error.
    #[error("compile error: {0}")]
    Compile(#[from] CompileError),
    /// Template resolution error.
    #[error("template error: {0}")]
    Resolve(#[from] ResolveError),
}

impl LangError {
    /// Format the error with source context.
    pub fn format_with_source(&self, source: &str) -> String {
        match self {
            LangError::Parse(e) => e.format_with_source(source),
            LangError::Compile(e) => e.format_with_source(source),
            LangError::Resolve(e) => e.format_with_source(source),
        }
    }

    /// Get the span of the error.
    pub fn span(&self) -> Span {
        match self {
            LangError::Parse(e) => e.span,
            LangError::Compile(e) => e.span,
            LangError::Resolve(e) => e.span,
        }
    }
}
