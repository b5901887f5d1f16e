//! ruledao query language
//!
//! This crate provides two small languages used by the data-access core:
//!
//! - the **query text language** executed by a persistence session, parsed
//!   into an AST and compiled against named parameter bindings into an
//!   [`EntityQuery`](ruledao_proto::EntityQuery);
//! - the **constraint template** syntax, resolved into an
//!   [`ExpressionModel`] whose tokens become named parameters.
//!
//! # Query Text Syntax
//!
//! ```text
//! find Country
//! find Country where designation = :var0
//! count Order where country.code in ('FR', 'DE') and total >= 100
//! find Country where name like 'Fr%' order by code desc limit 10 offset 20
//! find Country where parent is null or not (zone != :zone)
//! ```
//!
//! # Usage
//!
//! ```rust
//! use std::collections::HashMap;
//! use ruledao_lang::{parse_and_compile, resolve};
//! use ruledao_proto::Value;
//!
//! let model = resolve("find Country where designation = ${designation}")
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(model.computed(), "find Country where designation = :var0");
//!
//! let mut bindings = HashMap::new();
//! bindings.insert("var0".to_string(), Value::from("FRANCE"));
//! let query = parse_and_compile(model.computed(), &bindings).unwrap();
//! assert_eq!(query.entity, "Country");
//! ```

pub mod ast;
pub mod compiler;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod span;
pub mod template;

use std::collections::HashMap;

use ruledao_proto::{EntityQuery, Value};

// Re-export main types
pub use ast::{
    ComparisonOp, Condition, Literal, Operand, OrderItem, SortDirection, Statement, StatementKind,
};
pub use error::{
    CompileError, CompileErrorKind, LangError, ParseError, ResolveError, ResolveErrorKind,
};
pub use span::{Span, Spanned};
pub use template::{ExpressionModel, FunctionCall, Parameter};

/// Parse a source string into an AST.
pub fn parse(source: &str) -> Result<Statement, ParseError> {
    parser::parse(source)
}

/// Compile an AST against parameter bindings.
pub fn compile(
    stmt: &Statement,
    bindings: &HashMap<String, Value>,
) -> Result<EntityQuery, CompileError> {
    compiler::compile(stmt, bindings)
}

/// Parse and compile a source string in one step.
pub fn parse_and_compile(
    source: &str,
    bindings: &HashMap<String, Value>,
) -> Result<EntityQuery, LangError> {
    let stmt = parse(source)?;
    Ok(compile(&stmt, bindings)?)
}

/// Resolve a constraint template into an [`ExpressionModel`].
pub fn resolve(template: &str) -> Result<Option<ExpressionModel>, ResolveError> {
    template::resolve(template)
}

/// Tokenize a source string (useful for debugging).
pub fn tokenize(source: &str) -> Result<Vec<lexer::SpannedToken>, ParseError> {
    lexer::tokenize(source)
}
