//! ruledao shared types.
//!
//! This crate defines the value and query IR types shared by the query
//! language and the data-access core.
//!
//! # Modules
//!
//! - [`value`] - Runtime value types for query parameters and predicates
//! - [`query`] - Structured predicates, ordering and pagination
//! - [`error`] - Conversion error types

pub mod error;
pub mod query;
pub mod value;

pub use error::Error;

// Re-export commonly used types at crate root
pub use query::{EntityQuery, FilterExpr, OrderDirection, OrderSpec, Pagination, QueryKind};
pub use value::Value;
