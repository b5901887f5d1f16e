//! Protocol error types.

use thiserror::Error;

/// Errors raised converting JSON into runtime values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A JSON number that fits neither `i64` nor `f64`.
    #[error("number out of range: {0}")]
    NumberOutOfRange(String),

    /// JSON objects have no runtime `Value` counterpart.
    #[error("objects cannot be represented as values")]
    Object,
}
