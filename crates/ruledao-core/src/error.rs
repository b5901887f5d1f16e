//! Core error types.
//!
//! Every failure surfaced to callers carries a stable message code
//! ([`Error::code`]) that does not depend on the store's native error text.

use std::fmt;

use ruledao_lang::LangError;
use thiserror::Error;

use crate::constraint::{EvaluationTime, OperationMode};

/// Core errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A declared rule's check did not hold.
    #[error("{0}")]
    Validation(ValidationFailure),

    /// A rule could not be constructed from its declaration.
    #[error("cannot instantiate {kind} rule: {reason}")]
    RuleInstantiation { kind: &'static str, reason: String },

    /// The store rejected a mutation.
    #[error("{operation} failed ({code})")]
    Mutation {
        code: &'static str,
        operation: OperationMode,
        #[source]
        source: Option<Box<Error>>,
    },

    /// A null record or identifier was passed to an operation.
    #[error("{operation} called with a null {what}")]
    NullInput {
        operation: OperationMode,
        what: &'static str,
    },

    /// An expression could not be evaluated against a record.
    #[error("evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    /// Query text failed to parse or compile.
    #[error("query error: {0}")]
    Query(#[from] LangError),

    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Key decoding error.
    #[error("invalid key format")]
    InvalidKey,

    /// A record with the given id does not exist.
    #[error("{entity} with id {id} not found")]
    NotFound { entity: String, id: String },

    /// The stored version did not match the expected one.
    #[error("version conflict on {entity} {id}: expected {expected}, found {found}")]
    VersionConflict {
        entity: String,
        id: String,
        expected: u64,
        found: u64,
    },

    /// A request was malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Stable message code for this error.
    pub fn code(&self) -> &str {
        match self {
            Error::Validation(failure) => &failure.code,
            Error::RuleInstantiation { .. } => "rule.instantiation",
            Error::Mutation { code, .. } => code,
            Error::NullInput { .. } => "input.null",
            Error::Evaluation(e) => e.code(),
            Error::Query(_) => "query.invalid",
            Error::Storage(_) => "storage.failed",
            Error::Serialization(_) | Error::Deserialization(_) => "serialization.failed",
            Error::InvalidKey => "storage.invalid_key",
            Error::NotFound { .. } => "mutation.not_found",
            Error::VersionConflict { .. } => "mutation.conflict",
            Error::InvalidRequest(_) => "request.invalid",
            Error::Config(_) => "config.invalid",
        }
    }

    /// Whether this is a rule validation failure.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    /// The validation failure, if this is one.
    pub fn as_validation(&self) -> Option<&ValidationFailure> {
        match self {
            Error::Validation(failure) => Some(failure),
            _ => None,
        }
    }

    /// Wrap a store-level error as a mutation failure of `operation`.
    ///
    /// Rule failures and errors that are already mutation failures pass
    /// through unchanged.
    pub fn into_mutation(self, operation: OperationMode) -> Error {
        match self {
            Error::Mutation { .. } | Error::Validation(_) | Error::NullInput { .. } => self,
            other => {
                let code = match other {
                    Error::VersionConflict { .. } => "mutation.conflict",
                    Error::NotFound { .. } => "mutation.not_found",
                    _ => "mutation.failed",
                };
                Error::Mutation {
                    code,
                    operation,
                    source: Some(Box::new(other)),
                }
            }
        }
    }

    pub(crate) fn rule(kind: &'static str, reason: impl Into<String>) -> Self {
        Error::RuleInstantiation {
            kind,
            reason: reason.into(),
        }
    }
}

impl From<ValidationFailure> for Error {
    fn from(failure: ValidationFailure) -> Self {
        Error::Validation(failure)
    }
}

impl From<ruledao_lang::ParseError> for Error {
    fn from(e: ruledao_lang::ParseError) -> Self {
        Error::Query(e.into())
    }
}

impl From<ruledao_lang::CompileError> for Error {
    fn from(e: ruledao_lang::CompileError) -> Self {
        Error::Query(e.into())
    }
}

/// A declared rule whose check did not hold.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationFailure {
    /// Declared message code.
    pub code: String,
    /// Message parameters, computed only once the check has failed.
    pub params: Vec<String>,
    /// Entity type being validated.
    pub entity: String,
    /// Operation in progress.
    pub mode: OperationMode,
    /// Phase in which the rule ran.
    pub time: EvaluationTime,
    /// Failures of sibling rules in the same composite declaration.
    pub siblings: Vec<ValidationFailure>,
}

impl ValidationFailure {
    /// Every failure carried, this one first.
    pub fn all(&self) -> Vec<&ValidationFailure> {
        let mut out = vec![self];
        for sibling in &self.siblings {
            out.extend(sibling.all());
        }
        out
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "validation failed on {} ({} {}): {}",
            self.entity, self.mode, self.time, self.code
        )?;
        if !self.params.is_empty() {
            write!(f, " [{}]", self.params.join(", "))?;
        }
        if !self.siblings.is_empty() {
            write!(f, " (+{} more)", self.siblings.len())?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationFailure {}

/// Failure while evaluating a template expression against a record.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    /// A path segment is absent on the record and no configuration value
    /// with that name exists.
    #[error("property '{segment}' not found while resolving '{path}'")]
    PropertyNotFound { path: String, segment: String },

    /// A registered function rejected its argument.
    #[error("function '{name}' failed: {reason}")]
    Function { name: String, reason: String },

    /// A value cannot be used as a query parameter.
    #[error("cannot bind value: {0}")]
    Unbindable(String),
}

impl EvaluationError {
    /// Stable message code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            EvaluationError::PropertyNotFound { .. } => "evaluation.property_not_found",
            EvaluationError::Function { .. } => "evaluation.function_failed",
            EvaluationError::Unbindable(_) => "evaluation.unbindable",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(code: &str) -> ValidationFailure {
        ValidationFailure {
            code: code.to_string(),
            params: vec!["FRANCE".to_string()],
            entity: "Country".to_string(),
            mode: OperationMode::Create,
            time: EvaluationTime::PreCondition,
            siblings: Vec::new(),
        }
    }

    #[test]
    fn test_codes() {
        assert_eq!(Error::from(failure("country.duplicate")).code(), "country.duplicate");
        assert_eq!(
            Error::NullInput {
                operation: OperationMode::Delete,
                what: "id"
            }
            .code(),
            "input.null"
        );
        assert_eq!(Error::rule("composite", "mixed").code(), "rule.instantiation");
    }

    #[test]
    fn test_into_mutation_preserves_cause() {
        let err = Error::VersionConflict {
            entity: "Country".into(),
            id: "1".into(),
            expected: 1,
            found: 2,
        }
        .into_mutation(OperationMode::Update);

        assert_eq!(err.code(), "mutation.conflict");
        match err {
            Error::Mutation { source: Some(source), .. } => {
                assert!(matches!(*source, Error::VersionConflict { .. }))
            }
            other => panic!("expected Mutation, got {:?}", other),
        }
    }

    #[test]
    fn test_validation_passes_through_wrapping() {
        let err = Error::from(failure("x")).into_mutation(OperationMode::Create);
        assert!(err.is_validation());
    }

    #[test]
    fn test_failure_display() {
        let mut f = failure("country.duplicate");
        f.siblings.push(failure("country.other"));
        let text = f.to_string();
        assert!(text.contains("country.duplicate [FRANCE]"));
        assert!(text.contains("+1 more"));
        assert_eq!(f.all().len(), 2);
    }
}
