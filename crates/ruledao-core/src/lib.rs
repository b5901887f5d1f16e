//! ruledao core - constraint validation, persistence session and generic DAO.
//!
//! Entity types declare constraints as metadata ([`Entity::declarations`]).
//! Every save, update and delete issued through the [`Dao`] runs the
//! applicable rules before and after the store mutation.

pub mod catalog;
pub mod config;
pub mod constraint;
pub mod dao;
pub mod error;
pub mod session;
pub mod storage;

pub use catalog::{DeclarationCatalog, Entity};
pub use config::{DaoConfig, Phases};
pub use constraint::{
    Applicability, BoundedCountDecl, CompositeDecl, ConstraintDecl, DerivedExistenceDecl,
    EvaluationTime, Evaluator, FunctionTable, FunctionTableBuilder, NonEmptyDecl, OperationMode,
    OperationState, Orchestrator, Rule, RuleKind,
};
pub use dao::{BatchFailure, BatchReport, Dao, FilterRequest};
pub use error::{Error, EvaluationError, ValidationFailure};
pub use session::{Query, QueryOutput, Session, Stored};
pub use storage::{StorageConfig, StorageEngine, StoreSession};

/// Re-export protocol types.
pub use ruledao_proto as proto;
