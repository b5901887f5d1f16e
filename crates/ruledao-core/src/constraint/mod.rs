//! Constraint validation core.
//!
//! - [`decl`]: declarations attached to entity types
//! - [`Evaluator`] and [`FunctionTable`]: token evaluation against records
//! - [`rules`]: one rule implementation per declaration kind
//! - [`Orchestrator`]: which rules run for an operation, and when

pub mod decl;
mod evaluator;
mod functions;
mod orchestrator;
pub mod rules;

pub use decl::{
    Applicability, BoundedCountDecl, CompositeDecl, ConstraintDecl, DerivedExistenceDecl,
    EvaluationTime, NonEmptyDecl, OperationMode,
};
pub use evaluator::Evaluator;
pub use functions::{display, Function, FunctionTable, FunctionTableBuilder, NullaryFn, UnaryFn};
pub use orchestrator::{
    default_declaration, OperationState, Orchestrator, DUPLICATE_ID, MISSING_RECORD,
};
pub use rules::{Rule, RuleContext, RuleKind};
