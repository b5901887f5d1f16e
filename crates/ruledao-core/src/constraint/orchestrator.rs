//! Validation orchestrator.
//!
//! Drives one data-access operation through its states:
//!
//! ```text
//! NotStarted -> PreValidating -> Mutating -> PostValidating -> Done
//!                     |              |              |
//!                     +--------------+--------------+--> Failed
//! ```
//!
//! In each validating state the declarations applicable to the current
//! (mode, time) slot are instantiated and processed in order. The first
//! failure aborts the operation.

use serde_json::Value as JsonValue;
use tracing::debug;

use super::decl::{BoundedCountDecl, ConstraintDecl, EvaluationTime, OperationMode};
use super::evaluator::Evaluator;
use super::rules::{instantiate, RuleContext};
use crate::config::Phases;
use crate::error::Error;
use crate::session::{Session, Stored};

/// Code of the default CREATE check.
pub const DUPLICATE_ID: &str = "integrity.duplicate_id";

/// Code of the default UPDATE check.
pub const MISSING_RECORD: &str = "integrity.missing_record";

/// Operation progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    NotStarted,
    PreValidating,
    Mutating,
    PostValidating,
    Done,
    Failed,
}

/// The declaration used for a slot that has none.
///
/// CREATE/PRE rejects an id that is already stored and UPDATE/PRE requires
/// exactly one stored record with the id. DELETE and every POST slot get
/// [`ConstraintDecl::Identity`].
pub fn default_declaration(
    entity: &str,
    id_field: &str,
    mode: OperationMode,
    time: EvaluationTime,
) -> ConstraintDecl {
    let by_id = || format!("count {} where {} = ${{{}}}", entity, id_field, id_field);
    match (mode, time) {
        (OperationMode::Create, EvaluationTime::PreCondition) => {
            BoundedCountDecl::new(by_id(), DUPLICATE_ID)
                .max(0)
                .with_modes([OperationMode::Create])
                .with_message_params([format!("${{{}}}", id_field)])
                .into()
        }
        (OperationMode::Update, EvaluationTime::PreCondition) => {
            BoundedCountDecl::new(by_id(), MISSING_RECORD)
                .min(1)
                .max(1)
                .with_modes([OperationMode::Update])
                .with_message_params([format!("${{{}}}", id_field)])
                .into()
        }
        _ => ConstraintDecl::Identity,
    }
}

/// Runs the validation phases around one store mutation.
pub struct Orchestrator<'a> {
    session: &'a dyn Session,
    evaluator: &'a Evaluator,
    entity: &'a str,
    id_field: &'a str,
    declarations: &'a [ConstraintDecl],
    phases: Phases,
    mode: OperationMode,
    state: OperationState,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        session: &'a dyn Session,
        evaluator: &'a Evaluator,
        entity: &'a str,
        id_field: &'a str,
        declarations: &'a [ConstraintDecl],
        mode: OperationMode,
    ) -> Self {
        Self {
            session,
            evaluator,
            entity,
            id_field,
            declarations,
            phases: Phases::all(),
            mode,
            state: OperationState::NotStarted,
        }
    }

    /// Restrict which phases run.
    pub fn with_phases(mut self, phases: Phases) -> Self {
        self.phases = phases;
        self
    }

    /// Current state.
    pub fn state(&self) -> OperationState {
        self.state
    }

    /// Declarations that run in the given slot: the applicable declared
    /// ones, or the slot's default when none applies.
    pub fn declarations_for(&self, time: EvaluationTime) -> Vec<ConstraintDecl> {
        let applicable: Vec<ConstraintDecl> = self
            .declarations
            .iter()
            .filter(|d| d.applies_to(self.mode, time))
            .cloned()
            .collect();
        if applicable.is_empty() {
            vec![default_declaration(self.entity, self.id_field, self.mode, time)]
        } else {
            applicable
        }
    }

    /// Validate `target` for one slot.
    pub fn validate(&self, time: EvaluationTime, target: &JsonValue) -> Result<(), Error> {
        if !self.phases.allows(self.mode, time) {
            debug!(entity = self.entity, mode = %self.mode, time = %time, "phase disabled");
            return Ok(());
        }

        let ctx = RuleContext::new(self.session, self.evaluator, self.entity, self.mode, time);
        for decl in &self.declarations_for(time) {
            let rule = instantiate(decl, ctx)?;
            if rule.is_applicable() {
                rule.process(target)?;
            }
        }
        Ok(())
    }

    /// Run pre-validation on `target`, then `mutate`, then post-validation
    /// on the stored document.
    ///
    /// Errors from `mutate` are reported as mutation failures. A failure
    /// during post-validation is raised after the mutation has been applied.
    pub fn run<F>(&mut self, target: &JsonValue, mutate: F) -> Result<Stored, Error>
    where
        F: FnOnce() -> Result<Stored, Error>,
    {
        self.transition(OperationState::PreValidating);
        if let Err(e) = self.validate(EvaluationTime::PreCondition, target) {
            return Err(self.fail(e));
        }

        self.transition(OperationState::Mutating);
        let stored = match mutate() {
            Ok(stored) => stored,
            Err(e) => {
                let e = e.into_mutation(self.mode);
                return Err(self.fail(e));
            }
        };

        self.transition(OperationState::PostValidating);
        if let Err(e) = self.validate(EvaluationTime::PostCondition, &stored.document) {
            return Err(self.fail(e));
        }

        self.transition(OperationState::Done);
        Ok(stored)
    }

    fn transition(&mut self, next: OperationState) {
        debug!(
            entity = self.entity,
            mode = %self.mode,
            from = ?self.state,
            to = ?next,
            "operation state"
        );
        self.state = next;
    }

    fn fail(&mut self, error: Error) -> Error {
        debug!(entity = self.entity, mode = %self.mode, code = error.code(), "operation failed");
        self.transition(OperationState::Failed);
        error
    }
}
