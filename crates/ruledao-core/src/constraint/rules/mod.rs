//! Constraint rules.
//!
//! A rule is built from one declaration for one operation, checks a record
//! and is then dropped. [`RuleKind`] is the fixed mapping from declaration
//! kind to implementation.

mod composite;
mod count;
mod derived;

use std::fmt;

use ruledao_lang::ExpressionModel;
use serde_json::Value as JsonValue;
use tracing::trace;

use super::decl::{ConstraintDecl, EvaluationTime, OperationMode};
use super::evaluator::Evaluator;
use crate::error::{Error, ValidationFailure};
use crate::session::{Query, Session};

pub use composite::CompositeRule;
pub use count::{BoundedCountRule, NonEmptyRule};
pub use derived::DerivedExistenceRule;

/// The inputs every rule is initialized with.
#[derive(Clone, Copy)]
pub struct RuleContext<'a> {
    pub session: &'a dyn Session,
    pub evaluator: &'a Evaluator,
    pub entity: &'a str,
    pub mode: OperationMode,
    pub time: EvaluationTime,
}

impl<'a> RuleContext<'a> {
    pub fn new(
        session: &'a dyn Session,
        evaluator: &'a Evaluator,
        entity: &'a str,
        mode: OperationMode,
        time: EvaluationTime,
    ) -> Self {
        Self {
            session,
            evaluator,
            entity,
            mode,
            time,
        }
    }

    /// Build a failure, evaluating message parameters against `target`.
    pub fn failure(&self, code: &str, params: &[String], target: &JsonValue) -> ValidationFailure {
        ValidationFailure {
            code: code.to_string(),
            params: params
                .iter()
                .map(|p| self.evaluator.message_param(p, target))
                .collect(),
            entity: self.entity.to_string(),
            mode: self.mode,
            time: self.time,
            siblings: Vec::new(),
        }
    }
}

impl fmt::Debug for RuleContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleContext")
            .field("entity", &self.entity)
            .field("mode", &self.mode)
            .field("time", &self.time)
            .finish()
    }
}

/// A constraint check bound to one operation.
pub trait Rule {
    /// The kind of rule.
    fn kind(&self) -> RuleKind;

    /// Whether the current (mode, time) is covered by the declaration.
    fn is_applicable(&self) -> bool;

    /// Check `target`. Returns `Ok(())` when the rule is not applicable.
    fn process(&self, target: &JsonValue) -> Result<(), Error>;
}

/// Rule implementations, one per declaration kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    BoundedCount,
    NonEmpty,
    Composite,
    DerivedExistence,
    Identity,
}

impl RuleKind {
    /// Stable name of the rule kind.
    pub fn name(self) -> &'static str {
        match self {
            RuleKind::BoundedCount => "bounded_count",
            RuleKind::NonEmpty => "non_empty",
            RuleKind::Composite => "composite",
            RuleKind::DerivedExistence => "derived_existence",
            RuleKind::Identity => "identity",
        }
    }

    /// Build this kind of rule from a declaration.
    pub fn instantiate<'a>(
        self,
        decl: &ConstraintDecl,
        ctx: RuleContext<'a>,
    ) -> Result<Box<dyn Rule + 'a>, Error> {
        let rule: Box<dyn Rule + 'a> = match (self, decl) {
            (RuleKind::BoundedCount, ConstraintDecl::BoundedCount(d)) => {
                Box::new(BoundedCountRule::initialize(d.clone(), ctx)?)
            }
            (RuleKind::NonEmpty, ConstraintDecl::NonEmpty(d)) => {
                Box::new(NonEmptyRule::initialize(d.clone(), ctx)?)
            }
            (RuleKind::Composite, ConstraintDecl::Composite(d)) => {
                Box::new(CompositeRule::initialize(d, ctx)?)
            }
            (RuleKind::DerivedExistence, ConstraintDecl::DerivedExistence(d)) => {
                Box::new(DerivedExistenceRule::initialize(d, ctx)?)
            }
            (RuleKind::Identity, ConstraintDecl::Identity) => Box::new(IdentityRule),
            (kind, other) => {
                return Err(Error::rule(
                    kind.name(),
                    format!("cannot implement a {} declaration", other.rule_kind()),
                ))
            }
        };
        trace!(kind = %self, entity = ctx.entity, "rule initialized");
        Ok(rule)
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Build the rule associated with a declaration.
pub fn instantiate<'a>(
    decl: &ConstraintDecl,
    ctx: RuleContext<'a>,
) -> Result<Box<dyn Rule + 'a>, Error> {
    decl.rule_kind().instantiate(decl, ctx)
}

/// Always passes.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityRule;

impl Rule for IdentityRule {
    fn kind(&self) -> RuleKind {
        RuleKind::Identity
    }

    fn is_applicable(&self) -> bool {
        true
    }

    fn process(&self, _target: &JsonValue) -> Result<(), Error> {
        Ok(())
    }
}

/// A resolved template with its parsed query, ready to be bound per record.
struct CountQuery<'a> {
    model: ExpressionModel,
    query: Query<'a>,
}

impl<'a> CountQuery<'a> {
    /// Resolve `template` and parse the computed query. A blank template
    /// yields `None`.
    fn prepare(kind: RuleKind, template: &str, ctx: &RuleContext<'a>) -> Result<Option<Self>, Error> {
        let model = match ruledao_lang::resolve(template) {
            Ok(Some(model)) => model,
            Ok(None) => return Ok(None),
            Err(e) => return Err(Error::rule(kind.name(), e.format_with_source(template))),
        };
        let query = ctx
            .session
            .create_query(model.computed())
            .map_err(|e| Error::rule(kind.name(), e.to_string()))?;
        Ok(Some(Self { model, query }))
    }

    /// Bind every parameter from `target` and return the result-set size.
    fn size(&self, evaluator: &Evaluator, target: &JsonValue) -> Result<u64, Error> {
        let mut query = self.query.clone();
        for param in self.model.parameters() {
            let value = evaluator.evaluate(&param.expression, target)?;
            trace!(
                parameter = %param.name,
                expression = %param.expression,
                value = %value,
                "binding parameter"
            );
            query.bind_json(param.name.as_str(), &value)?;
        }
        Ok(query.execute()?.size())
    }
}


#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::test_support::{context, store};
    use super::*;
    use crate::constraint::decl::{BoundedCountDecl, NonEmptyDecl};

    #[test]
    fn test_instantiate_by_kind() {
        let (session, _dir) = store();
        let evaluator = Evaluator::default();
        let ctx = context(&session, &evaluator, OperationMode::Create, EvaluationTime::PreCondition);

        let decl = ConstraintDecl::from(NonEmptyDecl::new("find Country", "x"));
        assert_eq!(instantiate(&decl, ctx).unwrap().kind(), RuleKind::NonEmpty);
        assert_eq!(
            instantiate(&ConstraintDecl::Identity, ctx).unwrap().kind(),
            RuleKind::Identity
        );
    }

    #[test]
    fn test_kind_mismatch() {
        let (session, _dir) = store();
        let evaluator = Evaluator::default();
        let ctx = context(&session, &evaluator, OperationMode::Create, EvaluationTime::PreCondition);

        let decl = ConstraintDecl::from(BoundedCountDecl::new("find Country", "x"));
        let err = RuleKind::NonEmpty.instantiate(&decl, ctx).err().unwrap();
        assert_eq!(err.code(), "rule.instantiation");
    }

    #[test]
    fn test_unparseable_template() {
        let (session, _dir) = store();
        let evaluator = Evaluator::default();
        let ctx = context(&session, &evaluator, OperationMode::Create, EvaluationTime::PreCondition);

        for query in ["find Country where a = $F_upper(${a}", "select * from Country"] {
            let decl = ConstraintDecl::from(BoundedCountDecl::new(query, "x"));
            let err = instantiate(&decl, ctx).err().unwrap();
            assert!(matches!(err, Error::RuleInstantiation { kind: "bounded_count", .. }));
        }
    }

    #[test]
    fn test_identity_always_passes() {
        let rule = IdentityRule;
        assert!(rule.is_applicable());
        assert!(rule.process(&json!(null)).is_ok());
    }

    #[test]
    fn test_failure_params() {
        let (session, _dir) = store();
        let evaluator = Evaluator::default();
        let ctx = context(&session, &evaluator, OperationMode::Update, EvaluationTime::PostCondition);

        let failure = ctx.failure(
            "country.duplicate",
            &["${designation}".to_string(), "${missing}".to_string()],
            &json!({"designation": "FRANCE"}),
        );
        assert_eq!(failure.params, vec!["FRANCE", "[${missing}]"]);
        assert_eq!(failure.mode, OperationMode::Update);
        assert_eq!(failure.time, EvaluationTime::PostCondition);
    }
}
