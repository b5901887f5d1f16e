//! Query-count rules.

use serde_json::Value as JsonValue;
use tracing::debug;

use super::{CountQuery, Rule, RuleContext, RuleKind};
use crate::constraint::decl::{BoundedCountDecl, NonEmptyDecl};
use crate::error::Error;

/// Fails unless the query matches between `min` and `max` rows.
pub struct BoundedCountRule<'a> {
    ctx: RuleContext<'a>,
    decl: BoundedCountDecl,
    query: Option<CountQuery<'a>>,
}

impl<'a> BoundedCountRule<'a> {
    /// Resolve the declaration's template and parse its query.
    pub fn initialize(decl: BoundedCountDecl, ctx: RuleContext<'a>) -> Result<Self, Error> {
        if decl.min > decl.max {
            return Err(Error::rule(
                RuleKind::BoundedCount.name(),
                format!("min {} exceeds max {}", decl.min, decl.max),
            ));
        }
        let query = CountQuery::prepare(RuleKind::BoundedCount, &decl.query, &ctx)?;
        Ok(Self { ctx, decl, query })
    }

    /// The declaration this rule checks.
    pub fn declaration(&self) -> &BoundedCountDecl {
        &self.decl
    }
}

impl Rule for BoundedCountRule<'_> {
    fn kind(&self) -> RuleKind {
        RuleKind::BoundedCount
    }

    fn is_applicable(&self) -> bool {
        self.decl.applicability.contains(self.ctx.mode, self.ctx.time)
    }

    fn process(&self, target: &JsonValue) -> Result<(), Error> {
        let Some(query) = self.query.as_ref().filter(|_| self.is_applicable()) else {
            return Ok(());
        };

        let n = query.size(self.ctx.evaluator, target)?;
        debug!(
            entity = self.ctx.entity,
            message = %self.decl.message,
            n,
            min = self.decl.min,
            max = self.decl.max,
            "bounded count"
        );

        if n < self.decl.min || n > self.decl.max {
            return Err(self
                .ctx
                .failure(&self.decl.message, &self.decl.message_params, target)
                .into());
        }
        Ok(())
    }
}

/// Fails when the query matches no rows.
pub struct NonEmptyRule<'a> {
    ctx: RuleContext<'a>,
    decl: NonEmptyDecl,
    query: Option<CountQuery<'a>>,
}

impl<'a> NonEmptyRule<'a> {
    /// Resolve the declaration's template and parse its query.
    pub fn initialize(decl: NonEmptyDecl, ctx: RuleContext<'a>) -> Result<Self, Error> {
        let query = CountQuery::prepare(RuleKind::NonEmpty, &decl.query, &ctx)?;
        Ok(Self { ctx, decl, query })
    }
}

impl Rule for NonEmptyRule<'_> {
    fn kind(&self) -> RuleKind {
        RuleKind::NonEmpty
    }

    fn is_applicable(&self) -> bool {
        self.decl.applicability.contains(self.ctx.mode, self.ctx.time)
    }

    fn process(&self, target: &JsonValue) -> Result<(), Error> {
        let Some(query) = self.query.as_ref().filter(|_| self.is_applicable()) else {
            return Ok(());
        };

        let n = query.size(self.ctx.evaluator, target)?;
        debug!(entity = self.ctx.entity, message = %self.decl.message, n, "non empty");

        if n == 0 {
            return Err(self
                .ctx
                .failure(&self.decl.message, &self.decl.message_params, target)
                .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::constraint::decl::{EvaluationTime, OperationMode};
    use crate::constraint::evaluator::Evaluator;
    use crate::constraint::rules::test_support::{context, store};

    const PRE: EvaluationTime = EvaluationTime::PreCondition;

    fn unique_designation() -> BoundedCountDecl {
        BoundedCountDecl::new(
            "find Country where designation = ${designation}",
            "country.duplicate_designation",
        )
        .max(0)
        .with_message_params(["${designation}"])
    }

    #[test]
    fn test_bounded_count_zero_zero() {
        let (session, _dir) = store();
        let evaluator = Evaluator::default();
        let ctx = context(&session, &evaluator, OperationMode::Create, PRE);
        let rule = BoundedCountRule::initialize(unique_designation(), ctx).unwrap();

        let err = rule.process(&json!({"designation": "FRANCE"})).unwrap_err();
        let failure = err.as_validation().unwrap();
        assert_eq!(failure.code, "country.duplicate_designation");
        assert_eq!(failure.params, vec!["FRANCE"]);

        assert!(rule.process(&json!({"designation": "ITALY"})).is_ok());
    }

    #[test]
    fn test_bounded_count_range() {
        let (session, _dir) = store();
        let evaluator = Evaluator::default();
        let ctx = context(&session, &evaluator, OperationMode::Update, PRE);

        let two = BoundedCountRule::initialize(
            BoundedCountDecl::new("count Country", "x").min(2).max(2),
            ctx,
        )
        .unwrap();
        assert!(two.process(&json!({})).is_ok());

        let at_least_three =
            BoundedCountRule::initialize(BoundedCountDecl::new("find Country", "x").min(3), ctx)
                .unwrap();
        assert!(at_least_three.process(&json!({})).is_err());
    }

    #[test]
    fn test_min_above_max_is_rejected() {
        let (session, _dir) = store();
        let evaluator = Evaluator::default();
        let ctx = context(&session, &evaluator, OperationMode::Create, PRE);
        let decl = BoundedCountDecl::new("find Country", "x").min(2).max(1);
        assert!(matches!(
            BoundedCountRule::initialize(decl, ctx),
            Err(Error::RuleInstantiation { .. })
        ));
    }

    #[test]
    fn test_not_applicable_skips_query() {
        let (session, _dir) = store();
        let evaluator = Evaluator::default();
        let ctx = context(&session, &evaluator, OperationMode::Delete, PRE);
        let rule = BoundedCountRule::initialize(unique_designation(), ctx).unwrap();

        assert!(!rule.is_applicable());
        // The target has no `designation`; evaluation would fail if the rule ran.
        assert!(rule.process(&json!({})).is_ok());
    }

    #[test]
    fn test_blank_template_is_noop() {
        let (session, _dir) = store();
        let evaluator = Evaluator::default();
        let ctx = context(&session, &evaluator, OperationMode::Create, PRE);
        let rule = BoundedCountRule::initialize(BoundedCountDecl::new("  ", "x").min(1), ctx).unwrap();
        assert!(rule.process(&json!({})).is_ok());
    }

    #[test]
    fn test_evaluation_error_propagates() {
        let (session, _dir) = store();
        let evaluator = Evaluator::default();
        let ctx = context(&session, &evaluator, OperationMode::Create, PRE);
        let rule = BoundedCountRule::initialize(unique_designation(), ctx).unwrap();

        let err = rule.process(&json!({"name": "FRANCE"})).unwrap_err();
        assert_eq!(err.code(), "evaluation.property_not_found");
    }

    #[test]
    fn test_non_empty_ignores_cardinality() {
        let (session, _dir) = store();
        let evaluator = Evaluator::default();
        let ctx = context(&session, &evaluator, OperationMode::Create, PRE);

        let any = NonEmptyRule::initialize(NonEmptyDecl::new("find Country", "none"), ctx).unwrap();
        assert!(any.process(&json!({})).is_ok());

        let one = NonEmptyRule::initialize(
            NonEmptyDecl::new("find Country where designation = $F_upper(${name})", "none"),
            ctx,
        )
        .unwrap();
        assert!(one.process(&json!({"name": "spain"})).is_ok());

        let err = one.process(&json!({"name": "italy"})).unwrap_err();
        assert_eq!(err.code(), "none");
    }
}
