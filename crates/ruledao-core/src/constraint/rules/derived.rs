//! Derived-existence rule.

use serde_json::Value as JsonValue;

use super::{BoundedCountRule, Rule, RuleContext, RuleKind};
use crate::constraint::decl::DerivedExistenceDecl;
use crate::error::Error;

/// Checks that a record of another type exists, by delegating to the
/// equivalent bounded-count rule (`min = max = 1`).
pub struct DerivedExistenceRule<'a> {
    inner: BoundedCountRule<'a>,
}

impl<'a> DerivedExistenceRule<'a> {
    pub fn initialize(decl: &DerivedExistenceDecl, ctx: RuleContext<'a>) -> Result<Self, Error> {
        let inner = BoundedCountRule::initialize(decl.to_bounded_count(), ctx).map_err(|e| match e {
            Error::RuleInstantiation { reason, .. } => {
                Error::rule(RuleKind::DerivedExistence.name(), reason)
            }
            other => other,
        })?;
        Ok(Self { inner })
    }

    /// The rule this one delegates to.
    pub fn delegate(&self) -> &BoundedCountRule<'a> {
        &self.inner
    }
}

impl Rule for DerivedExistenceRule<'_> {
    fn kind(&self) -> RuleKind {
        RuleKind::DerivedExistence
    }

    fn is_applicable(&self) -> bool {
        self.inner.is_applicable()
    }

    fn process(&self, target: &JsonValue) -> Result<(), Error> {
        self.inner.process(target)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::constraint::decl::{BoundedCountDecl, EvaluationTime, OperationMode};
    use crate::constraint::evaluator::Evaluator;
    use crate::constraint::rules::test_support::{context, store};

    #[test]
    fn test_same_outcome_as_bounded_count() {
        let (store, _dir) = store();
        let evaluator = Evaluator::default();
        let ctx = context(&store, &evaluator, OperationMode::Create, EvaluationTime::PreCondition);

        let derived = DerivedExistenceRule::initialize(
            &DerivedExistenceDecl::new("Country", "countryId", "order.unknown_country"),
            ctx,
        )
        .unwrap();
        let bounded = BoundedCountRule::initialize(
            BoundedCountDecl::new("find Country where id = ${countryId}", "order.unknown_country")
                .min(1)
                .max(1),
            ctx,
        )
        .unwrap();

        assert_eq!(derived.delegate().declaration().query, bounded.declaration().query);
        for country_id in [json!(1), json!(2), json!(3), json!(null)] {
            let order = json!({"countryId": country_id});
            let a = derived.process(&order).map_err(|e| e.code().to_string());
            let b = bounded.process(&order).map_err(|e| e.code().to_string());
            assert_eq!(a, b, "countryId = {}", country_id);
        }
        assert!(derived.process(&json!({"countryId": 1})).is_ok());
        assert!(derived.process(&json!({"countryId": 3})).is_err());
    }

    #[test]
    fn test_custom_id_field() {
        let (store, _dir) = store();
        let evaluator = Evaluator::default();
        let ctx = context(&store, &evaluator, OperationMode::Create, EvaluationTime::PreCondition);

        let rule = DerivedExistenceRule::initialize(
            &DerivedExistenceDecl::new("Country", "country", "unknown").with_id_field("designation"),
            ctx,
        )
        .unwrap();
        assert!(rule.process(&json!({"country": "SPAIN"})).is_ok());
        assert_eq!(rule.kind(), RuleKind::DerivedExistence);
    }
}
