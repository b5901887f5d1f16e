//! Composite rule.

use serde_json::Value as JsonValue;
use tracing::debug;

use super::{instantiate, Rule, RuleContext, RuleKind};
use crate::constraint::decl::{Applicability, CompositeDecl, ConstraintDecl};
use crate::error::Error;

/// Runs one sub-rule per entry, in order, without stopping at the first
/// failed check.
///
/// Validation failures are collected: the first becomes the reported
/// failure and the rest are attached as its siblings. Any other error
/// aborts immediately.
pub struct CompositeRule<'a> {
    ctx: RuleContext<'a>,
    applicability: Applicability,
    rules: Vec<Box<dyn Rule + 'a>>,
}

impl<'a> CompositeRule<'a> {
    /// Build a sub-rule for every entry. All entries must be of one kind.
    pub fn initialize(decl: &CompositeDecl, ctx: RuleContext<'a>) -> Result<Self, Error> {
        if let Some(first) = decl.entries.first() {
            let kind = first.rule_kind();
            if let Some(other) = decl.entries.iter().find(|e| e.rule_kind() != kind) {
                return Err(Error::rule(
                    RuleKind::Composite.name(),
                    format!(
                        "entries must share one kind, found {} and {}",
                        kind,
                        other.rule_kind()
                    ),
                ));
            }
        }

        let rules = decl
            .entries
            .iter()
            .map(|entry| instantiate(entry, ctx))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            ctx,
            applicability: ConstraintDecl::Composite(decl.clone()).applicability(),
            rules,
        })
    }

    /// Number of sub-rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the composite has no entries.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Rule for CompositeRule<'_> {
    fn kind(&self) -> RuleKind {
        RuleKind::Composite
    }

    fn is_applicable(&self) -> bool {
        self.applicability.contains(self.ctx.mode, self.ctx.time)
    }

    fn process(&self, target: &JsonValue) -> Result<(), Error> {
        if !self.is_applicable() {
            return Ok(());
        }

        let mut failures = Vec::new();
        for (index, rule) in self.rules.iter().enumerate() {
            match rule.process(target) {
                Ok(()) => {}
                Err(Error::Validation(failure)) => {
                    debug!(entity = self.ctx.entity, index, code = %failure.code, "composite entry failed");
                    failures.push(failure);
                }
                Err(e) => return Err(e),
            }
        }

        let mut failures = failures.into_iter();
        match failures.next() {
            None => Ok(()),
            Some(mut first) => {
                first.siblings.extend(failures);
                Err(first.into())
            }
        }
    }
}
