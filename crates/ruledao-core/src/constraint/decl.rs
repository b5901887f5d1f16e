//! Constraint declarations.
//!
//! Declarations are static metadata attached to an entity type. Each kind
//! maps to exactly one rule implementation through [`RuleKind`].

use std::fmt;

use serde::{Deserialize, Serialize};

use super::rules::RuleKind;

/// The kind of data-access operation in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationMode {
    Create,
    Update,
    Delete,
}

impl OperationMode {
    /// All modes.
    pub const ALL: [OperationMode; 3] = [
        OperationMode::Create,
        OperationMode::Update,
        OperationMode::Delete,
    ];
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OperationMode::Create => "CREATE",
            OperationMode::Update => "UPDATE",
            OperationMode::Delete => "DELETE",
        })
    }
}

/// Whether a rule runs before or after the store mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvaluationTime {
    PreCondition,
    PostCondition,
}

impl EvaluationTime {
    /// Both times.
    pub const ALL: [EvaluationTime; 2] = [EvaluationTime::PreCondition, EvaluationTime::PostCondition];
}

impl fmt::Display for EvaluationTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EvaluationTime::PreCondition => "PRE_CONDITION",
            EvaluationTime::PostCondition => "POST_CONDITION",
        })
    }
}

/// The (modes, times) pair gating whether a rule runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Applicability {
    pub modes: Vec<OperationMode>,
    pub times: Vec<EvaluationTime>,
}

impl Default for Applicability {
    /// {CREATE, UPDATE} x {PRE_CONDITION}.
    fn default() -> Self {
        Self {
            modes: vec![OperationMode::Create, OperationMode::Update],
            times: vec![EvaluationTime::PreCondition],
        }
    }
}

impl Applicability {
    /// Create an applicability from explicit sets.
    pub fn new(
        modes: impl IntoIterator<Item = OperationMode>,
        times: impl IntoIterator<Item = EvaluationTime>,
    ) -> Self {
        let mut out = Self {
            modes: Vec::new(),
            times: Vec::new(),
        };
        out.extend(modes, times);
        out
    }

    /// Every mode at every time.
    pub fn always() -> Self {
        Self::new(OperationMode::ALL, EvaluationTime::ALL)
    }

    /// Whether both `mode` and `time` are members.
    pub fn contains(&self, mode: OperationMode, time: EvaluationTime) -> bool {
        self.modes.contains(&mode) && self.times.contains(&time)
    }

    /// Union of two applicabilities.
    pub fn union(&self, other: &Applicability) -> Applicability {
        let mut out = self.clone();
        out.extend(other.modes.iter().copied(), other.times.iter().copied());
        out
    }

    fn extend(
        &mut self,
        modes: impl IntoIterator<Item = OperationMode>,
        times: impl IntoIterator<Item = EvaluationTime>,
    ) {
        for mode in modes {
            if !self.modes.contains(&mode) {
                self.modes.push(mode);
            }
        }
        for time in times {
            if !self.times.contains(&time) {
                self.times.push(time);
            }
        }
    }
}

/// A constraint declared on an entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConstraintDecl {
    /// The number of rows matched by a query must lie in `[min, max]`.
    BoundedCount(BoundedCountDecl),
    /// A query must match at least one row.
    NonEmpty(NonEmptyDecl),
    /// Several declarations of one kind, all of which must pass.
    Composite(CompositeDecl),
    /// A record of another type must exist with a given id.
    DerivedExistence(DerivedExistenceDecl),
    /// Always passes.
    Identity,
}

impl ConstraintDecl {
    /// The rule kind implementing this declaration.
    pub fn rule_kind(&self) -> RuleKind {
        match self {
            ConstraintDecl::BoundedCount(_) => RuleKind::BoundedCount,
            ConstraintDecl::NonEmpty(_) => RuleKind::NonEmpty,
            ConstraintDecl::Composite(_) => RuleKind::Composite,
            ConstraintDecl::DerivedExistence(_) => RuleKind::DerivedExistence,
            ConstraintDecl::Identity => RuleKind::Identity,
        }
    }

    /// When this declaration applies. A composite applies wherever any of
    /// its entries does.
    pub fn applicability(&self) -> Applicability {
        match self {
            ConstraintDecl::BoundedCount(d) => d.applicability.clone(),
            ConstraintDecl::NonEmpty(d) => d.applicability.clone(),
            ConstraintDecl::DerivedExistence(d) => d.applicability.clone(),
            ConstraintDecl::Composite(d) => d
                .entries
                .iter()
                .map(ConstraintDecl::applicability)
                .reduce(|a, b| a.union(&b))
                .unwrap_or_else(|| Applicability::new([], [])),
            ConstraintDecl::Identity => Applicability::always(),
        }
    }

    /// Whether this declaration applies to `(mode, time)`.
    pub fn applies_to(&self, mode: OperationMode, time: EvaluationTime) -> bool {
        self.applicability().contains(mode, time)
    }
}

impl From<BoundedCountDecl> for ConstraintDecl {
    fn from(d: BoundedCountDecl) -> Self {
        ConstraintDecl::BoundedCount(d)
    }
}

impl From<NonEmptyDecl> for ConstraintDecl {
    fn from(d: NonEmptyDecl) -> Self {
        ConstraintDecl::NonEmpty(d)
    }
}

impl From<CompositeDecl> for ConstraintDecl {
    fn from(d: CompositeDecl) -> Self {
        ConstraintDecl::Composite(d)
    }
}

impl From<DerivedExistenceDecl> for ConstraintDecl {
    fn from(d: DerivedExistenceDecl) -> Self {
        ConstraintDecl::DerivedExistence(d)
    }
}

fn unbounded() -> u64 {
    u64::MAX
}

/// Bounded-count declaration.
///
/// ```text
/// query   = "find Country where designation = ${designation}"
/// max     = 0
/// message = "country.duplicate_designation"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundedCountDecl {
    pub query: String,
    #[serde(default)]
    pub min: u64,
    #[serde(default = "unbounded")]
    pub max: u64,
    pub message: String,
    #[serde(default)]
    pub message_params: Vec<String>,
    #[serde(default, flatten)]
    pub applicability: Applicability,
}

impl BoundedCountDecl {
    /// A declaration with `min = 0`, no upper bound and default applicability.
    pub fn new(query: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            min: 0,
            max: u64::MAX,
            message: message.into(),
            message_params: Vec::new(),
            applicability: Applicability::default(),
        }
    }

    /// Set the lower bound.
    pub fn min(mut self, min: u64) -> Self {
        self.min = min;
        self
    }

    /// Set the upper bound.
    pub fn max(mut self, max: u64) -> Self {
        self.max = max;
        self
    }

    /// Set the modes the declaration applies to.
    pub fn with_modes(mut self, modes: impl IntoIterator<Item = OperationMode>) -> Self {
        self.applicability.modes = modes.into_iter().collect();
        self
    }

    /// Set the times the declaration applies at.
    pub fn with_times(mut self, times: impl IntoIterator<Item = EvaluationTime>) -> Self {
        self.applicability.times = times.into_iter().collect();
        self
    }

    /// Set the message parameter expressions.
    pub fn with_message_params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.message_params = params.into_iter().map(Into::into).collect();
        self
    }
}

/// Non-empty declaration: the query must match at least one row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NonEmptyDecl {
    pub query: String,
    pub message: String,
    #[serde(default)]
    pub message_params: Vec<String>,
    #[serde(default, flatten)]
    pub applicability: Applicability,
}

impl NonEmptyDecl {
    /// A declaration with default applicability.
    pub fn new(query: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            message: message.into(),
            message_params: Vec::new(),
            applicability: Applicability::default(),
        }
    }

    /// Set the modes the declaration applies to.
    pub fn with_modes(mut self, modes: impl IntoIterator<Item = OperationMode>) -> Self {
        self.applicability.modes = modes.into_iter().collect();
        self
    }

    /// Set the times the declaration applies at.
    pub fn with_times(mut self, times: impl IntoIterator<Item = EvaluationTime>) -> Self {
        self.applicability.times = times.into_iter().collect();
        self
    }

    /// Set the message parameter expressions.
    pub fn with_message_params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.message_params = params.into_iter().map(Into::into).collect();
        self
    }
}

/// Ordered declarations of a single kind; every entry is checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeDecl {
    pub entries: Vec<ConstraintDecl>,
}

impl CompositeDecl {
    pub fn new(entries: impl IntoIterator<Item = ConstraintDecl>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }
}

/// "A `target` whose `id_field` equals this record's `context_field` exists."
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedExistenceDecl {
    pub target: String,
    #[serde(default = "default_id_field")]
    pub id_field: String,
    pub context_field: String,
    pub message: String,
    #[serde(default)]
    pub message_params: Vec<String>,
    #[serde(default, flatten)]
    pub applicability: Applicability,
}

fn default_id_field() -> String {
    "id".to_string()
}

impl DerivedExistenceDecl {
    /// A declaration checking `target.id = ${context_field}`.
    pub fn new(
        target: impl Into<String>,
        context_field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            target: target.into(),
            id_field: default_id_field(),
            context_field: context_field.into(),
            message: message.into(),
            message_params: Vec::new(),
            applicability: Applicability::default(),
        }
    }

    /// Set the id field on the target type.
    pub fn with_id_field(mut self, id_field: impl Into<String>) -> Self {
        self.id_field = id_field.into();
        self
    }

    /// Set the modes the declaration applies to.
    pub fn with_modes(mut self, modes: impl IntoIterator<Item = OperationMode>) -> Self {
        self.applicability.modes = modes.into_iter().collect();
        self
    }

    /// Set the times the declaration applies at.
    pub fn with_times(mut self, times: impl IntoIterator<Item = EvaluationTime>) -> Self {
        self.applicability.times = times.into_iter().collect();
        self
    }

    /// Rewrite as the equivalent bounded-count declaration (`min = max = 1`).
    pub fn to_bounded_count(&self) -> BoundedCountDecl {
        BoundedCountDecl {
            query: format!(
                "find {} where {} = ${{{}}}",
                self.target, self.id_field, self.context_field
            ),
            min: 1,
            max: 1,
            message: self.message.clone(),
            message_params: self.message_params.clone(),
            applicability: self.applicability.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_applicability() {
        let decl = ConstraintDecl::from(BoundedCountDecl::new("find X", "x"));
        assert!(decl.applies_to(OperationMode::Create, EvaluationTime::PreCondition));
        assert!(decl.applies_to(OperationMode::Update, EvaluationTime::PreCondition));
        assert!(!decl.applies_to(OperationMode::Delete, EvaluationTime::PreCondition));
        assert!(!decl.applies_to(OperationMode::Create, EvaluationTime::PostCondition));
    }

    #[test]
    fn test_composite_applicability_is_union() {
        let decl = ConstraintDecl::from(CompositeDecl::new([
            NonEmptyDecl::new("find A", "a")
                .with_modes([OperationMode::Delete])
                .into(),
            NonEmptyDecl::new("find B", "b")
                .with_modes([OperationMode::Create])
                .with_times([EvaluationTime::PostCondition])
                .into(),
        ]));
        assert!(decl.applies_to(OperationMode::Delete, EvaluationTime::PreCondition));
        assert!(decl.applies_to(OperationMode::Create, EvaluationTime::PostCondition));
        assert!(decl.applies_to(OperationMode::Delete, EvaluationTime::PostCondition));
        assert!(!decl.applies_to(OperationMode::Update, EvaluationTime::PreCondition));

        let empty = ConstraintDecl::from(CompositeDecl::new([]));
        assert!(!empty.applies_to(OperationMode::Create, EvaluationTime::PreCondition));
    }

    #[test]
    fn test_derived_existence_rewrite() {
        let decl = DerivedExistenceDecl::new("Country", "countryId", "order.unknown_country");
        let bounded = decl.to_bounded_count();
        assert_eq!(bounded.query, "find Country where id = ${countryId}");
        assert_eq!((bounded.min, bounded.max), (1, 1));
        assert_eq!(bounded.message, "order.unknown_country");
    }

    #[test]
    fn test_declarations_from_json() {
        let decls: Vec<ConstraintDecl> = serde_json::from_value(json!([
            {"kind": "bounded_count", "query": "find X where a = ${a}", "max": 0, "message": "x.dup"},
            {"kind": "derived_existence", "target": "Zone", "context_field": "zone", "message": "z",
             "modes": ["CREATE"], "times": ["PRE_CONDITION", "POST_CONDITION"]},
            {"kind": "identity"}
        ]))
        .unwrap();

        match &decls[0] {
            ConstraintDecl::BoundedCount(d) => {
                assert_eq!((d.min, d.max), (0, 0));
                assert_eq!(d.applicability, Applicability::default());
            }
            other => panic!("expected BoundedCount, got {:?}", other),
        }
        assert!(decls[1].applies_to(OperationMode::Create, EvaluationTime::PostCondition));
        assert_eq!(decls[2].rule_kind(), RuleKind::Identity);
    }
}
