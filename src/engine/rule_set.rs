//! Mask rules and ordered rule sets.
//!
//! A rule maps a candidate string (one token, or several tokens joined with
//! the engine delimiter) to a mask. Rules are tried in rule-set order and the
//! first match wins, so the order of a [`RuleSet`] is its priority.
//!
//! ## Value restriction index
//!
//! Every rule declares which kind of candidate it can match
//! ([`ValueRestriction`]). The rule set keeps one id list per restriction bit
//! so that a numeric candidate never reaches a rule that only understands
//! words:
//!
//! ```text
//! rules:        [keyword(A), year(N), number(N), title(A|N)]
//! alphabetical: [0, 3]
//! numeric:      [1, 2, 3]
//! ```
//!
//! ## Invariants
//!
//! - `RuleId` is an index into `RuleSet::rules`; index lists are sorted.
//! - Rule predicates may suspend; the caller awaits each one before trying the
//!   next rule.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;

use crate::context::EvaluationContext;
use crate::error::{BoxError, Error, Result};
use crate::masked::Mask;

/// Rule identifier (index into the rules vector).
pub(crate) type RuleId = usize;

bitflags::bitflags! {
    /// Kinds of candidate a rule accepts.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ValueRestriction: u8 {
        const ALPHABETICAL = 1 << 0;
        const NUMERIC      = 1 << 1;
        const ANY          = Self::ALPHABETICAL.bits() | Self::NUMERIC.bits();
    }
}

impl ValueRestriction {
    /// Classify a candidate: numeric when it is made of ASCII digits only,
    /// alphabetical otherwise (joined sequences always contain a delimiter).
    pub fn of(candidate: &str) -> ValueRestriction {
        if !candidate.is_empty() && candidate.bytes().all(|b| b.is_ascii_digit()) {
            ValueRestriction::NUMERIC
        } else {
            ValueRestriction::ALPHABETICAL
        }
    }

    pub fn admits(self, candidate: &str) -> bool {
        self.intersects(ValueRestriction::of(candidate))
    }
}

#[async_trait]
pub trait MaskRule<M: Mask>: Send + Sync {
    /// Name used in logs and error reports.
    fn name(&self) -> &str;

    /// Mask assigned to the tokens of a matching candidate.
    fn mask(&self) -> &M;

    fn value_restriction(&self) -> ValueRestriction {
        ValueRestriction::ANY
    }

    async fn is_match(&self, candidate: &str) -> std::result::Result<bool, BoxError>;
}

/// How an [`FnRule`] tests a candidate.
pub enum Matcher {
    /// The whole candidate must match (use anchors).
    Regex(&'static Regex),
    Predicate(Box<dyn Fn(&str) -> bool + Send + Sync>),
}

impl Matcher {
    pub fn predicate(pred: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Matcher::Predicate(Box::new(pred))
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Regex(re) => f.debug_tuple("Regex").field(&re.as_str()).finish(),
            Matcher::Predicate(_) => f.write_str("Predicate(<function>)"),
        }
    }
}

/// A synchronous rule built from a regex or a closure (see [`mask_rule!`]).
#[derive(Debug)]
pub struct FnRule<M> {
    name: &'static str,
    mask: M,
    restriction: ValueRestriction,
    matcher: Matcher,
}

impl<M: Mask> FnRule<M> {
    pub fn new(name: &'static str, mask: M, matcher: Matcher) -> Self {
        FnRule { name, mask, restriction: ValueRestriction::ANY, matcher }
    }

    pub fn with_restriction(mut self, restriction: ValueRestriction) -> Self {
        self.restriction = restriction;
        self
    }

    fn matches(&self, candidate: &str) -> bool {
        match &self.matcher {
            Matcher::Regex(re) => re.is_match(candidate),
            Matcher::Predicate(pred) => pred(candidate),
        }
    }
}

#[async_trait]
impl<M: Mask> MaskRule<M> for FnRule<M> {
    fn name(&self) -> &str {
        self.name
    }

    fn mask(&self) -> &M {
        &self.mask
    }

    fn value_restriction(&self) -> ValueRestriction {
        self.restriction
    }

    async fn is_match(&self, candidate: &str) -> std::result::Result<bool, BoxError> {
        Ok(self.matches(candidate))
    }
}

#[derive(Default, Debug)]
pub struct RestrictionIndex {
    pub alphabetical: Vec<RuleId>,
    pub numeric: Vec<RuleId>,
}

/// Ordered list of rules plus the restriction index.
pub struct RuleSet<M> {
    rules: Vec<Arc<dyn MaskRule<M>>>,
    index: RestrictionIndex,
}

impl<M: Mask> RuleSet<M> {
    pub fn new() -> Self {
        RuleSet { rules: Vec::new(), index: RestrictionIndex::default() }
    }

    /// Builder-style [`push`](Self::push).
    pub fn with(mut self, rule: impl MaskRule<M> + 'static) -> Self {
        self.push(Arc::new(rule));
        self
    }

    /// Append a rule with the lowest priority so far.
    pub fn push(&mut self, rule: Arc<dyn MaskRule<M>>) {
        let id = self.rules.len();
        let restriction = rule.value_restriction();
        if restriction.contains(ValueRestriction::ALPHABETICAL) {
            self.index.alphabetical.push(id);
        }
        if restriction.contains(ValueRestriction::NUMERIC) {
            self.index.numeric.push(id);
        }
        self.rules.push(rule);
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[Arc<dyn MaskRule<M>>] {
        &self.rules
    }

    pub fn names(&self) -> Vec<String> {
        self.rules.iter().map(|r| r.name().to_string()).collect()
    }

    /// Rules whose restriction admits `candidate`, in priority order.
    pub fn candidates_for<'a>(&'a self, candidate: &str) -> impl Iterator<Item = &'a Arc<dyn MaskRule<M>>> + 'a {
        let ids = if ValueRestriction::of(candidate) == ValueRestriction::NUMERIC {
            &self.index.numeric
        } else {
            &self.index.alphabetical
        };
        ids.iter().map(move |&id| &self.rules[id])
    }

    /// First rule matching `candidate`. Every awaited predicate adds one to
    /// `checks`; a failing predicate aborts with [`Error::RulePredicate`].
    pub async fn find_match(&self, candidate: &str, checks: &mut usize) -> Result<Option<&Arc<dyn MaskRule<M>>>> {
        for rule in self.candidates_for(candidate) {
            *checks += 1;
            if check(rule.as_ref(), candidate).await? {
                return Ok(Some(rule));
            }
        }
        Ok(None)
    }

    /// Whether some rule for `mask` accepts `value`.
    pub async fn accepts(&self, mask: &M, value: &str, checks: &mut usize) -> Result<bool> {
        for rule in self.candidates_for(value).filter(|r| r.mask() == mask) {
            *checks += 1;
            if check(rule.as_ref(), value).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

async fn check<M: Mask>(rule: &dyn MaskRule<M>, candidate: &str) -> Result<bool> {
    rule.is_match(candidate).await.map_err(|source| Error::RulePredicate {
        rule: rule.name().to_string(),
        candidate: candidate.to_string(),
        source,
    })
}

impl<M: Mask> Default for RuleSet<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Mask> fmt::Debug for RuleSet<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleSet").field("rules", &self.names()).field("index", &self.index).finish()
    }
}

impl<M: Mask> FromIterator<Arc<dyn MaskRule<M>>> for RuleSet<M> {
    fn from_iter<I: IntoIterator<Item = Arc<dyn MaskRule<M>>>>(iter: I) -> Self {
        let mut set = RuleSet::new();
        for rule in iter {
            set.push(rule);
        }
        set
    }
}

/// Builds the rule set for one evaluation. Called once per entity, possibly
/// from several tasks at once.
pub trait RuleSetFactory<M: Mask>: Send + Sync {
    fn create_rule_set(&self, context: &EvaluationContext) -> RuleSet<M>;
}

impl<M, F> RuleSetFactory<M> for F
where
    M: Mask,
    F: Fn(&EvaluationContext) -> RuleSet<M> + Send + Sync,
{
    fn create_rule_set(&self, context: &EvaluationContext) -> RuleSet<M> {
        self(context)
    }
}
