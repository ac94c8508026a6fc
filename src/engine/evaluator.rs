//! Convergence evaluator.
//!
//! Assigns masks to the unmasked tokens of an entity by alternating two
//! phases until every token is masked or a sequence sweep assigns nothing:
//!
//! ```text
//!            ┌──────────────────────────────┐
//!            v                              │
//!  individual sweep ──(assigned > 0)────────┘
//!            │ (nothing new)
//!            v
//!  all masked? ──yes──> done (resolved)
//!            │ no
//!            v
//!  sequence sweep ──(assigned > 0)──> back to individual sweeps
//!            │ (nothing new)
//!            v
//!          done (partial)
//! ```
//!
//! - **Individual sweep**: every unmasked token is tried on its own; the first
//!   matching rule assigns its mask.
//! - **Sequence sweep**: for every unmasked index `i`, the maximal run of
//!   unmasked tokens starting at `i` is joined with the delimiter and tried
//!   once ([`SequencePolicy::FullRun`]) or as successively shorter prefixes
//!   down to two tokens ([`SequencePolicy::Shrinking`]). A match masks the
//!   whole candidate and the sweep continues after it.
//!
//! Predicates are awaited one at a time in token order, so the assignment
//! order is the same on every run.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, trace};

use super::metrics::{EvaluationMetrics, Phase, SweepMetrics};
use super::rule_set::RuleSet;
use crate::error::Result;
use crate::masked::{Mask, MaskedEntity};
use crate::tokenizer::DEFAULT_DELIMITER;

/// How the sequence sweep treats a run that does not match as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SequencePolicy {
    /// One attempt per run, at its full length.
    #[default]
    FullRun,
    /// Retry with shorter prefixes of the run, down to two tokens.
    Shrinking,
}

#[derive(Debug)]
pub struct Evaluator<'a, M: Mask> {
    rules: &'a RuleSet<M>,
    policy: SequencePolicy,
    delimiter: &'a str,
}

impl<'a, M: Mask> Evaluator<'a, M> {
    pub fn new(rules: &'a RuleSet<M>) -> Self {
        Evaluator { rules, policy: SequencePolicy::default(), delimiter: DEFAULT_DELIMITER }
    }

    pub fn with_policy(mut self, policy: SequencePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_delimiter(mut self, delimiter: &'a str) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Run the convergence loop. The entity is resolved when
    /// [`MaskedEntity::all_masked`] holds afterwards.
    pub async fn evaluate(&self, entity: &mut MaskedEntity<M>) -> Result<EvaluationMetrics> {
        let start = Instant::now();
        let mut metrics = EvaluationMetrics::default();

        loop {
            while !entity.all_masked() {
                let sweep = self.individual_sweep(entity).await?;
                let assigned = sweep.assigned;
                metrics.sweeps.push(sweep);
                if assigned == 0 {
                    break;
                }
            }
            if entity.all_masked() {
                break;
            }

            let sweep = self.sequence_sweep(entity).await?;
            let assigned = sweep.assigned;
            metrics.sweeps.push(sweep);
            if assigned == 0 {
                break;
            }
        }

        metrics.total = start.elapsed();
        debug!(
            template = entity.tokenizer().template(),
            sweeps = metrics.sweeps.len(),
            assigned = metrics.assigned(),
            resolved = entity.all_masked(),
            "evaluation converged"
        );
        Ok(metrics)
    }

    async fn individual_sweep(&self, entity: &mut MaskedEntity<M>) -> Result<SweepMetrics> {
        let start = Instant::now();
        let mut sweep = SweepMetrics::new(Phase::Individual);
        let tokenizer = Arc::clone(entity.tokenizer());

        for (index, text) in tokenizer.tokens().enumerate() {
            if entity.all_masked() {
                break;
            }
            if entity.is_mask_set(index) {
                continue;
            }

            sweep.candidates += 1;
            if let Some(rule) = self.rules.find_match(text, &mut sweep.rule_checks).await? {
                trace!(rule = rule.name(), index, candidate = text, "token matched");
                entity.set_mask(index, rule.mask().clone())?;
                sweep.assigned += 1;
            }
        }

        sweep.duration = start.elapsed();
        Ok(sweep)
    }

    async fn sequence_sweep(&self, entity: &mut MaskedEntity<M>) -> Result<SweepMetrics> {
        let start = Instant::now();
        let mut sweep = SweepMetrics::new(Phase::Sequence);
        let tokenizer = Arc::clone(entity.tokenizer());
        let count = entity.token_count();
        let mut index = 0;

        while index < count && !entity.all_masked() {
            if entity.is_mask_set(index) {
                index += 1;
                continue;
            }

            let mut end = index + 1;
            while end < count && !entity.is_mask_set(end) {
                end += 1;
            }
            let run = end - index;
            // Single tokens were already tried by the individual sweep.
            if run < 2 {
                index = end;
                continue;
            }

            let shortest = match self.policy {
                SequencePolicy::FullRun => run,
                SequencePolicy::Shrinking => 2,
            };

            let mut matched = None;
            for len in (shortest..=run).rev() {
                let candidate = tokenizer.token_sequence(index, index + len - 1, self.delimiter)?;
                sweep.candidates += 1;
                if let Some(rule) = self.rules.find_match(&candidate, &mut sweep.rule_checks).await? {
                    trace!(rule = rule.name(), start = index, len, candidate = candidate.as_str(), "sequence matched");
                    matched = Some((len, rule.mask().clone()));
                    break;
                }
            }

            match matched {
                Some((len, mask)) => {
                    entity.set_mask_range(index, len, mask)?;
                    sweep.assigned += len;
                    index += len;
                }
                None => index += 1,
            }
        }

        sweep.duration = start.elapsed();
        Ok(sweep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::rule_set::{FnRule, Matcher, ValueRestriction};
    use crate::error::Error;
    use crate::masked::{MaskConfiguration, MaskRegistry};
    use crate::tokenizer::Tokenizer;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum TestMask {
        None,
        Any,
        Title,
        Number,
    }

    fn entity(input: &str) -> MaskedEntity<TestMask> {
        let registry = MaskRegistry::new(TestMask::None, MaskConfiguration::unmergeable("%d"))
            .with(TestMask::Any, MaskConfiguration::new("%a"))
            .with(TestMask::Title, MaskConfiguration::new("%t"))
            .with(TestMask::Number, MaskConfiguration::unmergeable("%n"));
        MaskedEntity::new(Tokenizer::new(input).unwrap(), Arc::new(registry))
    }

    fn words_rule() -> FnRule<TestMask> {
        FnRule::new("words", TestMask::Any, Matcher::Regex(regex!(r"^[A-Za-z]+( [A-Za-z]+)*$")))
    }

    fn title_rule() -> FnRule<TestMask> {
        FnRule::new("title", TestMask::Title, Matcher::Regex(regex!(r"^[A-Za-z]+( [A-Za-z]+)+$")))
            .with_restriction(ValueRestriction::ALPHABETICAL)
    }

    fn number_rule() -> FnRule<TestMask> {
        FnRule::new("number", TestMask::Number, Matcher::Regex(regex!(r"^\d+$")))
            .with_restriction(ValueRestriction::NUMERIC)
    }

    #[tokio::test]
    async fn single_individual_sweep_when_every_token_matches() {
        let rules = RuleSet::new().with(words_rule());
        let mut e = entity("Some Test File");

        let metrics = Evaluator::new(&rules).evaluate(&mut e).await.unwrap();

        assert!(e.all_masked());
        assert_eq!(e.mask_mappings(), vec![TestMask::Any; 3]);
        assert_eq!(metrics.sweeps.len(), 1);
        assert_eq!(metrics.sweep_count(Phase::Sequence), 0);
        assert_eq!(e.render(), "%a");
    }

    #[tokio::test]
    async fn sequence_sweep_masks_remaining_run() {
        let rules = RuleSet::new().with(title_rule()).with(number_rule());
        let mut e = entity("Some Title 01");

        let metrics = Evaluator::new(&rules).evaluate(&mut e).await.unwrap();

        assert!(e.all_masked());
        assert_eq!(e.mask_mappings(), vec![TestMask::Title, TestMask::Title, TestMask::Number]);
        assert_eq!(e.render(), "%t%n");
        assert_eq!(metrics.sweep_count(Phase::Sequence), 1);
        assert_eq!(metrics.assigned(), 3);
    }

    #[tokio::test]
    async fn unmatched_tokens_leave_partial_result() {
        let rules = RuleSet::new().with(number_rule());
        let mut e = entity("Some 01 Title");

        let metrics = Evaluator::new(&rules).evaluate(&mut e).await.unwrap();

        assert!(!e.all_masked());
        assert_eq!(e.mask_mappings(), vec![TestMask::None, TestMask::Number, TestMask::None]);
        // individual (1 assigned), individual (0), sequence (0)
        assert_eq!(metrics.sweeps.len(), 3);
        assert_eq!(metrics.sweeps[2].phase, Phase::Sequence);
    }

    #[tokio::test]
    async fn full_run_policy_does_not_shrink() {
        let rules = RuleSet::new().with(
            FnRule::new("pair", TestMask::Title, Matcher::Regex(regex!(r"^Some Title$")))
                .with_restriction(ValueRestriction::ALPHABETICAL),
        );

        let mut full = entity("Some Title Extra");
        Evaluator::new(&rules).evaluate(&mut full).await.unwrap();
        assert_eq!(full.masked_count(), 0);

        let mut shrunk = entity("Some Title Extra");
        let metrics =
            Evaluator::new(&rules).with_policy(SequencePolicy::Shrinking).evaluate(&mut shrunk).await.unwrap();
        assert_eq!(shrunk.mask_mappings(), vec![TestMask::Title, TestMask::Title, TestMask::None]);
        assert!(metrics.sweeps.iter().any(|s| s.phase == Phase::Sequence && s.candidates >= 2));
    }

    #[tokio::test]
    async fn later_runs_start_at_each_unmasked_index() {
        let rules = RuleSet::new().with(
            FnRule::new("tail", TestMask::Title, Matcher::Regex(regex!(r"^Title Extra$")))
                .with_restriction(ValueRestriction::ALPHABETICAL),
        );
        let mut e = entity("Some Title Extra");

        Evaluator::new(&rules).evaluate(&mut e).await.unwrap();

        assert_eq!(e.mask_mappings(), vec![TestMask::None, TestMask::Title, TestMask::Title]);
    }

    #[tokio::test]
    async fn custom_delimiter_is_used_for_sequences() {
        let rules = RuleSet::new().with(
            FnRule::new("dotted", TestMask::Title, Matcher::Regex(regex!(r"^Some\.Title$")))
                .with_restriction(ValueRestriction::ALPHABETICAL),
        );
        let mut e = entity("Some Title");

        Evaluator::new(&rules).with_delimiter(".").evaluate(&mut e).await.unwrap();

        assert!(e.all_masked());
    }

    #[tokio::test]
    async fn empty_entity_needs_no_sweep() {
        let rules = RuleSet::new().with(words_rule());
        let mut e = entity("--");

        let metrics = Evaluator::new(&rules).evaluate(&mut e).await.unwrap();

        assert!(e.all_masked());
        assert!(metrics.sweeps.is_empty());
    }

    #[tokio::test]
    async fn evaluation_is_deterministic() {
        let rules = RuleSet::new().with(number_rule()).with(title_rule());

        let mut first = entity("Alpha Beta 12 Gamma Delta 7");
        let mut second = entity("Alpha Beta 12 Gamma Delta 7");
        Evaluator::new(&rules).evaluate(&mut first).await.unwrap();
        Evaluator::new(&rules).evaluate(&mut second).await.unwrap();

        assert_eq!(first.mask_mappings(), second.mask_mappings());
        assert_eq!(first.render(), "%t%n%t%n");
    }

    #[tokio::test]
    async fn predicate_failure_aborts_evaluation() {
        let rules = RuleSet::new()
            .with(FnRule::new("numbers", TestMask::Number, Matcher::Regex(regex!(r"^\d+$"))))
            .with(FailOn { needle: "Boom" });
        let mut e = entity("12 Boom");

        let err = Evaluator::new(&rules).evaluate(&mut e).await.unwrap_err();
        assert!(matches!(err, Error::RulePredicate { ref rule, .. } if rule == "fail-on"));
        // assignments made before the failure are kept
        assert!(e.is_mask_set(0));
    }

    struct FailOn {
        needle: &'static str,
    }

    #[async_trait::async_trait]
    impl crate::engine::rule_set::MaskRule<TestMask> for FailOn {
        fn name(&self) -> &str {
            "fail-on"
        }

        fn mask(&self) -> &TestMask {
            &TestMask::Any
        }

        async fn is_match(&self, candidate: &str) -> std::result::Result<bool, crate::error::BoxError> {
            if candidate.contains(self.needle) { Err(format!("cannot classify {candidate}").into()) } else { Ok(false) }
        }
    }
}
