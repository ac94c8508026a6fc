use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::context::EvaluationContext;
use crate::engine::{
    self, AmbiguityPolicy, Evaluator, RuleSet, RuleSetFactory, RunMetrics, SequencePolicy, SweepMetrics,
};
use crate::error::{Error, Result};
use crate::knowledge::KnowledgeBase;
use crate::masked::{Mask, MaskRegistry, MaskedEntity};
use crate::reader::{MaskRun, MaskedEntityReader};
use crate::tokenizer::{DEFAULT_DELIMITER, Tokenizer};

/// Options that affect resolution behavior.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub sequence_policy: SequencePolicy,
    pub ambiguity_policy: AmbiguityPolicy,
    /// Consult the knowledge base before evaluating rules.
    pub use_knowledge_base: bool,
    /// Hand entities resolved by rules back to the knowledge base.
    pub record_resolved: bool,
    /// Joins tokens into sequence candidates and reader values.
    pub token_delimiter: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            sequence_policy: SequencePolicy::default(),
            ambiguity_policy: AmbiguityPolicy::default(),
            use_knowledge_base: true,
            record_resolved: true,
            token_delimiter: DEFAULT_DELIMITER.to_string(),
        }
    }
}

/// How a resolution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// A knowledge-base candidate was applied.
    KnowledgeBase,
    /// Rule evaluation masked every token.
    Rules,
    /// Some tokens still carry the default mask.
    Partial,
}

impl Outcome {
    pub fn is_resolved(self) -> bool {
        !matches!(self, Outcome::Partial)
    }
}

/// Result of [`RuleEngine::resolve`].
#[derive(Debug)]
pub struct Resolution<M: Mask> {
    pub entity: MaskedEntity<M>,
    pub outcome: Outcome,
    pub elapsed: Duration,
}

impl<M: Mask> Resolution<M> {
    /// The rendered masked string.
    pub fn rendered(&self) -> &str {
        self.entity.render()
    }

    pub fn runs(&self, delimiter: &str) -> Vec<MaskRun<M>> {
        MaskedEntityReader::with_delimiter(&self.entity, delimiter).collect()
    }
}

/// Compact per-sweep trace.
#[derive(Debug, Clone)]
pub struct SweepSummary {
    pub sweep: usize,
    pub phase: engine::Phase,
    pub duration: Duration,
    pub assigned: usize,
    pub candidates: usize,
    pub rule_checks: usize,
}

/// Additional details returned by [`RuleEngine::resolve_verbose`].
#[derive(Debug, Clone)]
pub struct ResolveDetails {
    pub total: Duration,
    pub template: String,
    pub fingerprint: String,
    /// Names of the rules built for this context, in priority order.
    pub active_rules: Vec<String>,
    pub knowledge_base: Option<engine::ShortcutMetrics>,
    pub evaluation_total: Duration,
    pub sweeps: Vec<SweepSummary>,
}

/// Result of [`RuleEngine::resolve_verbose`].
#[derive(Debug)]
pub struct ResolutionVerbose<M: Mask> {
    pub resolution: Resolution<M>,
    pub details: ResolveDetails,
}

/// Resolves entities: knowledge-base shortcut first, rule evaluation second.
///
/// The engine holds no per-entity state, so one instance (usually behind an
/// `Arc`) serves any number of concurrent resolutions.
pub struct RuleEngine<M: Mask, F, K: ?Sized> {
    registry: Arc<MaskRegistry<M>>,
    factory: F,
    knowledge: Arc<K>,
    options: EngineOptions,
}

impl<M, F, K> RuleEngine<M, F, K>
where
    M: Mask,
    F: RuleSetFactory<M>,
    K: KnowledgeBase<M> + ?Sized,
{
    pub fn new(registry: Arc<MaskRegistry<M>>, factory: F, knowledge: Arc<K>) -> Self {
        RuleEngine { registry, factory, knowledge, options: EngineOptions::default() }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn registry(&self) -> &Arc<MaskRegistry<M>> {
        &self.registry
    }

    pub fn knowledge_base(&self) -> &Arc<K> {
        &self.knowledge
    }

    /// Fresh entity for the context's name, every token at the default mask.
    pub fn entity_for(&self, context: &EvaluationContext) -> Result<MaskedEntity<M>> {
        let tokenizer = Tokenizer::new(context.name())?;
        Ok(MaskedEntity::new(tokenizer, Arc::clone(&self.registry)))
    }

    /// Resolve the name carried by `context`.
    pub async fn resolve(&self, context: &EvaluationContext) -> Result<Resolution<M>> {
        let start = Instant::now();
        let mut entity = self.entity_for(context)?;
        let (outcome, _) = self.resolve_entity(context, &mut entity).await?;
        Ok(Resolution { entity, outcome, elapsed: start.elapsed() })
    }

    /// Resolve a bare name.
    pub async fn resolve_str(&self, name: &str) -> Result<Resolution<M>> {
        self.resolve(&EvaluationContext::from_name(name)?).await
    }

    /// Resolve and return extra (compact) debug details.
    pub async fn resolve_verbose(&self, context: &EvaluationContext) -> Result<ResolutionVerbose<M>> {
        let start = Instant::now();
        let mut entity = self.entity_for(context)?;
        let rules = self.factory.create_rule_set(context);
        let active_rules = rules.names();
        let (outcome, metrics) = self.resolve_with(context, &rules, &mut entity).await?;

        let evaluation = metrics.evaluation.unwrap_or_default();
        let details = ResolveDetails {
            total: metrics.total,
            template: entity.tokenizer().template().to_string(),
            fingerprint: entity.tokenizer().fingerprint().to_string(),
            active_rules,
            knowledge_base: metrics.shortcut,
            evaluation_total: evaluation.total,
            sweeps: evaluation.sweeps.iter().enumerate().map(|(idx, s)| sweep_summary(idx, s)).collect(),
        };

        let resolution = Resolution { entity, outcome, elapsed: start.elapsed() };
        Ok(ResolutionVerbose { resolution, details })
    }

    /// Resolve an existing entity in place.
    ///
    /// Masks already set are kept, so an entity left partial by an earlier
    /// call can be handed back for another attempt.
    pub async fn resolve_entity(
        &self,
        context: &EvaluationContext,
        entity: &mut MaskedEntity<M>,
    ) -> Result<(Outcome, RunMetrics)> {
        let rules = self.factory.create_rule_set(context);
        self.resolve_with(context, &rules, entity).await
    }

    /// Shortcut, evaluation and recording against an already built rule set.
    async fn resolve_with(
        &self,
        context: &EvaluationContext,
        rules: &RuleSet<M>,
        entity: &mut MaskedEntity<M>,
    ) -> Result<(Outcome, RunMetrics)> {
        let start = Instant::now();
        let mut metrics = RunMetrics::default();

        if entity.all_masked() {
            metrics.total = start.elapsed();
            return Ok((Outcome::Rules, metrics));
        }
        if entity.is_read_only() {
            return Err(Error::ReadOnly);
        }

        let delimiter = self.options.token_delimiter.as_str();

        if self.options.use_knowledge_base {
            let shortcut =
                engine::try_shortcut(self.knowledge.as_ref(), rules, entity, self.options.ambiguity_policy, delimiter)
                    .await?;
            let accepted = shortcut.accepted;
            metrics.shortcut = Some(shortcut);
            if accepted {
                metrics.total = start.elapsed();
                debug!(name = context.name(), rendered = entity.render(), "resolved from knowledge base");
                return Ok((Outcome::KnowledgeBase, metrics));
            }
        }

        let evaluation = Evaluator::new(rules)
            .with_policy(self.options.sequence_policy)
            .with_delimiter(delimiter)
            .evaluate(entity)
            .await?;
        metrics.evaluation = Some(evaluation);

        let outcome = if entity.all_masked() { Outcome::Rules } else { Outcome::Partial };
        if outcome == Outcome::Rules && self.options.record_resolved {
            self.knowledge
                .record_resolved(entity.snapshot())
                .await
                .map_err(|source| Error::KnowledgeBase { operation: "record_resolved", source })?;
        }
        if outcome == Outcome::Partial {
            warn!(
                name = context.name(),
                masked = entity.masked_count(),
                tokens = entity.token_count(),
                "entity only partially resolved"
            );
        }

        metrics.total = start.elapsed();
        Ok((outcome, metrics))
    }
}

fn sweep_summary(idx: usize, sweep: &SweepMetrics) -> SweepSummary {
    SweepSummary {
        sweep: idx,
        phase: sweep.phase,
        duration: sweep.duration,
        assigned: sweep.assigned,
        candidates: sweep.candidates,
        rule_checks: sweep.rule_checks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{FnRule, Matcher, RuleSet, ValueRestriction};
    use crate::knowledge::{MemoryKnowledgeBase, NoKnowledgeBase};
    use crate::masked::MaskConfiguration;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum TestMask {
        Unknown,
        Title,
        Number,
    }

    fn registry() -> Arc<MaskRegistry<TestMask>> {
        Arc::new(
            MaskRegistry::new(TestMask::Unknown, MaskConfiguration::unmergeable("%?"))
                .with(TestMask::Title, MaskConfiguration::new("%t"))
                .with(TestMask::Number, MaskConfiguration::unmergeable("%n")),
        )
    }

    fn rules(_: &EvaluationContext) -> RuleSet<TestMask> {
        RuleSet::new()
            .with(
                FnRule::new("title", TestMask::Title, Matcher::Regex(regex!(r"^[A-Za-z]+( [A-Za-z]+)+$")))
                    .with_restriction(ValueRestriction::ALPHABETICAL),
            )
            .with(
                FnRule::new("number", TestMask::Number, Matcher::Regex(regex!(r"^\d+$")))
                    .with_restriction(ValueRestriction::NUMERIC),
            )
    }

    #[tokio::test]
    async fn resolve_with_rules_then_knowledge_base() {
        let kb = Arc::new(MemoryKnowledgeBase::new());
        let engine = RuleEngine::new(registry(), rules, Arc::clone(&kb));

        let first = engine.resolve_str("Some Title 01").await.unwrap();
        assert_eq!(first.outcome, Outcome::Rules);
        assert_eq!(first.rendered(), "%t%n");
        assert_eq!(kb.len().await, 1);

        let second = engine.resolve_str("Other Show 22").await.unwrap();
        assert_eq!(second.outcome, Outcome::KnowledgeBase);
        assert_eq!(second.rendered(), "%t%n");
        let runs = second.runs(" ");
        assert_eq!(runs.iter().map(|r| r.value.as_str()).collect::<Vec<_>>(), vec!["Other Show", "22"]);
    }

    #[tokio::test]
    async fn partial_result_is_not_an_error() {
        let engine = RuleEngine::new(registry(), rules, Arc::new(MemoryKnowledgeBase::new()));

        let res = engine.resolve_str("Lonely 01").await.unwrap();

        assert_eq!(res.outcome, Outcome::Partial);
        assert!(!res.outcome.is_resolved());
        assert_eq!(res.entity.mask_mappings(), vec![TestMask::Unknown, TestMask::Number]);
        assert!(engine.knowledge_base().is_empty().await);
    }

    #[tokio::test]
    async fn knowledge_base_can_be_disabled() {
        let kb = Arc::new(MemoryKnowledgeBase::new());
        let options = EngineOptions { use_knowledge_base: false, record_resolved: false, ..EngineOptions::default() };
        let engine = RuleEngine::new(registry(), rules, Arc::clone(&kb)).with_options(options);

        engine.resolve_str("Some Title 01").await.unwrap();
        let res = engine.resolve_str("Other Show 22").await.unwrap();

        assert_eq!(res.outcome, Outcome::Rules);
        assert!(kb.is_empty().await);
    }

    #[tokio::test]
    async fn empty_names_resolve_trivially() {
        let engine = RuleEngine::new(registry(), rules, Arc::new(NoKnowledgeBase));

        let res = engine.resolve_str("--").await.unwrap();
        assert_eq!(res.outcome, Outcome::Rules);
        assert_eq!(res.rendered(), "");

        assert!(matches!(engine.resolve_str("").await, Err(Error::EmptyArgument { .. })));
        let long = "a ".repeat(200);
        assert!(matches!(engine.resolve_str(&long).await, Err(Error::InputTooLong { .. })));
    }

    #[tokio::test]
    async fn verbose_resolution_reports_sweeps() {
        let engine = RuleEngine::new(registry(), rules, Arc::new(NoKnowledgeBase));
        let ctx = EvaluationContext::from_name("Some Title 01").unwrap();

        let res = engine.resolve_verbose(&ctx).await.unwrap();

        assert_eq!(res.resolution.outcome, Outcome::Rules);
        assert_eq!(res.details.template, "%0 %1 %2");
        assert_eq!(res.details.active_rules, vec!["title", "number"]);
        assert_eq!(res.details.knowledge_base.as_ref().map(|s| s.candidates), Some(0));
        assert_eq!(res.details.sweeps.len(), 3);
        assert_eq!(res.details.sweeps[2].phase, engine::Phase::Sequence);
        assert!(res.details.evaluation_total <= res.details.total);
    }

    #[tokio::test]
    async fn verbose_resolution_builds_the_rule_set_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let factory = move |_: &EvaluationContext| {
            let name = if counter.fetch_add(1, Ordering::SeqCst) == 0 { "first" } else { "second" };
            RuleSet::new().with(FnRule::new(name, TestMask::Number, Matcher::Regex(regex!(r"^\d+$"))))
        };
        let engine = RuleEngine::new(registry(), factory, Arc::new(NoKnowledgeBase));

        let res = engine.resolve_verbose(&EvaluationContext::from_name("12").unwrap()).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(res.details.active_rules, vec!["first"]);
        assert_eq!(res.resolution.rendered(), "%n");
    }

    #[tokio::test]
    async fn resolve_entity_keeps_existing_masks() {
        let engine = RuleEngine::new(registry(), rules, Arc::new(NoKnowledgeBase));
        let ctx = EvaluationContext::from_name("Some 01").unwrap();
        let mut entity = engine.entity_for(&ctx).unwrap();
        entity.set_mask(0, TestMask::Title).unwrap();

        let (outcome, metrics) = engine.resolve_entity(&ctx, &mut entity).await.unwrap();

        assert_eq!(outcome, Outcome::Rules);
        assert_eq!(entity.render(), "%t%n");
        assert_eq!(metrics.evaluation.map(|e| e.assigned()), Some(1));
    }

    #[tokio::test]
    async fn shrinking_policy_changes_results() {
        let strict = |_: &EvaluationContext| {
            RuleSet::new().with(FnRule::new("pair", TestMask::Title, Matcher::Regex(regex!(r"^Some Title$"))))
        };
        let options = EngineOptions { sequence_policy: SequencePolicy::Shrinking, ..EngineOptions::default() };
        let full = RuleEngine::new(registry(), strict, Arc::new(NoKnowledgeBase));
        let shrinking = RuleEngine::new(registry(), strict, Arc::new(NoKnowledgeBase)).with_options(options);

        assert_eq!(full.resolve_str("Some Title Extra").await.unwrap().entity.masked_count(), 0);
        assert_eq!(shrinking.resolve_str("Some Title Extra").await.unwrap().entity.masked_count(), 2);
    }
}
