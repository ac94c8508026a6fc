//! Knowledge-base shortcut.
//!
//! Before any rule is evaluated, the engine asks the knowledge base for
//! entities resolved earlier with the same fingerprint. Each candidate is
//! replayed against the current tokens:
//!
//! ```text
//! candidate snapshot ──> readonly entity over the *current* tokens
//!                          │
//!                          v
//!                   reader runs (mask, joined value)
//!                          │
//!     every run accepted by a rule for its mask? ── no ──> rejected
//!                          │ yes
//!                          v
//!                       passing
//! ```
//!
//! One passing candidate is applied outright. Several passing candidates are
//! resolved by [`AmbiguityPolicy`]; none means the evaluator runs.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, trace};

use super::metrics::ShortcutMetrics;
use super::rule_set::RuleSet;
use crate::error::{Error, Result};
use crate::knowledge::KnowledgeBase;
use crate::masked::{Mask, MaskMapping, MaskedEntity, MaskedEntitySnapshot};
use crate::reader::{MaskRun, MaskedEntityReader};

/// What to do when more than one knowledge-base candidate passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AmbiguityPolicy {
    /// Ignore the knowledge base and evaluate rules.
    #[default]
    FallBack,
    /// Apply the first passing candidate in store order.
    FirstCandidate,
}

/// Try to resolve `entity` from `knowledge`. Returns metrics whose `accepted`
/// flag says whether the entity's masks were replaced by a candidate.
pub(crate) async fn try_shortcut<M, K>(
    knowledge: &K,
    rules: &RuleSet<M>,
    entity: &mut MaskedEntity<M>,
    policy: AmbiguityPolicy,
    delimiter: &str,
) -> Result<ShortcutMetrics>
where
    M: Mask,
    K: KnowledgeBase<M> + ?Sized,
{
    let start = Instant::now();
    let mut metrics = ShortcutMetrics::default();
    let fingerprint = *entity.tokenizer().fingerprint();

    let candidates = knowledge
        .find_by_fingerprint(&fingerprint)
        .await
        .map_err(|source| Error::KnowledgeBase { operation: "find_by_fingerprint", source })?;
    metrics.candidates = candidates.len();

    let mut passing: Vec<Vec<MaskMapping<M>>> = Vec::new();
    for candidate in &candidates {
        let Some(runs) = replay(entity, candidate, delimiter) else {
            continue;
        };

        let mut accepted = true;
        for run in &runs {
            if !rules.accepts(&run.mask, &run.value, &mut metrics.rule_checks).await? {
                trace!(rendered = candidate.rendered.as_str(), value = run.value.as_str(), "candidate run rejected");
                accepted = false;
                break;
            }
        }
        if !accepted {
            continue;
        }

        passing.push(candidate.mappings.clone());
        let enough = match policy {
            AmbiguityPolicy::FirstCandidate => true,
            // A second pass already makes the lookup ambiguous.
            AmbiguityPolicy::FallBack => passing.len() > 1,
        };
        if enough {
            break;
        }
    }
    metrics.passing = passing.len();

    let chosen = match (passing.len(), policy) {
        (0, _) => None,
        (1, _) | (_, AmbiguityPolicy::FirstCandidate) => passing.first(),
        (_, AmbiguityPolicy::FallBack) => None,
    };

    if let Some(mappings) = chosen {
        entity.apply_mappings(mappings)?;
        metrics.accepted = true;
    }

    metrics.duration = start.elapsed();
    debug!(
        fingerprint = %fingerprint,
        candidates = metrics.candidates,
        passing = metrics.passing,
        accepted = metrics.accepted,
        "knowledge base lookup"
    );
    Ok(metrics)
}

/// Rebuild `candidate` over the entity's tokens and read its runs, or `None`
/// when the candidate cannot describe this entity.
fn replay<M: Mask>(
    entity: &MaskedEntity<M>,
    candidate: &MaskedEntitySnapshot<M>,
    delimiter: &str,
) -> Option<Vec<MaskRun<M>>> {
    if candidate.fingerprint != *entity.tokenizer().fingerprint() {
        trace!(rendered = candidate.rendered.as_str(), "candidate fingerprint differs");
        return None;
    }

    let registry = entity.registry();
    let readonly = match MaskedEntity::from_snapshot(Arc::clone(entity.tokenizer()), Arc::clone(registry), candidate)
    {
        Ok(readonly) => readonly,
        Err(err) => {
            debug!(rendered = candidate.rendered.as_str(), error = %err, "candidate does not fit the tokens");
            return None;
        }
    };

    if !readonly.all_masked() || !readonly.masks().iter().all(|m| registry.contains(m)) {
        trace!(rendered = candidate.rendered.as_str(), "candidate is not fully masked");
        return None;
    }

    Some(MaskedEntityReader::with_delimiter(&readonly, delimiter).collect())
}
