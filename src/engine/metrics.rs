//! Engine run metrics.
//!
//! Collected on every run (they are a handful of counters and `Instant`s) and
//! surfaced through [`RuleEngine::resolve_verbose`](crate::RuleEngine::resolve_verbose)
//! and the CLI report.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// One candidate per unmasked token.
    Individual,
    /// One candidate per run of unmasked tokens (more when shrinking).
    Sequence,
}

/// Timing and counters for a single sweep.
#[derive(Debug, Clone)]
pub struct SweepMetrics {
    pub phase: Phase,
    pub duration: Duration,
    /// Tokens that received a mask during the sweep.
    pub assigned: usize,
    /// Candidate strings tried against the rule set.
    pub candidates: usize,
    /// Rule predicates awaited.
    pub rule_checks: usize,
}

impl SweepMetrics {
    pub(crate) fn new(phase: Phase) -> Self {
        SweepMetrics { phase, duration: Duration::ZERO, assigned: 0, candidates: 0, rule_checks: 0 }
    }
}

/// Timings for the convergence loop.
#[derive(Debug, Default, Clone)]
pub struct EvaluationMetrics {
    pub total: Duration,
    pub sweeps: Vec<SweepMetrics>,
}

impl EvaluationMetrics {
    pub fn assigned(&self) -> usize {
        self.sweeps.iter().map(|s| s.assigned).sum()
    }

    pub fn sweep_count(&self, phase: Phase) -> usize {
        self.sweeps.iter().filter(|s| s.phase == phase).count()
    }
}

/// What the knowledge-base lookup did before evaluation.
#[derive(Debug, Default, Clone)]
pub struct ShortcutMetrics {
    pub duration: Duration,
    /// Snapshots returned for the fingerprint.
    pub candidates: usize,
    /// Snapshots whose every run was accepted by the rule set.
    pub passing: usize,
    pub rule_checks: usize,
    /// Whether a candidate's mappings were applied.
    pub accepted: bool,
}

#[derive(Debug, Default, Clone)]
pub struct RunMetrics {
    pub total: Duration,
    /// `None` when the knowledge base was not consulted.
    pub shortcut: Option<ShortcutMetrics>,
    /// `None` when the shortcut resolved the entity or nothing was left to do.
    pub evaluation: Option<EvaluationMetrics>,
}
