//! Rule engine internals.
//!
//! The engine turns an entity whose tokens all carry the default mask into a
//! (hopefully) fully masked one. It is split into focused submodules under
//! `src/engine/`:
//!
//! ```text
//! EvaluationContext ── RuleSetFactory ──> RuleSet        (rule_set.rs)
//!                                            │
//! MaskedEntity ── try_shortcut ──────────────┤           (shortcut.rs)
//!                  (knowledge base replay)   │
//!                        │ miss / ambiguous  │
//!                        v                   │
//!                  Evaluator::evaluate <─────┘           (evaluator.rs)
//!                    - individual sweeps to fixpoint
//!                    - one sequence sweep
//!                    - repeat until nothing changes
//!                        │
//!                        v
//!                  RunMetrics                            (metrics.rs)
//! ```
//!
//! ## Responsibilities by module
//!
//! - `rule_set.rs`: the [`MaskRule`] contract, [`ValueRestriction`] and the
//!   ordered [`RuleSet`] with its restriction index.
//! - `evaluator.rs`: the convergence loop.
//! - `shortcut.rs`: knowledge-base lookup and candidate replay.
//! - `metrics.rs`: timings and counters for runs and sweeps.
//!
//! The public entry point wrapping all of this is
//! [`RuleEngine`](crate::RuleEngine).

#[path = "engine/evaluator.rs"]
mod evaluator;
#[path = "engine/metrics.rs"]
mod metrics;
#[path = "engine/rule_set.rs"]
mod rule_set;
#[path = "engine/shortcut.rs"]
mod shortcut;

pub use evaluator::{Evaluator, SequencePolicy};
pub use metrics::{EvaluationMetrics, Phase, RunMetrics, ShortcutMetrics, SweepMetrics};
pub use rule_set::{FnRule, MaskRule, Matcher, RestrictionIndex, RuleSet, RuleSetFactory, ValueRestriction};
pub use shortcut::AmbiguityPolicy;
pub(crate) use shortcut::try_shortcut;
