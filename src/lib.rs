//! Rule-based masking of file names and other short strings.
//!
//! A name is split into alpha and numeric tokens, its token shape is packed
//! into a [`Fingerprint`], and every token is assigned a caller-defined mask
//! by an ordered set of rules:
//!
//! ```text
//! "Some Title v01"
//!   tokenizer   ──> template "%0 %1 %2%3", tokens [Some, Title, v, 01]
//!   fingerprint ──> alpha alpha alpha numeric
//!   engine      ──> knowledge base (same fingerprint) or rule evaluation
//!   rendered    ──> "%t%k%n"
//! ```
//!
//! [`RuleEngine`] is the entry point; [`Agent`] wraps it in a retry queue, and
//! [`rules::file_name`] ships a rule set for media and document file names.

#[macro_use]
mod macros;
mod api;
mod context;
mod engine;
mod error;
mod fingerprint;
mod knowledge;
mod masked;
mod reader;
mod tokenizer;

pub mod agent;
pub mod rules;

pub use agent::{Agent, AgentOptions, AgentReport};
pub use api::{EngineOptions, Outcome, Resolution, ResolutionVerbose, ResolveDetails, RuleEngine, SweepSummary};
pub use context::EvaluationContext;
pub use engine::{
    AmbiguityPolicy, EvaluationMetrics, Evaluator, FnRule, MaskRule, Matcher, Phase, RunMetrics, RuleSet,
    RuleSetFactory, SequencePolicy, ShortcutMetrics, SweepMetrics, ValueRestriction,
};
pub use error::{BoxError, Error, Result};
pub use fingerprint::{FINGERPRINT_LEN, Fingerprint, MAX_TOKENS};
pub use knowledge::{KnowledgeBase, MemoryKnowledgeBase, NoKnowledgeBase};
pub use masked::{Mask, MaskConfiguration, MaskMapping, MaskRegistry, MaskedEntity, MaskedEntitySnapshot};
pub use reader::{MaskRun, MaskedEntityReader};
pub use tokenizer::{
    DEFAULT_DELIMITER, MAX_INPUT_LEN, TOKEN_MARKER, TemplatePart, TemplateParts, Token, TokenKind, Tokenizer,
    template_parts,
};

#[doc(hidden)]
pub mod __private {
    pub use once_cell::sync::Lazy;
    pub use regex::Regex;
}
