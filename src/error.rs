//! Crate error taxonomy.
//!
//! Every failure the core can report is one variant of [`Error`]. Validation,
//! capacity and state errors are raised synchronously by the data model;
//! `RulePredicate` and `KnowledgeBase` wrap failures coming from caller-supplied
//! collaborators and abort the evaluation that observed them.
//!
//! A partially resolved entity is *not* an error: see [`crate::Outcome`].

use crate::tokenizer::MAX_INPUT_LEN;

/// Boxed error type returned by rule predicates and knowledge-base stores.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --- Validation ---------------------------------------------------------
    #[error("input is {len} characters long; at most {} are supported", MAX_INPUT_LEN)]
    InputTooLong { len: usize },

    #[error("{index} is not a valid token index (token count {count})")]
    TokenIndexOutOfRange { index: usize, count: usize },

    #[error("invalid token range: start {start} is after end {end}")]
    InvalidTokenRange { start: usize, end: usize },

    #[error("range of {len} tokens starting at {start} overflows {count} tokens")]
    RangeOverflow { start: usize, len: usize, count: usize },

    #[error("no mask configuration registered for mask {mask}")]
    UnknownMask { mask: String },

    #[error("mask registry has no configuration for the default mask {mask}")]
    MissingDefaultMask { mask: String },

    #[error("required argument `{name}` is empty")]
    EmptyArgument { name: &'static str },

    #[error("raw fingerprint must be {expected} bytes, got {actual}")]
    InvalidFingerprintLength { expected: usize, actual: usize },

    // --- Capacity -----------------------------------------------------------
    #[error("fingerprint already holds the maximum of {max} tokens")]
    FingerprintOverflow { max: usize },

    // --- State --------------------------------------------------------------
    #[error("masked entity has been fully read")]
    ReaderExhausted,

    #[error("masked entity is read-only")]
    ReadOnly,

    #[error("agent is shut down")]
    AgentClosed,

    // --- Collaborators ------------------------------------------------------
    #[error("rule `{rule}` failed while matching {candidate:?}")]
    RulePredicate {
        rule: String,
        candidate: String,
        #[source]
        source: BoxError,
    },

    #[error("knowledge base {operation} failed")]
    KnowledgeBase {
        operation: &'static str,
        #[source]
        source: BoxError,
    },
}

impl Error {
    /// Returns true for caller mistakes that can never succeed on retry.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InputTooLong { .. }
                | Error::TokenIndexOutOfRange { .. }
                | Error::InvalidTokenRange { .. }
                | Error::RangeOverflow { .. }
                | Error::UnknownMask { .. }
                | Error::MissingDefaultMask { .. }
                | Error::EmptyArgument { .. }
                | Error::InvalidFingerprintLength { .. }
        )
    }
}
