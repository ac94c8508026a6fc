//! Alpha/numeric tokenizer and template format.
//!
//! The tokenizer scans a string once, left to right:
//!
//! ```text
//! "this is *** a t3st. 201 ok!"
//!   -> tokens:   this | is | a | t | 3 | st | 201 | ok
//!   -> template: "%0 %1 *** %2 %3%4%5. %6 %7!"
//! ```
//!
//! - a maximal run of ASCII letters is one alpha token;
//! - a maximal run of ASCII digits is one numeric token;
//! - a literal `%` is escaped as `%%` in the template and is not a token;
//! - everything else is copied into the template unchanged.
//!
//! Markers are numbered from zero in order of appearance, and every token
//! appends one bit to the [`Fingerprint`].

use std::fmt;
use std::ops::Range;

use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;

/// Maximum input length in characters.
pub const MAX_INPUT_LEN: usize = 255;

/// Character introducing a marker in a template.
pub const TOKEN_MARKER: char = '%';

/// Delimiter used when joining tokens unless the caller asks otherwise.
pub const DEFAULT_DELIMITER: &str = " ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Alpha,
    Numeric,
}

impl TokenKind {
    fn of(c: char) -> Option<TokenKind> {
        if c.is_ascii_alphabetic() {
            Some(TokenKind::Alpha)
        } else if c.is_ascii_digit() {
            Some(TokenKind::Numeric)
        } else {
            None
        }
    }
}

/// A token: its kind and the byte span it covers in the original string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Range<usize>,
}

#[derive(Debug, Clone)]
pub struct Tokenizer {
    original: String,
    template: String,
    tokens: Vec<Token>,
    fingerprint: Fingerprint,
}

impl Tokenizer {
    /// Tokenize `input`. Fails with [`Error::InputTooLong`] past
    /// [`MAX_INPUT_LEN`] characters.
    pub fn new(input: &str) -> Result<Self> {
        let len = input.chars().count();
        if len > MAX_INPUT_LEN {
            return Err(Error::InputTooLong { len });
        }

        let mut template = String::with_capacity(input.len() + 8);
        let mut tokens = Vec::new();
        let mut fingerprint = Fingerprint::new();
        let mut chars = input.char_indices().peekable();

        while let Some((start, c)) = chars.next() {
            match TokenKind::of(c) {
                Some(kind) => {
                    let mut end = start + c.len_utf8();
                    while let Some(&(idx, next)) = chars.peek() {
                        if TokenKind::of(next) != Some(kind) {
                            break;
                        }
                        end = idx + next.len_utf8();
                        chars.next();
                    }

                    match kind {
                        TokenKind::Alpha => fingerprint.mark_alpha()?,
                        TokenKind::Numeric => fingerprint.mark_numeric()?,
                    }
                    template.push(TOKEN_MARKER);
                    template.push_str(&tokens.len().to_string());
                    tokens.push(Token { kind, span: start..end });
                }
                None if c == TOKEN_MARKER => {
                    template.push(TOKEN_MARKER);
                    template.push(TOKEN_MARKER);
                }
                None => template.push(c),
            }
        }

        Ok(Tokenizer { original: input.to_string(), template, tokens, fingerprint })
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    /// The input with every token replaced by its `%<n>` marker.
    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    /// Text of the token at `index`.
    pub fn token(&self, index: usize) -> Option<&str> {
        self.tokens.get(index).map(|t| &self.original[t.span.clone()])
    }

    pub fn token_kind(&self, index: usize) -> Option<TokenKind> {
        self.tokens.get(index).map(|t| t.kind)
    }

    /// Token kinds and spans, in order.
    pub fn token_spans(&self) -> &[Token] {
        &self.tokens
    }

    /// Token texts, in order.
    pub fn tokens(&self) -> impl Iterator<Item = &str> + '_ {
        self.tokens.iter().map(|t| &self.original[t.span.clone()])
    }

    /// Join tokens `start..=end` with `delimiter`.
    pub fn token_sequence(&self, start: usize, end: usize, delimiter: &str) -> Result<String> {
        let count = self.token_count();
        for index in [start, end] {
            if index >= count {
                return Err(Error::TokenIndexOutOfRange { index, count });
            }
        }
        if start > end {
            return Err(Error::InvalidTokenRange { start, end });
        }

        let mut joined = String::new();
        for (offset, token) in self.tokens[start..=end].iter().enumerate() {
            if offset > 0 {
                joined.push_str(delimiter);
            }
            joined.push_str(&self.original[token.span.clone()]);
        }
        Ok(joined)
    }
}

impl fmt::Display for Tokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Original: {}\nTemplate: {}", self.original, self.template)
    }
}

// --- Template parsing ----------------------------------------------------------

/// One piece of a template string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplatePart<'a> {
    /// Characters copied from the input.
    Literal(&'a str),
    /// An escaped `%%`, standing for a literal `%`.
    Escaped,
    /// A `%<n>` marker for token `n`.
    Marker(usize),
}

/// Split a template into literal runs, escaped markers and token markers.
///
/// A `%` that is followed by neither `%` nor a digit is reported as a literal;
/// tokenizer output never contains one.
pub fn template_parts(template: &str) -> TemplateParts<'_> {
    TemplateParts { rest: template }
}

pub struct TemplateParts<'a> {
    rest: &'a str,
}

impl<'a> Iterator for TemplateParts<'a> {
    type Item = TemplatePart<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }

        let Some(after) = self.rest.strip_prefix(TOKEN_MARKER) else {
            let end = self.rest.find(TOKEN_MARKER).unwrap_or(self.rest.len());
            let (literal, rest) = self.rest.split_at(end);
            self.rest = rest;
            return Some(TemplatePart::Literal(literal));
        };

        if let Some(rest) = after.strip_prefix(TOKEN_MARKER) {
            self.rest = rest;
            return Some(TemplatePart::Escaped);
        }

        let digits = after.bytes().take_while(u8::is_ascii_digit).count();
        match after[..digits].parse::<usize>() {
            Ok(index) => {
                self.rest = &after[digits..];
                Some(TemplatePart::Marker(index))
            }
            Err(_) => {
                let (literal, rest) = self.rest.split_at(TOKEN_MARKER.len_utf8());
                self.rest = rest;
                Some(TemplatePart::Literal(literal))
            }
        }
    }
}
