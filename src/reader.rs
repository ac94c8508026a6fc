//! Sequential reader over the mask runs of a [`MaskedEntity`].
//!
//! ```text
//! tokens:  Some  Test  File  2
//! masks:   T     T     T     N        (T mergeable, N not)
//! runs:    (T, "Some Test File") (N, "2")
//! ```
//!
//! A run extends while the next token carries an equal mask *and* that mask is
//! mergeable. The reader is forward-only; create a new one to read again.

use std::ops::Range;

use crate::error::{Error, Result};
use crate::masked::{Mask, MaskMapping, MaskedEntity};
use crate::tokenizer::DEFAULT_DELIMITER;

/// One run produced by [`MaskedEntityReader::read_next`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskRun<M> {
    pub mask: M,
    /// Token texts of the run joined with the reader's delimiter.
    pub value: String,
    pub tokens: Range<usize>,
}

impl<M: Clone> MaskRun<M> {
    pub fn to_mapping(&self) -> MaskMapping<M> {
        MaskMapping::new(self.mask.clone(), self.tokens.clone())
    }
}

#[derive(Debug)]
pub struct MaskedEntityReader<'a, M: Mask> {
    entity: &'a MaskedEntity<M>,
    delimiter: &'a str,
    cursor: usize,
}

impl<'a, M: Mask> MaskedEntityReader<'a, M> {
    pub fn new(entity: &'a MaskedEntity<M>) -> Self {
        Self::with_delimiter(entity, DEFAULT_DELIMITER)
    }

    pub fn with_delimiter(entity: &'a MaskedEntity<M>, delimiter: &'a str) -> Self {
        MaskedEntityReader { entity, delimiter, cursor: 0 }
    }

    /// True once every token has been consumed (immediately for an entity
    /// without tokens).
    pub fn at_end(&self) -> bool {
        self.cursor >= self.entity.token_count()
    }

    /// Read the next run. Fails with [`Error::ReaderExhausted`] at the end.
    pub fn read_next(&mut self) -> Result<MaskRun<M>> {
        self.next_run().ok_or(Error::ReaderExhausted)
    }

    fn next_run(&mut self) -> Option<MaskRun<M>> {
        let masks = self.entity.masks();
        let mask = masks.get(self.cursor)?;

        let start = self.cursor;
        let mergeable = self.entity.registry().is_mergeable(mask);
        let mut end = start + 1;
        while mergeable && masks.get(end) == Some(mask) {
            end += 1;
        }
        self.cursor = end;

        // One mask per token, so the run never leaves the token list.
        let texts: Vec<&str> = self.entity.tokenizer().tokens().skip(start).take(end - start).collect();
        let value = texts.join(self.delimiter);
        Some(MaskRun { mask: mask.clone(), value, tokens: start..end })
    }
}

impl<M: Mask> Iterator for MaskedEntityReader<'_, M> {
    type Item = MaskRun<M>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_run()
    }
}
