//! Rule set for media and document file names.
//!
//! ```text
//! /media/Some Title/Some Title Vol 3 HD WEB.cbz
//!   tokens:   Some | Title | Vol | 3 | HD | WEB
//!   masks:    Title  Title   Keyword Number Tag Tag
//!   rendered: "%t%k%n%g"
//! ```
//!
//! Rules, highest priority first: keyword, tag, year, number, directory
//! title (only when the context knows its directory) and title.

use serde::{Deserialize, Serialize};

use crate::context::EvaluationContext;
use crate::engine::RuleSet;
use crate::masked::{MaskConfiguration, MaskRegistry};

mod predicates;
mod rules;


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileMask {
    Unknown,
    Title,
    Keyword,
    Number,
    Year,
    Tag,
}

impl FileMask {
    pub const ALL: [FileMask; 6] =
        [FileMask::Unknown, FileMask::Title, FileMask::Keyword, FileMask::Number, FileMask::Year, FileMask::Tag];

    pub fn display(self) -> &'static str {
        match self {
            FileMask::Unknown => "%?",
            FileMask::Title => "%t",
            FileMask::Keyword => "%k",
            FileMask::Number => "%n",
            FileMask::Year => "%y",
            FileMask::Tag => "%g",
        }
    }

    pub fn is_mergeable(self) -> bool {
        matches!(self, FileMask::Title | FileMask::Tag)
    }

    fn configuration(self) -> MaskConfiguration {
        if self.is_mergeable() {
            MaskConfiguration::new(self.display())
        } else {
            MaskConfiguration::unmergeable(self.display())
        }
    }
}

/// Registry with [`FileMask::Unknown`] as the default mask.
pub fn registry() -> MaskRegistry<FileMask> {
    FileMask::ALL
        .into_iter()
        .filter(|m| *m != FileMask::Unknown)
        .fold(MaskRegistry::new(FileMask::Unknown, FileMask::Unknown.configuration()), |registry, mask| {
            registry.with(mask, mask.configuration())
        })
}

/// [`RuleSetFactory`](crate::RuleSetFactory) for file names.
pub fn rule_set(context: &EvaluationContext) -> RuleSet<FileMask> {
    rules::build(context)
}
