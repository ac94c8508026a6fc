use std::sync::Arc;

use crate::context::EvaluationContext;
use crate::engine::{FnRule, Matcher, RuleSet, ValueRestriction};
use crate::rules::file_name::FileMask;
use crate::rules::file_name::predicates::{all_words_known, is_plausible_year, is_title, words};

pub(super) fn build(context: &EvaluationContext) -> RuleSet<FileMask> {
    let mut set = RuleSet::new()
        .with(keyword())
        .with(tag())
        .with(year())
        .with(number());

    if let Some(directory) = context.directory() {
        let known = words(directory);
        if !known.is_empty() {
            set.push(Arc::new(directory_title(known)));
        }
    }

    set.with(title())
}

/// Volume / chapter / episode style markers.
fn keyword() -> FnRule<FileMask> {
    mask_rule! {
        name: "keyword",
        mask: FileMask::Keyword,
        restriction: ValueRestriction::ALPHABETICAL,
        regex: r"(?i)^(v|vol|volume|ch|chap|chapter|ep|episode|s|season|e|part|pt|no|issue|book)$",
    }
}

/// Release and quality tags.
fn tag() -> FnRule<FileMask> {
    mask_rule! {
        name: "tag",
        mask: FileMask::Tag,
        restriction: ValueRestriction::ALPHABETICAL,
        regex: r"(?i)^(hd|fhd|uhd|sd|web|dl|rip|bd|bluray|dvd|hdtv|raw|remux|hevc|dual|multi|subs?|dub|eng|jpn)$",
    }
}

fn year() -> FnRule<FileMask> {
    mask_rule! {
        name: "year",
        mask: FileMask::Year,
        restriction: ValueRestriction::NUMERIC,
        pred: is_plausible_year,
    }
}

fn number() -> FnRule<FileMask> {
    mask_rule! {
        name: "number",
        mask: FileMask::Number,
        restriction: ValueRestriction::NUMERIC,
        regex: r"^\d+$",
    }
}

/// Words that also appear in the name of the containing directory.
fn directory_title(known: Vec<String>) -> FnRule<FileMask> {
    FnRule::new(
        "directory-title",
        FileMask::Title,
        Matcher::predicate(move |candidate| all_words_known(&known, candidate)),
    )
    .with_restriction(ValueRestriction::ALPHABETICAL)
}

fn title() -> FnRule<FileMask> {
    mask_rule! {
        name: "title",
        mask: FileMask::Title,
        restriction: ValueRestriction::ALPHABETICAL,
        pred: is_title,
    }
}
