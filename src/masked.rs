//! Masked entities: a tokenized string plus one mask per token.
//!
//! A [`MaskedEntity`] starts with every token carrying the registry's default
//! mask. Masks are assigned by index (usually by the rule evaluator) and the
//! entity renders a masked string by replacing every template marker with the
//! display string of its mask:
//!
//! ```text
//! input:     "Some Title v01"
//! template:  "%0 %1 %2%3"
//! masks:     Title Title Keyword Number
//! rendered:  "%t%k%n"          (Title is mergeable, so %0 %1 render once)
//! ```
//!
//! Only mask display strings appear in the rendered output: literal template
//! text (including escaped `%%`) is skipped, and a token whose mask is
//! mergeable and equal to the previous token's mask adds no marker.
//!
//! The rendered string is computed lazily and cached until the next mutation.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::ops::Range;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use crate::tokenizer::{TemplatePart, Tokenizer, template_parts};

/// Bound for caller-supplied mask types (usually a small enum).
pub trait Mask: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

impl<T> Mask for T where T: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

/// How a mask is rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskConfiguration {
    pub display: String,
    /// Whether adjacent tokens carrying this mask render as one marker.
    pub mergeable: bool,
}

impl MaskConfiguration {
    /// A mergeable configuration.
    pub fn new(display: impl Into<String>) -> Self {
        MaskConfiguration { display: display.into(), mergeable: true }
    }

    pub fn unmergeable(display: impl Into<String>) -> Self {
        MaskConfiguration { display: display.into(), mergeable: false }
    }
}

/// The set of masks an entity may carry, including the default ("unassigned")
/// mask.
#[derive(Debug, Clone)]
pub struct MaskRegistry<M: Mask> {
    default: M,
    configs: HashMap<M, MaskConfiguration>,
}

impl<M: Mask> MaskRegistry<M> {
    /// Create a registry whose default mask is `default`.
    pub fn new(default: M, config: MaskConfiguration) -> Self {
        let mut configs = HashMap::new();
        configs.insert(default.clone(), config);
        MaskRegistry { default, configs }
    }

    /// Build a registry from an existing map, which must contain `default`.
    pub fn from_map(default: M, configs: HashMap<M, MaskConfiguration>) -> Result<Self> {
        if !configs.contains_key(&default) {
            return Err(Error::MissingDefaultMask { mask: format!("{default:?}") });
        }
        Ok(MaskRegistry { default, configs })
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, mask: M, config: MaskConfiguration) -> Self {
        self.insert(mask, config);
        self
    }

    pub fn insert(&mut self, mask: M, config: MaskConfiguration) {
        self.configs.insert(mask, config);
    }

    pub fn default_mask(&self) -> &M {
        &self.default
    }

    pub fn get(&self, mask: &M) -> Option<&MaskConfiguration> {
        self.configs.get(mask)
    }

    pub fn contains(&self, mask: &M) -> bool {
        self.configs.contains_key(mask)
    }

    /// Masks without a configuration never merge.
    pub fn is_mergeable(&self, mask: &M) -> bool {
        self.configs.get(mask).is_some_and(|c| c.mergeable)
    }
}

/// A mask assigned to a contiguous range of token indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskMapping<M> {
    pub mask: M,
    pub tokens: Range<usize>,
}

impl<M> MaskMapping<M> {
    pub fn new(mask: M, tokens: Range<usize>) -> Self {
        MaskMapping { mask, tokens }
    }

    /// Reject mappings whose range runs backwards; an empty range is fine.
    fn check_order(&self) -> Result<()> {
        let (start, end) = (self.tokens.start, self.tokens.end);
        if start > end {
            return Err(Error::InvalidTokenRange { start, end });
        }
        Ok(())
    }
}

/// What a knowledge base persists for a resolved entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskedEntitySnapshot<M> {
    pub rendered: String,
    pub fingerprint: Fingerprint,
    pub mappings: Vec<MaskMapping<M>>,
}

#[derive(Debug)]
pub struct MaskedEntity<M: Mask> {
    tokenizer: Arc<Tokenizer>,
    registry: Arc<MaskRegistry<M>>,
    masks: Vec<M>,
    read_only: bool,
    rendered: OnceCell<String>,
}

impl<M: Mask> MaskedEntity<M> {
    /// Create an entity with every token set to the registry's default mask.
    pub fn new(tokenizer: impl Into<Arc<Tokenizer>>, registry: Arc<MaskRegistry<M>>) -> Self {
        let tokenizer = tokenizer.into();
        let masks = vec![registry.default_mask().clone(); tokenizer.token_count()];
        MaskedEntity { tokenizer, registry, masks, read_only: false, rendered: OnceCell::new() }
    }

    /// Reconstruct a read-only entity from a persisted rendered string and its
    /// mappings.
    ///
    /// Indices are bounds-checked but masks are not validated against the
    /// registry. Tokens not covered by a mapping keep the default mask.
    pub fn readonly(
        tokenizer: impl Into<Arc<Tokenizer>>,
        registry: Arc<MaskRegistry<M>>,
        rendered: impl Into<String>,
        mappings: &[MaskMapping<M>],
    ) -> Result<Self> {
        let rendered = rendered.into();
        if rendered.is_empty() {
            return Err(Error::EmptyArgument { name: "rendered" });
        }

        let mut entity = Self::new(tokenizer, registry);
        let count = entity.token_count();
        for mapping in mappings {
            mapping.check_order()?;
            for index in mapping.tokens.clone() {
                let slot = entity.masks.get_mut(index).ok_or(Error::TokenIndexOutOfRange { index, count })?;
                *slot = mapping.mask.clone();
            }
        }

        entity.read_only = true;
        entity.rendered = OnceCell::with_value(rendered);
        Ok(entity)
    }

    /// [`readonly`](Self::readonly) from a snapshot.
    pub fn from_snapshot(
        tokenizer: impl Into<Arc<Tokenizer>>,
        registry: Arc<MaskRegistry<M>>,
        snapshot: &MaskedEntitySnapshot<M>,
    ) -> Result<Self> {
        Self::readonly(tokenizer, registry, snapshot.rendered.clone(), &snapshot.mappings)
    }

    pub fn tokenizer(&self) -> &Arc<Tokenizer> {
        &self.tokenizer
    }

    pub fn registry(&self) -> &Arc<MaskRegistry<M>> {
        &self.registry
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn token_count(&self) -> usize {
        self.masks.len()
    }

    pub fn mask(&self, index: usize) -> Option<&M> {
        self.masks.get(index)
    }

    pub fn masks(&self) -> &[M] {
        &self.masks
    }

    /// Copy of the per-token masks.
    pub fn mask_mappings(&self) -> Vec<M> {
        self.masks.clone()
    }

    /// Set the mask of one token.
    pub fn set_mask(&mut self, index: usize, mask: M) -> Result<()> {
        if self.read_only {
            return Err(Error::ReadOnly);
        }
        let count = self.masks.len();
        if index >= count {
            return Err(Error::TokenIndexOutOfRange { index, count });
        }
        if !self.registry.contains(&mask) {
            return Err(Error::UnknownMask { mask: format!("{mask:?}") });
        }

        self.masks[index] = mask;
        self.rendered.take();
        Ok(())
    }

    /// Set the mask of `len` tokens starting at `start`.
    pub fn set_mask_range(&mut self, start: usize, len: usize, mask: M) -> Result<()> {
        let count = self.masks.len();
        if start >= count {
            return Err(Error::TokenIndexOutOfRange { index: start, count });
        }
        if start.checked_add(len).is_none_or(|end| end > count) {
            return Err(Error::RangeOverflow { start, len, count });
        }

        for index in start..start + len {
            self.set_mask(index, mask.clone())?;
        }
        Ok(())
    }

    /// Set the mask of every listed token, stopping at the first failure.
    pub fn set_masks(&mut self, indices: &[usize], mask: M) -> Result<()> {
        for &index in indices {
            self.set_mask(index, mask.clone())?;
        }
        Ok(())
    }

    /// Apply persisted mappings (e.g. an accepted knowledge-base candidate).
    pub fn apply_mappings(&mut self, mappings: &[MaskMapping<M>]) -> Result<()> {
        for mapping in mappings {
            mapping.check_order()?;
            let len = mapping.tokens.len();
            if len > 0 {
                self.set_mask_range(mapping.tokens.start, len, mapping.mask.clone())?;
            }
        }
        Ok(())
    }

    /// True when the token carries a mask other than the default one.
    pub fn is_mask_set(&self, index: usize) -> bool {
        self.masks.get(index).is_some_and(|m| m != self.registry.default_mask())
    }

    pub fn masked_count(&self) -> usize {
        self.masks.iter().filter(|m| *m != self.registry.default_mask()).count()
    }

    /// True when every token carries a non-default mask (vacuously true for
    /// an entity without tokens).
    pub fn all_masked(&self) -> bool {
        self.masked_count() == self.masks.len()
    }

    /// Whether the next [`render`](Self::render) has to rebuild the string.
    pub fn is_dirty(&self) -> bool {
        self.rendered.get().is_none()
    }

    /// The masked string, rebuilt only after a mutation.
    pub fn render(&self) -> &str {
        self.rendered.get_or_init(|| self.build_rendered())
    }

    fn build_rendered(&self) -> String {
        let mut out = String::new();
        // Markers are numbered in order of appearance, so a running count is the token index.
        let mut index = 0;

        for part in template_parts(self.tokenizer.template()) {
            if !matches!(part, TemplatePart::Marker(_)) {
                continue;
            }
            let Some(mask) = self.masks.get(index) else {
                break;
            };

            let merges = index > 0 && self.masks[index - 1] == *mask && self.registry.is_mergeable(mask);
            if !merges {
                if let Some(config) = self.registry.get(mask) {
                    out.push_str(&config.display);
                }
            }
            index += 1;
        }

        out
    }

    /// Text of the first token carrying `mask`.
    pub fn first_value(&self, mask: &M) -> Option<&str> {
        let index = self.masks.iter().position(|m| m == mask)?;
        self.tokenizer.token(index)
    }

    /// Texts of all tokens carrying `mask`, joined with `delimiter`.
    pub fn joined_value(&self, mask: &M, delimiter: &str) -> String {
        self.masks
            .iter()
            .zip(self.tokenizer.tokens())
            .filter(|(m, _)| *m == mask)
            .map(|(_, text)| text)
            .collect::<Vec<_>>()
            .join(delimiter)
    }

    /// Maximal runs of equal non-default masks, as persisted by a knowledge base.
    pub fn to_mappings(&self) -> Vec<MaskMapping<M>> {
        let mut mappings: Vec<MaskMapping<M>> = Vec::new();

        for (index, mask) in self.masks.iter().enumerate() {
            if mask == self.registry.default_mask() {
                continue;
            }
            match mappings.last_mut() {
                Some(last) if last.tokens.end == index && last.mask == *mask => last.tokens.end = index + 1,
                _ => mappings.push(MaskMapping::new(mask.clone(), index..index + 1)),
            }
        }

        mappings
    }

    pub fn snapshot(&self) -> MaskedEntitySnapshot<M> {
        MaskedEntitySnapshot {
            rendered: self.render().to_string(),
            fingerprint: *self.tokenizer.fingerprint(),
            mappings: self.to_mappings(),
        }
    }
}

impl<M: Mask> fmt::Display for MaskedEntity<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    enum TestMask {
        Default,
        M1,
        M2,
        M3,
    }

    fn registry() -> Arc<MaskRegistry<TestMask>> {
        // M3 is deliberately left unregistered.
        Arc::new(
            MaskRegistry::new(TestMask::Default, MaskConfiguration::unmergeable("%d"))
                .with(TestMask::M1, MaskConfiguration::new("%a"))
                .with(TestMask::M2, MaskConfiguration::new("%b")),
        )
    }

    fn entity(input: &str) -> MaskedEntity<TestMask> {
        MaskedEntity::new(Tokenizer::new(input).unwrap(), registry())
    }

    #[test]
    fn registry_requires_default_mask() {
        let err = MaskRegistry::from_map(TestMask::Default, HashMap::new()).unwrap_err();
        assert!(matches!(err, Error::MissingDefaultMask { .. }));

        let map = HashMap::from([(TestMask::Default, MaskConfiguration::new("%d"))]);
        assert!(MaskRegistry::from_map(TestMask::Default, map).is_ok());
    }

    #[test]
    fn masks_start_at_default() {
        let e = entity("Test 21!");
        assert!(e.mask_mappings().iter().all(|m| *m == TestMask::Default));
        assert!(!e.is_mask_set(0));
        assert!(!e.all_masked());
    }

    #[test]
    fn set_mask_stores_value() {
        let mut e = entity("Test 21!");
        e.set_mask(0, TestMask::M1).unwrap();

        assert_eq!(e.mask_mappings()[0], TestMask::M1);
        assert!(e.is_mask_set(0));
        assert!(!e.is_mask_set(1));
        assert!(!e.is_mask_set(7));
    }

    #[test]
    fn set_mask_validates_index_and_mask() {
        let mut e = entity("Test 21!");

        assert!(matches!(e.set_mask(2, TestMask::M1), Err(Error::TokenIndexOutOfRange { index: 2, count: 2 })));
        assert!(matches!(e.set_mask(0, TestMask::M3), Err(Error::UnknownMask { .. })));
        assert!(matches!(e.set_mask_range(0, 3, TestMask::M1), Err(Error::RangeOverflow { .. })));
        assert!(matches!(e.set_mask_range(5, 1, TestMask::M1), Err(Error::TokenIndexOutOfRange { .. })));
        assert!(matches!(e.set_mask_range(1, usize::MAX, TestMask::M1), Err(Error::RangeOverflow { .. })));
    }

    #[test]
    fn batch_set_stops_at_first_failure() {
        let mut e = entity("a b c");

        let err = e.set_masks(&[0, 9, 2], TestMask::M1).unwrap_err();
        assert!(matches!(err, Error::TokenIndexOutOfRange { index: 9, .. }));
        assert_eq!(e.mask_mappings(), vec![TestMask::M1, TestMask::Default, TestMask::Default]);

        e.set_masks(&[1, 2], TestMask::M2).unwrap();
        assert_eq!(e.mask_mappings(), vec![TestMask::M1, TestMask::M2, TestMask::M2]);
    }

    #[test]
    fn renders_default_masks_unmerged() {
        let e = entity("Test - 21!");
        assert_eq!(e.render(), "%d%d");
    }

    #[test]
    fn renders_assigned_masks() {
        let mut e = entity("Test - 21!");
        e.set_mask(0, TestMask::M1).unwrap();
        e.set_mask(1, TestMask::M2).unwrap();

        assert_eq!(e.render(), "%a%b");
    }

    #[test]
    fn escaped_marker_does_not_render() {
        let mut e = entity("Test % 21!");
        e.set_mask(0, TestMask::M1).unwrap();
        e.set_mask(1, TestMask::M2).unwrap();

        assert_eq!(e.render(), "%a%b");
    }

    #[test]
    fn mergeable_masks_collapse() {
        let mut e = entity("Test - 21!");
        e.set_mask(0, TestMask::M1).unwrap();
        e.set_mask(1, TestMask::M1).unwrap();

        assert_eq!(e.render(), "%a");
    }

    #[test]
    fn different_mask_splits_merge() {
        let mut e = entity("Test - 21 - Ok!");
        e.set_mask(0, TestMask::M1).unwrap();
        e.set_mask(1, TestMask::M2).unwrap();
        e.set_mask(2, TestMask::M1).unwrap();

        assert_eq!(e.render(), "%a%b%a");
        assert_eq!(e.to_string(), "%a%b%a");
    }

    #[test]
    fn render_is_cached_until_mutation() {
        let mut e = entity("Test - 21!");
        assert!(e.is_dirty());

        let first = e.render().to_string();
        assert!(!e.is_dirty());
        assert_eq!(e.render(), first);

        e.set_mask(0, TestMask::M1).unwrap();
        assert!(e.is_dirty());
        assert_eq!(e.render(), "%a%d");
    }

    #[test]
    fn values_by_mask() {
        let mut e = entity("Test - 21!");
        e.set_mask(0, TestMask::M1).unwrap();
        e.set_mask(1, TestMask::M1).unwrap();

        assert_eq!(e.first_value(&TestMask::M1), Some("Test"));
        assert_eq!(e.joined_value(&TestMask::M1, " "), "Test 21");
        assert_eq!(e.joined_value(&TestMask::M1, ""), "Test21");
        assert_eq!(e.first_value(&TestMask::M2), None);
        assert_eq!(e.joined_value(&TestMask::M2, " "), "");
    }

    #[test]
    fn readonly_entity_keeps_persisted_render() {
        let tokenizer = Tokenizer::new("Some Test 2").unwrap();
        let mappings = vec![MaskMapping::new(TestMask::M1, 0..2), MaskMapping::new(TestMask::M3, 2..3)];
        let mut e = MaskedEntity::readonly(tokenizer, registry(), "persisted", &mappings).unwrap();

        assert!(e.is_read_only());
        assert_eq!(e.render(), "persisted");
        assert_eq!(e.mask_mappings(), vec![TestMask::M1, TestMask::M1, TestMask::M3]);
        assert!(matches!(e.set_mask(0, TestMask::M2), Err(Error::ReadOnly)));
    }

    #[test]
    fn readonly_entity_validates_inputs() {
        let tokenizer = Arc::new(Tokenizer::new("Some Test").unwrap());

        let err = MaskedEntity::<TestMask>::readonly(tokenizer.clone(), registry(), "", &[]).unwrap_err();
        assert!(matches!(err, Error::EmptyArgument { name: "rendered" }));

        let mappings = vec![MaskMapping::new(TestMask::M1, 1..3)];
        let err = MaskedEntity::readonly(tokenizer, registry(), "%a", &mappings).unwrap_err();
        assert!(matches!(err, Error::TokenIndexOutOfRange { index: 2, count: 2 }));
    }

    #[test]
    fn snapshot_round_trips_through_readonly() {
        let mut e = entity("Some Test File 7");
        e.set_mask_range(0, 2, TestMask::M1).unwrap();
        e.set_mask(2, TestMask::M2).unwrap();

        let snapshot = e.snapshot();
        assert_eq!(snapshot.rendered, "%a%b%d");
        assert_eq!(snapshot.mappings, vec![MaskMapping::new(TestMask::M1, 0..2), MaskMapping::new(TestMask::M2, 2..3)]);

        let json = serde_json::to_string(&snapshot).unwrap();
        let restored: MaskedEntitySnapshot<TestMask> = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, snapshot);

        let readonly = MaskedEntity::from_snapshot(e.tokenizer().clone(), registry(), &restored).unwrap();
        assert_eq!(readonly.mask_mappings(), e.mask_mappings());
        assert_eq!(readonly.render(), e.render());
    }

    #[test]
    fn apply_mappings_reproduces_render() {
        let mut source = entity("Alpha Beta 12 Gamma");
        source.set_mask_range(0, 2, TestMask::M1).unwrap();
        source.set_mask(2, TestMask::M2).unwrap();
        source.set_mask(3, TestMask::M1).unwrap();

        let mut copy = entity("Alpha Beta 12 Gamma");
        copy.apply_mappings(&source.to_mappings()).unwrap();

        assert_eq!(copy.render(), source.render());
        assert!(copy.all_masked());
    }

    #[test]
    #[allow(clippy::reversed_empty_ranges)]
    fn backwards_mappings_are_rejected() {
        let tokenizer = Arc::new(Tokenizer::new("Some Test File").unwrap());
        let backwards = vec![MaskMapping::new(TestMask::M1, 0..1), MaskMapping::new(TestMask::M2, 2..1)];

        let err = MaskedEntity::readonly(tokenizer.clone(), registry(), "%a", &backwards).unwrap_err();
        assert!(matches!(err, Error::InvalidTokenRange { start: 2, end: 1 }));

        let mut e = MaskedEntity::new(tokenizer, registry());
        let err = e.apply_mappings(&backwards).unwrap_err();
        assert!(matches!(err, Error::InvalidTokenRange { start: 2, end: 1 }));

        let empty = vec![MaskMapping::new(TestMask::M1, 1..1)];
        e.apply_mappings(&empty).unwrap();
        assert_eq!(e.mask(1), Some(&TestMask::Default));
    }

    #[test]
    fn empty_entity_is_fully_masked() {
        let e = entity("--");
        assert!(e.all_masked());
        assert_eq!(e.render(), "");
    }
}
