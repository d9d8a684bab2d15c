use std::collections::{BTreeMap, BTreeSet};

use crate::error::GraphError;
use crate::model::{Card, CardId, ReferenceIndex, ReferenceType, ReferencesInfo};

// ─────────────────────────────────────────────
// Accessor view
// ─────────────────────────────────────────────

/// Read-only view over one direction of a card's references.
///
/// Obtained via [`Card::refs`] / [`Card::refs_inbound`]; all methods walk the
/// authoritative info map, never the derived boolean index.
#[derive(Debug, Clone, Copy)]
pub struct ReferencesView<'a> {
    info: &'a ReferencesInfo,
}

impl<'a> ReferencesView<'a> {
    pub fn new(info: &'a ReferencesInfo) -> Self {
        Self { info }
    }

    pub fn is_empty(&self) -> bool {
        self.info.is_empty()
    }

    pub fn contains(&self, target: &str) -> bool {
        self.info.contains_key(target)
    }

    /// Every referenced card id, in id order.
    pub fn ids(&self) -> impl Iterator<Item = &'a CardId> {
        self.info.keys()
    }

    /// Card ids referenced with the given type.
    pub fn ids_of_type(&self, ref_type: ReferenceType) -> Vec<&'a CardId> {
        self.info
            .iter()
            .filter(|(_, block)| block.contains_key(&ref_type))
            .map(|(id, _)| id)
            .collect()
    }

    /// Card ids referenced with at least one substantive type.
    pub fn substantive_ids(&self) -> Vec<&'a CardId> {
        self.info
            .iter()
            .filter(|(_, block)| block.keys().any(ReferenceType::is_substantive))
            .map(|(id, _)| id)
            .collect()
    }

    /// Convenience for the most common edge kind.
    pub fn links(&self) -> Vec<&'a CardId> {
        self.ids_of_type(ReferenceType::Link)
    }

    pub fn text_for(&self, target: &str, ref_type: ReferenceType) -> Option<&'a str> {
        self.info
            .get(target)
            .and_then(|block| block.get(&ref_type))
            .map(String::as_str)
    }

    /// All non-empty text payloads carried by references of the given type.
    pub fn texts_of_type(&self, ref_type: ReferenceType) -> Vec<&'a str> {
        self.info
            .values()
            .filter_map(|block| block.get(&ref_type))
            .map(String::as_str)
            .filter(|t| !t.is_empty())
            .collect()
    }
}

// ─────────────────────────────────────────────
// Legality + mutation
// ─────────────────────────────────────────────

/// Structural legality of a (info, index) pair:
/// - the index key set equals the info key set
/// - every per-target block carries at least one type
/// - every index value is literally `true`
pub fn references_legal(info: &ReferencesInfo, index: &ReferenceIndex) -> Result<(), GraphError> {
    if info.len() != index.len() {
        return Err(GraphError::InvalidReferenceState(format!(
            "index has {} entries but info has {}",
            index.len(),
            info.len()
        )));
    }
    for (target, block) in info {
        if block.is_empty() {
            return Err(GraphError::InvalidReferenceState(format!(
                "empty reference block for {target}"
            )));
        }
        match index.get(target) {
            Some(true) => {}
            Some(false) => {
                return Err(GraphError::InvalidReferenceState(format!(
                    "index entry for {target} is false"
                )))
            }
            None => {
                return Err(GraphError::InvalidReferenceState(format!(
                    "index missing entry for {target}"
                )))
            }
        }
    }
    Ok(())
}

fn derive_index(info: &ReferencesInfo) -> ReferenceIndex {
    info.keys().map(|id| (id.clone(), true)).collect()
}

impl Card {
    pub fn refs(&self) -> ReferencesView<'_> {
        ReferencesView::new(&self.references_info)
    }

    pub fn refs_inbound(&self) -> ReferencesView<'_> {
        ReferencesView::new(&self.references_info_inbound)
    }

    /// Set (or overwrite) one outbound reference leaf, then re-derive the
    /// index and re-validate.
    pub fn set_reference(
        &mut self,
        target: &str,
        ref_type: ReferenceType,
        text: &str,
    ) -> Result<(), GraphError> {
        self.references_info
            .entry(target.to_string())
            .or_default()
            .insert(ref_type, text.to_string());
        self.rebuild_reference_index()
    }

    /// Remove one outbound reference leaf. Removing the last type for a
    /// target removes the whole per-target block.
    pub fn remove_reference(
        &mut self,
        target: &str,
        ref_type: ReferenceType,
    ) -> Result<(), GraphError> {
        let emptied = match self.references_info.get_mut(target) {
            Some(block) => {
                if block.remove(&ref_type).is_none() {
                    return Err(GraphError::InvalidReferenceState(format!(
                        "no {} reference to {target}",
                        ref_type.as_str()
                    )));
                }
                block.is_empty()
            }
            None => return Err(GraphError::CardNotFound(target.to_string())),
        };
        if emptied {
            self.references_info.remove(target);
        }
        self.rebuild_reference_index()
    }

    /// Replace every reference of `ref_type` with the given (target, text)
    /// set. Targets losing their last type lose their block.
    pub fn set_all_references_of_type(
        &mut self,
        ref_type: ReferenceType,
        entries: &[(CardId, String)],
    ) -> Result<(), GraphError> {
        let keep: BTreeSet<&CardId> = entries.iter().map(|(id, _)| id).collect();
        self.references_info.retain(|target, block| {
            if !keep.contains(target) {
                block.remove(&ref_type);
            }
            !block.is_empty()
        });
        for (target, text) in entries {
            self.references_info
                .entry(target.clone())
                .or_default()
                .insert(ref_type, text.clone());
        }
        self.rebuild_reference_index()
    }

    /// Add references of `ref_type` without disturbing existing ones.
    pub fn add_references_of_type(
        &mut self,
        ref_type: ReferenceType,
        entries: &[(CardId, String)],
    ) -> Result<(), GraphError> {
        for (target, text) in entries {
            self.references_info
                .entry(target.clone())
                .or_default()
                .insert(ref_type, text.clone());
        }
        self.rebuild_reference_index()
    }

    fn rebuild_reference_index(&mut self) -> Result<(), GraphError> {
        self.references = derive_index(&self.references_info);
        references_legal(&self.references_info, &self.references)
    }

    /// Inbound links with no reciprocal outbound link, minus the explicit
    /// skip list. Feeds [`Card::needs_reciprocal_links`].
    pub fn missing_reciprocal_links(&self) -> Vec<CardId> {
        let outbound: BTreeSet<&CardId> = self.refs().links().into_iter().collect();
        self.refs_inbound()
            .links()
            .into_iter()
            .filter(|id| !outbound.contains(*id))
            .filter(|id| !self.auto_todo_skipped_links_inbound.contains(*id))
            .cloned()
            .collect()
    }

    /// Whether the reciprocal-link check currently fires for this card: a
    /// manual override wins outright, otherwise any missing reciprocal link
    /// triggers it.
    pub fn needs_reciprocal_links(&self) -> bool {
        match self.auto_todo_overrides.get(RECIPROCAL_LINKS_CHECK) {
            Some(&forced) => forced,
            None => !self.missing_reciprocal_links().is_empty(),
        }
    }
}

/// Key of the reciprocal-link check in [`Card::auto_todo_overrides`].
pub const RECIPROCAL_LINKS_CHECK: &str = "reciprocal-links";

// ─────────────────────────────────────────────
// Diffing
// ─────────────────────────────────────────────

/// Leaf-level difference between two reference states.
///
/// When a target loses its whole block it appears only in `card_deletions`;
/// `leaf_deletions` lists removed (target, type) leaves for targets that
/// still carry other types.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferencesDiff {
    pub additions: BTreeMap<(CardId, ReferenceType), String>,
    pub modifications: BTreeMap<(CardId, ReferenceType), String>,
    pub leaf_deletions: BTreeSet<(CardId, ReferenceType)>,
    pub card_deletions: BTreeSet<CardId>,
}

impl ReferencesDiff {
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty()
            && self.modifications.is_empty()
            && self.leaf_deletions.is_empty()
            && self.card_deletions.is_empty()
    }
}

static EMPTY_INFO: ReferencesInfo = BTreeMap::new();

fn info_of(card: Option<&Card>) -> &ReferencesInfo {
    card.map(|c| &c.references_info).unwrap_or(&EMPTY_INFO)
}

/// Leaf-level diff of outbound references. A missing card counts as having
/// no references, so creations and deletions fall out naturally.
pub fn references_diff(before: Option<&Card>, after: Option<&Card>) -> ReferencesDiff {
    let before = info_of(before);
    let after = info_of(after);
    let mut diff = ReferencesDiff::default();

    for (target, after_block) in after {
        match before.get(target) {
            None => {
                for (ref_type, text) in after_block {
                    diff.additions
                        .insert((target.clone(), *ref_type), text.clone());
                }
            }
            Some(before_block) => {
                for (ref_type, text) in after_block {
                    match before_block.get(ref_type) {
                        None => {
                            diff.additions
                                .insert((target.clone(), *ref_type), text.clone());
                        }
                        Some(old) if old != text => {
                            diff.modifications
                                .insert((target.clone(), *ref_type), text.clone());
                        }
                        Some(_) => {}
                    }
                }
                for ref_type in before_block.keys() {
                    if !after_block.contains_key(ref_type) {
                        diff.leaf_deletions.insert((target.clone(), *ref_type));
                    }
                }
            }
        }
    }
    for target in before.keys() {
        if !after.contains_key(target) {
            diff.card_deletions.insert(target.clone());
        }
    }
    diff
}

/// Card-level view of the same diff: (targets added or modified, targets
/// fully removed).
pub fn references_cards_diff(
    before: Option<&Card>,
    after: Option<&Card>,
) -> (BTreeSet<CardId>, BTreeSet<CardId>) {
    let before = info_of(before);
    let after = info_of(after);

    let mut touched = BTreeSet::new();
    let mut deleted = BTreeSet::new();
    for (target, after_block) in after {
        if before.get(target) != Some(after_block) {
            touched.insert(target.clone());
        }
    }
    for target in before.keys() {
        if !after.contains_key(target) {
            deleted.insert(target.clone());
        }
    }
    (touched, deleted)
}

/// One value in a flattened storage update map.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    Set(String),
    Flag(bool),
    Delete,
}

/// Flatten a diff into dotted field paths for the storage collaborator's
/// batched writer. Info leaves and index entries are written side by side so
/// the stored index never drifts from the stored info.
pub fn apply_references_diff(diff: &ReferencesDiff, update: &mut BTreeMap<String, FieldUpdate>) {
    for ((target, ref_type), text) in diff.additions.iter().chain(&diff.modifications) {
        update.insert(
            format!("references_info.{target}.{}", ref_type.as_str()),
            FieldUpdate::Set(text.clone()),
        );
        update.insert(format!("references.{target}"), FieldUpdate::Flag(true));
    }
    for (target, ref_type) in &diff.leaf_deletions {
        update.insert(
            format!("references_info.{target}.{}", ref_type.as_str()),
            FieldUpdate::Delete,
        );
    }
    for target in &diff.card_deletions {
        update.insert(format!("references_info.{target}"), FieldUpdate::Delete);
        update.insert(format!("references.{target}"), FieldUpdate::Delete);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card_with_link(id: &str, target: &str, text: &str) -> Card {
        let mut card = Card::new(id);
        card.set_reference(target, ReferenceType::Link, text)
            .unwrap();
        card
    }

    // ── accessor view ────────────────────────────────────

    #[test]
    fn view_filters_by_type_and_substantiveness() {
        let mut card = Card::new("a");
        card.set_reference("b", ReferenceType::Link, "").unwrap();
        card.set_reference("b", ReferenceType::SeeAlso, "related")
            .unwrap();
        card.set_reference("c", ReferenceType::Ack, "").unwrap();

        let refs = card.refs();
        assert_eq!(refs.ids().collect::<Vec<_>>(), vec!["b", "c"]);
        assert_eq!(refs.links(), vec!["b"]);
        assert_eq!(refs.substantive_ids(), vec!["b"]);
        assert_eq!(refs.text_for("b", ReferenceType::SeeAlso), Some("related"));
        assert_eq!(refs.texts_of_type(ReferenceType::SeeAlso), vec!["related"]);
    }

    // ── mutation + legality ──────────────────────────────

    #[test]
    fn set_reference_keeps_index_in_sync() {
        let card = card_with_link("a", "b", "hello");
        assert_eq!(card.references.get("b"), Some(&true));
        references_legal(&card.references_info, &card.references).unwrap();
    }

    #[test]
    fn removing_last_type_drops_the_block() {
        let mut card = card_with_link("a", "b", "");
        card.remove_reference("b", ReferenceType::Link).unwrap();
        assert!(card.references_info.is_empty());
        assert!(card.references.is_empty());
    }

    #[test]
    fn removing_missing_leaf_is_an_error() {
        let mut card = card_with_link("a", "b", "");
        assert!(card.remove_reference("b", ReferenceType::Concept).is_err());
        assert!(card.remove_reference("z", ReferenceType::Link).is_err());
    }

    #[test]
    fn set_all_of_type_replaces_only_that_type() {
        let mut card = Card::new("a");
        card.set_reference("b", ReferenceType::Link, "").unwrap();
        card.set_reference("b", ReferenceType::Concept, "").unwrap();
        card.set_reference("c", ReferenceType::Link, "").unwrap();

        card.set_all_references_of_type(ReferenceType::Link, &[("d".into(), String::new())])
            .unwrap();

        // b keeps its concept leaf, c's block is gone, d is new
        assert_eq!(card.refs().links(), vec!["d"]);
        assert_eq!(card.refs().ids_of_type(ReferenceType::Concept), vec!["b"]);
        assert!(!card.refs().contains("c"));
    }

    #[test]
    fn legality_rejects_drifted_index() {
        let card = card_with_link("a", "b", "");
        let mut bad_index = card.references.clone();
        bad_index.insert("ghost".into(), true);
        assert!(references_legal(&card.references_info, &bad_index).is_err());

        let mut false_index = card.references.clone();
        false_index.insert("b".into(), false);
        assert!(references_legal(&card.references_info, &false_index).is_err());
    }

    // ── reciprocal links ─────────────────────────────────

    #[test]
    fn missing_reciprocal_links_respects_skip_list() {
        let mut card = Card::new("a");
        card.references_info_inbound
            .entry("b".into())
            .or_default()
            .insert(ReferenceType::Link, String::new());
        card.references_info_inbound
            .entry("c".into())
            .or_default()
            .insert(ReferenceType::Link, String::new());
        card.set_reference("b", ReferenceType::Link, "").unwrap();
        card.auto_todo_skipped_links_inbound = vec!["c".into()];

        assert!(card.missing_reciprocal_links().is_empty());

        card.auto_todo_skipped_links_inbound.clear();
        assert_eq!(card.missing_reciprocal_links(), vec!["c".to_string()]);
    }

    #[test]
    fn needs_reciprocal_links_defers_to_overrides() {
        let mut card = Card::new("a");
        card.references_info_inbound
            .entry("b".into())
            .or_default()
            .insert(ReferenceType::Link, String::new());
        assert!(card.needs_reciprocal_links());

        card.auto_todo_overrides
            .insert(RECIPROCAL_LINKS_CHECK.to_string(), false);
        assert!(!card.needs_reciprocal_links());

        let mut clean = Card::new("c");
        assert!(!clean.needs_reciprocal_links());
        clean
            .auto_todo_overrides
            .insert(RECIPROCAL_LINKS_CHECK.to_string(), true);
        assert!(clean.needs_reciprocal_links());
    }

    // ── diffing ──────────────────────────────────────────

    #[test]
    fn diff_classifies_additions_modifications_deletions() {
        let mut before = Card::new("a");
        before.set_reference("b", ReferenceType::Link, "old").unwrap();
        before.set_reference("b", ReferenceType::SeeAlso, "").unwrap();
        before.set_reference("c", ReferenceType::Link, "").unwrap();

        let mut after = Card::new("a");
        after.set_reference("b", ReferenceType::Link, "new").unwrap();
        after.set_reference("d", ReferenceType::Concept, "").unwrap();

        let diff = references_diff(Some(&before), Some(&after));
        assert_eq!(
            diff.modifications.get(&("b".into(), ReferenceType::Link)),
            Some(&"new".to_string())
        );
        assert!(diff
            .leaf_deletions
            .contains(&("b".into(), ReferenceType::SeeAlso)));
        assert!(diff.card_deletions.contains("c"));
        // c's leaf is folded into the card deletion
        assert!(!diff
            .leaf_deletions
            .contains(&("c".into(), ReferenceType::Link)));
        assert!(diff
            .additions
            .contains_key(&("d".into(), ReferenceType::Concept)));
    }

    #[test]
    fn diff_treats_missing_cards_as_empty() {
        let card = card_with_link("a", "b", "");
        let created = references_diff(None, Some(&card));
        assert_eq!(created.additions.len(), 1);

        let deleted = references_diff(Some(&card), None);
        assert!(deleted.card_deletions.contains("b"));
        assert!(references_diff(None, None).is_empty());
    }

    #[test]
    fn cards_diff_is_coarse() {
        let mut before = Card::new("a");
        before.set_reference("b", ReferenceType::Link, "old").unwrap();
        before.set_reference("c", ReferenceType::Link, "").unwrap();

        let mut after = Card::new("a");
        after.set_reference("b", ReferenceType::Link, "new").unwrap();
        after.set_reference("d", ReferenceType::Link, "").unwrap();

        let (touched, deleted) = references_cards_diff(Some(&before), Some(&after));
        assert!(touched.contains("b"));
        assert!(touched.contains("d"));
        assert!(deleted.contains("c"));
    }

    #[test]
    fn apply_diff_emits_paired_info_and_index_writes() {
        let before = Card::new("a");
        let after = card_with_link("a", "b", "hi");
        let diff = references_diff(Some(&before), Some(&after));

        let mut update = BTreeMap::new();
        apply_references_diff(&diff, &mut update);
        assert_eq!(
            update.get("references_info.b.link"),
            Some(&FieldUpdate::Set("hi".into()))
        );
        assert_eq!(update.get("references.b"), Some(&FieldUpdate::Flag(true)));

        let reverse = references_diff(Some(&after), Some(&before));
        let mut update = BTreeMap::new();
        apply_references_diff(&reverse, &mut update);
        assert_eq!(update.get("references_info.b"), Some(&FieldUpdate::Delete));
        assert_eq!(update.get("references.b"), Some(&FieldUpdate::Delete));
    }
}
