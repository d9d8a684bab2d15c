use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::model::{Card, CardId, Slug};

// Process-wide generation allocator. Every snapshot gets a fresh number so
// caches keyed on it can never confuse two snapshots, including an overlay
// built from the same base.
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

fn next_generation() -> u64 {
    NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
}

// ─────────────────────────────────────────────
// CardSet
// ─────────────────────────────────────────────

/// An immutable snapshot of the card universe a collection is evaluated
/// against.
///
/// Cards live in a `BTreeMap` so every iteration (and therefore BFS
/// tie-breaking and filter evaluation order) is deterministic. The slug
/// index is built once at construction; downstream caches key on
/// [`CardSet::generation`] instead of pointer identity.
#[derive(Debug, Clone)]
pub struct CardSet {
    cards: BTreeMap<CardId, Card>,
    slug_index: HashMap<Slug, CardId>,
    generation: u64,
}

impl CardSet {
    pub fn new(cards: BTreeMap<CardId, Card>) -> Self {
        let mut slug_index = HashMap::new();
        for (id, card) in &cards {
            for slug in &card.slugs {
                slug_index.insert(slug.clone(), id.clone());
            }
        }
        Self {
            cards,
            slug_index,
            generation: next_generation(),
        }
    }

    pub fn empty() -> Self {
        Self::new(BTreeMap::new())
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.cards.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Card> {
        self.cards.get(id)
    }

    /// Resolve an id or slug to the canonical card id.
    pub fn resolve(&self, identifier: &str) -> Option<&CardId> {
        if let Some((id, _)) = self.cards.get_key_value(identifier) {
            return Some(id);
        }
        self.slug_index.get(identifier)
    }

    /// Resolve an id or slug directly to the card.
    pub fn get_by_identifier(&self, identifier: &str) -> Option<&Card> {
        self.resolve(identifier).and_then(|id| self.cards.get(id))
    }

    pub fn ids(&self) -> impl Iterator<Item = &CardId> {
        self.cards.keys()
    }

    pub fn cards(&self) -> impl Iterator<Item = &Card> {
        self.cards.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CardId, &Card)> {
        self.cards.iter()
    }

    /// A new snapshot with one card replaced (or inserted) by an in-progress
    /// edit. The overlay gets its own generation.
    pub fn with_editing_card(&self, card: Card) -> CardSet {
        let mut cards = self.cards.clone();
        cards.insert(card.id.clone(), card);
        CardSet::new(cards)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slugged(id: &str, slug: &str) -> Card {
        let mut card = Card::new(id);
        card.slugs = vec![slug.into()];
        card
    }

    fn set_of(cards: Vec<Card>) -> CardSet {
        CardSet::new(cards.into_iter().map(|c| (c.id.clone(), c)).collect())
    }

    #[test]
    fn resolve_prefers_ids_over_slugs() {
        let mut a = slugged("a", "b");
        a.title = "the card named a".into();
        let b = Card::new("b");
        let set = set_of(vec![a, b]);

        // "b" is both a's slug and b's id; the id wins
        assert_eq!(set.resolve("b"), Some(&"b".to_string()));
        assert_eq!(set.resolve("missing"), None);
    }

    #[test]
    fn resolve_falls_back_to_slugs() {
        let set = set_of(vec![slugged("c-1", "complexity")]);
        assert_eq!(set.resolve("complexity"), Some(&"c-1".to_string()));
        assert_eq!(set.get_by_identifier("complexity").unwrap().id, "c-1");
    }

    #[test]
    fn generations_are_unique_per_snapshot() {
        let base = set_of(vec![Card::new("a")]);
        let overlay = base.with_editing_card(Card::new("a"));
        let other = set_of(vec![Card::new("a")]);

        assert_ne!(base.generation(), overlay.generation());
        assert_ne!(base.generation(), other.generation());
    }

    #[test]
    fn with_editing_card_overlays_without_touching_base() {
        let base = set_of(vec![Card::new("a")]);
        let mut edit = Card::new("a");
        edit.title = "edited".into();
        let overlay = base.with_editing_card(edit);

        assert_eq!(base.get("a").unwrap().title, "");
        assert_eq!(overlay.get("a").unwrap().title, "edited");
        assert_eq!(overlay.len(), 1);
    }
}
