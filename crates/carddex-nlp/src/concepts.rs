//! Concept detection: which concept cards does a card's text mention?
//!
//! A concept card "claims" its normalized title tokens; a card is suggested
//! to reference a concept when those tokens occur contiguously in the card's
//! normalized title or body and no explicit concept reference exists yet.

use std::collections::BTreeMap;

use carddex_graph::{Card, CardId, CardSet, CardType, ReferenceType};

/// Normalized concept title tokens → concept card id, for one snapshot.
#[derive(Debug, Default)]
pub struct ConceptMap {
    concepts: BTreeMap<Vec<String>, CardId>,
    generation: u64,
}

impl ConceptMap {
    pub fn new(set: &CardSet) -> Self {
        let mut concepts = BTreeMap::new();
        for (id, card) in set.iter() {
            if card.card_type == CardType::Concept && !card.normalized.title.is_empty() {
                concepts.insert(card.normalized.title.clone(), id.clone());
            }
        }
        Self {
            concepts,
            generation: set.generation(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn concept_ids(&self) -> impl Iterator<Item = &CardId> {
        self.concepts.values()
    }

    /// Concepts the card's text mentions but does not yet reference.
    pub fn suggested_concept_references(&self, card: &Card) -> Vec<CardId> {
        self.concepts
            .iter()
            .filter(|(_, concept_id)| card.id != **concept_id)
            .filter(|(_, concept_id)| {
                !card
                    .refs()
                    .ids_of_type(ReferenceType::Concept)
                    .contains(concept_id)
            })
            .filter(|(tokens, _)| {
                contains_run(&card.normalized.title, tokens)
                    || contains_run(&card.normalized.body, tokens)
            })
            .map(|(_, concept_id)| concept_id.clone())
            .collect()
    }
}

fn contains_run(haystack: &[String], needle: &[String]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}
