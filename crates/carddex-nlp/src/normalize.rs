use std::collections::HashMap;

use parking_lot::Mutex;

use carddex_graph::{Card, ReferenceType};

// ─────────────────────────────────────────────
// Word normalization
// ─────────────────────────────────────────────

/// Lowercase a text run and split it into cleaned words.
///
/// Em-dash spellings (`--`, `&emdash;`, `—`) become spaces before the split;
/// each word is stripped of leading and trailing non-alphanumeric characters.
pub fn normalized_words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .replace("--", " ")
        .replace("&emdash;", " ")
        .replace('—', " ")
        .split_whitespace()
        .map(trim_non_word)
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn trim_non_word(word: &str) -> &str {
    word.trim_matches(|c: char| !c.is_alphanumeric())
}

// ─────────────────────────────────────────────
// Stemmer
// ─────────────────────────────────────────────

// Longest-first so e.g. "ization" wins over "ation".
const SUFFIXES: [&str; 24] = [
    "ization", "ational", "iveness", "fulness", "ousness", "ation", "ement", "ment", "able",
    "ible", "ness", "ical", "ings", "ing", "ies", "ive", "ful", "ous", "ity", "ed", "ly", "er",
    "es", "s",
];

/// Suffix-stripping stemmer with a per-instance word cache.
///
/// A suffix is stripped only when the remaining stem keeps more than two
/// characters, so short words pass through untouched.
#[derive(Debug, Default)]
pub struct Stemmer {
    cache: Mutex<HashMap<String, String>>,
}

impl Stemmer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stem(&self, word: &str) -> String {
        if let Some(hit) = self.cache.lock().get(word) {
            return hit.clone();
        }
        let stemmed = stem_uncached(word);
        self.cache
            .lock()
            .insert(word.to_string(), stemmed.clone());
        stemmed
    }
}

fn stem_uncached(word: &str) -> String {
    for suffix in SUFFIXES {
        if word.len() > suffix.len() + 2 {
            if let Some(stem) = word.strip_suffix(suffix) {
                return stem.to_string();
            }
        }
    }
    word.to_string()
}

/// Normalized words with hyphen splitting and stemming applied.
pub fn stemmed_normalized_words(text: &str, stemmer: &Stemmer) -> Vec<String> {
    normalized_words(text)
        .iter()
        .flat_map(|w| w.split('-'))
        .filter(|w| !w.is_empty())
        .map(|w| stemmer.stem(w))
        .collect()
}

// ─────────────────────────────────────────────
// Card normalization
// ─────────────────────────────────────────────

/// Populate a card's derived normalized fields.
///
/// Must run before the card is placed in a queried snapshot; fingerprints
/// and query scoring read only the normalized runs. Cards whose title is
/// derived (working-notes) contribute no title text.
pub fn normalize_card(card: &mut Card, stemmer: &Stemmer) {
    card.normalized.title = if card.card_type.title_is_derived() {
        Vec::new()
    } else {
        stemmed_normalized_words(&card.title, stemmer)
    };
    card.normalized.subtitle = stemmed_normalized_words(&card.subtitle, stemmer);
    card.normalized.body = stemmed_normalized_words(&card.body, stemmer);

    let inbound_text = card
        .refs_inbound()
        .texts_of_type(ReferenceType::Link)
        .join(" ");
    card.normalized.inbound_links_text = stemmed_normalized_words(&inbound_text, stemmer);
}

#[cfg(test)]
mod tests {
    use super::*;
    use carddex_graph::CardType;

    #[test]
    fn normalization_lowercases_and_strips_punctuation() {
        assert_eq!(
            normalized_words("The *Quick* brown--fox, (and) friends!"),
            vec!["the", "quick", "brown", "fox", "and", "friends"]
        );
    }

    #[test]
    fn emdash_spellings_split_words() {
        assert_eq!(
            normalized_words("alpha&emdash;beta—gamma"),
            vec!["alpha", "beta", "gamma"]
        );
    }

    #[test]
    fn stemmer_strips_common_suffixes() {
        let stemmer = Stemmer::new();
        assert_eq!(stemmer.stem("complexity"), "complex");
        assert_eq!(stemmer.stem("cards"), "card");
        assert_eq!(stemmer.stem("running"), "runn");
        // stem would be too short, left alone
        assert_eq!(stemmer.stem("sing"), "sing");
        assert_eq!(stemmer.stem("is"), "is");
    }

    #[test]
    fn stemming_splits_hyphenated_words() {
        let stemmer = Stemmer::new();
        assert_eq!(
            stemmed_normalized_words("well-known complexity", &stemmer),
            vec!["well", "known", "complex"]
        );
    }

    #[test]
    fn normalize_card_fills_all_runs() {
        let stemmer = Stemmer::new();
        let mut card = Card::new("a");
        card.title = "Complexity".into();
        card.body = "About cards".into();
        card.references_info_inbound
            .entry("b".into())
            .or_default()
            .insert(ReferenceType::Link, "linked phrasing".into());

        normalize_card(&mut card, &stemmer);
        assert_eq!(card.normalized.title, vec!["complex"]);
        assert_eq!(card.normalized.body, vec!["about", "card"]);
        assert_eq!(card.normalized.inbound_links_text, vec!["link", "phras"]);
    }

    #[test]
    fn derived_titles_are_not_searchable() {
        let stemmer = Stemmer::new();
        let mut card = Card::new("a");
        card.card_type = CardType::WorkingNotes;
        card.title = "3/12 notes".into();
        normalize_card(&mut card, &stemmer);
        assert!(card.normalized.title.is_empty());
    }
}
