use carddex_graph::Card;

use crate::normalize::{stemmed_normalized_words, Stemmer};

// ─────────────────────────────────────────────
// URL text codec
// ─────────────────────────────────────────────

/// Decode a free-text filter argument: `+` stands for space on top of
/// ordinary percent-encoding. Undecodable input is kept verbatim.
pub fn decode_query_text(raw: &str) -> String {
    let plus_expanded = raw.replace('+', " ");
    match urlencoding::decode(&plus_expanded) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => plus_expanded,
    }
}

/// Inverse of [`decode_query_text`], for building filter URLs.
pub fn encode_query_text(text: &str) -> String {
    urlencoding::encode(text).replace("%20", "+")
}

// ─────────────────────────────────────────────
// PreparedQuery
// ─────────────────────────────────────────────

/// A free-text query normalized and stemmed once, scoreable against any
/// card's normalized runs.
#[derive(Debug, Clone)]
pub struct PreparedQuery {
    terms: Vec<String>,
}

impl PreparedQuery {
    pub fn new(text: &str, stemmer: &Stemmer) -> Self {
        Self {
            terms: stemmed_normalized_words(text, stemmer),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Score a card against the query.
    ///
    /// Each query term earns the weight of the heaviest field containing it;
    /// the flag is true when every term matched somewhere. An empty query
    /// scores 0 and counts as a full match.
    pub fn card_score(&self, card: &Card) -> (f64, bool) {
        let mut score = 0.0;
        let mut full_match = true;
        for term in &self.terms {
            let best = card
                .normalized
                .weighted_runs()
                .iter()
                .filter(|(run, _)| run.contains(term))
                .map(|(_, weight)| *weight)
                .fold(None, |acc: Option<f64>, w| {
                    Some(acc.map_or(w, |a| a.max(w)))
                });
            match best {
                Some(w) => score += w,
                None => full_match = false,
            }
        }
        (score, full_match)
    }
}
