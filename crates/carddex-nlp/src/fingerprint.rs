//! Semantic fingerprints: compact per-card term-weight profiles.
//!
//! A fingerprint keeps the top [`FINGERPRINT_SIZE`] terms of a card by a
//! TF-IDF-style weight computed against the whole snapshot. The inverse
//! frequency term is signed, so terms appearing in nearly every card carry
//! negative weight and drag overlap scores down instead of inflating them.

use std::collections::{BTreeSet, HashMap};

use carddex_graph::{Card, CardId, CardSet};

/// Number of terms a fingerprint retains.
pub const FINGERPRINT_SIZE: usize = 25;

/// Base credit for any shared term, independent of its weights.
const MATCH_CONSTANT: f64 = 1.0;

// ─────────────────────────────────────────────
// Fingerprint
// ─────────────────────────────────────────────

/// Ordered term-weight profile, heaviest term first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fingerprint {
    items: Vec<(String, f64)>,
}

impl Fingerprint {
    /// Build from raw term weights, keeping the top terms. Ties break on
    /// term text so fingerprints are deterministic.
    pub fn from_weights(weights: HashMap<String, f64>) -> Self {
        let mut items: Vec<(String, f64)> = weights.into_iter().collect();
        items.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        items.truncate(FINGERPRINT_SIZE);
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.items.iter().map(|(t, w)| (t.as_str(), *w))
    }

    pub fn weight_for(&self, term: &str) -> Option<f64> {
        self.items
            .iter()
            .find(|(t, _)| t == term)
            .map(|(_, w)| *w)
    }
}

/// Similarity of two fingerprints: every shared term contributes the match
/// constant plus both of its weights. Symmetric; no shared terms scores 0.
pub fn semantic_overlap(a: &Fingerprint, b: &Fingerprint) -> f64 {
    a.iter()
        .filter_map(|(term, wa)| b.weight_for(term).map(|wb| MATCH_CONSTANT + wa + wb))
        .sum()
}

// ─────────────────────────────────────────────
// Generator
// ─────────────────────────────────────────────

/// Fingerprints for every card of one snapshot.
///
/// Construction walks the snapshot twice (document frequencies, then
/// per-card weights); lookups after that are O(1). Tied to the snapshot via
/// [`FingerprintGenerator::generation`] so caches can invalidate.
#[derive(Debug)]
pub struct FingerprintGenerator {
    generation: u64,
    fingerprints: HashMap<CardId, Fingerprint>,
}

impl FingerprintGenerator {
    pub fn new(set: &CardSet) -> Self {
        let doc_count = set.len() as f64;

        let mut document_frequency: HashMap<&str, usize> = HashMap::new();
        let mut per_card: Vec<(&CardId, HashMap<&str, f64>, f64)> = Vec::with_capacity(set.len());
        for (id, card) in set.iter() {
            let (tf, mass) = weighted_term_frequencies(card);
            for &term in tf.keys() {
                *document_frequency.entry(term).or_default() += 1;
            }
            per_card.push((id, tf, mass));
        }

        // Signed inverse document frequency: negative once a term appears in
        // more than half the snapshot.
        let idf = |df: usize| ((doc_count - df as f64 + 0.5) / (df as f64 + 0.5)).log10();

        let mut fingerprints = HashMap::with_capacity(per_card.len());
        for (id, tf, mass) in per_card {
            let weights: HashMap<String, f64> = tf
                .into_iter()
                .map(|(term, weighted_count)| {
                    let weight = weighted_count / mass.max(1.0) * idf(document_frequency[term]);
                    (term.to_string(), weight)
                })
                .collect();
            fingerprints.insert(id.clone(), Fingerprint::from_weights(weights));
        }

        Self {
            generation: set.generation(),
            fingerprints,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn fingerprint_for_card(&self, id: &str) -> Option<&Fingerprint> {
        self.fingerprints.get(id)
    }

    /// Merged fingerprint for a multi-seed similarity query: term weights
    /// summed across the seeds, then re-capped.
    pub fn fingerprint_for_cards(&self, ids: &[CardId]) -> Fingerprint {
        let mut merged: HashMap<String, f64> = HashMap::new();
        for id in ids {
            if let Some(fp) = self.fingerprints.get(id) {
                for (term, weight) in fp.iter() {
                    *merged.entry(term.to_string()).or_default() += weight;
                }
            }
        }
        Fingerprint::from_weights(merged)
    }

    /// Overlap of every non-excluded card against a target fingerprint.
    pub fn closest_overlapping(
        &self,
        target: &Fingerprint,
        exclude: &BTreeSet<CardId>,
    ) -> HashMap<CardId, f64> {
        self.fingerprints
            .iter()
            .filter(|(id, _)| !exclude.contains(*id))
            .map(|(id, fp)| (id.clone(), semantic_overlap(target, fp)))
            .collect()
    }
}

fn weighted_term_frequencies(card: &Card) -> (HashMap<&str, f64>, f64) {
    let mut tf: HashMap<&str, f64> = HashMap::new();
    let mut mass = 0.0;
    for (run, field_weight) in card.normalized.weighted_runs() {
        for term in run {
            *tf.entry(term.as_str()).or_default() += field_weight;
            mass += field_weight;
        }
    }
    (tf, mass)
}
