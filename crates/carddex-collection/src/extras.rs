use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::distributions::Alphanumeric;
use rand::Rng;

use carddex_algo::{PageRankCache, PageRankConfig};
use carddex_graph::{CardId, CardSet};
use carddex_nlp::{ConceptMap, FingerprintGenerator};

use crate::filters::CompiledFilter;

// ─────────────────────────────────────────────
// MatchResult
// ─────────────────────────────────────────────

/// Outcome of one filter predicate for one card.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchResult {
    pub matches: bool,
    /// Filter-specific ranking value (hop distance, score, overlap).
    pub sort_value: Option<f64>,
    /// Rendering hint: the card matched, but not fully.
    pub partial: bool,
}

impl MatchResult {
    pub fn matched(matches: bool) -> Self {
        Self {
            matches,
            sort_value: None,
            partial: false,
        }
    }

    pub fn with_value(matches: bool, sort_value: f64) -> Self {
        Self {
            matches,
            sort_value: Some(sort_value),
            partial: false,
        }
    }
}

// ─────────────────────────────────────────────
// FilterMembership
// ─────────────────────────────────────────────

/// A filter expression materialized against one snapshot.
///
/// `members` always holds the raw positive matches; `reversed` marks
/// memberships whose meaning is the complement, so the complement set is
/// never materialized unless a caller needs it concretely.
#[derive(Debug, Clone, Default)]
pub struct FilterMembership {
    pub members: BTreeSet<CardId>,
    pub reversed: bool,
    pub sort_values: Option<HashMap<CardId, f64>>,
    /// Larger sort values mean farther, not better (hop distances).
    pub sort_flipped: bool,
    pub partials: BTreeSet<CardId>,
}

impl FilterMembership {
    pub fn contains(&self, id: &str) -> bool {
        self.members.contains(id) != self.reversed
    }

    /// Resolve `reversed` against the snapshot into an explicit id set.
    pub fn concrete_members(&self, set: &CardSet) -> BTreeSet<CardId> {
        if self.reversed {
            set.ids()
                .filter(|id| !self.members.contains(*id))
                .cloned()
                .collect()
        } else {
            self.members.clone()
        }
    }
}

// ─────────────────────────────────────────────
// FilterExtras
// ─────────────────────────────────────────────

/// Everything a filter predicate may consult besides the card itself.
///
/// Unsaved edits are folded in before evaluation via
/// [`CardSet::with_editing_card`], so predicates only ever see one snapshot.
pub struct FilterExtras<'a> {
    pub cards: &'a CardSet,
    /// The card the collection is centered on; `_` arguments resolve to it.
    pub key_card_id: CardId,
    /// Requesting user, for the `me` author token.
    pub user_id: String,
    /// Session salt feeding the `random` sort.
    pub random_salt: String,
    pub caches: &'a EvalCaches,
}

impl<'a> FilterExtras<'a> {
    pub fn new(cards: &'a CardSet, caches: &'a EvalCaches) -> Self {
        Self {
            cards,
            key_card_id: CardId::new(),
            user_id: String::new(),
            random_salt: random_salt(),
            caches,
        }
    }

    /// Resolve a filter card argument: the key-card placeholder, then slugs,
    /// falling back to the raw string for ids with no card behind them.
    pub fn resolve_card_arg(&self, raw: &str) -> CardId {
        let ident = if raw == crate::filters::KEY_CARD_ID_PLACEHOLDER {
            self.key_card_id.as_str()
        } else {
            raw
        };
        self.cards
            .resolve(ident)
            .cloned()
            .unwrap_or_else(|| ident.to_string())
    }
}

/// Fresh salt for the `random` sort; one per viewing session.
pub fn random_salt() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect()
}

// ─────────────────────────────────────────────
// EvalCaches
// ─────────────────────────────────────────────

/// Memoization for one evaluation context.
///
/// Every entry is keyed by the snapshot generation (plus the parameters the
/// cached value depends on), so a context can outlive any number of
/// snapshots without ever serving stale results. Builders run outside the
/// lock; nested filter evaluation re-enters these maps.
#[derive(Default)]
pub struct EvalCaches {
    fingerprints: Mutex<Option<(u64, Arc<FingerprintGenerator>)>>,
    concepts: Mutex<Option<(u64, Arc<ConceptMap>)>>,
    distances: Mutex<HashMap<(u64, String), Arc<BTreeMap<CardId, i32>>>>,
    overlaps: Mutex<HashMap<(u64, String), Arc<HashMap<CardId, f64>>>>,
    expansions: Mutex<HashMap<(u64, String), Arc<BTreeSet<CardId>>>>,
    memberships: Mutex<HashMap<(u64, String), Arc<FilterMembership>>>,
    compiled: Mutex<HashMap<String, Arc<CompiledFilter>>>,
    page_ranks: PageRankCache,
}

impl EvalCaches {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fingerprints_for(&self, set: &CardSet) -> Arc<FingerprintGenerator> {
        {
            let slot = self.fingerprints.lock();
            if let Some((generation, generator)) = slot.as_ref() {
                if *generation == set.generation() {
                    return Arc::clone(generator);
                }
            }
        }
        let generator = Arc::new(FingerprintGenerator::new(set));
        *self.fingerprints.lock() = Some((set.generation(), Arc::clone(&generator)));
        generator
    }

    pub fn concepts_for(&self, set: &CardSet) -> Arc<ConceptMap> {
        {
            let slot = self.concepts.lock();
            if let Some((generation, map)) = slot.as_ref() {
                if *generation == set.generation() {
                    return Arc::clone(map);
                }
            }
        }
        let map = Arc::new(ConceptMap::new(set));
        *self.concepts.lock() = Some((set.generation(), Arc::clone(&map)));
        map
    }

    pub fn distances_for(
        &self,
        set: &CardSet,
        key: &str,
        build: impl FnOnce() -> BTreeMap<CardId, i32>,
    ) -> Arc<BTreeMap<CardId, i32>> {
        let cache_key = (set.generation(), key.to_string());
        if let Some(hit) = self.distances.lock().get(&cache_key) {
            return Arc::clone(hit);
        }
        let value = Arc::new(build());
        self.distances.lock().insert(cache_key, Arc::clone(&value));
        value
    }

    pub fn overlaps_for(
        &self,
        set: &CardSet,
        key: &str,
        build: impl FnOnce() -> HashMap<CardId, f64>,
    ) -> Arc<HashMap<CardId, f64>> {
        let cache_key = (set.generation(), key.to_string());
        if let Some(hit) = self.overlaps.lock().get(&cache_key) {
            return Arc::clone(hit);
        }
        let value = Arc::new(build());
        self.overlaps.lock().insert(cache_key, Arc::clone(&value));
        value
    }

    pub fn expansion_for(
        &self,
        set: &CardSet,
        key: &str,
        build: impl FnOnce() -> BTreeSet<CardId>,
    ) -> Arc<BTreeSet<CardId>> {
        let cache_key = (set.generation(), key.to_string());
        if let Some(hit) = self.expansions.lock().get(&cache_key) {
            return Arc::clone(hit);
        }
        let value = Arc::new(build());
        self.expansions.lock().insert(cache_key, Arc::clone(&value));
        value
    }

    pub fn membership_for(
        &self,
        set: &CardSet,
        key: &str,
        build: impl FnOnce() -> FilterMembership,
    ) -> Arc<FilterMembership> {
        let cache_key = (set.generation(), key.to_string());
        if let Some(hit) = self.memberships.lock().get(&cache_key) {
            return Arc::clone(hit);
        }
        let value = Arc::new(build());
        self.memberships
            .lock()
            .insert(cache_key, Arc::clone(&value));
        value
    }

    pub fn compile(&self, name: &str) -> Arc<CompiledFilter> {
        if let Some(hit) = self.compiled.lock().get(name) {
            return Arc::clone(hit);
        }
        let compiled = Arc::new(crate::filters::build_filter(name));
        self.compiled
            .lock()
            .insert(name.to_string(), Arc::clone(&compiled));
        compiled
    }

    pub fn page_ranks_for(&self, set: &CardSet) -> Arc<HashMap<CardId, f64>> {
        self.page_ranks.ranks_for(set, &PageRankConfig::default())
    }
}
