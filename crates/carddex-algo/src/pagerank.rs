use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;

use carddex_graph::{CardId, CardSet};

// ─────────────────────────────────────────────
// Config
// ─────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PageRankConfig {
    /// Fraction of a node's rank distributed along its outbound links.
    pub damping_factor: f64,
    pub max_iterations: usize,
    /// Stop once the summed per-node rank change falls at or below this.
    pub convergence_threshold: f64,
}

impl Default for PageRankConfig {
    fn default() -> Self {
        Self {
            damping_factor: 0.85,
            max_iterations: 50,
            convergence_threshold: 0.005,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PageRankResult {
    pub ranks: HashMap<CardId, f64>,
    pub iterations: usize,
    pub converged: bool,
}

// ─────────────────────────────────────────────
// PageRank
// ─────────────────────────────────────────────

/// PageRank over the induced `Link` subgraph of the snapshot.
///
/// Links to cards absent from the snapshot are dropped, duplicate links
/// count once. Nodes with no inbound links are forced to 0 before the
/// leaked-mass redistribution, which hands every node an equal share of
/// whatever the damped distribution did not hand out, so total mass stays
/// at 1 every round.
pub fn page_rank(set: &CardSet, config: &PageRankConfig) -> PageRankResult {
    let ids: Vec<&CardId> = set.ids().collect();
    let n = ids.len();
    if n == 0 {
        return PageRankResult {
            ranks: HashMap::new(),
            iterations: 0,
            converged: true,
        };
    }

    // Induced adjacency: unique outbound links to present cards only.
    let index_of: HashMap<&CardId, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
    let mut outbound: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut inbound: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, id) in ids.iter().enumerate() {
        let card = match set.get(id) {
            Some(c) => c,
            None => continue,
        };
        let targets: BTreeSet<usize> = card
            .refs()
            .links()
            .into_iter()
            .filter_map(|target| index_of.get(target).copied())
            .collect();
        for t in targets {
            outbound[i].push(t);
            inbound[t].push(i);
        }
    }

    let initial = 1.0 / n as f64;
    let mut ranks = vec![initial; n];
    let mut iterations = 0;
    let mut converged = false;

    while iterations < config.max_iterations {
        let mut next = vec![0.0; n];
        for i in 0..n {
            if inbound[i].is_empty() {
                continue;
            }
            let gathered: f64 = inbound[i]
                .iter()
                .map(|&source| ranks[source] / outbound[source].len() as f64)
                .sum();
            next[i] = gathered * config.damping_factor;
        }

        let distributed: f64 = next.iter().sum();
        let leaked = (1.0 - distributed) / n as f64;
        for rank in next.iter_mut() {
            *rank += leaked;
        }

        let distance: f64 = next
            .iter()
            .zip(&ranks)
            .map(|(new, old)| (new - old).abs())
            .sum();
        ranks = next;
        iterations += 1;
        if distance <= config.convergence_threshold {
            converged = true;
            break;
        }
    }

    PageRankResult {
        ranks: ids
            .into_iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), ranks[i]))
            .collect(),
        iterations,
        converged,
    }
}

// ─────────────────────────────────────────────
// Cache
// ─────────────────────────────────────────────

/// One-slot rank cache keyed by snapshot generation.
#[derive(Debug, Default)]
pub struct PageRankCache {
    slot: Mutex<Option<(u64, Arc<HashMap<CardId, f64>>)>>,
}

impl PageRankCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ranks_for(&self, set: &CardSet, config: &PageRankConfig) -> Arc<HashMap<CardId, f64>> {
        let mut slot = self.slot.lock();
        if let Some((generation, ranks)) = slot.as_ref() {
            if *generation == set.generation() {
                return Arc::clone(ranks);
            }
        }
        let ranks = Arc::new(page_rank(set, config).ranks);
        *slot = Some((set.generation(), Arc::clone(&ranks)));
        ranks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carddex_graph::{Card, ReferenceType};
    use std::collections::BTreeMap;

    fn linked_set(ids: &[&str], edges: &[(&str, &str)]) -> CardSet {
        let mut cards: BTreeMap<CardId, Card> = ids
            .iter()
            .map(|&id| (id.to_string(), Card::new(id)))
            .collect();
        for &(from, to) in edges {
            if let Some(card) = cards.get_mut(from) {
                card.set_reference(to, ReferenceType::Link, "").unwrap();
            }
        }
        CardSet::new(cards)
    }

    fn total_mass(result: &PageRankResult) -> f64 {
        result.ranks.values().sum()
    }

    #[test]
    fn empty_set_trivially_converges() {
        let result = page_rank(&CardSet::empty(), &PageRankConfig::default());
        assert!(result.converged);
        assert!(result.ranks.is_empty());
    }

    #[test]
    fn mass_is_conserved() {
        let set = linked_set(
            &["a", "b", "c", "d"],
            &[("a", "b"), ("b", "c"), ("c", "a"), ("d", "a")],
        );
        let result = page_rank(&set, &PageRankConfig::default());
        assert!((total_mass(&result) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn heavily_linked_card_ranks_highest() {
        let set = linked_set(
            &["hub", "b", "c", "d"],
            &[("b", "hub"), ("c", "hub"), ("d", "hub")],
        );
        let result = page_rank(&set, &PageRankConfig::default());
        let hub = result.ranks["hub"];
        for id in ["b", "c", "d"] {
            assert!(hub > result.ranks[id]);
        }
    }

    #[test]
    fn links_to_absent_cards_are_ignored() {
        let with_ghost = linked_set(&["a", "b"], &[("a", "b"), ("a", "ghost")]);
        let without = linked_set(&["a", "b"], &[("a", "b")]);
        let r1 = page_rank(&with_ghost, &PageRankConfig::default());
        let r2 = page_rank(&without, &PageRankConfig::default());
        assert!((r1.ranks["b"] - r2.ranks["b"]).abs() < 1e-12);
    }

    #[test]
    fn iteration_cap_is_honored() {
        let set = linked_set(&["a", "b"], &[("a", "b")]);
        let config = PageRankConfig {
            max_iterations: 1,
            convergence_threshold: 0.0,
            ..Default::default()
        };
        let result = page_rank(&set, &config);
        assert_eq!(result.iterations, 1);
        assert!(!result.converged);
    }

    #[test]
    fn cache_reuses_ranks_per_generation() {
        let set = linked_set(&["a", "b"], &[("a", "b")]);
        let cache = PageRankCache::new();
        let first = cache.ranks_for(&set, &PageRankConfig::default());
        let second = cache.ranks_for(&set, &PageRankConfig::default());
        assert!(Arc::ptr_eq(&first, &second));

        let other = linked_set(&["a", "b"], &[("a", "b")]);
        let third = cache.ranks_for(&other, &PageRankConfig::default());
        assert!(!Arc::ptr_eq(&first, &third));
    }
}
