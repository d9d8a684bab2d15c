use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::model::{Card, CardId, ReferenceType};
use crate::set::CardSet;

// ─────────────────────────────────────────────
// Config
// ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalDirection {
    /// Follow outbound references.
    Outbound,
    /// Follow inbound references.
    Inbound,
    /// Both passes unioned; inbound distances are negated and an outbound
    /// distance wins when a card is reachable both ways.
    Both,
}

/// Configuration for bounded card traversal.
#[derive(Debug, Clone)]
pub struct BfsConfig {
    /// Maximum hop depth from the seeds (inclusive). `0` means unbounded.
    pub ply: u32,
    pub direction: TraversalDirection,
    /// When set, only edges carrying at least one of these types are
    /// followed.
    pub reference_types: Option<BTreeSet<ReferenceType>>,
    /// Whether the seed cards appear in the result.
    pub include_seeds: bool,
}

impl Default for BfsConfig {
    fn default() -> Self {
        Self {
            ply: 1,
            direction: TraversalDirection::Outbound,
            reference_types: None,
            include_seeds: true,
        }
    }
}

// ─────────────────────────────────────────────
// BFS
// ─────────────────────────────────────────────

/// Multi-source bounded BFS over the reference graph.
///
/// Returns `card id → hop distance` for every discovered card. Seeds sit at
/// distance 0. Ids without a card in the snapshot are still recorded when
/// discovered, but act as dead ends. Seed identifiers may be slugs;
/// unresolvable seeds are kept verbatim and simply find nothing.
pub fn card_bfs(set: &CardSet, seeds: &[String], config: &BfsConfig) -> BTreeMap<CardId, i32> {
    let seeds: Vec<CardId> = seeds
        .iter()
        .map(|s| set.resolve(s).cloned().unwrap_or_else(|| s.clone()))
        .collect();
    let ply = if config.ply == 0 {
        i32::MAX
    } else {
        config.ply as i32
    };

    let mut result = match config.direction {
        TraversalDirection::Outbound => bfs_pass(set, &seeds, ply, false, config),
        TraversalDirection::Inbound => bfs_pass(set, &seeds, ply, true, config),
        TraversalDirection::Both => {
            let outbound = bfs_pass(set, &seeds, ply, false, config);
            let mut union: BTreeMap<CardId, i32> = bfs_pass(set, &seeds, ply, true, config)
                .into_iter()
                .map(|(id, d)| (id, -d))
                .collect();
            union.extend(outbound);
            union
        }
    };

    if !config.include_seeds {
        for seed in &seeds {
            result.remove(seed);
        }
    }
    result
}

fn bfs_pass(
    set: &CardSet,
    seeds: &[CardId],
    ply: i32,
    inbound: bool,
    config: &BfsConfig,
) -> BTreeMap<CardId, i32> {
    let mut seen: BTreeMap<CardId, i32> = BTreeMap::new();
    let mut queue: VecDeque<CardId> = VecDeque::new();
    for seed in seeds {
        if seen.insert(seed.clone(), 0).is_none() {
            queue.push_back(seed.clone());
        }
    }

    while let Some(id) = queue.pop_front() {
        let card = match set.get(&id) {
            Some(c) => c,
            None => continue, // dead end
        };
        let depth = seen[&id] + 1;
        if depth > ply {
            continue;
        }
        for neighbor in edge_targets(card, inbound, config.reference_types.as_ref()) {
            if !seen.contains_key(neighbor) {
                seen.insert(neighbor.clone(), depth);
                queue.push_back(neighbor.clone());
            }
        }
    }
    seen
}

fn edge_targets<'a>(
    card: &'a Card,
    inbound: bool,
    types: Option<&'a BTreeSet<ReferenceType>>,
) -> impl Iterator<Item = &'a CardId> {
    let info = if inbound {
        &card.references_info_inbound
    } else {
        &card.references_info
    };
    info.iter()
        .filter(move |(_, block)| match types {
            Some(allowed) => block.keys().any(|t| allowed.contains(t)),
            None => true,
        })
        .map(|(id, _)| id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as Map;

    // ── helpers ──────────────────────────────────────────

    /// Build a set from directed Link edges, maintaining inbound mirrors.
    fn linked_set(ids: &[&str], edges: &[(&str, &str)]) -> CardSet {
        typed_set(
            ids,
            &edges
                .iter()
                .map(|&(a, b)| (a, b, ReferenceType::Link))
                .collect::<Vec<_>>(),
        )
    }

    fn typed_set(ids: &[&str], edges: &[(&str, &str, ReferenceType)]) -> CardSet {
        let mut cards: Map<CardId, Card> = ids
            .iter()
            .map(|&id| (id.to_string(), Card::new(id)))
            .collect();
        for &(from, to, ref_type) in edges {
            if let Some(card) = cards.get_mut(from) {
                card.set_reference(to, ref_type, "").unwrap();
            }
            if let Some(card) = cards.get_mut(to) {
                card.references_info_inbound
                    .entry(from.to_string())
                    .or_default()
                    .insert(ref_type, String::new());
                card.references_inbound.insert(from.to_string(), true);
            }
        }
        CardSet::new(cards)
    }

    fn bfs_from(set: &CardSet, seed: &str, config: &BfsConfig) -> Map<CardId, i32> {
        card_bfs(set, &[seed.to_string()], config)
    }

    // ── outbound ─────────────────────────────────────────

    #[test]
    fn outbound_chain_distances() {
        let set = linked_set(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
        let result = bfs_from(&set, "a", &BfsConfig { ply: 2, ..Default::default() });

        assert_eq!(result["a"], 0);
        assert_eq!(result["b"], 1);
        assert_eq!(result["c"], 2);
    }

    #[test]
    fn ply_bounds_the_search() {
        let set = linked_set(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
        let result = bfs_from(&set, "a", &BfsConfig::default());

        assert!(result.contains_key("b"));
        assert!(!result.contains_key("c"));
    }

    #[test]
    fn ply_zero_is_unbounded() {
        let ids = ["a", "b", "c", "d", "e"];
        let set = linked_set(&ids, &[("a", "b"), ("b", "c"), ("c", "d"), ("d", "e")]);
        let result = bfs_from(&set, "a", &BfsConfig { ply: 0, ..Default::default() });
        assert_eq!(result.len(), 5);
        assert_eq!(result["e"], 4);
    }

    #[test]
    fn seeds_can_be_excluded() {
        let set = linked_set(&["a", "b"], &[("a", "b")]);
        let config = BfsConfig { include_seeds: false, ..Default::default() };
        let result = bfs_from(&set, "a", &config);
        assert!(!result.contains_key("a"));
        assert_eq!(result["b"], 1);
    }

    #[test]
    fn seeds_resolve_through_slugs() {
        let mut cards: Map<CardId, Card> = Map::new();
        let mut a = Card::new("c-1");
        a.slugs = vec!["start".into()];
        a.set_reference("c-2", ReferenceType::Link, "").unwrap();
        cards.insert("c-1".into(), a);
        cards.insert("c-2".into(), Card::new("c-2"));
        let set = CardSet::new(cards);

        let result = bfs_from(&set, "start", &BfsConfig::default());
        assert_eq!(result["c-1"], 0);
        assert_eq!(result["c-2"], 1);
    }

    #[test]
    fn missing_cards_are_recorded_dead_ends() {
        // "ghost" has no card in the set; nothing can be discovered past it
        let set = linked_set(&["a"], &[("a", "ghost")]);
        let result = bfs_from(&set, "a", &BfsConfig { ply: 3, ..Default::default() });
        assert_eq!(result["ghost"], 1);
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn multi_seed_takes_shortest_distance() {
        let set = linked_set(
            &["a", "b", "c"],
            &[("a", "b"), ("b", "c")],
        );
        let result = card_bfs(
            &set,
            &["a".to_string(), "c".to_string()],
            &BfsConfig { ply: 3, ..Default::default() },
        );
        assert_eq!(result["a"], 0);
        assert_eq!(result["c"], 0);
        assert_eq!(result["b"], 1);
    }

    // ── direction ────────────────────────────────────────

    #[test]
    fn inbound_mirrors_outbound() {
        let set = linked_set(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
        let config = BfsConfig {
            ply: 2,
            direction: TraversalDirection::Inbound,
            ..Default::default()
        };
        let result = bfs_from(&set, "c", &config);
        assert_eq!(result["c"], 0);
        assert_eq!(result["b"], 1);
        assert_eq!(result["a"], 2);
    }

    #[test]
    fn both_directions_sign_encode_inbound() {
        // a → b outbound, c → a inbound
        let set = linked_set(&["a", "b", "c"], &[("a", "b"), ("c", "a")]);
        let config = BfsConfig {
            ply: 1,
            direction: TraversalDirection::Both,
            ..Default::default()
        };
        let result = bfs_from(&set, "a", &config);
        assert_eq!(result["a"], 0);
        assert_eq!(result["b"], 1);
        assert_eq!(result["c"], -1);
    }

    #[test]
    fn both_directions_outbound_wins_overlap() {
        // a ↔ b: b is reachable at 1 both ways; the outbound value stands
        let set = linked_set(&["a", "b"], &[("a", "b"), ("b", "a")]);
        let config = BfsConfig {
            ply: 2,
            direction: TraversalDirection::Both,
            ..Default::default()
        };
        let result = bfs_from(&set, "a", &config);
        assert_eq!(result["b"], 1);
    }

    // ── type restriction ─────────────────────────────────

    #[test]
    fn reference_type_allow_list_prunes_edges() {
        let set = typed_set(
            &["a", "b", "c"],
            &[
                ("a", "b", ReferenceType::Concept),
                ("a", "c", ReferenceType::Link),
            ],
        );
        let config = BfsConfig {
            reference_types: Some([ReferenceType::Concept].into_iter().collect()),
            ..Default::default()
        };
        let result = bfs_from(&set, "a", &config);
        assert!(result.contains_key("b"));
        assert!(!result.contains_key("c"));
    }
}
