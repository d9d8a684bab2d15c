use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::{debug, warn};

use carddex_graph::CardId;

use crate::description::{CollectionDescription, SetName};
use crate::extras::{FilterExtras, FilterMembership};
use crate::filters::filter_membership;
use crate::sorts::{sort_value, SortContext, SortName};

/// The materialized answer to one collection description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCollection {
    /// Final card ids, sorted and paginated.
    pub ids: Vec<CardId>,
    /// Surviving cards that matched only partially (rendering hint).
    pub partial_matches: BTreeSet<CardId>,
}

/// Resolve a collection description against the evaluation context.
///
/// `base_order` is the storage collaborator's ordered membership for the
/// named set; `None` starts from the whole snapshot in id order, except for
/// the reading list, which is meaningless without a membership.
///
/// Pipeline: base set, filter intersection (unions resolved per filter),
/// sort with the first filter-emitted ranking values, then offset/limit.
pub fn resolve_collection(
    description: &CollectionDescription,
    extras: &FilterExtras,
    base_order: Option<&[CardId]>,
) -> ResolvedCollection {
    let set = extras.cards;
    let base: Vec<CardId> = match base_order {
        Some(ids) => ids.iter().filter(|id| set.contains(id)).cloned().collect(),
        None if description.set == SetName::ReadingList => {
            warn!(
                set = %description.set.as_str(),
                "no membership provided for the named set, starting empty"
            );
            Vec::new()
        }
        None => set.ids().cloned().collect(),
    };
    let base_index: HashMap<CardId, usize> = base
        .iter()
        .enumerate()
        .map(|(index, id)| (id.clone(), index))
        .collect();

    let limit = description.pagination_value("limit");
    let offset = description.pagination_value("offset");

    let mut ids = base;
    let mut partials: BTreeSet<CardId> = BTreeSet::new();
    let mut sort_extra: Option<Arc<FilterMembership>> = None;
    for filter in &description.filters {
        // Pagination pseudo-filters never restrict membership.
        if filter.starts_with("limit/") || filter.starts_with("offset/") {
            continue;
        }
        let membership = filter_membership(filter, extras);
        ids.retain(|id| membership.contains(id));
        partials.extend(membership.partials.iter().cloned());
        if sort_extra.is_none() && membership.sort_values.is_some() {
            sort_extra = Some(Arc::clone(&membership));
        }
        debug!(filter = %filter, remaining = ids.len(), "applied filter");
    }

    let page_ranks = (description.sort == SortName::CardRank)
        .then(|| extras.caches.page_ranks_for(set));
    let ctx = SortContext {
        base_index: &base_index,
        sort_extra: sort_extra.as_deref(),
        random_salt: &extras.random_salt,
        page_ranks: page_ranks.as_deref(),
    };

    // Descending by ranking value, section then id ascending as tie-break.
    let mut keyed: Vec<(f64, String, CardId)> = ids
        .into_iter()
        .map(|id| match set.get(&id) {
            Some(card) => (
                sort_value(description.sort, card, &ctx),
                card.section.clone(),
                id,
            ),
            None => (0.0, String::new(), id),
        })
        .collect();
    keyed.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.1.cmp(&b.1))
            .then_with(|| a.2.cmp(&b.2))
    });
    let mut ids: Vec<CardId> = keyed.into_iter().map(|(_, _, id)| id).collect();
    if description.sort_reversed {
        ids.reverse();
    }

    if let Some(offset) = offset {
        ids.drain(..offset.min(ids.len()));
    }
    if let Some(limit) = limit {
        ids.truncate(limit);
    }

    let surviving: BTreeSet<&CardId> = ids.iter().collect();
    partials.retain(|id| surviving.contains(id));

    ResolvedCollection {
        ids,
        partial_matches: partials,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extras::EvalCaches;
    use carddex_graph::{Card, CardSet, ReferenceType};
    use carddex_nlp::{normalize_card, Stemmer};
    use std::collections::BTreeMap;

    // ── fixture ──────────────────────────────────────────
    //
    // a → b → c, a and b published in "main", c an unpublished orphan.

    fn fixture() -> CardSet {
        let stemmer = Stemmer::new();

        let mut a = Card::new("a");
        a.title = "Complexity".into();
        a.body = "thoughts on complexity".into();
        a.section = "main".into();
        a.published = true;
        a.updated_substantive = Some("2021-06-01T00:00:00Z".parse().unwrap());
        a.set_reference("b", ReferenceType::Link, "").unwrap();

        let mut b = Card::new("b");
        b.title = "Emergence".into();
        b.body = "emergence rises out of complexity".into();
        b.section = "main".into();
        b.published = true;
        b.updated_substantive = Some("2019-02-01T00:00:00Z".parse().unwrap());
        b.set_reference("c", ReferenceType::Link, "").unwrap();
        b.references_info_inbound
            .entry("a".into())
            .or_default()
            .insert(ReferenceType::Link, String::new());

        let mut c = Card::new("c");
        c.title = "Gardens".into();
        c.body = "mostly roses".into();
        c.updated_substantive = Some("2020-03-01T00:00:00Z".parse().unwrap());
        c.references_info_inbound
            .entry("b".into())
            .or_default()
            .insert(ReferenceType::Link, String::new());

        CardSet::new(
            [a, b, c]
                .into_iter()
                .map(|mut card| {
                    normalize_card(&mut card, &stemmer);
                    (card.id.clone(), card)
                })
                .collect::<BTreeMap<_, _>>(),
        )
    }

    fn resolve(raw: &str, extras: &FilterExtras) -> ResolvedCollection {
        resolve_collection(&CollectionDescription::deserialize(raw), extras, None)
    }

    // ── pipeline ─────────────────────────────────────────

    #[test]
    fn no_filters_returns_the_base_set_in_order() {
        let set = fixture();
        let caches = EvalCaches::new();
        let extras = FilterExtras::new(&set, &caches);
        assert_eq!(resolve("all/", &extras).ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn filters_intersect() {
        let set = fixture();
        let caches = EvalCaches::new();
        let extras = FilterExtras::new(&set, &caches);
        assert_eq!(resolve("all/published/", &extras).ids, vec!["a", "b"]);
        assert_eq!(
            resolve("all/published/has-inbound-links/", &extras).ids,
            vec!["b"]
        );
    }

    #[test]
    fn link_filter_distances_drive_the_default_sort() {
        let set = fixture();
        let caches = EvalCaches::new();
        let extras = FilterExtras::new(&set, &caches);
        // nearest first: b at one hop, c at two
        assert_eq!(resolve("all/descendants/a/2/", &extras).ids, vec!["b", "c"]);
    }

    #[test]
    fn combine_unions_without_duplicates() {
        let set = fixture();
        let caches = EvalCaches::new();
        let extras = FilterExtras::new(&set, &caches);
        let resolved = resolve("all/combine/cards/a/cards/a+b/", &extras);
        assert_eq!(resolved.ids, vec!["a", "b"]);
    }

    #[test]
    fn exclude_composes_with_other_filters() {
        let set = fixture();
        let caches = EvalCaches::new();
        let extras = FilterExtras::new(&set, &caches);
        assert_eq!(
            resolve("all/published/exclude/cards/a/", &extras).ids,
            vec!["b"]
        );
    }

    #[test]
    fn query_scores_order_and_flag_partial_matches() {
        let set = fixture();
        let caches = EvalCaches::new();
        let extras = FilterExtras::new(&set, &caches);

        // title hit on a outranks body hit on b
        let resolved = resolve("all/query/complexity/", &extras);
        assert_eq!(resolved.ids, vec!["a", "b"]);
        assert!(resolved.partial_matches.is_empty());

        // second term matches nowhere: hits survive but flagged partial
        let loose = resolve("all/query/complexity+zebra/", &extras);
        assert_eq!(loose.ids, vec!["a", "b"]);
        assert_eq!(loose.partial_matches.len(), 2);

        // strict demands every term
        let strict = resolve("all/query-strict/complexity+zebra/", &extras);
        assert!(strict.ids.is_empty());
    }

    #[test]
    fn sort_and_reverse_order_the_result() {
        let set = fixture();
        let caches = EvalCaches::new();
        let extras = FilterExtras::new(&set, &caches);
        assert_eq!(
            resolve("all/sort/updated/", &extras).ids,
            vec!["a", "c", "b"]
        );
        assert_eq!(
            resolve("all/sort/reverse/updated/", &extras).ids,
            vec!["b", "c", "a"]
        );
    }

    #[test]
    fn pagination_applies_after_sorting() {
        let set = fixture();
        let caches = EvalCaches::new();
        let extras = FilterExtras::new(&set, &caches);
        assert_eq!(
            resolve("all/offset/1/sort/updated/", &extras).ids,
            vec!["c", "b"]
        );
        assert_eq!(
            resolve("all/limit/1/offset/1/sort/updated/", &extras).ids,
            vec!["c"]
        );
        // offset past the end leaves nothing
        assert!(resolve("all/offset/9/", &extras).ids.is_empty());
    }

    #[test]
    fn key_card_placeholder_flows_from_extras() {
        let set = fixture();
        let caches = EvalCaches::new();
        let mut extras = FilterExtras::new(&set, &caches);
        extras.key_card_id = "a".into();
        assert_eq!(resolve("all/cards/_/", &extras).ids, vec!["a"]);
        assert_eq!(resolve("all/children/_/", &extras).ids, vec!["b"]);
    }

    #[test]
    fn reading_list_without_membership_is_empty() {
        let set = fixture();
        let caches = EvalCaches::new();
        let extras = FilterExtras::new(&set, &caches);
        assert!(resolve("reading-list/", &extras).ids.is_empty());
    }

    #[test]
    fn explicit_base_order_is_respected_and_pruned() {
        let set = fixture();
        let caches = EvalCaches::new();
        let extras = FilterExtras::new(&set, &caches);
        let base: Vec<CardId> = vec!["c".into(), "a".into(), "ghost".into()];
        let resolved = resolve_collection(
            &CollectionDescription::deserialize("all/"),
            &extras,
            Some(&base),
        );
        assert_eq!(resolved.ids, vec!["c", "a"]);
    }

    #[test]
    fn editing_overlay_changes_the_answer_without_touching_base() {
        let set = fixture();
        let mut edit = set.get("c").unwrap().clone();
        edit.published = true;
        let overlay = set.with_editing_card(edit);

        let caches = EvalCaches::new();
        let base_extras = FilterExtras::new(&set, &caches);
        let overlay_extras = FilterExtras::new(&overlay, &caches);

        assert_eq!(resolve("all/published/", &base_extras).ids, vec!["a", "b"]);
        assert_eq!(
            resolve("all/published/", &overlay_extras).ids,
            vec!["a", "b", "c"]
        );
    }
}
