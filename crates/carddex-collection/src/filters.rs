//! The configurable filter registry.
//!
//! Filter names are slash-delimited expressions (`descendants/c-1/2`,
//! `exclude/cards/_`). Compiling a name yields a predicate closure plus an
//! inversion flag; evaluation happens against a [`FilterExtras`] context and
//! memoizes per-snapshot work (BFS maps, fingerprint overlaps, sub-filter
//! memberships) through [`crate::extras::EvalCaches`].

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use tracing::warn;

use carddex_graph::{
    card_bfs, BfsConfig, Card, CardId, CardType, ReferenceType, TimestampField,
    TraversalDirection,
};
use carddex_nlp::{decode_query_text, PreparedQuery, Stemmer};

use crate::extras::{FilterExtras, FilterMembership, MatchResult};

/// Stands for the key card in any card-argument position.
pub const KEY_CARD_ID_PLACEHOLDER: &str = "_";
/// Prefix on a card argument keeping the seed card itself in the result.
pub const INCLUDE_KEY_CARD_PREFIX: char = '+';
/// Prefix on a reference-type argument selecting the complement.
pub const INVERT_REFERENCE_TYPES_PREFIX: char = '-';
/// Delimiter for unions of ids, of types, and of simple filter names.
pub const UNION_FILTER_DELIMITER: char = '+';
/// Author argument meaning the requesting user.
pub const ME_AUTHOR_ID: &str = "me";
/// `missing-concept` argument meaning any concept at all.
pub const ALL_CONCEPTS_TOKEN: &str = "+";

// ─────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigurableFilterType {
    Updated,
    LastTweeted,
    Before,
    After,
    Between,
    Children,
    Descendants,
    Parents,
    Ancestors,
    DirectConnections,
    Connections,
    References,
    ReferencesInbound,
    ReferencesOutbound,
    DirectReferences,
    DirectReferencesInbound,
    DirectReferencesOutbound,
    Author,
    Exclude,
    Combine,
    Expand,
    Cards,
    Query,
    QueryStrict,
    Limit,
    Offset,
    Similar,
    SimilarCutoff,
    AboutConcept,
    MissingConcept,
    SameType,
    DifferentType,
}

use ConfigurableFilterType::*;

/// (url token, kind, argument segments the token consumes).
///
/// Consumption is recursive: a consumed segment that is itself a
/// configurable token pulls in its own arguments too, which is how
/// `updated/before/2020-10-03` and nested `exclude/...` hang together.
const CONFIGURABLE_FILTERS: [(&str, ConfigurableFilterType, usize); 32] = [
    ("updated", Updated, 1),
    ("last-tweeted", LastTweeted, 1),
    ("before", Before, 1),
    ("after", After, 1),
    ("between", Between, 2),
    ("children", Children, 1),
    ("descendants", Descendants, 2),
    ("parents", Parents, 1),
    ("ancestors", Ancestors, 2),
    ("direct-connections", DirectConnections, 1),
    ("connections", Connections, 2),
    ("references", References, 3),
    ("references-inbound", ReferencesInbound, 3),
    ("references-outbound", ReferencesOutbound, 3),
    ("direct-references", DirectReferences, 2),
    ("direct-references-inbound", DirectReferencesInbound, 2),
    ("direct-references-outbound", DirectReferencesOutbound, 2),
    ("author", Author, 1),
    ("exclude", Exclude, 1),
    ("combine", Combine, 2),
    ("expand", Expand, 2),
    ("cards", Cards, 1),
    ("query", Query, 1),
    ("query-strict", QueryStrict, 1),
    ("limit", Limit, 1),
    ("offset", Offset, 1),
    ("similar", Similar, 1),
    ("similar-cutoff", SimilarCutoff, 2),
    ("about-concept", AboutConcept, 1),
    ("missing-concept", MissingConcept, 1),
    ("same-type", SameType, 1),
    ("different-type", DifferentType, 1),
];

impl ConfigurableFilterType {
    pub fn parse(token: &str) -> Option<Self> {
        CONFIGURABLE_FILTERS
            .iter()
            .find(|(name, _, _)| *name == token)
            .map(|(_, kind, _)| *kind)
    }

    pub fn as_str(&self) -> &'static str {
        CONFIGURABLE_FILTERS
            .iter()
            .find(|(_, kind, _)| kind == self)
            .map(|(name, _, _)| *name)
            .unwrap_or("")
    }

    pub fn url_part_count(&self) -> usize {
        CONFIGURABLE_FILTERS
            .iter()
            .find(|(_, kind, _)| kind == self)
            .map(|(_, _, count)| *count)
            .unwrap_or(0)
    }

    fn is_link_kind(&self) -> bool {
        matches!(
            self,
            Children
                | Descendants
                | Parents
                | Ancestors
                | DirectConnections
                | Connections
                | References
                | ReferencesInbound
                | ReferencesOutbound
                | DirectReferences
                | DirectReferencesInbound
                | DirectReferencesOutbound
        )
    }
}

/// Argument segments a url token consumes; 0 for anything that is not a
/// configurable filter head.
pub fn filter_url_part_count(token: &str) -> usize {
    ConfigurableFilterType::parse(token)
        .map(|kind| kind.url_part_count())
        .unwrap_or(0)
}

/// Group a flat run of url segments into whole filter names, consuming
/// arguments recursively.
pub fn group_filter_parts(parts: &[&str]) -> Vec<String> {
    let mut filters = Vec::new();
    let mut i = 0;
    while i < parts.len() {
        let start = i;
        let mut remaining = filter_url_part_count(parts[i]);
        i += 1;
        while remaining > 0 && i < parts.len() {
            remaining -= 1;
            remaining += filter_url_part_count(parts[i]);
            i += 1;
        }
        filters.push(parts[start..i].join("/"));
    }
    filters
}

// ─────────────────────────────────────────────
// Simple filters
// ─────────────────────────────────────────────

type SimplePredicate = fn(&Card) -> bool;

static SIMPLE_FILTERS: Lazy<HashMap<&'static str, SimplePredicate>> = Lazy::new(|| {
    let mut m: HashMap<&'static str, SimplePredicate> = HashMap::new();
    m.insert("all-cards", |_| true);
    m.insert("has-content", |c| !c.body.trim().is_empty());
    m.insert("has-body", |c| !c.body.trim().is_empty());
    m.insert("published", |c| c.published);
    m.insert("orphaned", |c| c.section.is_empty());
    m.insert("has-links", |c| !c.refs().links().is_empty());
    m.insert("has-inbound-links", |c| !c.refs_inbound().links().is_empty());
    m.insert("has-slug", |c| !c.slugs.is_empty());
    m.insert("has-comments", |c| c.thread_count > 0);
    m.insert("has-substantive-references", |c| {
        !c.refs().substantive_ids().is_empty()
    });
    m.insert("has-todo", |c| !c.todo.trim().is_empty());
    m.insert("has-tags", |c| !c.tags.is_empty());
    m.insert("has-all-reciprocal-links", |c| {
        c.missing_reciprocal_links().is_empty()
    });
    m.insert("needs-reciprocal-links", |c| c.needs_reciprocal_links());
    m.insert("type-content", |c| c.card_type == CardType::Content);
    m.insert("type-section-head", |c| c.card_type == CardType::SectionHead);
    m.insert("type-working-notes", |c| c.card_type == CardType::WorkingNotes);
    m.insert("type-concept", |c| c.card_type == CardType::Concept);
    m
});

static INVERSE_FILTER_NAMES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("none", "all-cards");
    m.insert("no-content", "has-content");
    m.insert("no-body", "has-body");
    m.insert("unpublished", "published");
    m.insert("not-orphaned", "orphaned");
    m.insert("no-links", "has-links");
    m.insert("no-inbound-links", "has-inbound-links");
    m.insert("no-slug", "has-slug");
    m.insert("no-comments", "has-comments");
    m.insert("no-substantive-references", "has-substantive-references");
    m.insert("no-todo", "has-todo");
    m.insert("no-tags", "has-tags");
    m.insert("missing-reciprocal-links", "has-all-reciprocal-links");
    m.insert("does-not-need-reciprocal-links", "needs-reciprocal-links");
    m.insert("not-type-content", "type-content");
    m.insert("not-type-section-head", "type-section-head");
    m.insert("not-type-working-notes", "type-working-notes");
    m.insert("not-type-concept", "type-concept");
    m
});

// ─────────────────────────────────────────────
// CompiledFilter
// ─────────────────────────────────────────────

pub type FilterFn = Box<dyn Fn(&Card, &FilterExtras) -> MatchResult + Send + Sync>;

/// A compiled filter expression.
///
/// `invert_output` signals that the predicate's raw answer is to be read
/// inverted (inverse names, `exclude`); the pipeline resolves it through
/// [`FilterMembership::contains`].
pub struct CompiledFilter {
    pub func: FilterFn,
    pub invert_output: bool,
    /// Sort values are hop distances: nearest first when used for ordering.
    pub is_link_style: bool,
}

impl CompiledFilter {
    fn new(func: FilterFn) -> Self {
        Self {
            func,
            invert_output: false,
            is_link_style: false,
        }
    }

    fn simple(pred: SimplePredicate, invert_output: bool) -> Self {
        Self {
            func: Box::new(move |card, _| MatchResult::matched(pred(card))),
            invert_output,
            is_link_style: false,
        }
    }

    fn never() -> Self {
        Self::simple(|_| false, false)
    }
}

/// Compile one concrete (non-union) filter name. Unknown names degrade to a
/// match-everything no-op so a stale bookmark cannot blank a whole
/// collection.
pub fn build_filter(name: &str) -> CompiledFilter {
    if let Some(base) = INVERSE_FILTER_NAMES.get(name) {
        if let Some(pred) = SIMPLE_FILTERS.get(base) {
            return CompiledFilter::simple(*pred, true);
        }
    }
    if let Some(pred) = SIMPLE_FILTERS.get(name) {
        return CompiledFilter::simple(*pred, false);
    }

    let parts: Vec<&str> = name.split('/').collect();
    let args = &parts[1..];
    match ConfigurableFilterType::parse(parts[0]) {
        Some(
            kind @ (Children | Descendants | Parents | Ancestors | DirectConnections
            | Connections | References | ReferencesInbound | ReferencesOutbound
            | DirectReferences | DirectReferencesInbound | DirectReferencesOutbound),
        ) => build_link(kind, args, name),
        Some(kind @ (Updated | LastTweeted | Before | After | Between)) => {
            build_date(kind, args, name)
        }
        Some(Author) => build_author(args, name),
        Some(Cards) => build_cards(args, name),
        Some(Query) => build_query(args, false),
        Some(QueryStrict) => build_query(args, true),
        Some(Similar) => build_similar(args, name, None),
        Some(SimilarCutoff) => build_similar(&args[..args.len().min(1)], name, args.get(1).copied()),
        Some(AboutConcept) => build_about_concept(args),
        Some(MissingConcept) => build_missing_concept(args),
        Some(SameType) => build_type_comparison(args, true),
        Some(DifferentType) => build_type_comparison(args, false),
        Some(Exclude) => build_exclude(args, name),
        Some(Combine) => build_combine(args, name),
        Some(Expand) => build_expand(args, name),
        Some(Limit | Offset) => CompiledFilter::simple(|_| true, false),
        None => {
            warn!(filter = %name, "unknown filter name, treating as a no-op");
            CompiledFilter::simple(|_| true, false)
        }
    }
}

// ─────────────────────────────────────────────
// Date filters
// ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum DateOp {
    Before(DateTime<Utc>),
    After(DateTime<Utc>),
    Between(DateTime<Utc>, DateTime<Utc>),
    Never,
}

fn parse_date(raw: Option<&str>) -> Option<DateTime<Utc>> {
    NaiveDate::parse_from_str(raw?, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| ndt.and_utc())
}

fn build_date(kind: ConfigurableFilterType, args: &[&str], name: &str) -> CompiledFilter {
    // `updated`/`last-tweeted` pick the property and re-dispatch on the
    // comparison token; the bare comparisons default to substantive update.
    let (field, op_name, dates): (TimestampField, &str, &[&str]) = match kind {
        Updated => match args.split_first() {
            Some((op, rest)) => (TimestampField::UpdatedSubstantive, *op, rest),
            None => (TimestampField::UpdatedSubstantive, "", args),
        },
        LastTweeted => match args.split_first() {
            Some((op, rest)) => (TimestampField::LastTweeted, *op, rest),
            None => (TimestampField::LastTweeted, "", args),
        },
        _ => (TimestampField::UpdatedSubstantive, kind.as_str(), args),
    };

    let op = match op_name {
        "before" => parse_date(dates.first().copied()).map(DateOp::Before),
        "after" => parse_date(dates.first().copied()).map(DateOp::After),
        "between" => {
            let a = parse_date(dates.first().copied());
            let b = parse_date(dates.get(1).copied());
            match (a, b) {
                (Some(a), Some(b)) => Some(DateOp::Between(a.min(b), a.max(b))),
                _ => None,
            }
        }
        _ => None,
    }
    .unwrap_or_else(|| {
        warn!(filter = %name, "unparseable date filter, matching nothing");
        DateOp::Never
    });

    CompiledFilter::new(Box::new(move |card, _| {
        let ts = match card.timestamp(field) {
            Some(ts) => ts,
            None => return MatchResult::matched(false),
        };
        let matches = match op {
            DateOp::Before(d) => ts < d,
            DateOp::After(d) => ts > d,
            DateOp::Between(lo, hi) => ts > lo && ts < hi,
            DateOp::Never => false,
        };
        MatchResult::matched(matches)
    }))
}

// ─────────────────────────────────────────────
// Link filters
// ─────────────────────────────────────────────

#[derive(Debug, Clone)]
struct LinkSpec {
    raw_ids: Vec<String>,
    include_key: bool,
    ply: u32,
    direction: TraversalDirection,
    types: Option<BTreeSet<ReferenceType>>,
}

fn parse_ply(arg: Option<&&str>) -> u32 {
    arg.and_then(|s| s.parse().ok()).unwrap_or(1)
}

fn parse_reference_types(arg: Option<&&str>, name: &str) -> Option<BTreeSet<ReferenceType>> {
    let raw = *arg?;
    let (invert, raw) = match raw.strip_prefix(INVERT_REFERENCE_TYPES_PREFIX) {
        Some(rest) => (true, rest),
        None => (false, raw),
    };
    let mut types = BTreeSet::new();
    for part in raw.split(UNION_FILTER_DELIMITER).filter(|p| !p.is_empty()) {
        match ReferenceType::parse(part) {
            Ok(t) => {
                types.insert(t);
            }
            Err(_) => warn!(filter = %name, reference_type = %part, "unknown reference type"),
        }
    }
    if invert {
        types = ReferenceType::ALL
            .into_iter()
            .filter(|t| !types.contains(t))
            .collect();
    }
    if types.is_empty() {
        warn!(filter = %name, "no recognized reference types, following all");
        return None;
    }
    Some(types)
}

fn parse_link_spec(kind: ConfigurableFilterType, args: &[&str], name: &str) -> LinkSpec {
    let raw = args.first().copied().unwrap_or("");
    let (include_key, raw) = match raw.strip_prefix(INCLUDE_KEY_CARD_PREFIX) {
        Some(rest) => (true, rest),
        None => (false, raw),
    };
    let raw_ids: Vec<String> = raw
        .split(UNION_FILTER_DELIMITER)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();

    let (direction, ply, types) = match kind {
        Children => (TraversalDirection::Outbound, 1, None),
        Descendants => (TraversalDirection::Outbound, parse_ply(args.get(1)), None),
        Parents => (TraversalDirection::Inbound, 1, None),
        Ancestors => (TraversalDirection::Inbound, parse_ply(args.get(1)), None),
        DirectConnections => (TraversalDirection::Both, 1, None),
        Connections => (TraversalDirection::Both, parse_ply(args.get(1)), None),
        References => (
            TraversalDirection::Both,
            parse_ply(args.get(2)),
            parse_reference_types(args.get(1), name),
        ),
        ReferencesInbound => (
            TraversalDirection::Inbound,
            parse_ply(args.get(2)),
            parse_reference_types(args.get(1), name),
        ),
        ReferencesOutbound => (
            TraversalDirection::Outbound,
            parse_ply(args.get(2)),
            parse_reference_types(args.get(1), name),
        ),
        DirectReferences => (
            TraversalDirection::Both,
            1,
            parse_reference_types(args.get(1), name),
        ),
        DirectReferencesInbound => (
            TraversalDirection::Inbound,
            1,
            parse_reference_types(args.get(1), name),
        ),
        DirectReferencesOutbound => (
            TraversalDirection::Outbound,
            1,
            parse_reference_types(args.get(1), name),
        ),
        _ => (TraversalDirection::Outbound, 1, None),
    };

    LinkSpec {
        raw_ids,
        include_key,
        ply,
        direction,
        types,
    }
}

fn resolve_seed_ids(raw_ids: &[String], extras: &FilterExtras) -> Vec<String> {
    raw_ids
        .iter()
        .map(|raw| {
            if raw == KEY_CARD_ID_PLACEHOLDER {
                extras.key_card_id.clone()
            } else {
                raw.clone()
            }
        })
        .collect()
}

fn build_link(kind: ConfigurableFilterType, args: &[&str], name: &str) -> CompiledFilter {
    let spec = parse_link_spec(kind, args, name);
    if spec.raw_ids.is_empty() {
        warn!(filter = %name, "link filter without a card argument, matching nothing");
        return CompiledFilter::never();
    }
    let name = name.to_string();
    let mut compiled = CompiledFilter::new(Box::new(move |card, extras| {
        let seeds = resolve_seed_ids(&spec.raw_ids, extras);
        let config = BfsConfig {
            ply: spec.ply,
            direction: spec.direction,
            reference_types: spec.types.clone(),
            include_seeds: spec.include_key,
        };
        let cache_key = format!("{name}|{}|{}", extras.key_card_id, extras.user_id);
        let distances = extras
            .caches
            .distances_for(extras.cards, &cache_key, || {
                card_bfs(extras.cards, &seeds, &config)
            });
        match distances.get(&card.id) {
            Some(d) => MatchResult::with_value(true, *d as f64),
            None => MatchResult::matched(false),
        }
    }));
    compiled.is_link_style = true;
    compiled
}

// ─────────────────────────────────────────────
// Card / author filters
// ─────────────────────────────────────────────

fn build_cards(args: &[&str], name: &str) -> CompiledFilter {
    let raw_ids: Vec<String> = args
        .first()
        .map(|raw| {
            raw.split(UNION_FILTER_DELIMITER)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if raw_ids.is_empty() {
        warn!(filter = %name, "cards filter without ids, matching nothing");
        return CompiledFilter::never();
    }
    CompiledFilter::new(Box::new(move |card, extras| {
        let matches = raw_ids.iter().any(|raw| {
            let ident = if raw == KEY_CARD_ID_PLACEHOLDER {
                extras.key_card_id.as_str()
            } else {
                raw.as_str()
            };
            card.answers_to(ident)
        });
        MatchResult::matched(matches)
    }))
}

fn build_author(args: &[&str], name: &str) -> CompiledFilter {
    let authors: Vec<String> = args
        .first()
        .map(|raw| {
            raw.split(UNION_FILTER_DELIMITER)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if authors.is_empty() {
        warn!(filter = %name, "author filter without ids, matching nothing");
        return CompiledFilter::never();
    }
    CompiledFilter::new(Box::new(move |card, extras| {
        let matches = authors.iter().any(|author| {
            let author = if author == ME_AUTHOR_ID {
                extras.user_id.as_str()
            } else {
                author.as_str()
            };
            !author.is_empty()
                && (card.author.eq_ignore_ascii_case(author)
                    || card
                        .collaborators
                        .iter()
                        .any(|c| c.eq_ignore_ascii_case(author)))
        });
        MatchResult::matched(matches)
    }))
}

// ─────────────────────────────────────────────
// Text filters
// ─────────────────────────────────────────────

fn build_query(args: &[&str], strict: bool) -> CompiledFilter {
    let text = decode_query_text(args.first().copied().unwrap_or(""));
    let query = PreparedQuery::new(&text, &Stemmer::new());
    CompiledFilter::new(Box::new(move |card, _| {
        let (score, full_match) = query.card_score(card);
        let matches = if strict {
            full_match && score > 0.0
        } else {
            score > 0.0
        };
        MatchResult {
            matches,
            sort_value: Some(score),
            partial: !full_match,
        }
    }))
}

fn build_similar(args: &[&str], name: &str, cutoff_arg: Option<&str>) -> CompiledFilter {
    let raw = args.first().copied().unwrap_or("");
    let (include_key, raw) = match raw.strip_prefix(INCLUDE_KEY_CARD_PREFIX) {
        Some(rest) => (true, rest),
        None => (false, raw),
    };
    let raw_ids: Vec<String> = raw
        .split(UNION_FILTER_DELIMITER)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    if raw_ids.is_empty() {
        warn!(filter = %name, "similarity filter without a card argument, matching nothing");
        return CompiledFilter::never();
    }
    let cutoff: Option<f64> = cutoff_arg.map(|raw| {
        raw.parse().unwrap_or_else(|_| {
            warn!(filter = %name, cutoff = %raw, "unparseable similarity cutoff, using 0");
            0.0
        })
    });
    let name = name.to_string();
    CompiledFilter::new(Box::new(move |card, extras| {
        let seeds: Vec<CardId> = raw_ids
            .iter()
            .map(|raw| extras.resolve_card_arg(raw))
            .collect();
        // Seed cards never rank against themselves; they pin to the ends.
        if seeds.iter().any(|s| card.id == *s) {
            return if include_key {
                MatchResult::with_value(true, f64::MAX)
            } else {
                MatchResult::with_value(false, f64::MIN)
            };
        }
        let cache_key = format!("{name}|{}", extras.key_card_id);
        let overlaps = extras.caches.overlaps_for(extras.cards, &cache_key, || {
            let generator = extras.caches.fingerprints_for(extras.cards);
            let target = generator.fingerprint_for_cards(&seeds);
            let exclude: BTreeSet<CardId> = seeds.iter().cloned().collect();
            generator.closest_overlapping(&target, &exclude)
        });
        let value = overlaps.get(&card.id).copied().unwrap_or(0.0);
        // Plain similarity is a ranking over every non-seed card; only the
        // cutoff variant gates membership, and a zero overlap never passes.
        let matches = match cutoff {
            Some(c) => value != 0.0 && value > c,
            None => true,
        };
        MatchResult {
            matches,
            sort_value: Some(value),
            partial: false,
        }
    }))
}

// ─────────────────────────────────────────────
// Concept filters
// ─────────────────────────────────────────────

fn build_about_concept(args: &[&str]) -> CompiledFilter {
    let raw = args
        .first()
        .copied()
        .unwrap_or(KEY_CARD_ID_PLACEHOLDER)
        .to_string();
    CompiledFilter::new(Box::new(move |card, extras| {
        let concept_id = extras.resolve_card_arg(&raw);
        let concept = match extras.cards.get(&concept_id) {
            Some(c) => c,
            None => return MatchResult::matched(false),
        };
        if card.id == concept.id {
            return MatchResult::with_value(true, 1.0);
        }
        let matches = card
            .refs()
            .ids_of_type(ReferenceType::Concept)
            .into_iter()
            .any(|id| *id == concept.id);
        MatchResult::matched(matches)
    }))
}

fn build_missing_concept(args: &[&str]) -> CompiledFilter {
    let raw = args
        .first()
        .copied()
        .unwrap_or(ALL_CONCEPTS_TOKEN)
        .to_string();
    CompiledFilter::new(Box::new(move |card, extras| {
        let concepts = extras.caches.concepts_for(extras.cards);
        let suggestions = concepts.suggested_concept_references(card);
        if raw == ALL_CONCEPTS_TOKEN {
            MatchResult {
                matches: !suggestions.is_empty(),
                sort_value: Some(suggestions.len() as f64),
                partial: false,
            }
        } else {
            let target = extras.resolve_card_arg(&raw);
            let count = suggestions.iter().filter(|id| **id == target).count();
            MatchResult {
                matches: count > 0,
                sort_value: Some(count as f64),
                partial: false,
            }
        }
    }))
}

fn build_type_comparison(args: &[&str], same: bool) -> CompiledFilter {
    let raw = args
        .first()
        .copied()
        .unwrap_or(KEY_CARD_ID_PLACEHOLDER)
        .to_string();
    CompiledFilter::new(Box::new(move |card, extras| {
        let reference_id = extras.resolve_card_arg(&raw);
        let matches = match extras.cards.get(&reference_id) {
            Some(reference) => (card.card_type == reference.card_type) == same,
            None => false,
        };
        MatchResult::matched(matches)
    }))
}

// ─────────────────────────────────────────────
// Set-algebra filters
// ─────────────────────────────────────────────

fn build_exclude(args: &[&str], name: &str) -> CompiledFilter {
    let sub = args.join("/");
    if sub.is_empty() {
        warn!(filter = %name, "exclude without a sub-filter, matching nothing");
        return CompiledFilter::never();
    }
    let mut compiled = CompiledFilter::new(Box::new(move |card, extras| {
        MatchResult::matched(filter_membership(&sub, extras).contains(&card.id))
    }));
    compiled.invert_output = true;
    compiled
}

fn build_combine(args: &[&str], name: &str) -> CompiledFilter {
    let subs = group_filter_parts(args);
    if subs.len() != 2 {
        warn!(filter = %name, found = subs.len(), "combine expects two sub-filters, matching nothing");
        return CompiledFilter::never();
    }
    CompiledFilter::new(Box::new(move |card, extras| {
        let matches = subs
            .iter()
            .any(|sub| filter_membership(sub, extras).contains(&card.id));
        MatchResult::matched(matches)
    }))
}

fn build_expand(args: &[&str], name: &str) -> CompiledFilter {
    let subs = group_filter_parts(args);
    let main = subs.first().cloned().unwrap_or_default();
    let expansion = subs.get(1).cloned().unwrap_or_default();
    if main.is_empty() || expansion.is_empty() {
        warn!(filter = %name, "expand expects a main filter and an expansion filter, matching nothing");
        return CompiledFilter::never();
    }
    let name = name.to_string();
    CompiledFilter::new(Box::new(move |card, extras| {
        let base = filter_membership(&main, extras);
        if base.contains(&card.id) {
            return MatchResult::matched(true);
        }
        // The main sub-filter can depend on the requesting user, so the
        // expansion is keyed the same way the membership cache is.
        let cache_key = format!("{name}|{}|{}", extras.key_card_id, extras.user_id);
        let expanded = extras.caches.expansion_for(extras.cards, &cache_key, || {
            expand_members(&base, &expansion, extras)
        });
        MatchResult::matched(expanded.contains(&card.id))
    }))
}

/// Run the expansion filter re-seeded from the main filter's members.
fn expand_members(
    base: &FilterMembership,
    expansion: &str,
    extras: &FilterExtras,
) -> BTreeSet<CardId> {
    let seeds: Vec<String> = base.concrete_members(extras.cards).into_iter().collect();
    let parts: Vec<&str> = expansion.split('/').collect();
    match ConfigurableFilterType::parse(parts[0]) {
        Some(kind) if kind.is_link_kind() => {
            let spec = parse_link_spec(kind, &parts[1..], expansion);
            let config = BfsConfig {
                ply: spec.ply,
                direction: spec.direction,
                reference_types: spec.types,
                include_seeds: true,
            };
            card_bfs(extras.cards, &seeds, &config)
                .into_keys()
                .collect()
        }
        Some(SimilarCutoff) => {
            let cutoff: f64 = parts.get(2).and_then(|s| s.parse().ok()).unwrap_or(0.0);
            let generator = extras.caches.fingerprints_for(extras.cards);
            let seed_set: BTreeSet<CardId> = seeds.iter().cloned().collect();
            let target = generator.fingerprint_for_cards(&seeds);
            generator
                .closest_overlapping(&target, &seed_set)
                .into_iter()
                .filter(|(_, value)| *value > cutoff)
                .map(|(id, _)| id)
                .collect()
        }
        _ => {
            warn!(filter = %expansion, "unsupported expansion filter, expanding nothing");
            BTreeSet::new()
        }
    }
}

// ─────────────────────────────────────────────
// Membership evaluation
// ─────────────────────────────────────────────

/// Materialize a filter expression (possibly a `+` union of simple names)
/// against the snapshot, memoized per generation.
pub fn filter_membership(expr: &str, extras: &FilterExtras) -> Arc<FilterMembership> {
    let key = format!("{expr}|{}|{}", extras.key_card_id, extras.user_id);
    extras
        .caches
        .membership_for(extras.cards, &key, || compute_membership(expr, extras))
}

fn compute_membership(expr: &str, extras: &FilterExtras) -> FilterMembership {
    // Union names only ever join argument-less filters, so a slash means
    // any `+` belongs to an argument instead.
    if !expr.contains('/') && expr.contains(UNION_FILTER_DELIMITER) {
        let mut members = BTreeSet::new();
        for name in expr.split(UNION_FILTER_DELIMITER).filter(|n| !n.is_empty()) {
            let compiled = extras.caches.compile(name);
            let single = evaluate_single(&compiled, extras);
            members.extend(single.concrete_members(extras.cards));
        }
        return FilterMembership {
            members,
            ..Default::default()
        };
    }
    let compiled = extras.caches.compile(expr);
    evaluate_single(&compiled, extras)
}

fn evaluate_single(compiled: &CompiledFilter, extras: &FilterExtras) -> FilterMembership {
    let mut membership = FilterMembership {
        reversed: compiled.invert_output,
        sort_flipped: compiled.is_link_style,
        ..Default::default()
    };
    let mut sort_values = HashMap::new();
    for (id, card) in extras.cards.iter() {
        let result = (compiled.func)(card, extras);
        if let Some(value) = result.sort_value {
            sort_values.insert(id.clone(), value);
        }
        if result.matches {
            membership.members.insert(id.clone());
            if result.partial {
                membership.partials.insert(id.clone());
            }
        }
    }
    if !sort_values.is_empty() {
        membership.sort_values = Some(sort_values);
    }
    membership
}
