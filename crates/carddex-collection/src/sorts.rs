use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use carddex_graph::{Card, CardId};

use crate::extras::FilterMembership;

// ─────────────────────────────────────────────
// SortName
// ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SortName {
    /// Ranking values emitted by the filters, else the base set order.
    #[default]
    Default,
    OriginalOrder,
    /// Most recent of comment / substantive update activity.
    Recent,
    Stars,
    Updated,
    Created,
    Commented,
    LinkCount,
    TweetCount,
    LastTweeted,
    /// Stable shuffle, salted per viewing session.
    Random,
    /// PageRank over the snapshot's link graph.
    CardRank,
}

impl SortName {
    pub const ALL: [SortName; 12] = [
        SortName::Default,
        SortName::OriginalOrder,
        SortName::Recent,
        SortName::Stars,
        SortName::Updated,
        SortName::Created,
        SortName::Commented,
        SortName::LinkCount,
        SortName::TweetCount,
        SortName::LastTweeted,
        SortName::Random,
        SortName::CardRank,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SortName::Default => "default",
            SortName::OriginalOrder => "original-order",
            SortName::Recent => "recent",
            SortName::Stars => "stars",
            SortName::Updated => "updated",
            SortName::Created => "created",
            SortName::Commented => "commented",
            SortName::LinkCount => "link-count",
            SortName::TweetCount => "tweet-count",
            SortName::LastTweeted => "last-tweeted",
            SortName::Random => "random",
            SortName::CardRank => "card-rank",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|name| name.as_str() == s)
    }
}

// ─────────────────────────────────────────────
// Sort values
// ─────────────────────────────────────────────

/// Everything a sort extractor may consult besides the card.
pub struct SortContext<'a> {
    /// Position of each card in the pre-filter base order.
    pub base_index: &'a HashMap<CardId, usize>,
    /// First filter (left to right) that emitted ranking values, if any.
    pub sort_extra: Option<&'a FilterMembership>,
    pub random_salt: &'a str,
    pub page_ranks: Option<&'a HashMap<CardId, f64>>,
}

/// The ranking value for one card; collections order descending by this,
/// then by section and id for a total order.
pub fn sort_value(sort: SortName, card: &Card, ctx: &SortContext) -> f64 {
    match sort {
        SortName::Default => match ctx.sort_extra.and_then(|m| m.sort_values.as_ref()) {
            Some(values) => {
                let value = values.get(&card.id).copied().unwrap_or(0.0);
                // Hop distances rank nearest first
                if ctx.sort_extra.is_some_and(|m| m.sort_flipped) {
                    -value
                } else {
                    value
                }
            }
            None => base_order_value(card, ctx),
        },
        SortName::OriginalOrder => base_order_value(card, ctx),
        SortName::Recent => millis(card.last_activity()),
        SortName::Stars => card.star_count as f64,
        SortName::Updated => millis(card.updated_substantive),
        SortName::Created => millis(card.created),
        SortName::Commented => millis(card.updated_message),
        SortName::LinkCount => card.refs_inbound().links().len() as f64,
        SortName::TweetCount => card.tweet_count as f64,
        SortName::LastTweeted => millis(card.last_tweeted),
        SortName::Random => salted_hash(&card.id, ctx.random_salt),
        SortName::CardRank => ctx
            .page_ranks
            .and_then(|ranks| ranks.get(&card.id))
            .copied()
            .unwrap_or(0.0),
    }
}

fn base_order_value(card: &Card, ctx: &SortContext) -> f64 {
    match ctx.base_index.get(&card.id) {
        Some(&index) => (ctx.base_index.len() - index) as f64,
        None => 0.0,
    }
}

fn millis(ts: Option<chrono::DateTime<chrono::Utc>>) -> f64 {
    ts.map(|t| t.timestamp_millis() as f64).unwrap_or(0.0)
}

fn salted_hash(id: &str, salt: &str) -> f64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    id.hash(&mut hasher);
    salt.hash(&mut hasher);
    hasher.finish() as f64
}
