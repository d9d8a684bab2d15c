use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GraphError;

/// Cards are identified by opaque string ids. Slugs are human-readable
/// aliases that resolve to ids through [`crate::set::CardSet`].
pub type CardId = String;
pub type Slug = String;

/// The authoritative outbound reference map: target card id → per-type text.
/// An empty string is a legal text value; an empty per-target block is not.
pub type ReferencesInfo = BTreeMap<CardId, BTreeMap<ReferenceType, String>>;

/// Derived boolean index over [`ReferencesInfo`] keys. Every value is `true`;
/// the map exists so membership checks and storage-side queries never have to
/// walk the nested per-type blocks.
pub type ReferenceIndex = BTreeMap<CardId, bool>;

// ─────────────────────────────────────────────
// CardType
// ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CardType {
    #[default]
    Content,
    SectionHead,
    WorkingNotes,
    Concept,
}

impl CardType {
    pub const ALL: [CardType; 4] = [
        CardType::Content,
        CardType::SectionHead,
        CardType::WorkingNotes,
        CardType::Concept,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CardType::Content => "content",
            CardType::SectionHead => "section-head",
            CardType::WorkingNotes => "working-notes",
            CardType::Concept => "concept",
        }
    }

    pub fn parse(s: &str) -> Result<Self, GraphError> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| GraphError::UnknownCardType(s.to_string()))
    }

    /// Working-notes cards derive their title from the body, so the stored
    /// title is not independent searchable text.
    pub fn title_is_derived(&self) -> bool {
        matches!(self, CardType::WorkingNotes)
    }
}

// ─────────────────────────────────────────────
// ReferenceType
// ─────────────────────────────────────────────

/// The closed set of edge kinds a card may carry toward another card.
/// A single (source, target) pair may hold several types at once, each with
/// its own text payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReferenceType {
    /// An inline link in the card body.
    Link,
    /// Editorial cross-reference.
    SeeAlso,
    /// This card duplicates the target.
    DupeOf,
    /// The card is "about" the target concept card.
    Concept,
    /// The card is an example of the target concept.
    Example,
    /// Acknowledgement only; carries no substantive content.
    Ack,
    /// The card is a part of the target.
    PartOf,
}

impl ReferenceType {
    pub const ALL: [ReferenceType; 7] = [
        ReferenceType::Link,
        ReferenceType::SeeAlso,
        ReferenceType::DupeOf,
        ReferenceType::Concept,
        ReferenceType::Example,
        ReferenceType::Ack,
        ReferenceType::PartOf,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceType::Link => "link",
            ReferenceType::SeeAlso => "see-also",
            ReferenceType::DupeOf => "dupe-of",
            ReferenceType::Concept => "concept",
            ReferenceType::Example => "example",
            ReferenceType::Ack => "ack",
            ReferenceType::PartOf => "part-of",
        }
    }

    pub fn parse(s: &str) -> Result<Self, GraphError> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| GraphError::UnknownReferenceType(s.to_string()))
    }

    /// Substantive references count toward "has this card been meaningfully
    /// edited / referenced" checks. `Ack` is the only non-substantive type.
    pub fn is_substantive(&self) -> bool {
        !matches!(self, ReferenceType::Ack)
    }
}

// ─────────────────────────────────────────────
// Timestamps
// ─────────────────────────────────────────────

/// The named timestamp properties a date-range filter may target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimestampField {
    Created,
    Updated,
    UpdatedSubstantive,
    UpdatedMessage,
    LastTweeted,
}

// ─────────────────────────────────────────────
// NormalizedFields
// ─────────────────────────────────────────────

/// Stemmed, normalized word runs derived from a card's text fields.
/// Populated by the NLP layer before a snapshot is queried; every field is a
/// run of lowercase stemmed tokens.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizedFields {
    pub title: Vec<String>,
    pub body: Vec<String>,
    pub subtitle: Vec<String>,
    /// Concatenated text of every inbound `Link` reference pointing here.
    pub inbound_links_text: Vec<String>,
}

impl NormalizedFields {
    /// Every normalized run with the relative weight its field carries in
    /// text scoring: title 1.0, inbound link text 0.95, subtitle 0.75,
    /// body 0.5.
    pub fn weighted_runs(&self) -> [(&[String], f64); 4] {
        [
            (self.title.as_slice(), 1.0),
            (self.inbound_links_text.as_slice(), 0.95),
            (self.subtitle.as_slice(), 0.75),
            (self.body.as_slice(), 0.5),
        ]
    }
}

// ─────────────────────────────────────────────
// Card
// ─────────────────────────────────────────────

/// A single card in the collection graph.
///
/// Reference state is split between the authoritative `references_info`
/// (target → type → text) and the derived boolean index `references`; the
/// mutation methods in [`crate::references`] keep the two in sync and
/// re-validate after every change. The inbound mirrors are maintained by the
/// storage collaborator and treated as read-only here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Card {
    pub id: CardId,
    pub slugs: Vec<Slug>,
    pub card_type: CardType,

    pub title: String,
    pub subtitle: String,
    pub body: String,
    pub section: String,
    pub tags: Vec<String>,
    pub notes: String,
    pub todo: String,

    pub author: String,
    pub collaborators: Vec<String>,
    pub published: bool,

    pub star_count: u32,
    pub thread_count: u32,
    pub tweet_count: u32,
    pub sort_order: f64,

    pub created: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub updated_substantive: Option<DateTime<Utc>>,
    pub updated_message: Option<DateTime<Utc>>,
    pub last_tweeted: Option<DateTime<Utc>>,

    pub references_info: ReferencesInfo,
    pub references: ReferenceIndex,
    pub references_info_inbound: ReferencesInfo,
    pub references_inbound: ReferenceIndex,

    /// Manual overrides for auto-generated TODO checks, keyed by check name.
    pub auto_todo_overrides: BTreeMap<String, bool>,
    /// Inbound links explicitly dismissed from the reciprocal-link check.
    pub auto_todo_skipped_links_inbound: Vec<CardId>,

    pub normalized: NormalizedFields,
}

impl Card {
    pub fn new(id: impl Into<CardId>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn timestamp(&self, field: TimestampField) -> Option<DateTime<Utc>> {
        match field {
            TimestampField::Created => self.created,
            TimestampField::Updated => self.updated,
            TimestampField::UpdatedSubstantive => self.updated_substantive,
            TimestampField::UpdatedMessage => self.updated_message,
            TimestampField::LastTweeted => self.last_tweeted,
        }
    }

    /// The most recent of the message / substantive update timestamps.
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        match (self.updated_message, self.updated_substantive) {
            (Some(m), Some(s)) => Some(m.max(s)),
            (m, s) => m.or(s),
        }
    }

    pub fn has_slug(&self, slug: &str) -> bool {
        self.slugs.iter().any(|s| s == slug)
    }

    /// True when `identifier` is this card's id or one of its slugs.
    pub fn answers_to(&self, identifier: &str) -> bool {
        self.id == identifier || self.has_slug(identifier)
    }
}
