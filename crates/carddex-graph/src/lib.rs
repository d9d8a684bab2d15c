//! # carddex-graph
//!
//! Card graph core for CardDex.
//!
//! Provides the data model and traversal primitives the collection engine
//! is built on:
//! - [`model::Card`]: typed card with dual reference maps
//! - [`references`]: accessor views, mutation, legality, diffing
//! - [`set::CardSet`]: immutable generation-numbered snapshot
//! - [`traversal::card_bfs`]: multi-source bounded BFS over references

pub mod error;
pub mod model;
pub mod references;
pub mod set;
pub mod traversal;

pub use error::GraphError;
pub use model::{
    Card, CardId, CardType, NormalizedFields, ReferenceIndex, ReferenceType, ReferencesInfo, Slug,
    TimestampField,
};
pub use references::{
    apply_references_diff, references_cards_diff, references_diff, references_legal, FieldUpdate,
    ReferencesDiff, ReferencesView, RECIPROCAL_LINKS_CHECK,
};
pub use set::CardSet;
pub use traversal::{card_bfs, BfsConfig, TraversalDirection};
