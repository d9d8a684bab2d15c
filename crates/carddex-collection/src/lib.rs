//! Collection resolution over a card graph snapshot.
//!
//! A collection is described declaratively by a URL-shaped path: a named
//! base set, a chain of filters, and a sort. This crate parses those
//! descriptions, compiles the filter expressions against a configurable
//! registry, and resolves them into ordered card id lists, memoizing the
//! expensive intermediates per snapshot generation.

pub mod collection;
pub mod description;
pub mod extras;
pub mod filters;
pub mod sorts;

pub use collection::{resolve_collection, ResolvedCollection};
pub use description::{CollectionDescription, SetName};
pub use extras::{EvalCaches, FilterExtras, FilterMembership, MatchResult};
pub use filters::{
    build_filter, filter_membership, group_filter_parts, CompiledFilter, ConfigurableFilterType,
};
pub use sorts::{sort_value, SortContext, SortName};
