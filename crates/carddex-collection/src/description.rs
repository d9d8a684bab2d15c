use tracing::warn;

use crate::sorts::SortName;

pub const SORT_URL_KEYWORD: &str = "sort";
pub const SORT_REVERSED_URL_KEYWORD: &str = "reverse";

// ─────────────────────────────────────────────
// SetName
// ─────────────────────────────────────────────

/// The named base sets a collection can start from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SetName {
    /// The default set of ordinary, section-ordered cards.
    #[default]
    All,
    /// Every card in the snapshot, including orphans.
    Everything,
    /// The user's reading list.
    ReadingList,
}

impl SetName {
    pub const ALL_SETS: [SetName; 3] = [SetName::All, SetName::Everything, SetName::ReadingList];

    pub fn as_str(&self) -> &'static str {
        match self {
            SetName::All => "all",
            SetName::Everything => "everything",
            SetName::ReadingList => "reading-list",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL_SETS.iter().copied().find(|set| set.as_str() == s)
    }
}

// ─────────────────────────────────────────────
// CollectionDescription
// ─────────────────────────────────────────────

/// A parsed collection URL: base set, ordered filter names, sort.
///
/// The canonical serialized form always names the set, sorts the filters
/// lexicographically, elides a non-reversed default sort, and ends with a
/// slash; two descriptions are equivalent iff their canonical forms match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionDescription {
    pub set: SetName,
    pub filters: Vec<String>,
    pub sort: SortName,
    pub sort_reversed: bool,
}

impl CollectionDescription {
    pub fn new(set: SetName) -> Self {
        Self {
            set,
            ..Default::default()
        }
    }

    pub fn with_filters(set: SetName, filters: &[&str]) -> Self {
        Self {
            set,
            filters: filters.iter().map(|f| f.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Parse a full collection path. The whole input is the description;
    /// see [`CollectionDescription::deserialize_with_extra`] for paths that
    /// carry a trailing card selector.
    pub fn deserialize(raw: &str) -> Self {
        let parts: Vec<&str> = raw.split('/').filter(|p| !p.is_empty()).collect();
        Self::from_parts(&parts)
    }

    /// Parse a collection path whose last segment, when the path does not
    /// end in a slash, selects a card within the collection.
    pub fn deserialize_with_extra(raw: &str) -> (Self, Option<String>) {
        let mut parts: Vec<&str> = raw.split('/').collect();
        let extra = match parts.last() {
            Some(last) if !last.is_empty() => parts.pop().map(str::to_string),
            _ => None,
        };
        let parts: Vec<&str> = parts.into_iter().filter(|p| !p.is_empty()).collect();
        (Self::from_parts(&parts), extra)
    }

    fn from_parts(parts: &[&str]) -> Self {
        let mut description = Self::default();
        let mut rest = parts;

        // A recognized set name may lead; anything else is a filter.
        if let Some((first, tail)) = rest.split_first() {
            if let Some(set) = SetName::parse(first) {
                description.set = set;
                rest = tail;
            }
        }

        // Walk filter by filter; the sort keyword only counts at a filter
        // boundary, never inside a filter's own arguments. A later sort
        // clause overrides an earlier one, and filters after it still count.
        let mut i = 0;
        while i < rest.len() {
            if rest[i] == SORT_URL_KEYWORD {
                i += 1;
                description.sort_reversed = false;
                if rest.get(i) == Some(&SORT_REVERSED_URL_KEYWORD) {
                    description.sort_reversed = true;
                    i += 1;
                }
                if let Some(name) = rest.get(i) {
                    match SortName::parse(name) {
                        Some(sort) => description.sort = sort,
                        None => warn!(sort = %name, "unknown sort name, using the default"),
                    }
                    i += 1;
                }
                continue;
            }
            let start = i;
            let mut remaining = crate::filters::filter_url_part_count(rest[i]);
            i += 1;
            while remaining > 0 && i < rest.len() {
                remaining -= 1;
                remaining += crate::filters::filter_url_part_count(rest[i]);
                i += 1;
            }
            description.filters.push(rest[start..i].join("/"));
        }
        description
    }

    pub fn serialize(&self) -> String {
        let mut pieces: Vec<String> = vec![self.set.as_str().to_string()];
        let mut filters = self.filters.clone();
        filters.sort();
        pieces.extend(filters);
        if self.sort != SortName::Default || self.sort_reversed {
            pieces.push(SORT_URL_KEYWORD.to_string());
            if self.sort_reversed {
                pieces.push(SORT_REVERSED_URL_KEYWORD.to_string());
            }
            pieces.push(self.sort.as_str().to_string());
        }
        pieces.push(String::new()); // trailing slash
        pieces.join("/")
    }

    /// Order-insensitive equality of meaning.
    pub fn equivalent(&self, other: &Self) -> bool {
        self.serialize() == other.serialize()
    }

    /// The value of the single `limit/N` or `offset/N` filter, if present.
    /// Extra occurrences are ignored with a diagnostic.
    pub(crate) fn pagination_value(&self, keyword: &str) -> Option<usize> {
        let mut found = None;
        for filter in &self.filters {
            let Some(raw) = filter.strip_prefix(keyword).and_then(|f| f.strip_prefix('/'))
            else {
                continue;
            };
            match (found, raw.parse::<usize>()) {
                (None, Ok(value)) => found = Some(value),
                (Some(_), Ok(_)) => {
                    warn!(filter = %filter, "duplicate pagination filter ignored");
                }
                (_, Err(_)) => {
                    warn!(filter = %filter, "unparseable pagination filter ignored");
                }
            }
        }
        found
    }
}
