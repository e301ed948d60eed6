//! In-memory filter and sort for meditation lists.
//!
//! Pure and synchronous: callers recompute on every change of search text,
//! tag selection or sort order. Title search is a case-insensitive substring
//! match; the tag filter is conjunctive (an item must carry every selected tag).

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::model::{Meditation, MeditationView};

/// What the filter needs to know about a list item.
pub trait Listable {
    fn title(&self) -> &str;
    fn tags(&self) -> &[String];
    fn created_at(&self) -> DateTime<Utc>;
}

impl Listable for Meditation {
    fn title(&self) -> &str { &self.title }
    fn tags(&self) -> &[String] { &self.tags }
    fn created_at(&self) -> DateTime<Utc> { self.created_at }
}

impl Listable for MeditationView {
    fn title(&self) -> &str { &self.meditation.title }
    fn tags(&self) -> &[String] { &self.meditation.tags }
    fn created_at(&self) -> DateTime<Utc> { self.meditation.created_at }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Newest,
    Oldest,
}

impl SortOrder {
    pub fn toggle(self) -> Self {
        match self {
            SortOrder::Newest => SortOrder::Oldest,
            SortOrder::Oldest => SortOrder::Newest,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "newest" | "desc" => Some(SortOrder::Newest),
            "oldest" | "asc" => Some(SortOrder::Oldest),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub search: String,
    pub tags: BTreeSet<String>,
    pub sort: SortOrder,
}

impl ListQuery {
    /// Select a tag if unselected, unselect it otherwise.
    pub fn toggle_tag(&mut self, tag: &str) {
        if !self.tags.remove(tag) {
            self.tags.insert(tag.to_string());
        }
    }

    pub fn toggle_sort(&mut self) { self.sort = self.sort.toggle(); }

    /// True when search text or a tag narrows the list.
    pub fn is_filtering(&self) -> bool { !self.search.is_empty() || !self.tags.is_empty() }

    pub fn matches<T: Listable>(&self, item: &T) -> bool {
        let needle = self.search.to_lowercase();
        if !item.title().to_lowercase().contains(&needle) { return false; }
        self.tags.iter().all(|t| item.tags().iter().any(|have| have == t))
    }

    /// Filtered and sorted view over `items`.
    pub fn apply<'a, T: Listable>(&self, items: &'a [T]) -> Vec<&'a T> {
        let mut out: Vec<&T> = items.iter().filter(|m| self.matches(*m)).collect();
        match self.sort {
            SortOrder::Newest => out.sort_by(|a, b| b.created_at().cmp(&a.created_at())),
            SortOrder::Oldest => out.sort_by(|a, b| a.created_at().cmp(&b.created_at())),
        }
        out
    }
}

/// De-duplicated union of all tags, lexicographically ordered.
pub fn tag_universe<T: Listable>(items: &[T]) -> Vec<String> {
    items
        .iter()
        .flat_map(|m| m.tags().iter().cloned())
        .collect::<BTreeSet<String>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
#[path = "filter_tests.rs"]
mod filter_tests;
