//! Next/previous ordering of regular pages.
//!
//! Pages are ordered by weight (ascending, unweighted pages last), then by
//! date (newest first, undated pages last), then by tree insertion order.
//! "Next" points towards the start of the ordering (the newer neighbour),
//! "previous" towards its end.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};

/// Ordering key of a page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SortKey {
    /// Front matter weight (0 = unweighted).
    pub weight: i64,
    /// Content date.
    pub date: Option<DateTime<Utc>>,
    /// Tree insertion position.
    pub ordinal: usize,
}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        let weight = match (self.weight, other.weight) {
            (0, 0) => Ordering::Equal,
            (0, _) => Ordering::Greater,
            (_, 0) => Ordering::Less,
            (a, b) => a.cmp(&b),
        };
        let date = match (self.date, other.date) {
            (Some(a), Some(b)) => b.cmp(&a),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        weight
            .then(date)
            .then_with(|| self.ordinal.cmp(&other.ordinal))
    }
}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Sort `(key, item)` pairs into navigation order and return the items.
pub(crate) fn sorted<T>(mut entries: Vec<(SortKey, T)>) -> Vec<T> {
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries.into_iter().map(|(_, item)| item).collect()
}

/// Neighbours of a page in one ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NextPrev<T> {
    /// Newer neighbour (one position earlier).
    pub next: Option<T>,
    /// Older neighbour (one position later).
    pub prev: Option<T>,
}

impl<T> Default for NextPrev<T> {
    fn default() -> Self {
        Self {
            next: None,
            prev: None,
        }
    }
}

impl<T: Copy> NextPrev<T> {
    fn at(order: &[T], position: usize) -> Self {
        Self {
            next: position.checked_sub(1).map(|i| order[i]),
            prev: order.get(position + 1).copied(),
        }
    }
}

/// Global and per-section orderings of eligible regular pages.
///
/// Items are identified by `T` (page ids inside a site).
#[derive(Debug)]
pub struct NavigationIndex<T> {
    global: Vec<T>,
    positions: HashMap<T, usize>,
    sections: HashMap<T, Vec<T>>,
    section_positions: HashMap<T, (T, usize)>,
}

impl<T: Copy + Eq + std::hash::Hash> NavigationIndex<T> {
    /// Build the index from `(item, section, key)` triples of eligible pages.
    #[must_use]
    pub fn new(entries: Vec<(T, T, SortKey)>) -> Self {
        let mut by_section: HashMap<T, Vec<(SortKey, T)>> = HashMap::new();
        let mut global = Vec::with_capacity(entries.len());
        for (item, section, key) in entries {
            by_section.entry(section).or_default().push((key, item));
            global.push((key, item));
        }

        let global = sorted(global);
        let positions = global.iter().enumerate().map(|(i, &item)| (item, i)).collect();

        let mut sections = HashMap::with_capacity(by_section.len());
        let mut section_positions = HashMap::new();
        for (section, entries) in by_section {
            let order = sorted(entries);
            for (i, &item) in order.iter().enumerate() {
                section_positions.insert(item, (section, i));
            }
            sections.insert(section, order);
        }

        Self {
            global,
            positions,
            sections,
            section_positions,
        }
    }

    /// Every eligible page in global order.
    #[must_use]
    pub fn global(&self) -> &[T] {
        &self.global
    }

    /// Eligible pages of a section, in order.
    #[must_use]
    pub fn section(&self, section: T) -> &[T] {
        self.sections
            .get(&section)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Neighbours of `item` in the global ordering.
    #[must_use]
    pub fn next_prev(&self, item: T) -> NextPrev<T> {
        self.positions
            .get(&item)
            .map(|&i| NextPrev::at(&self.global, i))
            .unwrap_or_default()
    }

    /// Neighbours of `item` within its section.
    #[must_use]
    pub fn next_prev_in_section(&self, item: T) -> NextPrev<T> {
        self.section_positions
            .get(&item)
            .map(|(section, i)| NextPrev::at(self.section(*section), *i))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;

    fn key(weight: i64, date: Option<(i32, u32, u32)>, ordinal: usize) -> SortKey {
        SortKey {
            weight,
            date: date.map(|(y, m, d)| Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()),
            ordinal,
        }
    }

    #[test]
    fn test_sort_weight_then_date_then_ordinal() {
        let entries = vec![
            (key(0, Some((2024, 1, 1)), 0), "old"),
            (key(0, Some((2024, 2, 1)), 1), "new"),
            (key(2, None, 2), "weighted2"),
            (key(1, None, 3), "weighted1"),
            (key(0, None, 4), "undated"),
            (key(0, Some((2024, 2, 1)), 5), "new_tie"),
        ];

        assert_eq!(
            sorted(entries),
            vec!["weighted1", "weighted2", "new", "new_tie", "old", "undated"]
        );
    }

    #[test]
    fn test_blog_scenario() {
        // blog/a dated 2024-01-01, blog/b dated 2024-02-01, both in section 0.
        let index = NavigationIndex::new(vec![
            (1, 0, key(0, Some((2024, 1, 1)), 1)),
            (2, 0, key(0, Some((2024, 2, 1)), 2)),
        ]);

        let b = index.next_prev(2);
        assert_eq!(b, NextPrev { next: None, prev: Some(1) });
        assert_eq!(index.next_prev(1), NextPrev { next: Some(2), prev: None });
        assert_eq!(index.next_prev_in_section(2), b);
        assert_eq!(index.next_prev_in_section(1), index.next_prev(1));
    }

    #[test]
    fn test_next_and_prev_agree() {
        let index = NavigationIndex::new(
            (0..5)
                .map(|i| (i, i % 2, key(0, Some((2024, 1, 1 + u32::try_from(i).unwrap())), i)))
                .collect(),
        );

        for (i, &item) in index.global().iter().enumerate() {
            let np = index.next_prev(item);
            assert_eq!(np.next, i.checked_sub(1).map(|j| index.global()[j]));
            if let Some(next) = np.next {
                assert_eq!(index.next_prev(next).prev, Some(item));
            }
        }
    }

    #[test]
    fn test_sections_are_independent() {
        let index = NavigationIndex::new(vec![
            (1, 10, key(0, None, 1)),
            (2, 20, key(0, None, 2)),
            (3, 10, key(0, None, 3)),
        ]);

        assert_eq!(index.global(), &[1, 2, 3]);
        assert_eq!(index.section(10), &[1, 3]);
        assert_eq!(index.next_prev(1).prev, Some(2));
        assert_eq!(index.next_prev_in_section(1).prev, Some(3));
        assert_eq!(index.next_prev_in_section(2), NextPrev::default());
    }

    #[test]
    fn test_unknown_item_has_no_neighbours() {
        let index = NavigationIndex::new(vec![(1, 0, key(0, None, 0))]);

        assert_eq!(index.next_prev(42), NextPrev::default());
        assert!(index.section(7).is_empty());
    }
}
