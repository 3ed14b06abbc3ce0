//! Translation groups.
//!
//! Items sharing a translation key are translations of each other. The key
//! is the front matter `translation_key` if set, otherwise the item kind plus
//! its tree path with a leading language segment removed, so `blog/a` (en)
//! and `fr/blog/a` (fr) are grouped together. Language roots (`fr`) share
//! the home page's key.

use std::collections::HashMap;

/// Default translation key of an item.
pub(crate) fn default_key(kind: &str, path: &str, lang: &str) -> String {
    let path = match path.split_once('/') {
        Some((first, rest)) if first == lang => rest,
        _ if path == lang => "",
        _ => path,
    };
    if path.is_empty() {
        return "home/".to_owned();
    }
    format!("{kind}/{path}")
}

/// Items grouped by translation key, each group in language order.
#[derive(Debug)]
pub struct TranslationIndex<T> {
    groups: HashMap<String, Vec<T>>,
}

impl<T: Copy> TranslationIndex<T> {
    /// Group `(key, lang, item)` triples.
    ///
    /// Within a group, items follow `language_order`; unknown languages sort
    /// after known ones, by name.
    #[must_use]
    pub fn new(entries: Vec<(String, String, T)>, language_order: &[String]) -> Self {
        let rank = |lang: &str| {
            language_order
                .iter()
                .position(|l| l == lang)
                .unwrap_or(language_order.len())
        };

        let mut grouped: HashMap<String, Vec<(usize, String, usize, T)>> = HashMap::new();
        for (insertion, (key, lang, item)) in entries.into_iter().enumerate() {
            grouped
                .entry(key)
                .or_default()
                .push((rank(&lang), lang, insertion, item));
        }

        let groups = grouped
            .into_iter()
            .map(|(key, mut members)| {
                members.sort_by(|a, b| (a.0, &a.1, a.2).cmp(&(b.0, &b.1, b.2)));
                (key, members.into_iter().map(|(_, _, _, item)| item).collect())
            })
            .collect();
        Self { groups }
    }

    /// Members of the group `key`, self included.
    #[must_use]
    pub fn group(&self, key: &str) -> &[T] {
        self.groups.get(key).map(Vec::as_slice).unwrap_or_default()
    }
}
