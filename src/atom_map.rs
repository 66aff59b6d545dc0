use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::hash::Hash;

use crate::matching::extended_cp_match;

/// Values that can absorb another value of the same type
///
/// Used by [`ExtendedAtomMap::get`] to combine the entries of every key that
/// matches a lookup.
pub trait Merge {
    fn merge(&mut self, other: &Self);
}

impl<T: Clone> Merge for Vec<T> {
    fn merge(&mut self, other: &Self) {
        self.extend_from_slice(other);
    }
}

impl<T: Ord + Clone> Merge for BTreeSet<T> {
    fn merge(&mut self, other: &Self) {
        self.extend(other.iter().cloned());
    }
}

impl<T: Eq + Hash + Clone> Merge for HashSet<T> {
    fn merge(&mut self, other: &Self) {
        self.extend(other.iter().cloned());
    }
}

impl<K: Ord + Clone, V: Clone> Merge for BTreeMap<K, V> {
    fn merge(&mut self, other: &Self) {
        self.extend(other.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
}

/// Map keyed by `category/package`, where keys may be `*` patterns
///
/// Plain and wildcard keys are stored apart. Looking up a plain cp merges
/// its own entry with the entries of every wildcard key matching it;
/// looking up a wildcard key returns just that key's entry.
///
/// ```
/// use portage_depspec::ExtendedAtomMap;
///
/// let mut masks: ExtendedAtomMap<Vec<&str>> = ExtendedAtomMap::new();
/// masks.insert("dev-libs/foo", vec!["=dev-libs/foo-1"]);
/// masks.insert("dev-libs/*", vec!["dev-libs/*::overlay"]);
/// assert_eq!(
///     masks.get("dev-libs/foo"),
///     Some(vec!["=dev-libs/foo-1", "dev-libs/*::overlay"])
/// );
/// assert_eq!(masks.get("dev-libs/bar"), Some(vec!["dev-libs/*::overlay"]));
/// assert_eq!(masks.get("app-misc/bar"), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedAtomMap<V> {
    normal: BTreeMap<String, V>,
    extended: BTreeMap<String, V>,
}

impl<V> Default for ExtendedAtomMap<V> {
    fn default() -> Self {
        ExtendedAtomMap {
            normal: BTreeMap::new(),
            extended: BTreeMap::new(),
        }
    }
}

fn is_extended(cp: &str) -> bool {
    cp.contains('*')
}

impl<V> ExtendedAtomMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    fn side(&self, cp: &str) -> &BTreeMap<String, V> {
        if is_extended(cp) {
            &self.extended
        } else {
            &self.normal
        }
    }

    fn side_mut(&mut self, cp: &str) -> &mut BTreeMap<String, V> {
        if is_extended(cp) {
            &mut self.extended
        } else {
            &mut self.normal
        }
    }

    pub fn insert(&mut self, cp: &str, value: V) -> Option<V> {
        self.side_mut(cp).insert(cp.to_string(), value)
    }

    pub fn remove(&mut self, cp: &str) -> Option<V> {
        self.side_mut(cp).remove(cp)
    }

    /// The entry stored under exactly this key, without wildcard merging
    pub fn get_exact(&self, cp: &str) -> Option<&V> {
        self.side(cp).get(cp)
    }

    pub fn len(&self) -> usize {
        self.normal.len() + self.extended.len()
    }

    pub fn is_empty(&self) -> bool {
        self.normal.is_empty() && self.extended.is_empty()
    }

    pub fn clear(&mut self) {
        self.normal.clear();
        self.extended.clear();
    }

    /// Plain keys first, then wildcard keys
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.normal
            .iter()
            .chain(self.extended.iter())
            .map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.iter().map(|(k, _)| k)
    }
}

impl<V: Default> ExtendedAtomMap<V> {
    /// The entry for `cp`, inserted as `V::default()` when missing
    pub fn get_or_insert_default(&mut self, cp: &str) -> &mut V {
        self.side_mut(cp).entry(cp.to_string()).or_default()
    }
}

impl<V: Merge + Default + Clone> ExtendedAtomMap<V> {
    /// Merged value for `cp`, or `None` when no key matches
    pub fn get(&self, cp: &str) -> Option<V> {
        if is_extended(cp) {
            return self.extended.get(cp).cloned();
        }
        let mut merged = V::default();
        let mut found = false;
        if let Some(value) = self.normal.get(cp) {
            merged.merge(value);
            found = true;
        }
        for (pattern, value) in &self.extended {
            if extended_cp_match(pattern, cp) {
                merged.merge(value);
                found = true;
            }
        }
        found.then_some(merged)
    }

    pub fn contains_key(&self, cp: &str) -> bool {
        if is_extended(cp) {
            return self.extended.contains_key(cp);
        }
        self.normal.contains_key(cp)
            || self
                .extended
                .keys()
                .any(|pattern| extended_cp_match(pattern, cp))
    }
}
