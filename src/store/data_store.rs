//! Keyed store for evaluation results and per-tree services

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt::Debug;
use std::hash::Hash;

use super::Disposable;
use crate::core::{DiagnosticKind, Diagnostics};
use crate::pool::BufferPools;

/// Map from key to value that reports duplicate inserts and missing
/// required entries instead of failing.
pub struct DataStore<K, V> {
    label: &'static str,
    entries: HashMap<K, V>,
    diagnostics: Diagnostics,
}

/// Store keyed by name
pub type StringStore<V> = DataStore<String, V>;

impl<K: Eq + Hash + Debug, V> DataStore<K, V> {
    pub fn new(label: &'static str, diagnostics: Diagnostics) -> Self {
        Self {
            label,
            entries: HashMap::new(),
            diagnostics,
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.entries.get_mut(key)
    }

    /// Like [`get`](Self::get), but a missing entry is reported
    pub fn get_required(&self, key: &K) -> Option<&V> {
        let value = self.entries.get(key);
        if value.is_none() {
            self.diagnostics.report(
                DiagnosticKind::MissingEntry,
                format!("{} store has no entry for {:?}", self.label, key),
            );
        }
        value
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get_or_create(&mut self, key: K, create: impl FnOnce() -> V) -> &mut V {
        self.entries.entry(key).or_insert_with(create)
    }

    /// Insert a value. A duplicate key is reported and the old value kept.
    pub fn add_data(&mut self, key: K, value: V) -> bool {
        match self.entries.entry(key) {
            Entry::Occupied(entry) => {
                self.diagnostics.report(
                    DiagnosticKind::DuplicateKey,
                    format!("{} store already holds {:?}", self.label, entry.key()),
                );
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(value);
                true
            }
        }
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter()
    }
}

impl<K: Eq + Hash + Debug, V: Disposable> Disposable for DataStore<K, V> {
    fn has_pending_work(&self) -> bool {
        self.entries.values().any(Disposable::has_pending_work)
    }

    fn complete_pending_work(&mut self) {
        for value in self.entries.values_mut() {
            value.complete_pending_work();
        }
    }

    fn dispose_returned(&mut self, pools: &mut BufferPools) {
        for (_, mut value) in self.entries.drain() {
            value.dispose_returned(pools);
        }
    }
}
