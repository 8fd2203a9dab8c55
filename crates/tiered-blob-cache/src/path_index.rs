//! Path → content hash index, bounded to the most recently created paths

use crate::hash::ContentHash;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEntry {
    /// Assigned once when the path is first inserted
    pub insertion_index: u64,
    pub hash: ContentHash,
}

/// Maps human path keys onto content hashes.
///
/// The window is kept by creation order, not access order: repointing an
/// existing path keeps its original insertion index, so it ages out at the
/// same time it would have otherwise.
pub struct PathIndex {
    entries: HashMap<String, PathEntry>,
    by_index: BTreeMap<u64, String>,
    next_index: u64,
    limit: usize,
}

impl PathIndex {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: HashMap::new(),
            by_index: BTreeMap::new(),
            next_index: 0,
            limit,
        }
    }

    /// Point `path` at `hash`.
    ///
    /// Returns the path pushed out of the window, if the insertion crossed
    /// the limit.
    pub fn insert(&mut self, path: &str, hash: ContentHash) -> Option<String> {
        if let Some(entry) = self.entries.get_mut(path) {
            entry.hash = hash;
            return None;
        }

        let insertion_index = self.next_index;
        self.next_index += 1;
        self.entries.insert(
            path.to_string(),
            PathEntry {
                insertion_index,
                hash,
            },
        );
        self.by_index.insert(insertion_index, path.to_string());

        if self.entries.len() > self.limit {
            self.evict_oldest()
        } else {
            None
        }
    }

    pub fn get(&self, path: &str) -> Option<&ContentHash> {
        self.entries.get(path).map(|e| &e.hash)
    }

    pub fn entry(&self, path: &str) -> Option<&PathEntry> {
        self.entries.get(path)
    }

    pub fn remove_by_exact_path(&mut self, path: &str) -> bool {
        match self.entries.remove(path) {
            Some(entry) => {
                self.by_index.remove(&entry.insertion_index);
                true
            }
            None => false,
        }
    }

    /// Remove every path starting with `prefix`, returning the removed keys
    pub fn remove_by_prefix(&mut self, prefix: &str) -> Vec<String> {
        let matching: Vec<String> = self
            .entries
            .keys()
            .filter(|p| p.starts_with(prefix))
            .cloned()
            .collect();
        for path in &matching {
            self.remove_by_exact_path(path);
        }
        matching
    }

    /// Change the window size, dropping the oldest paths if it shrank
    pub fn set_limit(&mut self, limit: usize) -> Vec<String> {
        self.limit = limit;
        let mut evicted = Vec::new();
        while self.entries.len() > self.limit {
            match self.evict_oldest() {
                Some(path) => evicted.push(path),
                None => break,
            }
        }
        evicted
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_index.clear();
        self.next_index = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index the next new path will receive
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    // With a fixed limit the oldest survivor is always the entry at
    // `next_index - limit - 1`; taking the smallest key also covers a
    // limit that was changed in between.
    fn evict_oldest(&mut self) -> Option<String> {
        let (_, path) = self.by_index.pop_first()?;
        self.entries.remove(&path);
        debug!(path = %path, limit = self.limit, "Path aged out of index window");
        Some(path)
    }
}
