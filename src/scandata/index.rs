// src/scandata/index.rs

//! Derived leaf index: page type (and note marker) -> sorted leaf numbers.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::scandata::model::{LeafData, PageType};

/// A property the index can answer "next / previous leaf with X" for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndexKey {
    PageType(PageType),
    Note,
}

impl From<PageType> for IndexKey {
    fn from(pt: PageType) -> Self {
        IndexKey::PageType(pt)
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKey::PageType(pt) => write!(f, "{pt}"),
            IndexKey::Note => f.write_str("note"),
        }
    }
}

/// Set of index keys touched by one logical ScanData operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeReport {
    keys: BTreeSet<IndexKey>,
}

impl ChangeReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, key: impl Into<IndexKey>) -> bool {
        self.keys.contains(&key.into())
    }

    pub fn keys(&self) -> impl Iterator<Item = IndexKey> + '_ {
        self.keys.iter().copied()
    }

    pub(crate) fn touch(&mut self, key: IndexKey) {
        self.keys.insert(key);
    }
}

/// Index over `pageData`.
///
/// Never persisted: rebuilt on load and kept in step by every mutator.
/// Empty sets are pruned so two indexes over equal `pageData` compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeafIndex {
    sets: BTreeMap<IndexKey, BTreeSet<u32>>,
}

impl LeafIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(page_data: &BTreeMap<u32, LeafData>) -> Self {
        let mut index = Self::new();
        let mut scratch = ChangeReport::new();
        for (leaf, data) in page_data {
            index.add(*leaf, data, &mut scratch);
        }
        index
    }

    pub(crate) fn add(&mut self, leaf: u32, data: &LeafData, report: &mut ChangeReport) {
        for key in keys_for(data) {
            self.sets.entry(key).or_default().insert(leaf);
            report.touch(key);
        }
    }

    pub(crate) fn remove(&mut self, leaf: u32, data: &LeafData, report: &mut ChangeReport) {
        for key in keys_for(data) {
            if let Some(set) = self.sets.get_mut(&key) {
                set.remove(&leaf);
                if set.is_empty() {
                    self.sets.remove(&key);
                }
            }
            report.touch(key);
        }
    }

    pub(crate) fn clear(&mut self, report: &mut ChangeReport) {
        for key in self.sets.keys() {
            report.touch(*key);
        }
        self.sets.clear();
    }

    pub fn leaves(&self, key: impl Into<IndexKey>) -> impl Iterator<Item = u32> + '_ {
        self.sets
            .get(&key.into())
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    pub fn count(&self, key: impl Into<IndexKey>) -> usize {
        self.sets.get(&key.into()).map_or(0, BTreeSet::len)
    }

    pub fn contains(&self, key: impl Into<IndexKey>, leaf: u32) -> bool {
        self.sets
            .get(&key.into())
            .is_some_and(|set| set.contains(&leaf))
    }

    /// First leaf strictly after `from` carrying `key`.
    pub fn next_leaf(&self, key: impl Into<IndexKey>, from: u32) -> Option<u32> {
        let set = self.sets.get(&key.into())?;
        set.range(from.checked_add(1)?..).next().copied()
    }

    /// Last leaf strictly before `from` carrying `key`.
    pub fn prev_leaf(&self, key: impl Into<IndexKey>, from: u32) -> Option<u32> {
        let set = self.sets.get(&key.into())?;
        set.range(..from).next_back().copied()
    }

    pub fn keys(&self) -> impl Iterator<Item = IndexKey> + '_ {
        self.sets.keys().copied()
    }
}

fn keys_for(data: &LeafData) -> impl Iterator<Item = IndexKey> {
    let note = data.has_note().then_some(IndexKey::Note);
    std::iter::once(IndexKey::PageType(data.page_type)).chain(note)
}
