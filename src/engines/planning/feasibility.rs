use super::program::{InputSlot, Program, ProgramKey};
use crate::data::store::{FeasibilityStore, MemoryStore};
use crate::error::Result;
use crate::types::CatalogIndex;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotEntries {
    pub slot: InputSlot,
    pub entries: BTreeSet<CatalogIndex>,
}

/// Cached value of one program: compatible catalog entries per catalog-fed input slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    slots: Vec<SlotEntries>,
}

impl IndexEntry {
    pub fn from_map(map: BTreeMap<InputSlot, BTreeSet<CatalogIndex>>) -> Self {
        Self {
            slots: map
                .into_iter()
                .map(|(slot, entries)| SlotEntries { slot, entries })
                .collect(),
        }
    }

    pub fn add(&mut self, slot: InputSlot, entry: CatalogIndex) {
        match self.slots.binary_search_by(|s| s.slot.cmp(&slot)) {
            Ok(i) => {
                self.slots[i].entries.insert(entry);
            }
            Err(i) => self.slots.insert(
                i,
                SlotEntries {
                    slot,
                    entries: BTreeSet::from([entry]),
                },
            ),
        }
    }

    pub fn merge(&mut self, other: &IndexEntry) {
        for s in &other.slots {
            for &e in &s.entries {
                self.add(s.slot, e);
            }
        }
    }

    /// Entries for `slot` in catalog order; empty when the slot is unknown.
    pub fn entries(&self, slot: InputSlot) -> Vec<CatalogIndex> {
        self.slots
            .binary_search_by(|s| s.slot.cmp(&slot))
            .map(|i| self.slots[i].entries.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn slots(&self) -> &[SlotEntries] {
        &self.slots
    }
}

/// Read side of the precomputed program cache. Safe for concurrent readers.
pub struct FeasibilityIndex {
    store: Box<dyn FeasibilityStore>,
    max_depth: usize,
}

impl FeasibilityIndex {
    pub fn new(store: Box<dyn FeasibilityStore>, max_depth: usize) -> Self {
        Self { store, max_depth }
    }

    pub fn in_memory(max_depth: usize) -> Self {
        Self::new(Box::new(MemoryStore::new()), max_depth)
    }

    /// Depth bound D the index was built for.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Whether at least one feasible completion of `program` is known.
    pub fn exists(&self, program: &Program) -> bool {
        self.exists_key(&program.key())
    }

    pub fn exists_key(&self, key: &ProgramKey) -> bool {
        match self.store.contains(key) {
            Ok(found) => found,
            Err(e) => {
                warn!("Feasibility lookup for {} failed: {}", key, e);
                false
            }
        }
    }

    pub fn entries(&self, program: &Program, slot: InputSlot) -> Vec<CatalogIndex> {
        self.entries_by_key(&program.key(), slot)
    }

    pub fn entries_by_key(&self, key: &ProgramKey, slot: InputSlot) -> Vec<CatalogIndex> {
        match self.store.get(key) {
            Ok(Some(entry)) => entry.entries(slot),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Feasibility lookup for {} failed: {}", key, e);
                Vec::new()
            }
        }
    }

    /// Register a feasible program under every partial-assignment view,
    /// merging with whatever those keys already hold.
    pub fn insert(&self, program: &Program, entry: &IndexEntry) -> Result<()> {
        for view in program.views()? {
            let key = view.key();
            let existing = self.store.get(&key)?;
            let mut merged = existing.clone().unwrap_or_default();
            merged.merge(entry);
            if existing.as_ref() != Some(&merged) {
                self.store.put(key, merged)?;
            }
        }
        Ok(())
    }

    pub fn keys(&self) -> Result<Vec<ProgramKey>> {
        self.store.keys()
    }

    pub fn len(&self) -> usize {
        self.store.keys().map(|k| k.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn path_for(&self, program: &Program) -> Option<PathBuf> {
        self.store.path_for(&program.key())
    }
}
