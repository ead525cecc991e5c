//! Persistence for feasibility-index entries, addressed by program key.

use crate::engines::planning::feasibility::IndexEntry;
use crate::engines::planning::program::ProgramKey;
use crate::error::{Result, SynrouteError};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

pub trait FeasibilityStore: Send + Sync {
    fn get(&self, key: &ProgramKey) -> Result<Option<IndexEntry>>;

    fn put(&self, key: ProgramKey, entry: IndexEntry) -> Result<()>;

    fn contains(&self, key: &ProgramKey) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Every stored key, sorted.
    fn keys(&self) -> Result<Vec<ProgramKey>>;

    /// Storage location of a key, for stores that have one.
    fn path_for(&self, _key: &ProgramKey) -> Option<PathBuf> {
        None
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<ProgramKey, IndexEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> SynrouteError {
    SynrouteError::IndexBuild("Feasibility store lock poisoned".to_string())
}

impl FeasibilityStore for MemoryStore {
    fn get(&self, key: &ProgramKey) -> Result<Option<IndexEntry>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: ProgramKey, entry: IndexEntry) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.insert(key, entry);
        Ok(())
    }

    fn contains(&self, key: &ProgramKey) -> Result<bool> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.contains_key(key))
    }

    fn keys(&self) -> Result<Vec<ProgramKey>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        let mut keys: Vec<_> = entries.keys().copied().collect();
        keys.sort();
        Ok(keys)
    }
}

/// One JSON file per key at `<root>/<first two hex chars>/<hex>.json`.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_for(&self, key: &ProgramKey) -> PathBuf {
        let hex = key.to_hex();
        self.root.join(&hex[..2]).join(format!("{}.json", hex))
    }
}

impl FeasibilityStore for FileStore {
    fn get(&self, key: &ProgramKey) -> Result<Option<IndexEntry>> {
        let path = self.file_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn put(&self, key: ProgramKey, entry: IndexEntry) -> Result<()> {
        let path = self.file_for(&key);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        // Write-then-rename so concurrent readers never see a partial file.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string(&entry)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn contains(&self, key: &ProgramKey) -> Result<bool> {
        Ok(self.file_for(key).exists())
    }

    fn keys(&self) -> Result<Vec<ProgramKey>> {
        let mut keys = Vec::new();
        for shard in fs::read_dir(&self.root)? {
            let shard = shard?;
            if !shard.file_type()?.is_dir() {
                continue;
            }
            for file in fs::read_dir(shard.path())? {
                let path = file?.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    keys.push(ProgramKey::from_hex(stem)?);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn path_for(&self, key: &ProgramKey) -> Option<PathBuf> {
        Some(self.file_for(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::planning::program::{InputSlot, Program};

    fn sample() -> (ProgramKey, IndexEntry) {
        let mut entry = IndexEntry::default();
        entry.add(InputSlot { node: 0, slot: 0 }, 3);
        entry.add(InputSlot { node: 0, slot: 0 }, 1);
        (Program::leaf(4, 1).key(), entry)
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        let (key, entry) = sample();
        assert!(!store.contains(&key).unwrap());
        store.put(key, entry.clone()).unwrap();
        assert_eq!(store.get(&key).unwrap(), Some(entry));
        assert_eq!(store.keys().unwrap(), vec![key]);
    }

    #[test]
    fn test_file_store_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let (key, entry) = sample();
        store.put(key, entry.clone()).unwrap();

        let path = store.path_for(&key).unwrap();
        let hex = key.to_hex();
        assert_eq!(path, dir.path().join(&hex[..2]).join(format!("{}.json", hex)));
        assert!(path.exists());
        assert_eq!(store.get(&key).unwrap(), Some(entry));
        assert_eq!(store.keys().unwrap(), vec![key]);
    }
}
