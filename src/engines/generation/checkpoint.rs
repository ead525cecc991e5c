use super::genome::Population;
use crate::error::Result;
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Serialized population snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub generation: usize,
    pub saved_at: DateTime<Utc>,
    pub oracle_calls: usize,
    pub population: Population,
}

impl Checkpoint {
    pub fn new(generation: usize, oracle_calls: usize, population: Population) -> Self {
        Self {
            generation,
            saved_at: Utc::now(),
            oracle_calls,
            population,
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

pub trait CheckpointSink: Send {
    fn save(&mut self, checkpoint: &Checkpoint) -> Result<()>;
}

/// Overwrites one JSON file with the latest snapshot.
pub struct JsonCheckpoint {
    path: PathBuf,
}

impl JsonCheckpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CheckpointSink for JsonCheckpoint {
    fn save(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_string_pretty(checkpoint)?)?;
        fs::rename(&tmp, &self.path)?;
        info!(
            "Saved generation {} ({} individuals) to {}",
            checkpoint.generation,
            checkpoint.population.len(),
            self.path.display()
        );
        Ok(())
    }
}
