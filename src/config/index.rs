use super::traits::ConfigSection;
use crate::error::SynrouteError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Largest program size for which every partial-assignment view is registered.
pub const MAX_PROGRAM_SIZE: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Depth bound D on enumerated programs.
    pub max_depth: usize,
    /// Largest program (transformation count) enumerated.
    pub max_program_size: usize,
    /// Reactant combinations tried per program when realizing it.
    pub max_trials_per_program: usize,
    /// Realized products kept per program for use by enclosing programs.
    pub max_products_per_program: usize,
    /// Content-addressed storage root. In-memory when unset.
    pub storage_dir: Option<PathBuf>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            max_depth: 2,
            max_program_size: 3,
            max_trials_per_program: 64,
            max_products_per_program: 16,
            storage_dir: None,
        }
    }
}

impl ConfigSection for IndexConfig {
    fn section_name() -> &'static str {
        "index"
    }

    fn validate(&self) -> Result<(), SynrouteError> {
        if self.max_depth == 0 {
            return Err(SynrouteError::Configuration(
                "Index depth must be at least 1".to_string()
            ));
        }
        if self.max_program_size == 0 || self.max_program_size > MAX_PROGRAM_SIZE {
            return Err(SynrouteError::Configuration(format!(
                "max_program_size must be between 1 and {}",
                MAX_PROGRAM_SIZE
            )));
        }
        if self.max_trials_per_program == 0 || self.max_products_per_program == 0 {
            return Err(SynrouteError::Configuration(
                "Realization caps must be positive".to_string()
            ));
        }
        Ok(())
    }
}
