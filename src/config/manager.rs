use super::{
    decoder::DecoderConfig,
    index::IndexConfig,
    search::SearchConfig,
    traits::ConfigSection,
};
use crate::error::SynrouteError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Prefix of environment variables that override file settings,
/// e.g. `SYNROUTE_SEARCH__POPULATION_SIZE=64`.
pub const ENV_PREFIX: &str = "SYNROUTE";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub search: SearchConfig,
    pub decoder: DecoderConfig,
    pub index: IndexConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), SynrouteError> {
        self.search.validate()?;
        self.decoder.validate()?;
        self.index.validate()?;
        if self.decoder.max_depth > self.index.max_depth {
            return Err(SynrouteError::Configuration(format!(
                "Decoder depth {} exceeds the indexed depth {}",
                self.decoder.max_depth, self.index.max_depth
            )));
        }
        Ok(())
    }
}

pub struct ConfigManager {
    config: Arc<RwLock<AppConfig>>,
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            config: Arc::new(RwLock::new(AppConfig::default())),
        }
    }

    /// Load a TOML file layered under `SYNROUTE_*` environment overrides.
    pub fn load_from_file<P: AsRef<Path>>(&self, path: P) -> Result<(), SynrouteError> {
        let config: AppConfig = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).format(config::FileFormat::Toml))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;

        config.validate()?;

        *self.write_guard()? = config;
        log::info!("Loaded configuration from {}", path.as_ref().display());
        Ok(())
    }

    pub fn load_from_str(&self, contents: &str) -> Result<(), SynrouteError> {
        let config: AppConfig = toml::from_str(contents)
            .map_err(|e| SynrouteError::Configuration(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        *self.write_guard()? = config;
        Ok(())
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), SynrouteError> {
        let config = self.get()?;
        let toml_str = toml::to_string_pretty(&config)
            .map_err(|e| SynrouteError::Configuration(format!("Failed to serialize: {}", e)))?;

        std::fs::write(path, toml_str)
            .map_err(|e| SynrouteError::Configuration(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    pub fn get(&self) -> Result<AppConfig, SynrouteError> {
        self.config
            .read()
            .map(|c| c.clone())
            .map_err(|_| SynrouteError::Configuration("Config lock poisoned".to_string()))
    }

    pub fn update<F>(&self, f: F) -> Result<(), SynrouteError>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut config = self.write_guard()?;
        let mut candidate = config.clone();
        f(&mut candidate);
        candidate.validate()?;
        *config = candidate;
        Ok(())
    }

    fn write_guard(&self) -> Result<std::sync::RwLockWriteGuard<'_, AppConfig>, SynrouteError> {
        self.config
            .write()
            .map_err(|_| SynrouteError::Configuration("Config lock poisoned".to_string()))
    }
}
