pub mod traits;
pub mod search;
pub mod decoder;
pub mod index;
pub mod manager;

pub use manager::{ConfigManager, AppConfig};
pub use traits::ConfigSection;
pub use search::{CrossoverKind, RankWeighting, SearchConfig, SelectionSchedule};
pub use decoder::DecoderConfig;
pub use index::IndexConfig;
