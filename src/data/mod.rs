pub mod catalog;
pub mod embeddings;
pub mod store;
pub mod templates;

pub use catalog::Catalog;
pub use embeddings::EmbeddingStore;
pub use store::{FeasibilityStore, FileStore, MemoryStore};
pub use templates::{ReactionTemplate, TemplateSet};
