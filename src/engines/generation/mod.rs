pub mod checkpoint;
pub mod evolution_engine;
pub mod genome;
pub mod metrics;
pub mod operators;
pub mod progress;
pub mod surrogate;

pub use checkpoint::{Checkpoint, CheckpointSink, JsonCheckpoint};
pub use evolution_engine::{cull, Initialization, SearchEngine, SearchOutcome};
pub use genome::{Individual, Population};
pub use metrics::GenerationMetrics;
pub use progress::{
    ChannelProgressCallback, LogProgressCallback, NoProgress, ProgressCallback, ProgressMessage,
    StopReason,
};
pub use surrogate::GaussianProcess;
