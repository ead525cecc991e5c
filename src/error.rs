use thiserror::Error;

#[derive(Error, Debug)]
pub enum SynrouteError {
    #[error("Invalid assignment at node {node}: {reason}")]
    InvalidAssignment { node: usize, reason: String },

    #[error("Invalid skeleton: {0}")]
    InvalidSkeleton(String),

    #[error("Infeasible program: {0}")]
    InfeasibleProgram(String),

    #[error("Decoder exhausted: {0}")]
    DecoderExhausted(String),

    #[error("Index build error: {0}")]
    IndexBuild(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Chemistry error: {0}")]
    Chemistry(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Collaborator error: {0}")]
    Collaborator(#[from] anyhow::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, SynrouteError>;
