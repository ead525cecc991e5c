//! Synthesis-route planning: a feasibility-indexed tree decoder that fills
//! plan skeletons from model scores, and a genetic search over
//! fingerprint/shape genomes that uses the decoder to express candidates.

pub mod config;
pub mod data;
pub mod engines;
pub mod error;
pub mod models;
pub mod types;

pub use error::{Result, SynrouteError};
