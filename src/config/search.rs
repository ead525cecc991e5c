use super::traits::ConfigSection;
use crate::error::SynrouteError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Parameters of the genetic search over fingerprint/skeleton genomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub seed: u64,

    // Individuals
    pub fp_bits: usize,
    pub min_nodes: usize,
    pub max_nodes: usize,
    /// Upper bound on transformation (internal) nodes per shape. `None` means unbounded.
    pub max_transformations: Option<usize>,

    // Search parameters
    pub generations: usize,
    pub population_size: usize,
    pub offspring_size: usize,
    pub max_oracle_calls: usize,
    pub min_fitness: f64,

    // Crossover and parent selection
    pub crossover: CrossoverKind,
    pub selection: SelectionSchedule,

    // Mutation
    pub fp_mutate_prob: f64,
    pub fp_mutate_frac: f64,
    /// Analog candidates receive between 1 and this many leaf edits.
    pub structure_mutate_edits: usize,
    /// Shapes are re-predicted from the child fingerprint at a rank drawn from `1..=shape_top_k`.
    pub shape_top_k: usize,
    pub realign_fingerprints: bool,

    // Diversity vs. expected improvement
    pub explore_warmup: usize,
    pub surrogate_length_scale: f64,
    pub surrogate_noise: f64,
    pub surrogate_max_history: usize,

    // Early stopping
    pub early_stop: bool,
    pub early_stop_delta: f64,
    pub early_stop_warmup: usize,
    pub early_stop_patience: usize,

    // Snapshots
    pub checkpoint_path: Option<PathBuf>,
    pub checkpoint_every: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossoverKind {
    /// Bits taken from the first parent at a random subset of positions.
    RandomMask,
    /// Bits taken from the first parent over one contiguous run.
    Contiguous,
}

/// Sampling weight as a function of ascending fitness rank.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankWeighting {
    /// weight = rank + offset
    Linear { offset: f64 },
    /// weight = exp(rank / (n * temperature))
    Softmax { temperature: f64 },
}

impl RankWeighting {
    pub fn weights(&self, n: usize) -> Vec<f64> {
        match *self {
            RankWeighting::Linear { offset } => (0..n).map(|r| r as f64 + offset).collect(),
            RankWeighting::Softmax { temperature } => {
                let scale = (n.max(1) as f64) * temperature.max(f64::EPSILON);
                let logits: Vec<f64> = (0..n).map(|r| r as f64 / scale).collect();
                let max = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                logits.iter().map(|l| (l - max).exp()).collect()
            }
        }
    }
}

/// Rank weighting that may switch to a different schedule partway through a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionSchedule {
    pub initial: RankWeighting,
    pub later: Option<RankWeighting>,
    pub switch_generation: usize,
}

impl SelectionSchedule {
    pub fn at(&self, generation: usize) -> RankWeighting {
        match self.later {
            Some(later) if generation >= self.switch_generation => later,
            _ => self.initial,
        }
    }
}

impl Default for SelectionSchedule {
    fn default() -> Self {
        Self {
            initial: RankWeighting::Linear { offset: 10.0 },
            later: None,
            switch_generation: 0,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            seed: 10,
            fp_bits: 2048,
            min_nodes: 2,
            max_nodes: 16,
            max_transformations: None,
            generations: 200,
            population_size: 128,
            offspring_size: 384,
            max_oracle_calls: 10_000_000,
            min_fitness: 0.0,
            crossover: CrossoverKind::RandomMask,
            selection: SelectionSchedule::default(),
            fp_mutate_prob: 0.5,
            fp_mutate_frac: 24.0 / 4096.0,
            structure_mutate_edits: 3,
            shape_top_k: 3,
            realign_fingerprints: true,
            explore_warmup: 15,
            surrogate_length_scale: 1.0,
            surrogate_noise: 1e-6,
            surrogate_max_history: 512,
            early_stop: false,
            early_stop_delta: 0.01,
            early_stop_warmup: 30,
            early_stop_patience: 10,
            checkpoint_path: None,
            checkpoint_every: 1,
        }
    }
}

impl ConfigSection for SearchConfig {
    fn section_name() -> &'static str {
        "search"
    }

    fn validate(&self) -> Result<(), SynrouteError> {
        if self.population_size < 2 {
            return Err(SynrouteError::Configuration(
                "Population size must be at least 2".to_string()
            ));
        }
        if self.fp_bits == 0 {
            return Err(SynrouteError::Configuration(
                "Fingerprint length must be positive".to_string()
            ));
        }
        if self.min_nodes < 2 || self.min_nodes > self.max_nodes {
            return Err(SynrouteError::Configuration(
                "Node bounds must satisfy 2 <= min_nodes <= max_nodes".to_string()
            ));
        }
        if self.max_transformations == Some(0) {
            return Err(SynrouteError::Configuration(
                "max_transformations must allow at least one transformation".to_string()
            ));
        }
        for (name, p) in [
            ("fp_mutate_prob", self.fp_mutate_prob),
            ("fp_mutate_frac", self.fp_mutate_frac),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(SynrouteError::Configuration(format!(
                    "{} must be between 0 and 1",
                    name
                )));
            }
        }
        if self.shape_top_k == 0 {
            return Err(SynrouteError::Configuration(
                "shape_top_k must be at least 1".to_string()
            ));
        }
        if self.early_stop && self.early_stop_patience < 2 {
            return Err(SynrouteError::Configuration(
                "early_stop_patience must be at least 2".to_string()
            ));
        }
        if self.surrogate_length_scale <= 0.0 {
            return Err(SynrouteError::Configuration(
                "surrogate_length_scale must be positive".to_string()
            ));
        }
        Ok(())
    }
}
