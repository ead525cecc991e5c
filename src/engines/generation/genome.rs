/// Genome representation for the synthesis search.
///
/// An individual pairs a fingerprint with the tree shape of the plan that
/// should realize it. Neither is decoded directly: the fingerprint is the
/// decoder's target and the shape fixes the skeleton it fills. Offspring
/// inherit fingerprint bits through crossover, while their shape is always
/// re-predicted from the new fingerprint and only then edited by structural
/// mutation.
///
/// `molecule` and `fitness` stay unset until the individual has been
/// expressed and scored.
use crate::engines::planning::TreeShape;
use crate::types::Fingerprint;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Individual {
    pub fingerprint: Fingerprint,
    pub shape: TreeShape,
    pub molecule: Option<String>,
    pub fitness: Option<f64>,
}

impl Individual {
    pub fn new(fingerprint: Fingerprint, shape: TreeShape) -> Self {
        Self {
            fingerprint,
            shape,
            molecule: None,
            fitness: None,
        }
    }

    /// Fitness with unscored individuals counted at `floor`.
    pub fn fitness_or(&self, floor: f64) -> f64 {
        self.fitness.unwrap_or(floor)
    }

    /// Drop phenotype state so the individual is expressed again.
    pub fn reset(&mut self) {
        self.molecule = None;
        self.fitness = None;
    }
}

pub type Population = Vec<Individual>;
