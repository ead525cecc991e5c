use super::encoding::TreeEncoding;
use crate::engines::planning::shape::TreeShape;
use crate::types::{Fingerprint, TemplateId};
use anyhow::Result;

/// Stateless scorer over a tree encoding, one row per skeleton node.
///
/// The transformation model returns one logit per template in each row; the
/// terminal model returns a predicted building-block embedding in each row.
pub trait ScoringModel: Send + Sync {
    fn score(&self, encoding: &TreeEncoding) -> Result<Vec<Vec<f32>>>;
}

/// Reaction execution backend.
pub trait ChemistryExecutor: Send + Sync {
    /// Whether `molecule` can fill reactant position `slot` of `template`.
    fn matches(&self, template: TemplateId, slot: usize, molecule: &str) -> bool;

    /// Run `template` on ordered reactants; `None` when the reaction fails.
    fn apply(&self, template: TemplateId, reactants: &[&str]) -> Option<String>;
}

/// Objective being maximised by the search.
pub trait Oracle: Send + Sync {
    fn evaluate(&self, molecule: &str) -> Result<f64>;
}

pub trait Fingerprinter: Send + Sync {
    /// `None` when the identifier cannot be parsed.
    fn fingerprint(&self, molecule: &str, bits: usize) -> Option<Fingerprint>;
}

/// Predicts plan structure from a fingerprint.
pub trait ShapePredictor: Send + Sync {
    /// The `rank`-th most likely shape (1-based) with at most
    /// `max_transformations` internal nodes.
    fn predict(
        &self,
        fingerprint: &Fingerprint,
        max_transformations: Option<usize>,
        rank: usize,
    ) -> Option<TreeShape>;
}
