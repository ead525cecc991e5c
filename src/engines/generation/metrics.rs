use super::genome::Individual;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Per-generation population statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationMetrics {
    pub generation: usize,
    pub population_size: usize,
    pub mean: f64,
    pub stdev: f64,
    pub top1: f64,
    pub top2: f64,
    pub top3: f64,
    pub mean_top10: f64,
    pub mean_top100: f64,
    pub mean_tree_size: f64,
    pub mean_tree_depth: f64,
    pub mean_internal: f64,
    /// Mean pairwise Tanimoto distance between individuals holding a molecule.
    pub diversity: f64,
    /// Distinct molecules over population size.
    pub unique: f64,
    pub oracle_calls: usize,
}

impl GenerationMetrics {
    pub fn compute(
        generation: usize,
        population: &[Individual],
        min_fitness: f64,
        oracle_calls: usize,
    ) -> Self {
        let n = population.len();
        if n == 0 {
            return Self { generation, oracle_calls, ..Self::default() };
        }
        let mut scores: Vec<f64> = population.iter().map(|i| i.fitness_or(min_fitness)).collect();
        scores.sort_by(|a, b| b.partial_cmp(a).unwrap_or(Ordering::Equal));

        let avg = mean(&scores);
        let stdev = (scores.iter().map(|s| (s - avg).powi(2)).sum::<f64>() / n as f64).sqrt();
        let top = |k: usize| scores.get(k - 1).copied().unwrap_or(f64::NAN);

        let with_molecule: Vec<&Individual> =
            population.iter().filter(|i| i.molecule.is_some()).collect();
        let mut distances = Vec::new();
        for (i, a) in with_molecule.iter().enumerate() {
            for b in &with_molecule[i + 1..] {
                distances.push(1.0 - a.fingerprint.tanimoto(&b.fingerprint));
            }
        }
        let unique: HashSet<&str> = with_molecule
            .iter()
            .filter_map(|i| i.molecule.as_deref())
            .collect();

        let sizes: Vec<f64> = population.iter().map(|i| i.shape.node_count() as f64).collect();
        let depths: Vec<f64> = population.iter().map(|i| i.shape.depth() as f64).collect();
        let internal: Vec<f64> = population.iter().map(|i| i.shape.internal_count() as f64).collect();

        Self {
            generation,
            population_size: n,
            mean: avg,
            stdev,
            top1: top(1),
            top2: top(2),
            top3: top(3),
            mean_top10: mean(&scores[..n.min(10)]),
            mean_top100: mean(&scores[..n.min(100)]),
            mean_tree_size: mean(&sizes),
            mean_tree_depth: mean(&depths),
            mean_internal: mean(&internal),
            diversity: if distances.is_empty() { 0.0 } else { mean(&distances) },
            unique: unique.len() as f64 / n as f64,
            oracle_calls,
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::planning::TreeShape;
    use crate::types::Fingerprint;

    fn ind(fitness: f64, molecule: Option<&str>, bits: Vec<bool>) -> Individual {
        let mut i = Individual::new(Fingerprint::new(bits), TreeShape::single_step(2));
        i.fitness = Some(fitness);
        i.molecule = molecule.map(str::to_string);
        i
    }

    #[test]
    fn test_score_statistics() {
        let population = vec![
            ind(1.0, Some("A"), vec![true, false]),
            ind(3.0, Some("B"), vec![false, true]),
            ind(2.0, Some("A"), vec![true, false]),
            ind(0.0, None, vec![true, true]),
        ];
        let m = GenerationMetrics::compute(4, &population, 0.0, 12);
        assert_eq!(m.mean, 1.5);
        assert_eq!((m.top1, m.top2, m.top3), (3.0, 2.0, 1.0));
        assert_eq!(m.mean_top10, 1.5);
        assert!((m.stdev - 1.25f64.sqrt()).abs() < 1e-12);
        assert_eq!(m.unique, 0.5);
        assert_eq!(m.mean_tree_size, 3.0);
        assert_eq!(m.mean_tree_depth, 2.0);
        // Pairs A-B (1.0), A-A (0.0), B-A (1.0).
        assert!((m.diversity - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(m.oracle_calls, 12);
    }
}
