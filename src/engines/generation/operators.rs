use crate::config::{CrossoverKind, RankWeighting};
use crate::engines::generation::genome::Individual;
use crate::engines::planning::TreeShape;
use crate::types::Fingerprint;
use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::index::sample;
use rand::Rng;
use rand_distr::Normal;
use std::cmp::Ordering;

/// Rank-weighted parent pairs. Ranks are taken in ascending fitness order, so
/// the fittest individual has the largest weight. Within a pair the two
/// parents are distinct; across pairs individuals are reused freely.
/// Returns indices into `population`.
pub fn select_couples<R: Rng>(
    population: &[Individual],
    count: usize,
    weighting: RankWeighting,
    min_fitness: f64,
    rng: &mut R,
) -> Vec<(usize, usize)> {
    let n = population.len();
    if n < 2 {
        return Vec::new();
    }
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        population[a]
            .fitness_or(min_fitness)
            .partial_cmp(&population[b].fitness_or(min_fitness))
            .unwrap_or(Ordering::Equal)
    });
    let weights = weighting.weights(n);

    let Ok(first) = WeightedIndex::new(&weights) else {
        return (0..count)
            .map(|_| {
                let pair = sample(rng, n, 2);
                (pair.index(0), pair.index(1))
            })
            .collect();
    };

    (0..count)
        .map(|_| {
            let i1 = first.sample(rng);
            let mut rest = weights.clone();
            rest[i1] = 0.0;
            let i2 = match WeightedIndex::new(&rest) {
                Ok(dist) => dist.sample(rng),
                Err(_) => (i1 + 1 + rng.gen_range(0..n - 1)) % n,
            };
            (order[i1], order[i2])
        })
        .collect()
}

/// `n` flags with exactly `k` set, at uniformly random positions.
pub fn random_bitmask<R: Rng>(n: usize, k: usize, rng: &mut R) -> Vec<bool> {
    let mut mask = vec![false; n];
    for i in sample(rng, n, k.min(n)).iter() {
        mask[i] = true;
    }
    mask
}

/// Number of bits taken from the first parent: N(n/2, n/10) clipped to [0.2n, 0.8n].
pub fn crossover_size<R: Rng>(n: usize, rng: &mut R) -> usize {
    let len = n as f64;
    let draw = match Normal::new(len / 2.0, len / 10.0) {
        Ok(normal) => normal.sample(rng),
        Err(_) => len / 2.0,
    };
    draw.clamp(0.2 * len, 0.8 * len) as usize
}

/// Child fingerprint whose every bit comes from one of the parents.
pub fn crossover<R: Rng>(
    a: &Fingerprint,
    b: &Fingerprint,
    kind: CrossoverKind,
    rng: &mut R,
) -> Fingerprint {
    let n = a.len().min(b.len());
    if n == 0 {
        return a.clone();
    }
    let k = crossover_size(n, rng);
    let mask = match kind {
        CrossoverKind::RandomMask => random_bitmask(n, k, rng),
        CrossoverKind::Contiguous => {
            let start = rng.gen_range(0..=n - k);
            (0..n).map(|i| i >= start && i < start + k).collect()
        }
    };
    Fingerprint::new(
        mask.iter()
            .enumerate()
            .map(|(i, &from_a)| if from_a { a.get(i) } else { b.get(i) })
            .collect(),
    )
}

/// With probability `prob`, flip `round(len * frac)` distinct bits.
pub fn mutate_fingerprint<R: Rng>(fp: &mut Fingerprint, prob: f64, frac: f64, rng: &mut R) -> bool {
    if !rng.gen_bool(prob.clamp(0.0, 1.0)) {
        return false;
    }
    let flips = (fp.len() as f64 * frac).round() as usize;
    let mask = random_bitmask(fp.len(), flips, rng);
    for (i, flip) in mask.into_iter().enumerate() {
        if flip {
            fp.flip(i);
        }
    }
    true
}

/// Between 1 and `max_edits` leaf insertions or removals, each a coin flip.
/// Returns the number of edits that changed the shape.
pub fn mutate_structure<R: Rng>(
    shape: &mut TreeShape,
    max_edits: usize,
    max_internal: Option<usize>,
    min_nodes: usize,
    max_nodes: usize,
    rng: &mut R,
) -> usize {
    let edits = rng.gen_range(1..=max_edits.max(1));
    (0..edits)
        .filter(|_| {
            if rng.gen_bool(0.5) {
                shape.add_leaf(rng, max_internal, max_nodes)
            } else {
                shape.remove_leaf(rng, min_nodes)
            }
        })
        .count()
}
