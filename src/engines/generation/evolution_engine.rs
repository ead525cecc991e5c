use crate::config::{ConfigSection, SearchConfig};
use crate::engines::evaluation::phenotype::{evaluate_all, Expressed, Expresser};
use crate::engines::generation::{
    checkpoint::{Checkpoint, CheckpointSink, JsonCheckpoint},
    genome::{Individual, Population},
    metrics::GenerationMetrics,
    operators::{crossover, mutate_fingerprint, mutate_structure, select_couples},
    progress::{ProgressCallback, StopReason},
    surrogate::GaussianProcess,
};
use crate::engines::planning::{TreeDecoder, TreeShape};
use crate::error::{Result, SynrouteError};
use crate::models::Oracle;
use crate::types::{Fingerprint, Target};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::cmp::Ordering;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

/// Sentinel filling the early-stopping window before any generation is scored.
const WINDOW_SEED: f64 = -1000.0;

/// Where the first population comes from.
pub enum Initialization {
    /// Random fingerprints with predicted (or random) shapes.
    Random,
    /// Fingerprints of known molecules, sampled down to the population size.
    Reference(Vec<String>),
    /// A previously saved, already scored population.
    Resume(Checkpoint),
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub population: Population,
    pub metrics: Vec<GenerationMetrics>,
    pub oracle_calls: usize,
    pub stop_reason: StopReason,
}

pub struct SearchEngine {
    config: SearchConfig,
    decoder: Arc<TreeDecoder>,
    oracle: Arc<dyn Oracle>,
    checkpoint: Option<Box<dyn CheckpointSink>>,
    rng: StdRng,
    oracle_calls: usize,
    /// Every (fingerprint, fitness) the oracle has produced, oldest first.
    history: Vec<(Fingerprint, f64)>,
}

impl SearchEngine {
    pub fn new(config: SearchConfig, decoder: Arc<TreeDecoder>, oracle: Arc<dyn Oracle>) -> Result<Self> {
        config.validate()?;
        let rng = StdRng::seed_from_u64(config.seed);
        let checkpoint = config
            .checkpoint_path
            .as_ref()
            .map(|p| Box::new(JsonCheckpoint::new(p.clone())) as Box<dyn CheckpointSink>);
        Ok(Self {
            config,
            decoder,
            oracle,
            checkpoint,
            rng,
            oracle_calls: 0,
            history: Vec::new(),
        })
    }

    pub fn with_checkpoint(mut self, sink: Box<dyn CheckpointSink>) -> Self {
        self.checkpoint = Some(sink);
        self
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn oracle_calls(&self) -> usize {
        self.oracle_calls
    }

    /// Run the generational loop. Each generation is fully scored before the
    /// next one is bred.
    pub fn optimize<C: ProgressCallback>(
        &mut self,
        init: Initialization,
        mut callback: C,
    ) -> Result<SearchOutcome> {
        let mut window: VecDeque<f64> = VecDeque::with_capacity(self.config.early_stop_patience);
        window.push_back(WINDOW_SEED);
        let mut all_metrics = Vec::new();

        let (mut population, start) = match init {
            Initialization::Resume(checkpoint) => {
                info!(
                    "Resuming from generation {} with {} individuals",
                    checkpoint.generation,
                    checkpoint.population.len()
                );
                self.oracle_calls = checkpoint.oracle_calls;
                self.history = checkpoint
                    .population
                    .iter()
                    .filter_map(|i| i.fitness.map(|f| (i.fingerprint.clone(), f)))
                    .collect();
                (checkpoint.population, checkpoint.generation)
            }
            Initialization::Random => {
                info!("Initializing {} random individuals", self.config.population_size);
                callback.on_generation_start(0);
                let seeds = self.random_population();
                (self.score_seeds(seeds, &mut callback), 0)
            }
            Initialization::Reference(molecules) => {
                info!("Initializing from {} reference molecules", molecules.len());
                callback.on_generation_start(0);
                let seeds = self.reference_population(&molecules)?;
                (self.score_seeds(seeds, &mut callback), 0)
            }
        };
        if population.len() < 2 {
            return Err(SynrouteError::Validation(format!(
                "Need at least 2 individuals to search, have {}",
                population.len()
            )));
        }

        let seed_metrics = self.finish_generation(start, &population, &mut callback)?;
        self.push_window(&mut window, seed_metrics.mean);
        all_metrics.push(seed_metrics);

        let mut stop_reason = StopReason::Completed;
        let mut last = start;
        for generation in start + 1..=self.config.generations {
            if self.budget_left() == 0 {
                stop_reason = StopReason::BudgetExhausted;
                break;
            }
            callback.on_generation_start(generation);
            last = generation;

            let pairs = self.breed(&population, generation);
            let candidates = self.express_pairs(pairs);
            let promoted = self.promote(candidates, &population, generation);
            let batch = self.trim_to_budget(promoted);

            let total = batch.len();
            let (scored, calls) = evaluate_all(self.oracle.as_ref(), batch, self.config.min_fitness);
            self.record(&scored, calls);
            callback.on_offspring_evaluated(total, total);

            let mut pool = population;
            pool.extend(scored);
            population = cull(pool, self.config.population_size, self.config.min_fitness);

            let metrics = self.finish_generation(generation, &population, &mut callback)?;
            self.push_window(&mut window, metrics.mean);
            all_metrics.push(metrics);

            if self.should_stop_early(generation, &window) {
                info!("Early stopping at generation {}", generation);
                stop_reason = StopReason::EarlyStopped;
                break;
            }
            if self.budget_left() == 0 {
                info!("Exhausted {} oracle calls", self.config.max_oracle_calls);
                stop_reason = StopReason::BudgetExhausted;
                break;
            }
        }

        callback.on_stop(last, stop_reason);
        Ok(SearchOutcome {
            population,
            metrics: all_metrics,
            oracle_calls: self.oracle_calls,
            stop_reason,
        })
    }

    fn budget_left(&self) -> usize {
        self.config.max_oracle_calls.saturating_sub(self.oracle_calls)
    }

    fn push_window(&self, window: &mut VecDeque<f64>, mean: f64) {
        if window.len() == self.config.early_stop_patience.max(1) {
            window.pop_front();
        }
        window.push_back(mean);
    }

    fn should_stop_early(&self, generation: usize, window: &VecDeque<f64>) -> bool {
        if !self.config.early_stop || generation <= self.config.early_stop_warmup {
            return false;
        }
        if window.len() < self.config.early_stop_patience {
            return false;
        }
        match (window.front(), window.back()) {
            (Some(first), Some(last)) => last - first < self.config.early_stop_delta,
            _ => false,
        }
    }

    fn finish_generation<C: ProgressCallback>(
        &mut self,
        generation: usize,
        population: &Population,
        callback: &mut C,
    ) -> Result<GenerationMetrics> {
        let metrics = GenerationMetrics::compute(
            generation,
            population,
            self.config.min_fitness,
            self.oracle_calls,
        );
        callback.on_generation_complete(&metrics);
        let every = self.config.checkpoint_every.max(1);
        if let Some(sink) = self.checkpoint.as_mut() {
            if generation % every == 0 {
                sink.save(&Checkpoint::new(generation, self.oracle_calls, population.clone()))?;
            }
        }
        Ok(metrics)
    }

    fn record(&mut self, scored: &[Individual], calls: usize) {
        self.oracle_calls += calls;
        for ind in scored {
            if let Some(f) = ind.fitness {
                self.history.push((ind.fingerprint.clone(), f));
            }
        }
    }

    fn score_seeds<C: ProgressCallback>(&mut self, seeds: Population, callback: &mut C) -> Population {
        let expresser = Expresser::new(&self.decoder, self.config.realign_fingerprints);
        let expressed = expresser.express_all(seeds);
        let batch = self.trim_to_budget(expressed);
        let total = batch.len();
        let (scored, calls) = evaluate_all(self.oracle.as_ref(), batch, self.config.min_fitness);
        self.record(&scored, calls);
        callback.on_offspring_evaluated(total, total);
        scored
    }

    /// Shape for a fingerprint: the `rank`-th prediction, or a random shape
    /// within the configured bounds when nothing can be predicted.
    fn shape_for(&mut self, fingerprint: &Fingerprint, rank: usize) -> TreeShape {
        let target = Target::Fingerprint(fingerprint.clone());
        match self
            .decoder
            .predict_shape(&target, self.config.max_transformations, rank)
        {
            Ok(shape) => shape,
            Err(e) => {
                debug!("Falling back to a random shape: {}", e);
                TreeShape::random(
                    &mut self.rng,
                    self.config.min_nodes,
                    self.config.max_nodes,
                    self.config.max_transformations,
                )
            }
        }
    }

    fn random_population(&mut self) -> Population {
        (0..self.config.population_size)
            .map(|_| {
                let fp = Fingerprint::random(self.config.fp_bits, &mut self.rng);
                let shape = self.shape_for(&fp, 1);
                Individual::new(fp, shape)
            })
            .collect()
    }

    fn reference_population(&mut self, molecules: &[String]) -> Result<Population> {
        let fingerprinter = self.decoder.context().fingerprinter.clone().ok_or_else(|| {
            SynrouteError::Validation(
                "Reference initialization needs a fingerprinter".to_string(),
            )
        })?;
        let n = self.config.population_size;
        let chosen: Vec<&String> = if molecules.len() > n {
            sample(&mut self.rng, molecules.len(), n)
                .iter()
                .map(|i| &molecules[i])
                .collect()
        } else {
            molecules.iter().collect()
        };

        let mut population = Vec::with_capacity(n);
        for molecule in chosen {
            match fingerprinter.fingerprint(molecule, self.config.fp_bits) {
                Some(fp) => {
                    let shape = self.shape_for(&fp, 1);
                    population.push(Individual::new(fp, shape));
                }
                None => warn!("Skipping unparsable reference molecule '{}'", molecule),
            }
        }
        if population.len() < n {
            debug!("Topping up {} reference individuals with random ones", n - population.len());
            while population.len() < n {
                let fp = Fingerprint::random(self.config.fp_bits, &mut self.rng);
                let shape = self.shape_for(&fp, 1);
                population.push(Individual::new(fp, shape));
            }
        }
        Ok(population)
    }

    /// One (child, analog) pair per selected couple. The child carries
    /// crossed and mutated bits with a freshly predicted shape; the analog is
    /// the child with a structurally edited shape.
    fn breed(&mut self, population: &Population, generation: usize) -> Vec<(Individual, Individual)> {
        let weighting = self.config.selection.at(generation);
        let couples = select_couples(
            population,
            self.config.offspring_size,
            weighting,
            self.config.min_fitness,
            &mut self.rng,
        );
        couples
            .into_iter()
            .map(|(a, b)| {
                let mut fp = crossover(
                    &population[a].fingerprint,
                    &population[b].fingerprint,
                    self.config.crossover,
                    &mut self.rng,
                );
                mutate_fingerprint(
                    &mut fp,
                    self.config.fp_mutate_prob,
                    self.config.fp_mutate_frac,
                    &mut self.rng,
                );
                let rank = self.rng.gen_range(1..=self.config.shape_top_k);
                let shape = self.shape_for(&fp, rank);
                let child = Individual::new(fp, shape);

                let mut analog = child.clone();
                mutate_structure(
                    &mut analog.shape,
                    self.config.structure_mutate_edits,
                    self.config.max_transformations,
                    self.config.min_nodes,
                    self.config.max_nodes,
                    &mut self.rng,
                );
                (child, analog)
            })
            .collect()
    }

    fn express_pairs(&self, pairs: Vec<(Individual, Individual)>) -> Vec<[Expressed; 2]> {
        let expresser = Expresser::new(&self.decoder, self.config.realign_fingerprints);
        let flat: Vec<Individual> = pairs.into_iter().flat_map(|(a, b)| [a, b]).collect();
        let mut expressed = expresser.express_all(flat).into_iter();
        let mut out = Vec::with_capacity(expressed.len() / 2);
        while let (Some(a), Some(b)) = (expressed.next(), expressed.next()) {
            out.push([a, b]);
        }
        out
    }

    /// Keep one candidate per pair: least similar to the population while
    /// exploring, highest expected improvement afterwards.
    fn promote(
        &mut self,
        candidates: Vec<[Expressed; 2]>,
        population: &Population,
        generation: usize,
    ) -> Vec<Expressed> {
        let surrogate = if generation > self.config.explore_warmup {
            match GaussianProcess::fit(
                &self.history,
                self.config.surrogate_length_scale,
                self.config.surrogate_noise,
                self.config.surrogate_max_history,
            ) {
                Ok(gp) => Some(gp),
                Err(e) => {
                    warn!("Surrogate unavailable, promoting by diversity: {}", e);
                    None
                }
            }
        } else {
            None
        };
        let best = self
            .history
            .iter()
            .map(|(_, f)| *f)
            .fold(f64::NEG_INFINITY, f64::max);

        candidates
            .into_iter()
            .map(|pair| {
                let [a, b] = pair;
                // An expressible candidate always beats one that is not.
                if a.is_viable() != b.is_viable() {
                    return if a.is_viable() { a } else { b };
                }
                let (score_a, score_b) = match &surrogate {
                    Some(gp) => (
                        gp.expected_improvement(&a.individual.fingerprint, best),
                        gp.expected_improvement(&b.individual.fingerprint, best),
                    ),
                    None => (
                        -mean_similarity(&a.individual.fingerprint, population),
                        -mean_similarity(&b.individual.fingerprint, population),
                    ),
                };
                if score_b > score_a {
                    b
                } else {
                    a
                }
            })
            .collect()
    }

    /// Fit the batch into the oracle budget. Each candidate costs one call per
    /// product. When the batch overruns, candidates are visited in random order:
    /// unexpressed ones are free and always kept, the rest are kept while they
    /// fit, and the first that overruns keeps only its best products.
    fn trim_to_budget(&mut self, mut batch: Vec<Expressed>) -> Vec<Expressed> {
        let mut left = self.budget_left();
        let cost: usize = batch.iter().map(Expressed::oracle_cost).sum();
        if cost <= left {
            return batch;
        }
        warn!("Oracle budget allows {} of {} evaluations", left, cost);
        batch.shuffle(&mut self.rng);
        let mut kept = Vec::with_capacity(batch.len());
        for mut candidate in batch {
            let cost = candidate.oracle_cost();
            if cost <= left {
                left -= cost;
                kept.push(candidate);
            } else if left > 0 {
                candidate.products.truncate(left);
                left = 0;
                kept.push(candidate);
            }
        }
        kept
    }
}

fn mean_similarity(fp: &Fingerprint, population: &Population) -> f64 {
    if population.is_empty() {
        return 0.0;
    }
    population
        .iter()
        .map(|ind| fp.tanimoto(&ind.fingerprint))
        .sum::<f64>()
        / population.len() as f64
}

/// Survivor selection. Individuals are deduplicated by molecule (first seen
/// wins); the best `n` unique ones survive, backfilled with the best of the
/// duplicates and unexpressed individuals when fewer than `n` are unique.
pub fn cull(population: Population, n: usize, min_fitness: f64) -> Population {
    let mut unique = Vec::with_capacity(population.len());
    let mut leftover = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for ind in population {
        match &ind.molecule {
            Some(m) if seen.insert(m.clone()) => unique.push(ind),
            _ => leftover.push(ind),
        }
    }
    let by_fitness = |a: &Individual, b: &Individual| {
        b.fitness_or(min_fitness)
            .partial_cmp(&a.fitness_or(min_fitness))
            .unwrap_or(Ordering::Equal)
    };
    unique.sort_by(by_fitness);
    unique.truncate(n);
    if unique.len() < n {
        leftover.sort_by(by_fitness);
        let missing = n - unique.len();
        unique.extend(leftover.into_iter().take(missing));
        unique.sort_by(by_fitness);
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ind(fitness: f64, molecule: Option<&str>) -> Individual {
        let mut i = Individual::new(Fingerprint::zeros(4), TreeShape::single_step(1));
        i.fitness = Some(fitness);
        i.molecule = molecule.map(str::to_string);
        i
    }

    #[test]
    fn test_cull_backfills_from_duplicates() {
        let population = vec![
            ind(0.2, Some("A")),
            ind(0.8, Some("A")),
            ind(0.5, None),
            ind(0.3, Some("B")),
        ];
        let survivors = cull(population, 3, 0.0);
        let fitness: Vec<f64> = survivors.iter().map(|i| i.fitness.unwrap()).collect();
        // "A" keeps its first occurrence even though the duplicate scored higher.
        assert_eq!(fitness, vec![0.8, 0.3, 0.2]);
        assert_eq!(survivors[0].molecule, Some("A".to_string()));
        assert_eq!(survivors.iter().filter(|i| i.molecule.as_deref() == Some("A")).count(), 2);
    }

    #[test]
    fn test_cull_truncates_unique() {
        let population = vec![ind(0.1, Some("A")), ind(0.9, Some("B")), ind(0.5, Some("C"))];
        let survivors = cull(population, 2, 0.0);
        assert_eq!(survivors.len(), 2);
        assert_eq!(survivors[0].molecule.as_deref(), Some("B"));
        assert_eq!(survivors[1].molecule.as_deref(), Some("C"));
    }

    #[test]
    fn test_mean_similarity() {
        let population = vec![
            Individual::new(Fingerprint::new(vec![true, false]), TreeShape::single_step(1)),
            Individual::new(Fingerprint::new(vec![false, true]), TreeShape::single_step(1)),
        ];
        let fp = Fingerprint::new(vec![true, false]);
        assert!((mean_similarity(&fp, &population) - 0.5).abs() < 1e-12);
    }
}
