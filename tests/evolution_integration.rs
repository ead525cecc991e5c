mod common;

use common::*;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::mpsc;
use std::sync::Arc;
use synroute::config::{CrossoverKind, DecoderConfig, SearchConfig};
use synroute::engines::generation::operators::crossover;
use synroute::engines::generation::{
    cull, ChannelProgressCallback, Checkpoint, GenerationMetrics, Individual, Initialization,
    NoProgress, ProgressCallback, ProgressMessage, SearchEngine, StopReason,
};
use synroute::engines::planning::{TreeDecoder, TreeShape};
use synroute::types::Fingerprint;

/// Simple progress callback for testing
struct TestProgressCallback {
    last_generation: usize,
}

impl ProgressCallback for TestProgressCallback {
    fn on_generation_start(&mut self, _generation: usize) {}

    fn on_generation_complete(&mut self, metrics: &GenerationMetrics) {
        self.last_generation = metrics.generation;
        println!(
            "Generation {}: mean = {:.4}, top1 = {:.4}, oracle calls = {}",
            metrics.generation, metrics.mean, metrics.top1, metrics.oracle_calls
        );
    }

    fn on_offspring_evaluated(&mut self, _evaluated: usize, _total: usize) {}
}

/// Create a small search config for fast testing
fn create_test_search_config() -> SearchConfig {
    SearchConfig {
        seed: 42,
        fp_bits: 64,
        max_nodes: 6,
        generations: 3,
        population_size: 6,
        offspring_size: 6,
        explore_warmup: 1,
        shape_top_k: 3,
        ..SearchConfig::default()
    }
}

fn create_engine(config: SearchConfig) -> SearchEngine {
    let decoder = TreeDecoder::new(context(ContextOptions::default()), DecoderConfig::default()).unwrap();
    SearchEngine::new(config, Arc::new(decoder), Arc::new(LengthOracle)).unwrap()
}

fn create_counted_engine(
    config: SearchConfig,
    decoder_config: DecoderConfig,
) -> (SearchEngine, Arc<CountingOracle>) {
    let decoder = TreeDecoder::new(context(ContextOptions::default()), decoder_config).unwrap();
    let oracle = Arc::new(CountingOracle::default());
    let engine = SearchEngine::new(config, Arc::new(decoder), oracle.clone()).unwrap();
    (engine, oracle)
}

fn scored(fitness: f64, molecule: &str, marker: usize) -> Individual {
    let mut fp = Fingerprint::zeros(8);
    fp.set(marker, true);
    let mut ind = Individual::new(fp, TreeShape::single_step(1));
    ind.molecule = Some(molecule.to_string());
    ind.fitness = Some(fitness);
    ind
}

#[test]
fn test_cull_keeps_first_duplicate_and_backfills() {
    let population = vec![
        scored(0.9, "A", 0),
        scored(0.5, "B", 1),
        scored(0.5, "B", 2),
        scored(0.1, "C", 3),
    ];
    let survivors = cull(population, 3, 0.0);
    let fitness: Vec<f64> = survivors.iter().map(|i| i.fitness.unwrap()).collect();
    assert_eq!(fitness, vec![0.9, 0.5, 0.1]);
    assert!(survivors[1].fingerprint.get(1), "first-seen duplicate survives");
}

#[test]
fn test_cull_always_returns_n_when_available() {
    let population = vec![
        scored(0.3, "A", 0),
        scored(0.7, "A", 1),
        scored(0.2, "A", 2),
        scored(0.6, "B", 3),
    ];
    assert_eq!(cull(population.clone(), 4, 0.0).len(), 4);
    assert_eq!(cull(population.clone(), 2, 0.0).len(), 2);
    assert_eq!(cull(population, 10, 0.0).len(), 4);
}

proptest! {
    #[test]
    fn prop_crossover_bits_come_from_parents(
        a in proptest::collection::vec(any::<bool>(), 1..200),
        seed in any::<u64>(),
        contiguous in any::<bool>(),
    ) {
        let mut rng = StdRng::seed_from_u64(seed);
        let b: Vec<bool> = a.iter().map(|bit| !bit).collect();
        let kind = if contiguous { CrossoverKind::Contiguous } else { CrossoverKind::RandomMask };
        let pa = Fingerprint::new(a.clone());
        let pb = Fingerprint::new(b.clone());

        let child = crossover(&pa, &pb, kind, &mut rng);
        prop_assert_eq!(child.len(), a.len());
        for i in 0..a.len() {
            prop_assert!(child.get(i) == a[i] || child.get(i) == b[i]);
        }
    }
}

#[test]
fn test_small_run_completes() {
    init_logging();
    let (mut engine, oracle) = create_counted_engine(create_test_search_config(), DecoderConfig::default());
    let mut callback = TestProgressCallback { last_generation: 0 };

    let outcome = engine.optimize(Initialization::Random, &mut callback).unwrap();

    assert_eq!(outcome.stop_reason, StopReason::Completed);
    assert_eq!(outcome.population.len(), 6);
    assert_eq!(outcome.metrics.len(), 4);
    assert_eq!(outcome.oracle_calls, 6 + 3 * 6);
    assert_eq!(engine.oracle_calls(), outcome.oracle_calls);
    assert_eq!(oracle.calls(), outcome.oracle_calls);
    assert_eq!(callback.last_generation, 3);
    assert!(outcome.population.iter().all(|i| i.fitness.is_some()));
    // Every shape the fake predictor produces is realizable.
    assert!(outcome.population.iter().any(|i| i.molecule.is_some()));

    // Survivors are sorted best first and the top score never drops.
    let fitness: Vec<f64> = outcome.population.iter().map(|i| i.fitness.unwrap()).collect();
    assert!(fitness.windows(2).all(|w| w[0] >= w[1]));
    assert!(outcome.metrics.windows(2).all(|w| w[1].top1 >= w[0].top1));
}

#[test]
fn test_run_is_reproducible_for_a_seed() {
    let first = create_engine(create_test_search_config())
        .optimize(Initialization::Random, NoProgress)
        .unwrap();
    let second = create_engine(create_test_search_config())
        .optimize(Initialization::Random, NoProgress)
        .unwrap();
    assert_eq!(first.population, second.population);
    assert_eq!(first.metrics, second.metrics);
}

#[test]
fn test_budget_stops_the_run() {
    let config = SearchConfig {
        max_oracle_calls: 10,
        ..create_test_search_config()
    };
    let outcome = create_engine(config)
        .optimize(Initialization::Random, NoProgress)
        .unwrap();
    assert_eq!(outcome.stop_reason, StopReason::BudgetExhausted);
    assert_eq!(outcome.oracle_calls, 10);
    assert_eq!(outcome.metrics.len(), 2);
    assert_eq!(outcome.population.len(), 6);
}

#[test]
fn test_budget_counts_every_scored_product() {
    let config = SearchConfig {
        max_oracle_calls: 10,
        ..create_test_search_config()
    };
    let decoder_config = DecoderConfig { beam_width: 3, top_k: 3, ..DecoderConfig::default() };
    let (mut engine, oracle) = create_counted_engine(config, decoder_config);

    // Each seed realizes two products, so six seeds would need twelve calls.
    let outcome = engine.optimize(Initialization::Random, NoProgress).unwrap();
    assert_eq!(outcome.stop_reason, StopReason::BudgetExhausted);
    assert_eq!(oracle.calls(), 10);
    assert_eq!(outcome.oracle_calls, oracle.calls());
    assert_eq!(outcome.metrics.len(), 1);
}

#[test]
fn test_early_stop_after_full_window() {
    let config = SearchConfig {
        early_stop: true,
        early_stop_warmup: 0,
        early_stop_patience: 2,
        early_stop_delta: 1e9,
        ..create_test_search_config()
    };
    let outcome = create_engine(config)
        .optimize(Initialization::Random, NoProgress)
        .unwrap();
    assert_eq!(outcome.stop_reason, StopReason::EarlyStopped);
    assert_eq!(outcome.metrics.last().unwrap().generation, 1);
    assert_eq!(outcome.oracle_calls, 12);
}

#[test]
fn test_reference_initialization_tops_up() {
    let config = SearchConfig { generations: 1, ..create_test_search_config() };
    let references = vec!["CCX".to_string(), "COX".to_string(), String::new()];
    let outcome = create_engine(config)
        .optimize(Initialization::Reference(references), NoProgress)
        .unwrap();
    assert_eq!(outcome.population.len(), 6);
    assert_eq!(outcome.metrics[0].population_size, 6);
    assert_eq!(outcome.oracle_calls, 12);
}

#[test]
fn test_resume_from_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("population.json");
    let config = SearchConfig {
        generations: 2,
        checkpoint_path: Some(path.clone()),
        ..create_test_search_config()
    };
    create_engine(config)
        .optimize(Initialization::Random, NoProgress)
        .unwrap();

    let checkpoint = Checkpoint::load(&path).unwrap();
    assert_eq!(checkpoint.generation, 2);
    assert_eq!(checkpoint.oracle_calls, 18);
    assert_eq!(checkpoint.population.len(), 6);

    let outcome = create_engine(create_test_search_config())
        .optimize(Initialization::Resume(checkpoint), NoProgress)
        .unwrap();
    assert_eq!(outcome.metrics.len(), 2);
    assert_eq!(outcome.metrics[0].generation, 2);
    assert_eq!(outcome.metrics[1].generation, 3);
    assert_eq!(outcome.oracle_calls, 24);
}

#[test]
fn test_channel_progress_messages() {
    let (sender, receiver) = mpsc::channel();
    let config = SearchConfig { generations: 2, ..create_test_search_config() };
    create_engine(config)
        .optimize(Initialization::Random, ChannelProgressCallback::new(sender))
        .unwrap();

    let messages: Vec<ProgressMessage> = receiver.try_iter().collect();
    let starts: Vec<usize> = messages
        .iter()
        .filter_map(|m| match m {
            ProgressMessage::GenerationStart(g) => Some(*g),
            _ => None,
        })
        .collect();
    assert_eq!(starts, vec![0, 1, 2]);
    let completed = messages
        .iter()
        .filter(|m| matches!(m, ProgressMessage::GenerationComplete(_)))
        .count();
    assert_eq!(completed, 3);
    assert!(matches!(
        messages.last(),
        Some(ProgressMessage::Stopped { generation: 2, reason: StopReason::Completed })
    ));
}

#[test]
fn test_rejects_invalid_config() {
    let decoder = TreeDecoder::new(context(ContextOptions::default()), DecoderConfig::default()).unwrap();
    let config = SearchConfig { population_size: 1, ..create_test_search_config() };
    assert!(SearchEngine::new(config, Arc::new(decoder), Arc::new(LengthOracle)).is_err());
}
