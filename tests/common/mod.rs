//! Deterministic stand-ins for the external collaborators.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use synroute::config::{DecoderConfig, IndexConfig};
use synroute::data::{Catalog, EmbeddingStore, ReactionTemplate, TemplateSet};
use synroute::engines::planning::{FeasibilityIndex, IndexBuilder, PlanningContext, TreeDecoder, TreeShape};
use synroute::models::{ChemistryExecutor, Fingerprinter, Oracle, ScoringModel, ShapePredictor, TreeEncoding};
use synroute::types::{CatalogIndex, Fingerprint, TemplateId};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Same template logits on every node.
pub struct FixedLogits(pub Vec<f32>);

impl ScoringModel for FixedLogits {
    fn score(&self, encoding: &TreeEncoding) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(vec![self.0.clone(); encoding.len()])
    }
}

/// Same predicted building-block embedding on every node.
pub struct FixedEmbedding(pub Vec<f32>);

impl ScoringModel for FixedEmbedding {
    fn score(&self, encoding: &TreeEncoding) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(vec![self.0.clone(); encoding.len()])
    }
}

pub struct FailingModel;

impl ScoringModel for FailingModel {
    fn score(&self, _encoding: &TreeEncoding) -> anyhow::Result<Vec<Vec<f32>>> {
        anyhow::bail!("model offline")
    }
}

/// One predicted embedding per node id; rows past the end repeat the last one.
pub struct PerNodeEmbedding(pub Vec<Vec<f32>>);

impl ScoringModel for PerNodeEmbedding {
    fn score(&self, encoding: &TreeEncoding) -> anyhow::Result<Vec<Vec<f32>>> {
        let last = self.0.last().cloned().unwrap_or_default();
        Ok((0..encoding.len())
            .map(|i| self.0.get(i).cloned().unwrap_or_else(|| last.clone()))
            .collect())
    }
}

/// Predicts the origin, but fails on any plan already holding the given building block.
pub struct FailsOnMolecule(pub CatalogIndex);

impl ScoringModel for FailsOnMolecule {
    fn score(&self, encoding: &TreeEncoding) -> anyhow::Result<Vec<Vec<f32>>> {
        if encoding.nodes.iter().any(|n| n.molecule == Some(self.0)) {
            anyhow::bail!("model failed on building block {}", self.0);
        }
        Ok(vec![vec![0.0, 0.0]; encoding.len()])
    }
}

/// String chemistry over three templates:
/// 0 `tag`: unary, appends "X" to molecules starting with 'C';
/// 1 `dead`: unary, never applicable;
/// 2 `join`: binary, joins any two molecules with '.'.
pub struct ToyChemistry;

pub const TAG: TemplateId = 0;
pub const DEAD: TemplateId = 1;
pub const JOIN: TemplateId = 2;

impl ChemistryExecutor for ToyChemistry {
    fn matches(&self, template: TemplateId, _slot: usize, molecule: &str) -> bool {
        match template {
            TAG => molecule.starts_with('C'),
            JOIN => true,
            _ => false,
        }
    }

    fn apply(&self, template: TemplateId, reactants: &[&str]) -> Option<String> {
        match (template, reactants) {
            (TAG, [m]) if m.starts_with('C') => Some(format!("{}X", m)),
            (JOIN, [a, b]) => Some(format!("{}.{}", a, b)),
            _ => None,
        }
    }
}

/// Scores a molecule by its length.
pub struct LengthOracle;

impl Oracle for LengthOracle {
    fn evaluate(&self, molecule: &str) -> anyhow::Result<f64> {
        Ok(molecule.len() as f64 / 10.0)
    }
}

/// `LengthOracle` that counts its invocations.
#[derive(Default)]
pub struct CountingOracle {
    pub calls: AtomicUsize,
}

impl CountingOracle {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Oracle for CountingOracle {
    fn evaluate(&self, molecule: &str) -> anyhow::Result<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        LengthOracle.evaluate(molecule)
    }
}

/// Sets one bit per character position.
pub struct CharFingerprinter;

impl Fingerprinter for CharFingerprinter {
    fn fingerprint(&self, molecule: &str, bits: usize) -> Option<Fingerprint> {
        if molecule.is_empty() || bits == 0 {
            return None;
        }
        let mut fp = Fingerprint::zeros(bits);
        for (i, c) in molecule.chars().enumerate() {
            fp.set((c as usize * 31 + i) % bits, true);
        }
        Some(fp)
    }
}

/// Cycles through a fixed list of shapes by rank.
pub struct FixedShapes(pub Vec<TreeShape>);

impl ShapePredictor for FixedShapes {
    fn predict(
        &self,
        _fingerprint: &Fingerprint,
        max_transformations: Option<usize>,
        rank: usize,
    ) -> Option<TreeShape> {
        let allowed: Vec<&TreeShape> = self
            .0
            .iter()
            .filter(|s| max_transformations.map_or(true, |m| s.internal_count() <= m))
            .collect();
        if allowed.is_empty() || rank == 0 {
            return None;
        }
        Some(allowed[(rank - 1) % allowed.len()].clone())
    }
}

pub fn templates() -> TemplateSet {
    TemplateSet::new(vec![
        ReactionTemplate::new("tag", 1),
        ReactionTemplate::new("dead", 1),
        ReactionTemplate::new("join", 2),
    ])
    .unwrap()
}

/// "NN" sits closest to the origin, so an unrestricted search prefers it
/// although `tag` cannot use it.
pub fn catalog() -> (Catalog, EmbeddingStore) {
    let catalog = Catalog::new(["NN", "CC", "CO"]).unwrap();
    let embeddings = EmbeddingStore::new(vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![0.0, 2.0]]).unwrap();
    (catalog, embeddings)
}

pub fn build_index(templates: &TemplateSet, catalog: &Catalog, max_program_size: usize) -> FeasibilityIndex {
    let config = IndexConfig { max_program_size, ..IndexConfig::default() };
    let index = FeasibilityIndex::in_memory(config.max_depth);
    IndexBuilder::new(templates, catalog, &ToyChemistry, config)
        .build(&index)
        .unwrap();
    index
}

pub struct ContextOptions {
    pub logits: Vec<f32>,
    pub query: Vec<f32>,
    pub indexed: bool,
    /// Largest program enumerated into the index.
    pub program_size: usize,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            logits: vec![1.0, 0.0, 0.5],
            query: vec![0.0, 0.0],
            indexed: true,
            program_size: 3,
        }
    }
}

pub fn context(options: ContextOptions) -> Arc<PlanningContext> {
    let templates = templates();
    let (catalog, embeddings) = catalog();
    let index = options
        .indexed
        .then(|| Arc::new(build_index(&templates, &catalog, options.program_size)));
    Arc::new(PlanningContext {
        catalog: Arc::new(catalog),
        embeddings: Arc::new(embeddings),
        templates: Arc::new(templates),
        transformation_model: Arc::new(FixedLogits(options.logits)),
        terminal_model: Arc::new(FixedEmbedding(options.query)),
        index,
        executor: Arc::new(ToyChemistry),
        shape_predictor: Some(Arc::new(FixedShapes(vec![
            TreeShape::single_step(1),
            TreeShape::single_step(2),
            TreeShape::linear(2),
        ]))),
        fingerprinter: Some(Arc::new(CharFingerprinter)),
        fp_bits: 64,
    })
}

pub fn decoder(options: ContextOptions) -> TreeDecoder {
    TreeDecoder::new(context(options), DecoderConfig::default()).unwrap()
}
