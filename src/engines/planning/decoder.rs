//! Worklist decoder that fills a skeleton one node per step.

use super::feasibility::FeasibilityIndex;
use super::program::InputSlot;
use super::shape::TreeShape;
use super::skeleton::{NodeId, NodeKind, NodeValue, ProgramTrace, Skeleton};
use crate::config::DecoderConfig;
use crate::data::{Catalog, EmbeddingStore, TemplateSet};
use crate::error::{Result, SynrouteError};
use crate::models::{ChemistryExecutor, Fingerprinter, ScoringModel, ShapePredictor, TreeEncoding};
use crate::types::{CatalogIndex, Target, TemplateId};
use log::{debug, warn};
use rayon::prelude::*;
use std::sync::Arc;

/// Everything a decode needs, passed explicitly instead of living in globals.
#[derive(Clone)]
pub struct PlanningContext {
    pub catalog: Arc<Catalog>,
    pub embeddings: Arc<EmbeddingStore>,
    pub templates: Arc<TemplateSet>,
    pub transformation_model: Arc<dyn ScoringModel>,
    pub terminal_model: Arc<dyn ScoringModel>,
    pub index: Option<Arc<FeasibilityIndex>>,
    pub executor: Arc<dyn ChemistryExecutor>,
    pub shape_predictor: Option<Arc<dyn ShapePredictor>>,
    pub fingerprinter: Option<Arc<dyn Fingerprinter>>,
    /// Fingerprint length used when a molecule target needs a shape prediction.
    pub fp_bits: usize,
}

impl PlanningContext {
    pub fn validate(&self) -> Result<()> {
        if self.catalog.len() != self.embeddings.len() {
            return Err(SynrouteError::Validation(format!(
                "Catalog has {} entries but {} embeddings",
                self.catalog.len(),
                self.embeddings.len()
            )));
        }
        if self.templates.is_empty() {
            return Err(SynrouteError::Validation("No reaction templates loaded".to_string()));
        }
        Ok(())
    }
}

enum Step {
    Continue(Skeleton),
    Branch(Vec<Skeleton>),
    Drop,
}

struct Scores {
    transformation: Vec<Vec<f32>>,
    terminal: Vec<Vec<f32>>,
}

pub struct TreeDecoder {
    ctx: Arc<PlanningContext>,
    config: DecoderConfig,
}

impl TreeDecoder {
    pub fn new(ctx: Arc<PlanningContext>, config: DecoderConfig) -> Result<Self> {
        ctx.validate()?;
        Ok(Self { ctx, config })
    }

    pub fn context(&self) -> &Arc<PlanningContext> {
        &self.ctx
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Decode a target, predicting its plan shape first.
    pub fn decode(&self, target: &Target, beam_width: usize, top_k: usize) -> Result<Vec<Skeleton>> {
        let shape = self.predict_shape(target, None, 1)?;
        self.decode_shape(&shape, target.clone(), beam_width, top_k)
    }

    pub fn decode_shape(
        &self,
        shape: &TreeShape,
        target: Target,
        beam_width: usize,
        top_k: usize,
    ) -> Result<Vec<Skeleton>> {
        let skeleton = Skeleton::create(shape, target)?;
        self.decode_skeleton(skeleton, beam_width, top_k)
    }

    /// Decode independent targets in parallel; each keeps its own worklist.
    pub fn decode_batch(
        &self,
        targets: &[Target],
        beam_width: usize,
        top_k: usize,
    ) -> Vec<Result<Vec<Skeleton>>> {
        targets
            .par_iter()
            .map(|t| self.decode(t, beam_width, top_k))
            .collect()
    }

    pub fn predict_shape(
        &self,
        target: &Target,
        max_transformations: Option<usize>,
        rank: usize,
    ) -> Result<TreeShape> {
        let predictor = self.ctx.shape_predictor.as_ref().ok_or_else(|| {
            SynrouteError::Validation("No shape predictor configured".to_string())
        })?;
        let fingerprint = match target {
            Target::Fingerprint(fp) => fp.clone(),
            Target::Molecule(m) => self
                .ctx
                .fingerprinter
                .as_ref()
                .and_then(|f| f.fingerprint(m, self.ctx.fp_bits))
                .ok_or_else(|| {
                    SynrouteError::Validation(format!("Cannot fingerprint target '{}'", m))
                })?,
        };
        predictor
            .predict(&fingerprint, max_transformations, rank)
            .ok_or_else(|| SynrouteError::Model("Shape predictor returned nothing".to_string()))
    }

    /// Run the worklist to exhaustion. Returns between 1 and `beam_width`
    /// complete skeletons, or `DecoderExhausted`.
    pub fn decode_skeleton(
        &self,
        skeleton: Skeleton,
        beam_width: usize,
        top_k: usize,
    ) -> Result<Vec<Skeleton>> {
        let branch_width = top_k.min(beam_width).max(1);
        let mut worklist = vec![skeleton];
        let mut completed = Vec::new();
        let mut branched = false;

        while let Some(beam) = worklist.pop() {
            if beam.is_complete() {
                completed.push(beam);
                if completed.len() >= beam_width {
                    break;
                }
                continue;
            }
            let width = if branched { 1 } else { branch_width };
            match self.step(beam, width) {
                Ok(Step::Continue(next)) => worklist.push(next),
                Ok(Step::Branch(beams)) => {
                    branched = true;
                    // Reverse so the nearest candidate is popped first.
                    worklist.extend(beams.into_iter().rev());
                }
                Ok(Step::Drop) => {}
                Err(e) => warn!("Dropping beam: {}", e),
            }
        }

        if completed.is_empty() {
            return Err(SynrouteError::DecoderExhausted(
                "No beam reached a complete plan".to_string(),
            ));
        }
        debug!("Decode finished with {} beam(s)", completed.len());
        Ok(completed)
    }

    fn score(&self, beam: &Skeleton) -> Result<Scores> {
        let encoding = TreeEncoding::from_skeleton(beam);
        let transformation = self.ctx.transformation_model.score(&encoding)?;
        let terminal = self.ctx.terminal_model.score(&encoding)?;
        if transformation.len() != beam.len() || terminal.len() != beam.len() {
            return Err(SynrouteError::Model(format!(
                "Expected {} score rows, got {} and {}",
                beam.len(),
                transformation.len(),
                terminal.len()
            )));
        }
        Ok(Scores { transformation, terminal })
    }

    fn step(&self, beam: Skeleton, width: usize) -> Result<Step> {
        let frontier = beam.frontier();
        if frontier.is_empty() {
            warn!("Dropping beam with no frontier and unassigned nodes");
            return Ok(Step::Drop);
        }
        let scores = self.score(&beam)?;

        let transformations: Vec<NodeId> = frontier
            .iter()
            .copied()
            .filter(|&n| beam.kind(n) == NodeKind::Transformation)
            .collect();
        if !transformations.is_empty() {
            return self.fill_transformation(beam, &transformations, &scores);
        }
        self.fill_terminal(beam, &frontier, &scores, width)
    }

    fn index_depth(&self) -> Option<(usize, &FeasibilityIndex)> {
        if !self.config.filter_transformations && !self.config.filter_terminals {
            return None;
        }
        self.ctx
            .index
            .as_deref()
            .map(|index| (self.config.max_depth.min(index.max_depth()), index))
    }

    /// Templates allowed at `node`, with whether the index constrained them.
    fn allowed_templates(&self, beam: &Skeleton, node: NodeId) -> Result<(Vec<TemplateId>, bool)> {
        let arity = beam.children(node).len();
        let by_arity = self.ctx.templates.with_arity(arity);
        if !self.config.filter_transformations {
            return Ok((by_arity, false));
        }
        let Some((depth, index)) = self.index_depth() else {
            return Ok((by_arity, false));
        };
        let Some(sub) = beam.restricted_subtree(node, depth) else {
            return Ok((by_arity, false));
        };

        let mut feasible = Vec::with_capacity(by_arity.len());
        for &t in &by_arity {
            let program = sub.program(beam, Some((node, t)))?;
            if index.exists(&program) {
                feasible.push(t);
            }
        }
        if feasible.is_empty() {
            let err = SynrouteError::InfeasibleProgram(format!(
                "no indexed completion at node {}",
                node
            ));
            debug!("{}; falling back to arity-only masking", err);
            return Ok((by_arity, false));
        }
        Ok((feasible, true))
    }

    fn fill_transformation(
        &self,
        mut beam: Skeleton,
        candidates: &[NodeId],
        scores: &Scores,
    ) -> Result<Step> {
        // (node, template, logit, index-constrained)
        let mut best: Option<(NodeId, TemplateId, f32, bool)> = None;
        for &node in candidates {
            let (allowed, constrained) = self.allowed_templates(&beam, node)?;
            let row = &scores.transformation[node];
            let top = allowed
                .iter()
                .filter_map(|&t| row.get(t).map(|&logit| (t, logit)))
                .fold(None, |acc: Option<(TemplateId, f32)>, (t, logit)| match acc {
                    Some((_, l)) if l >= logit => acc,
                    _ => Some((t, logit)),
                });
            let Some((template, logit)) = top else {
                warn!(
                    "{}",
                    SynrouteError::InvalidAssignment {
                        node,
                        reason: "no template matches the node arity".to_string()
                    }
                );
                return Ok(Step::Drop);
            };
            if best.map_or(true, |(_, _, l, _)| logit > l) {
                best = Some((node, template, logit, constrained));
            }
        }
        let Some((node, template, _, constrained)) = best else {
            return Ok(Step::Drop);
        };

        if let Err(e) = beam.assign(node, NodeValue::Template(template)) {
            warn!("Dropping beam: {}", e);
            return Ok(Step::Drop);
        }
        if constrained {
            self.record_traces(&mut beam, node)?;
        }
        let intermediates: Vec<NodeId> = beam
            .children(node)
            .iter()
            .copied()
            .filter(|&c| beam.is_intermediate(c))
            .collect();
        beam.mask(&intermediates);
        Ok(Step::Continue(beam))
    }

    // Point every assigned member of the node's bounded subtree at the most
    // specific program key now known for it.
    fn record_traces(&self, beam: &mut Skeleton, node: NodeId) -> Result<()> {
        let Some((depth, _)) = self.index_depth() else {
            return Ok(());
        };
        let Some(sub) = beam.restricted_subtree(node, depth) else {
            return Ok(());
        };
        let key = sub.program(beam, None)?.key();
        for (position, &member) in sub.members().iter().enumerate() {
            if beam.template(member).is_some() {
                beam.record_trace(member, ProgramTrace { key, position });
            }
        }
        Ok(())
    }

    /// Building blocks considered for `node`, or `None` for the whole catalog.
    fn terminal_candidates(&self, beam: &Skeleton, node: NodeId, needed: usize) -> Option<Vec<CatalogIndex>> {
        if !self.config.filter_terminals {
            return None;
        }
        let index = self.ctx.index.as_deref()?;
        let (parent, slot) = beam.slot_of(node)?;
        let trace = beam.trace(parent)?;
        let entries = index.entries_by_key(&trace.key, InputSlot { node: trace.position, slot });
        if entries.len() < needed {
            debug!(
                "Node {}: {} indexed building blocks for {} requested, using the full catalog",
                node,
                entries.len(),
                needed
            );
            return None;
        }
        Some(entries)
    }

    fn fill_terminal(
        &self,
        mut beam: Skeleton,
        frontier: &[NodeId],
        scores: &Scores,
        width: usize,
    ) -> Result<Step> {
        let dim = self.ctx.embeddings.dim();
        let metric = self.config.metric;
        // Pick the node on unrestricted distance; restrict only its candidates.
        let mut best: Option<(NodeId, f32)> = None;
        for &node in frontier {
            let query = &scores.terminal[node];
            if query.len() != dim {
                return Err(SynrouteError::Model(format!(
                    "Terminal model returned {} values for node {}, embeddings have {}",
                    query.len(),
                    node,
                    dim
                )));
            }
            let Some((_, distance)) = self.ctx.embeddings.nearest(query, metric, None) else {
                continue;
            };
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((node, distance));
            }
        }
        let Some((node, _)) = best else {
            warn!("Dropping beam: no building block available for any frontier node");
            return Ok(Step::Drop);
        };
        let candidates = self.terminal_candidates(&beam, node, width);
        let ranked = self
            .ctx
            .embeddings
            .ranked(&scores.terminal[node], metric, candidates.as_deref());
        if ranked.is_empty() {
            warn!("Dropping beam: no indexed building block for node {}", node);
            return Ok(Step::Drop);
        }

        if width <= 1 {
            if let Err(e) = beam.assign(node, NodeValue::Molecule(ranked[0].0)) {
                warn!("Dropping beam: {}", e);
                return Ok(Step::Drop);
            }
            return Ok(Step::Continue(beam));
        }

        let mut beams = Vec::with_capacity(width);
        for &(molecule, _) in ranked.iter().take(width) {
            let mut clone = beam.clone();
            match clone.assign(node, NodeValue::Molecule(molecule)) {
                Ok(()) => beams.push(clone),
                Err(e) => warn!("Dropping branch: {}", e),
            }
        }
        Ok(Step::Branch(beams))
    }
}
