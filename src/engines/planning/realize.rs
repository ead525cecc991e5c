use super::decoder::PlanningContext;
use super::skeleton::{NodeId, NodeKind, NodeValue, Skeleton};
use crate::error::{Result, SynrouteError};
use log::debug;
use rayon::prelude::*;

/// A completed skeleton executed through the chemistry backend.
#[derive(Debug, Clone)]
pub struct RealizedPlan {
    pub skeleton: Skeleton,
    /// Molecule at every node: building blocks, intermediates and products.
    pub molecules: Vec<Option<String>>,
    pub product: String,
}

impl RealizedPlan {
    /// Apply every transformation bottom-up.
    pub fn realize(ctx: &PlanningContext, skeleton: &Skeleton) -> Result<Self> {
        if !skeleton.is_complete() {
            return Err(SynrouteError::Validation("Cannot realize an incomplete plan".to_string()));
        }
        if skeleton.transformation_count() == 0 {
            return Err(SynrouteError::Chemistry("Plan contains no transformation".to_string()));
        }
        let mut molecules = vec![None; skeleton.len()];
        let product = realize_node(ctx, skeleton, skeleton.root(), &mut molecules)?;
        Ok(Self {
            skeleton: skeleton.clone(),
            molecules,
            product,
        })
    }

    /// Realize every beam and keep the ones that worked.
    pub fn realize_all(ctx: &PlanningContext, beams: &[Skeleton]) -> Result<Vec<Self>> {
        let plans: Vec<RealizedPlan> = beams
            .par_iter()
            .filter_map(|beam| match Self::realize(ctx, beam) {
                Ok(plan) => Some(plan),
                Err(e) => {
                    debug!("Beam failed to realize: {}", e);
                    None
                }
            })
            .collect();
        if plans.is_empty() {
            return Err(SynrouteError::DecoderExhausted(
                "Chemistry failed on every beam".to_string(),
            ));
        }
        Ok(plans)
    }
}

fn realize_node(
    ctx: &PlanningContext,
    skeleton: &Skeleton,
    node: NodeId,
    molecules: &mut [Option<String>],
) -> Result<String> {
    let molecule = match (skeleton.kind(node), skeleton.value(node)) {
        (NodeKind::Transformation, Some(NodeValue::Template(template))) => {
            let mut reactants = Vec::with_capacity(skeleton.children(node).len());
            for &child in skeleton.children(node) {
                reactants.push(realize_node(ctx, skeleton, child, molecules)?);
            }
            let refs: Vec<&str> = reactants.iter().map(String::as_str).collect();
            ctx.executor.apply(template, &refs).ok_or_else(|| {
                SynrouteError::Chemistry(format!("Template {} failed at node {}", template, node))
            })?
        }
        (NodeKind::Terminal, Some(NodeValue::Molecule(index))) => ctx
            .catalog
            .get(index)
            .map(str::to_string)
            .ok_or_else(|| {
                SynrouteError::Validation(format!("Catalog index {} out of range", index))
            })?,
        // Target or masked intermediate: whatever its producer makes.
        (NodeKind::Terminal, _) => match skeleton.children(node) {
            [producer] => realize_node(ctx, skeleton, *producer, molecules)?,
            _ => {
                return Err(SynrouteError::Chemistry(format!(
                    "Terminal node {} has no molecule and no producer",
                    node
                )))
            }
        },
        (NodeKind::Transformation, _) => {
            return Err(SynrouteError::InvalidAssignment {
                node,
                reason: "transformation without a template".to_string(),
            })
        }
    };
    molecules[node] = Some(molecule.clone());
    Ok(molecule)
}
