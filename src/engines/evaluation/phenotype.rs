//! Genome to phenotype: decode a plan for the fingerprint, run it through the
//! chemistry backend, then score the resulting molecules with the oracle.

use crate::engines::generation::genome::Individual;
use crate::engines::planning::{RealizedPlan, TreeDecoder};
use crate::error::Result;
use crate::models::Oracle;
use crate::types::Target;
use log::{debug, warn};
use rayon::prelude::*;

/// An individual with the distinct products its decoded beams realized, best beam first.
#[derive(Debug, Clone)]
pub struct Expressed {
    pub individual: Individual,
    pub products: Vec<String>,
}

impl Expressed {
    pub fn is_viable(&self) -> bool {
        !self.products.is_empty()
    }

    /// Oracle calls needed to score this individual: one per product.
    pub fn oracle_cost(&self) -> usize {
        self.products.len()
    }
}

pub struct Expresser<'a> {
    decoder: &'a TreeDecoder,
    realign: bool,
}

impl<'a> Expresser<'a> {
    pub fn new(decoder: &'a TreeDecoder, realign: bool) -> Self {
        Self { decoder, realign }
    }

    /// Decode and realize one individual. Failures leave it without a molecule.
    pub fn express(&self, mut individual: Individual) -> Expressed {
        individual.reset();
        let products = match self.products(&individual) {
            Ok(products) => products,
            Err(e) => {
                debug!("Individual not expressible: {}", e);
                Vec::new()
            }
        };
        if let Some(first) = products.first() {
            individual.molecule = Some(first.clone());
            if self.realign {
                self.realign_fingerprint(&mut individual, first);
            }
        }
        Expressed { individual, products }
    }

    pub fn express_all(&self, individuals: Vec<Individual>) -> Vec<Expressed> {
        individuals
            .into_par_iter()
            .map(|ind| self.express(ind))
            .collect()
    }

    fn products(&self, individual: &Individual) -> Result<Vec<String>> {
        let config = self.decoder.config();
        let beams = self.decoder.decode_shape(
            &individual.shape,
            Target::Fingerprint(individual.fingerprint.clone()),
            config.beam_width,
            config.top_k,
        )?;
        let plans = RealizedPlan::realize_all(self.decoder.context(), &beams)?;
        let mut products: Vec<String> = Vec::with_capacity(plans.len());
        for plan in plans {
            if !products.contains(&plan.product) {
                products.push(plan.product);
            }
        }
        Ok(products)
    }

    fn realign_fingerprint(&self, individual: &mut Individual, molecule: &str) {
        let Some(fingerprinter) = self.decoder.context().fingerprinter.as_ref() else {
            return;
        };
        match fingerprinter.fingerprint(molecule, individual.fingerprint.len()) {
            Some(fp) if fp.len() == individual.fingerprint.len() => individual.fingerprint = fp,
            _ => debug!("Keeping original fingerprint for '{}'", molecule),
        }
    }
}

/// Score an expressed individual: the best oracle value over its products.
/// Individuals without products, or whose products all fail to score, get `min_fitness`.
/// Returns the individual with the number of oracle calls made.
pub fn evaluate(oracle: &dyn Oracle, expressed: Expressed, min_fitness: f64) -> (Individual, usize) {
    let Expressed { mut individual, products } = expressed;
    let mut best: Option<(f64, &String)> = None;
    let mut calls = 0;
    for product in &products {
        calls += 1;
        match oracle.evaluate(product) {
            Ok(score) if score.is_finite() => {
                if best.map_or(true, |(b, _)| score > b) {
                    best = Some((score, product));
                }
            }
            Ok(score) => warn!("Oracle returned {} for '{}'", score, product),
            Err(e) => warn!("Oracle failed on '{}': {}", product, e),
        }
    }
    match best {
        Some((score, product)) => {
            individual.molecule = Some(product.clone());
            individual.fitness = Some(score);
        }
        None => individual.fitness = Some(min_fitness),
    }
    (individual, calls)
}

/// Score a batch in parallel. Returns the individuals in order with the total oracle calls.
pub fn evaluate_all(oracle: &dyn Oracle, batch: Vec<Expressed>, min_fitness: f64) -> (Vec<Individual>, usize) {
    let scored: Vec<(Individual, usize)> = batch
        .into_par_iter()
        .map(|e| evaluate(oracle, e, min_fitness))
        .collect();
    let calls = scored.iter().map(|(_, c)| c).sum();
    (scored.into_iter().map(|(ind, _)| ind).collect(), calls)
}
