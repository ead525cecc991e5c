//! Offline construction of the feasibility index.
//!
//! Programs are enumerated by size class. Size-1 programs are single
//! templates over catalog inputs; a size-k program puts a unary template on
//! top of a size-(k-1) program, or a binary template on top of two programs
//! whose sizes add up to k-1, or a binary template over one size-(k-1)
//! program and one catalog input. Only programs that were realized through
//! the chemistry executor enter the size table, so every composition is
//! built from feasible parts. Each size class is tested in parallel and
//! fully committed before the next one starts.

use super::feasibility::{FeasibilityIndex, IndexEntry};
use super::program::{InputSlot, Program, ProgramKey};
use crate::config::{ConfigSection, IndexConfig};
use crate::data::{Catalog, TemplateSet};
use crate::error::{Result, SynrouteError};
use crate::models::ChemistryExecutor;
use crate::types::{CatalogIndex, TemplateId};
use log::{debug, info};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;

/// A program that was realized at least once.
#[derive(Debug, Clone)]
struct Realized {
    program: Program,
    entry: IndexEntry,
    products: Vec<String>,
}

/// Where a candidate's root input comes from: the catalog or a smaller program.
#[derive(Debug, Clone, Copy)]
enum Source {
    Catalog,
    Table { size: usize, index: usize },
}

#[derive(Debug, Clone)]
struct Candidate {
    template: TemplateId,
    inputs: Vec<Source>,
    program: Program,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SizeClassReport {
    pub size: usize,
    pub candidates: usize,
    pub retained: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
    pub size_classes: Vec<SizeClassReport>,
    /// Keys in the index after the build, partial views included.
    pub stored_keys: usize,
}

impl BuildReport {
    pub fn retained(&self) -> usize {
        self.size_classes.iter().map(|s| s.retained).sum()
    }
}

pub struct IndexBuilder<'a> {
    templates: &'a TemplateSet,
    catalog: &'a Catalog,
    executor: &'a dyn ChemistryExecutor,
    config: IndexConfig,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(
        templates: &'a TemplateSet,
        catalog: &'a Catalog,
        executor: &'a dyn ChemistryExecutor,
        config: IndexConfig,
    ) -> Self {
        Self { templates, catalog, executor, config }
    }

    pub fn build(&self, index: &FeasibilityIndex) -> Result<BuildReport> {
        self.config.validate()?;
        if self.templates.is_empty() {
            return Err(SynrouteError::IndexBuild("No reaction templates loaded".to_string()));
        }
        if self.catalog.is_empty() {
            return Err(SynrouteError::IndexBuild("Building-block catalog is empty".to_string()));
        }
        if index.max_depth() != self.config.max_depth {
            return Err(SynrouteError::IndexBuild(format!(
                "Index depth {} does not match build depth {}",
                index.max_depth(),
                self.config.max_depth
            )));
        }

        info!(
            "Building feasibility index: {} templates, {} building blocks, size <= {}, depth <= {}",
            self.templates.len(),
            self.catalog.len(),
            self.config.max_program_size,
            self.config.max_depth
        );

        // tables[k] holds the feasible programs of size k.
        let mut tables: Vec<Vec<Realized>> = vec![Vec::new()];
        let mut report = BuildReport::default();

        for size in 1..=self.config.max_program_size {
            let candidates = self.candidates(size, &tables)?;
            let realized: Vec<Realized> = candidates
                .par_iter()
                .filter_map(|c| self.realize(c, &tables))
                .collect();

            for r in &realized {
                index.insert(&r.program, &r.entry)?;
            }
            debug!(
                "Size class {}: {} candidates, {} feasible",
                size,
                candidates.len(),
                realized.len()
            );
            report.size_classes.push(SizeClassReport {
                size,
                candidates: candidates.len(),
                retained: realized.len(),
            });
            tables.push(realized);
        }

        report.stored_keys = index.keys()?.len();
        info!(
            "Feasibility index built: {} programs retained, {} keys stored",
            report.retained(),
            report.stored_keys
        );
        Ok(report)
    }

    fn arity(&self, template: TemplateId) -> Result<usize> {
        self.templates.arity(template).ok_or_else(|| {
            SynrouteError::IndexBuild(format!("Missing data for template {}", template))
        })
    }

    fn candidates(&self, size: usize, tables: &[Vec<Realized>]) -> Result<Vec<Candidate>> {
        let mut out = Vec::new();
        let mut seen: HashSet<ProgramKey> = HashSet::new();
        let mut push = |template: TemplateId, inputs: Vec<Source>, out: &mut Vec<Candidate>| {
            let children: Vec<Option<&Program>> = inputs
                .iter()
                .map(|s| match *s {
                    Source::Catalog => None,
                    Source::Table { size, index } => Some(&tables[size][index].program),
                })
                .collect();
            let program = Program::compose(template, &children);
            if program.height() <= self.config.max_depth && seen.insert(program.key()) {
                out.push(Candidate { template, inputs, program });
            }
        };

        for (template, _) in self.templates.iter() {
            let arity = self.arity(template)?;
            if size == 1 {
                push(template, vec![Source::Catalog; arity], &mut out);
                continue;
            }
            let below = &tables[size - 1];
            match arity {
                1 => {
                    for index in 0..below.len() {
                        push(template, vec![Source::Table { size: size - 1, index }], &mut out);
                    }
                }
                2 => {
                    for index in 0..below.len() {
                        let child = Source::Table { size: size - 1, index };
                        push(template, vec![child, Source::Catalog], &mut out);
                        push(template, vec![Source::Catalog, child], &mut out);
                    }
                    for left in 1..size - 1 {
                        let right = size - 1 - left;
                        for a in 0..tables[left].len() {
                            for b in 0..tables[right].len() {
                                push(
                                    template,
                                    vec![
                                        Source::Table { size: left, index: a },
                                        Source::Table { size: right, index: b },
                                    ],
                                    &mut out,
                                );
                            }
                        }
                    }
                }
                other => {
                    return Err(SynrouteError::IndexBuild(format!(
                        "Template {} has unsupported arity {}",
                        template, other
                    )))
                }
            }
        }
        Ok(out)
    }

    /// Try reactant combinations for the candidate's top template. `None` if
    /// no combination produced anything.
    fn realize(&self, candidate: &Candidate, tables: &[Vec<Realized>]) -> Option<Realized> {
        let t = candidate.template;

        // Per slot: (catalog index if from the catalog, molecule).
        let mut options: Vec<Vec<(Option<CatalogIndex>, &str)>> = Vec::new();
        for (slot, source) in candidate.inputs.iter().enumerate() {
            let slot_options: Vec<(Option<CatalogIndex>, &str)> = match *source {
                Source::Catalog => self
                    .catalog
                    .iter()
                    .filter(|(_, m)| self.executor.matches(t, slot, m))
                    .map(|(i, m)| (Some(i), m))
                    .collect(),
                Source::Table { size, index } => tables[size][index]
                    .products
                    .iter()
                    .filter(|p| self.executor.matches(t, slot, p))
                    .map(|p| (None, p.as_str()))
                    .collect(),
            };
            if slot_options.is_empty() {
                return None;
            }
            options.push(slot_options);
        }

        let mut entry = IndexEntry::default();
        let mut products: Vec<String> = Vec::new();
        let mut cursor = vec![0usize; options.len()];
        let mut trials = 0;
        loop {
            let reactants: Vec<&str> = cursor
                .iter()
                .zip(&options)
                .map(|(&i, opts)| opts[i].1)
                .collect();
            trials += 1;
            if let Some(product) = self.executor.apply(t, &reactants) {
                for (slot, (&i, opts)) in cursor.iter().zip(&options).enumerate() {
                    if let Some(catalog_index) = opts[i].0 {
                        entry.add(InputSlot { node: 0, slot }, catalog_index);
                    }
                }
                if products.len() < self.config.max_products_per_program
                    && !products.contains(&product)
                {
                    products.push(product);
                }
            }
            if trials >= self.config.max_trials_per_program || !advance(&mut cursor, &options) {
                break;
            }
        }

        if products.is_empty() {
            return None;
        }

        // Nested programs contribute their own slot entries, shifted to their
        // position in the composed layout.
        let mut offset = 1;
        for source in &candidate.inputs {
            if let Source::Table { size, index } = *source {
                let child = &tables[size][index];
                for s in child.entry.slots() {
                    for &e in &s.entries {
                        entry.add(InputSlot { node: s.slot.node + offset, slot: s.slot.slot }, e);
                    }
                }
                offset += child.program.size();
            }
        }

        Some(Realized {
            program: candidate.program.clone(),
            entry,
            products,
        })
    }
}

// Odometer over the per-slot option lists. Returns false after the last combination.
fn advance<T>(cursor: &mut [usize], options: &[Vec<T>]) -> bool {
    for i in (0..cursor.len()).rev() {
        cursor[i] += 1;
        if cursor[i] < options[i].len() {
            return true;
        }
        cursor[i] = 0;
    }
    false
}
