use crate::error::{Result, SynrouteError};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Structure of a synthesis plan without any assignments.
///
/// A rooted tree with out-degree at most two. Internal nodes are template
/// applications and leaves are building blocks; node 0 is the root, whose
/// product is the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeShape {
    children: Vec<Vec<usize>>,
}

impl TreeShape {
    pub fn new(children: Vec<Vec<usize>>) -> Result<Self> {
        if children.is_empty() {
            return Err(SynrouteError::InvalidSkeleton("Empty tree shape".to_string()));
        }
        let mut parents = vec![0usize; children.len()];
        for (i, kids) in children.iter().enumerate() {
            if kids.len() > 2 {
                return Err(SynrouteError::InvalidSkeleton(format!(
                    "Shape node {} has {} children",
                    i,
                    kids.len()
                )));
            }
            for &k in kids {
                if k == 0 || k >= children.len() {
                    return Err(SynrouteError::InvalidSkeleton(format!(
                        "Shape node {} has invalid child {}",
                        i, k
                    )));
                }
                parents[k] += 1;
            }
        }
        if parents.iter().skip(1).any(|&p| p != 1) {
            return Err(SynrouteError::InvalidSkeleton(
                "Every non-root shape node needs exactly one parent".to_string(),
            ));
        }
        let shape = Self { children };
        if shape.preorder().len() != shape.children.len() {
            return Err(SynrouteError::InvalidSkeleton("Shape is not connected".to_string()));
        }
        Ok(shape)
    }

    /// One transformation over `arity` building blocks.
    pub fn single_step(arity: usize) -> Self {
        let mut children = vec![(1..=arity).collect::<Vec<_>>()];
        children.extend((0..arity).map(|_| Vec::new()));
        Self { children }
    }

    /// `steps` unary transformations stacked over one building block.
    pub fn linear(steps: usize) -> Self {
        let mut children: Vec<Vec<usize>> = (1..=steps).map(|i| vec![i]).collect();
        children.push(Vec::new());
        Self { children }
    }

    /// Random shape with a node count drawn from `min_nodes..=max_nodes`.
    pub fn random<R: Rng>(
        rng: &mut R,
        min_nodes: usize,
        max_nodes: usize,
        max_internal: Option<usize>,
    ) -> Self {
        let mut shape = Self::single_step(1);
        let target = rng.gen_range(min_nodes.max(2)..=max_nodes.max(2));
        while shape.node_count() < target {
            if !shape.add_leaf(rng, max_internal, max_nodes) {
                break;
            }
        }
        shape
    }

    pub fn children(&self, node: usize) -> &[usize] {
        &self.children[node]
    }

    pub fn node_count(&self) -> usize {
        self.children.len()
    }

    pub fn is_leaf(&self, node: usize) -> bool {
        self.children[node].is_empty()
    }

    pub fn internal_count(&self) -> usize {
        self.children.iter().filter(|c| !c.is_empty()).count()
    }

    pub fn leaf_count(&self) -> usize {
        self.node_count() - self.internal_count()
    }

    /// Number of nodes on the longest root-to-leaf path.
    pub fn depth(&self) -> usize {
        fn walk(shape: &TreeShape, node: usize) -> usize {
            1 + shape.children[node].iter().map(|&c| walk(shape, c)).max().unwrap_or(0)
        }
        walk(self, 0)
    }

    pub fn preorder(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.children.len());
        let mut stack = vec![0usize];
        while let Some(n) = stack.pop() {
            if order.len() > self.children.len() {
                break;
            }
            order.push(n);
            for &c in self.children[n].iter().rev() {
                stack.push(c);
            }
        }
        order
    }

    /// Attach a new leaf under a node with spare capacity. Returns false when
    /// no node can take one within the bounds.
    pub fn add_leaf<R: Rng>(
        &mut self,
        rng: &mut R,
        max_internal: Option<usize>,
        max_nodes: usize,
    ) -> bool {
        if self.node_count() >= max_nodes {
            return false;
        }
        let internal = self.internal_count();
        let candidates: Vec<usize> = (0..self.node_count())
            .filter(|&n| {
                let degree = self.children[n].len();
                if degree >= 2 {
                    return false;
                }
                // A leaf that gains a child becomes a transformation.
                degree > 0 || max_internal.map_or(true, |m| internal < m)
            })
            .collect();
        let Some(&parent) = candidates.choose(rng) else {
            return false;
        };
        let new_node = self.children.len();
        self.children.push(Vec::new());
        self.children[parent].push(new_node);
        true
    }

    /// Detach a random leaf, keeping at least `min_nodes` nodes.
    pub fn remove_leaf<R: Rng>(&mut self, rng: &mut R, min_nodes: usize) -> bool {
        if self.node_count() <= min_nodes.max(2) {
            return false;
        }
        let leaves: Vec<usize> = (1..self.node_count()).filter(|&n| self.is_leaf(n)).collect();
        let Some(&victim) = leaves.choose(rng) else {
            return false;
        };
        self.children.remove(victim);
        for kids in self.children.iter_mut() {
            kids.retain(|&k| k != victim);
            for k in kids.iter_mut() {
                if *k > victim {
                    *k -= 1;
                }
            }
        }
        true
    }
}
