//! Bounded-depth transformation structures used as feasibility-index keys.
//!
//! A [`Program`] mirrors the transformation-only subgraph of a skeleton
//! subtree: every node is a template application, and every input slot is
//! either fed from the building-block catalog or by a nested step. Programs
//! are immutable once built and are compared through their [`ProgramKey`],
//! a digest of the tree read from the root in slot order. Arena positions do
//! not enter the digest, so relabelling nodes leaves the key unchanged.

use crate::config::index::MAX_PROGRAM_SIZE;
use crate::error::{Result, SynrouteError};
use crate::types::TemplateId;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

/// Canonical digest of a [`Program`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramKey([u8; 32]);

impl ProgramKey {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| SynrouteError::Validation(format!("Bad program key '{}': {}", s, e)))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| SynrouteError::Validation(format!("Bad program key length '{}'", s)))?;
        Ok(Self(arr))
    }
}

impl fmt::Display for ProgramKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for ProgramKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProgramKey({})", &self.to_hex()[..12])
    }
}

impl Serialize for ProgramKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ProgramKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ProgramKey::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProgramInput {
    /// Filled by a catalog building block.
    Catalog,
    /// Filled by the product of another program node (arena position).
    Step(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramNode {
    /// `None` is a wildcard: any template with a feasible completion.
    pub template: Option<TemplateId>,
    /// Distance from the program root, root = 1.
    pub depth: usize,
    pub inputs: Vec<ProgramInput>,
}

/// Addresses one input slot of one program node, by canonical (pre-order) position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InputSlot {
    pub node: usize,
    pub slot: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    nodes: Vec<ProgramNode>,
    root: usize,
}

impl Program {
    /// Build from an arbitrary arena. Validates that the nodes form one tree
    /// under `root` with consistent depths.
    pub fn new(nodes: Vec<ProgramNode>, root: usize) -> Result<Self> {
        if root >= nodes.len() {
            return Err(SynrouteError::Validation("Program root out of range".to_string()));
        }
        let mut seen = vec![false; nodes.len()];
        let mut stack = vec![(root, 1usize)];
        while let Some((i, depth)) = stack.pop() {
            if seen[i] {
                return Err(SynrouteError::Validation(format!(
                    "Program node {} is reachable twice",
                    i
                )));
            }
            seen[i] = true;
            let node = &nodes[i];
            if node.depth != depth {
                return Err(SynrouteError::Validation(format!(
                    "Program node {} has depth {}, expected {}",
                    i, node.depth, depth
                )));
            }
            if node.inputs.is_empty() || node.inputs.len() > 2 {
                return Err(SynrouteError::Validation(format!(
                    "Program node {} has {} inputs",
                    i,
                    node.inputs.len()
                )));
            }
            for input in &node.inputs {
                if let ProgramInput::Step(c) = *input {
                    if c >= nodes.len() {
                        return Err(SynrouteError::Validation(format!(
                            "Program node {} references missing node {}",
                            i, c
                        )));
                    }
                    stack.push((c, depth + 1));
                }
            }
        }
        if seen.iter().any(|s| !s) {
            return Err(SynrouteError::Validation(
                "Program contains unreachable nodes".to_string(),
            ));
        }
        Ok(Self { nodes, root })
    }

    /// A single template whose inputs all come from the catalog.
    pub fn leaf(template: TemplateId, arity: usize) -> Self {
        Self {
            nodes: vec![ProgramNode {
                template: Some(template),
                depth: 1,
                inputs: vec![ProgramInput::Catalog; arity],
            }],
            root: 0,
        }
    }

    /// Apply `template` on top of the given inputs; `None` slots read the catalog.
    pub fn compose(template: TemplateId, inputs: &[Option<&Program>]) -> Self {
        let mut nodes = vec![ProgramNode {
            template: Some(template),
            depth: 1,
            inputs: Vec::with_capacity(inputs.len()),
        }];
        for input in inputs {
            let slot = match input {
                Some(child) => ProgramInput::Step(child.append_into(child.root, 2, &mut nodes)),
                None => ProgramInput::Catalog,
            };
            nodes[0].inputs.push(slot);
        }
        Self { nodes, root: 0 }
    }

    // Copies the subtree at `node` into `out` in pre-order and returns its new position.
    fn append_into(&self, node: usize, depth: usize, out: &mut Vec<ProgramNode>) -> usize {
        let pos = out.len();
        let src = &self.nodes[node];
        out.push(ProgramNode {
            template: src.template,
            depth,
            inputs: Vec::with_capacity(src.inputs.len()),
        });
        for input in &src.inputs {
            let mapped = match *input {
                ProgramInput::Catalog => ProgramInput::Catalog,
                ProgramInput::Step(c) => ProgramInput::Step(self.append_into(c, depth + 1, out)),
            };
            out[pos].inputs.push(mapped);
        }
        pos
    }

    /// Same program laid out in pre-order with the root at position 0.
    pub fn canonical(&self) -> Program {
        let mut nodes = Vec::with_capacity(self.nodes.len());
        self.append_into(self.root, 1, &mut nodes);
        Program { nodes, root: 0 }
    }

    pub fn is_canonical(&self) -> bool {
        self.root == 0 && *self == self.canonical()
    }

    pub fn root(&self) -> usize {
        self.root
    }

    pub fn nodes(&self) -> &[ProgramNode] {
        &self.nodes
    }

    pub fn node(&self, i: usize) -> &ProgramNode {
        &self.nodes[i]
    }

    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    pub fn height(&self) -> usize {
        self.nodes.iter().map(|n| n.depth).max().unwrap_or(0)
    }

    pub fn root_template(&self) -> Option<TemplateId> {
        self.nodes[self.root].template
    }

    pub fn is_fully_assigned(&self) -> bool {
        self.nodes.iter().all(|n| n.template.is_some())
    }

    /// Copy with the templates of the canonical positions in `wildcards` erased.
    /// Bit `i` of the mask addresses canonical position `i`.
    pub fn with_wildcards(&self, wildcards: u32) -> Program {
        let mut out = self.canonical();
        for (i, node) in out.nodes.iter_mut().enumerate() {
            if wildcards.checked_shr(i as u32).map_or(false, |w| w & 1 == 1) {
                node.template = None;
            }
        }
        out
    }

    /// Every partial-assignment view, including the program itself (mask 0).
    /// Programs above `MAX_PROGRAM_SIZE` nodes are rejected.
    pub fn views(&self) -> Result<impl Iterator<Item = Program> + '_> {
        if self.nodes.len() > MAX_PROGRAM_SIZE {
            return Err(SynrouteError::IndexBuild(format!(
                "Program of size {} exceeds the view limit of {}",
                self.nodes.len(),
                MAX_PROGRAM_SIZE
            )));
        }
        let n = self.nodes.len() as u32;
        Ok((0..(1u32 << n)).map(move |mask| self.with_wildcards(mask)))
    }

    /// Catalog-fed input slots, addressed by canonical position.
    pub fn catalog_slots(&self) -> Vec<InputSlot> {
        self.canonical()
            .nodes
            .iter()
            .enumerate()
            .flat_map(|(node, n)| {
                n.inputs
                    .iter()
                    .enumerate()
                    .filter(|(_, input)| matches!(input, ProgramInput::Catalog))
                    .map(move |(slot, _)| InputSlot { node, slot })
            })
            .collect()
    }

    pub fn key(&self) -> ProgramKey {
        ProgramKey(self.digest(self.root))
    }

    fn digest(&self, node: usize) -> [u8; 32] {
        let n = &self.nodes[node];
        let mut hasher = Sha256::new();
        match n.template {
            Some(t) => {
                hasher.update(b"T");
                hasher.update((t as u64).to_le_bytes());
            }
            None => hasher.update(b"*"),
        }
        hasher.update(b"D");
        hasher.update((n.depth as u64).to_le_bytes());
        hasher.update(b"[");
        for input in &n.inputs {
            match *input {
                ProgramInput::Catalog => hasher.update(b"C"),
                ProgramInput::Step(c) => {
                    hasher.update(b"S");
                    hasher.update(self.digest(c));
                }
            }
        }
        hasher.update(b"]");
        hasher.finalize().into()
    }
}
