use super::program::{Program, ProgramInput, ProgramKey, ProgramNode};
use super::shape::TreeShape;
use crate::error::{Result, SynrouteError};
use crate::types::{CatalogIndex, Target, TemplateId};
use serde::{Deserialize, Serialize};

pub type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Applies one reaction template to its 1 or 2 inputs.
    Transformation,
    /// A molecule: the target, an intermediate product, or a catalog building block.
    Terminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeValue {
    Template(TemplateId),
    Molecule(CatalogIndex),
    /// The synthesis target; only ever placed on a terminal root.
    Target,
}

impl NodeValue {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeValue::Template(_) => NodeKind::Transformation,
            NodeValue::Molecule(_) | NodeValue::Target => NodeKind::Terminal,
        }
    }
}

/// Feasibility-index entry consulted when a transformation was filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramTrace {
    pub key: ProgramKey,
    /// Canonical position of the node inside the keyed program.
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkeletonNode {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub value: Option<NodeValue>,
    pub masked: bool,
    pub trace: Option<ProgramTrace>,
}

/// A (possibly partial) synthesis plan over a fixed tree structure.
///
/// Nodes live in an arena; cloning a skeleton copies one flat vector, which
/// is how the decoder branches beams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skeleton {
    nodes: Vec<SkeletonNode>,
    root: NodeId,
    target: Target,
}

pub struct SkeletonBuilder {
    nodes: Vec<SkeletonNode>,
}

impl SkeletonBuilder {
    pub fn new(root_kind: NodeKind) -> Self {
        Self {
            nodes: vec![SkeletonNode {
                kind: root_kind,
                parent: None,
                children: Vec::new(),
                value: None,
                masked: false,
                trace: None,
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        0
    }

    pub fn add_child(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(SkeletonNode {
            kind,
            parent: Some(parent),
            children: Vec::new(),
            value: None,
            masked: false,
            trace: None,
        });
        self.nodes[parent].children.push(id);
        id
    }

    pub fn build(mut self, target: Target) -> Result<Skeleton> {
        for (id, node) in self.nodes.iter().enumerate() {
            match node.kind {
                NodeKind::Transformation => {
                    if node.children.is_empty() || node.children.len() > 2 {
                        return Err(SynrouteError::InvalidSkeleton(format!(
                            "Transformation node {} has {} inputs",
                            id,
                            node.children.len()
                        )));
                    }
                }
                NodeKind::Terminal if id == 0 => {
                    if node.children.len() > 1 {
                        return Err(SynrouteError::InvalidSkeleton(
                            "Target node has more than one producer".to_string(),
                        ));
                    }
                }
                NodeKind::Terminal => {
                    let ok = match node.children.as_slice() {
                        [] => true,
                        [only] => self.nodes[*only].kind == NodeKind::Transformation,
                        _ => false,
                    };
                    if !ok {
                        return Err(SynrouteError::InvalidSkeleton(format!(
                            "Intermediate node {} must be produced by one transformation",
                            id
                        )));
                    }
                }
            }
        }
        if self.nodes[0].kind == NodeKind::Terminal {
            self.nodes[0].value = Some(NodeValue::Target);
        }
        Ok(Skeleton {
            nodes: self.nodes,
            root: 0,
            target,
        })
    }
}

impl Skeleton {
    /// Expand a tree shape into a skeleton: the target sits on a terminal
    /// root, internal shape nodes become transformations, and every internal
    /// node below the top is reached through an intermediate terminal.
    pub fn create(shape: &TreeShape, target: Target) -> Result<Self> {
        let mut builder = SkeletonBuilder::new(NodeKind::Terminal);
        if !shape.is_leaf(0) {
            let top = builder.add_child(0, NodeKind::Transformation);
            let mut stack = vec![(0usize, top)];
            while let Some((shape_node, step)) = stack.pop() {
                for &c in shape.children(shape_node) {
                    let slot = builder.add_child(step, NodeKind::Terminal);
                    if !shape.is_leaf(c) {
                        let inner = builder.add_child(slot, NodeKind::Transformation);
                        stack.push((c, inner));
                    }
                }
            }
        }
        builder.build(target)
    }

    pub fn builder(root_kind: NodeKind) -> SkeletonBuilder {
        SkeletonBuilder::new(root_kind)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &SkeletonNode {
        &self.nodes[id]
    }

    pub fn nodes(&self) -> &[SkeletonNode] {
        &self.nodes
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.nodes[id].kind
    }

    pub fn value(&self, id: NodeId) -> Option<NodeValue> {
        self.nodes[id].value
    }

    pub fn template(&self, id: NodeId) -> Option<TemplateId> {
        match self.nodes[id].value {
            Some(NodeValue::Template(t)) => Some(t),
            _ => None,
        }
    }

    pub fn molecule(&self, id: NodeId) -> Option<CatalogIndex> {
        match self.nodes[id].value {
            Some(NodeValue::Molecule(m)) => Some(m),
            _ => None,
        }
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn is_masked(&self, id: NodeId) -> bool {
        self.nodes[id].masked
    }

    /// Terminal node without children, i.e. a building block.
    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.nodes[id].kind == NodeKind::Terminal && self.nodes[id].children.is_empty()
    }

    /// Terminal below the root that is produced by a transformation.
    pub fn is_intermediate(&self, id: NodeId) -> bool {
        id != self.root
            && self.nodes[id].kind == NodeKind::Terminal
            && !self.nodes[id].children.is_empty()
    }

    fn is_ready(&self, id: NodeId) -> bool {
        match self.nodes[id].kind {
            NodeKind::Transformation => true,
            NodeKind::Terminal => self.nodes[id]
                .parent
                .map_or(true, |p| self.nodes[p].value.is_some()),
        }
    }

    /// Unmasked, unassigned nodes that may be filled next, in arena order.
    pub fn frontier(&self) -> Vec<NodeId> {
        (0..self.nodes.len())
            .filter(|&id| {
                let node = &self.nodes[id];
                !node.masked && node.value.is_none() && self.is_ready(id)
            })
            .collect()
    }

    /// Exclude nodes from the frontier and from completeness.
    pub fn mask(&mut self, nodes: &[NodeId]) {
        for &id in nodes {
            self.nodes[id].masked = true;
        }
    }

    pub fn assign(&mut self, id: NodeId, value: NodeValue) -> Result<()> {
        let node = self.nodes.get(id).ok_or_else(|| SynrouteError::InvalidAssignment {
            node: id,
            reason: "no such node".to_string(),
        })?;
        if node.kind != value.kind() {
            return Err(SynrouteError::InvalidAssignment {
                node: id,
                reason: format!("{:?} value on a {:?} node", value, node.kind),
            });
        }
        if let Some(existing) = node.value {
            return Err(SynrouteError::InvalidAssignment {
                node: id,
                reason: format!("already holds {:?}", existing),
            });
        }
        if node.masked {
            return Err(SynrouteError::InvalidAssignment {
                node: id,
                reason: "node is masked".to_string(),
            });
        }
        if value == NodeValue::Target {
            return Err(SynrouteError::InvalidAssignment {
                node: id,
                reason: "the target is fixed at creation".to_string(),
            });
        }
        self.nodes[id].value = Some(value);
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.nodes.iter().all(|n| n.masked || n.value.is_some())
    }

    pub fn record_trace(&mut self, id: NodeId, trace: ProgramTrace) {
        self.nodes[id].trace = Some(trace);
    }

    pub fn trace(&self, id: NodeId) -> Option<ProgramTrace> {
        self.nodes[id].trace
    }

    /// Position of `child` among its parent's inputs.
    pub fn slot_of(&self, child: NodeId) -> Option<(NodeId, usize)> {
        let parent = self.nodes[child].parent?;
        let slot = self.nodes[parent].children.iter().position(|&c| c == child)?;
        Some((parent, slot))
    }

    pub fn assigned_leaf_count(&self) -> usize {
        (0..self.nodes.len())
            .filter(|&id| self.is_leaf(id) && id != self.root && self.nodes[id].value.is_some())
            .count()
    }

    pub fn transformation_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Transformation)
            .count()
    }

    /// Nearest transformation strictly above `id`.
    pub fn transformation_parent(&self, id: NodeId) -> Option<NodeId> {
        let mut cur = self.nodes[id].parent;
        while let Some(p) = cur {
            if self.nodes[p].kind == NodeKind::Transformation {
                return Some(p);
            }
            cur = self.nodes[p].parent;
        }
        None
    }

    /// For each input slot of a transformation, the transformation feeding it,
    /// or `None` when the slot takes a building block.
    pub fn transformation_inputs(&self, id: NodeId) -> Vec<Option<NodeId>> {
        self.nodes[id]
            .children
            .iter()
            .map(|&c| match self.nodes[c].kind {
                NodeKind::Transformation => Some(c),
                NodeKind::Terminal => self.nodes[c].children.first().copied(),
            })
            .collect()
    }

    /// Height on the transformation-only subgraph; 1 when every input is a building block.
    pub fn transformation_height(&self, id: NodeId) -> usize {
        1 + self
            .transformation_inputs(id)
            .into_iter()
            .flatten()
            .map(|c| self.transformation_height(c))
            .max()
            .unwrap_or(0)
    }

    /// Distance from the root on the transformation-only subgraph; the topmost transformation is 1.
    pub fn transformation_depth(&self, id: NodeId) -> usize {
        let mut depth = 1;
        let mut cur = id;
        while let Some(p) = self.transformation_parent(cur) {
            depth += 1;
            cur = p;
        }
        depth
    }

    /// Number of nodes on the longest root-to-leaf path.
    pub fn depth(&self) -> usize {
        fn walk(sk: &Skeleton, id: NodeId) -> usize {
            1 + sk.nodes[id].children.iter().map(|&c| walk(sk, c)).max().unwrap_or(0)
        }
        walk(self, self.root)
    }

    /// The transformation subtree used for feasibility lookups around `id`:
    /// rooted at the highest transformation ancestor whose own subtree is at
    /// most `max_depth` levels tall. `None` when `id` itself is taller.
    pub fn restricted_subtree(&self, id: NodeId, max_depth: usize) -> Option<RestrictedSubtree> {
        if self.nodes[id].kind != NodeKind::Transformation
            || self.transformation_height(id) > max_depth
        {
            return None;
        }
        let mut anchor = id;
        while let Some(p) = self.transformation_parent(anchor) {
            if self.transformation_height(p) > max_depth {
                break;
            }
            anchor = p;
        }
        let mut members = Vec::new();
        self.collect_preorder(anchor, &mut members);
        Some(RestrictedSubtree { anchor, members })
    }

    fn collect_preorder(&self, id: NodeId, out: &mut Vec<NodeId>) {
        out.push(id);
        for c in self.transformation_inputs(id).into_iter().flatten() {
            self.collect_preorder(c, out);
        }
    }
}

/// Transformation nodes of a bounded subtree, in canonical program order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestrictedSubtree {
    anchor: NodeId,
    members: Vec<NodeId>,
}

impl RestrictedSubtree {
    pub fn anchor(&self) -> NodeId {
        self.anchor
    }

    pub fn members(&self) -> &[NodeId] {
        &self.members
    }

    pub fn position(&self, id: NodeId) -> Option<usize> {
        self.members.iter().position(|&m| m == id)
    }

    /// Program over the current assignments, with `candidate` overriding one node.
    pub fn program(
        &self,
        skeleton: &Skeleton,
        candidate: Option<(NodeId, TemplateId)>,
    ) -> Result<Program> {
        let mut nodes = Vec::with_capacity(self.members.len());
        let mut depths = vec![0usize; self.members.len()];
        depths[0] = 1;
        for (pos, &id) in self.members.iter().enumerate() {
            let template = match candidate {
                Some((c, t)) if c == id => Some(t),
                _ => skeleton.template(id),
            };
            let inputs = skeleton
                .transformation_inputs(id)
                .into_iter()
                .map(|input| match input.and_then(|c| self.position(c)) {
                    Some(child_pos) => {
                        depths[child_pos] = depths[pos] + 1;
                        ProgramInput::Step(child_pos)
                    }
                    None => ProgramInput::Catalog,
                })
                .collect();
            nodes.push(ProgramNode {
                template,
                depth: depths[pos],
                inputs,
            });
        }
        Program::new(nodes, 0)
    }
}
