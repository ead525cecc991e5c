use crate::engines::planning::skeleton::{NodeKind, NodeValue, Skeleton};
use crate::types::{CatalogIndex, Fingerprint, TemplateId};
use serde::{Deserialize, Serialize};

/// Number of flag columns preceding the template one-hot in [`TreeEncoding::features`].
pub const FLAG_FEATURES: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedNode {
    pub kind: NodeKind,
    pub template: Option<TemplateId>,
    pub molecule: Option<CatalogIndex>,
    pub is_target: bool,
    pub masked: bool,
    pub on_frontier: bool,
}

/// Model input for one partially filled skeleton: node table plus parent to
/// child edges. Masked nodes are encoded blank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEncoding {
    pub nodes: Vec<EncodedNode>,
    pub edges: Vec<(usize, usize)>,
    pub target: Option<Fingerprint>,
}

impl TreeEncoding {
    pub fn from_skeleton(skeleton: &Skeleton) -> Self {
        let frontier = skeleton.frontier();
        let nodes = (0..skeleton.len())
            .map(|id| {
                let masked = skeleton.is_masked(id);
                let value = if masked { None } else { skeleton.value(id) };
                EncodedNode {
                    kind: skeleton.kind(id),
                    template: match value {
                        Some(NodeValue::Template(t)) => Some(t),
                        _ => None,
                    },
                    molecule: match value {
                        Some(NodeValue::Molecule(m)) => Some(m),
                        _ => None,
                    },
                    is_target: value == Some(NodeValue::Target),
                    masked,
                    on_frontier: frontier.contains(&id),
                }
            })
            .collect();
        let edges = (0..skeleton.len())
            .flat_map(|p| skeleton.children(p).iter().map(move |&c| (p, c)))
            .collect();
        Self {
            nodes,
            edges,
            target: skeleton.target().fingerprint().cloned(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Dense per-node rows: kind, target, masked, assigned and frontier flags
    /// followed by a one-hot of the assigned template.
    pub fn features(&self, num_templates: usize) -> Vec<Vec<f32>> {
        let flag = |b: bool| if b { 1.0 } else { 0.0 };
        self.nodes
            .iter()
            .map(|n| {
                let mut row = vec![0.0; FLAG_FEATURES + num_templates];
                row[0] = flag(n.kind == NodeKind::Transformation);
                row[1] = flag(n.is_target);
                row[2] = flag(n.masked);
                row[3] = flag(n.template.is_some() || n.molecule.is_some());
                row[4] = flag(n.on_frontier);
                if let Some(t) = n.template.filter(|t| *t < num_templates) {
                    row[FLAG_FEATURES + t] = 1.0;
                }
                row
            })
            .collect()
    }
}
