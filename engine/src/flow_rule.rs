//! The eight-node flow-rule automaton.
//!
//! Base primes map to nodes `S0..S7` in order. A transition is legal when it
//! persists in place, is one of the whitelisted direct edges, or stays within
//! one parity class. Even-to-odd moves are only legal when whitelisted (none
//! are), so every illegal edge changes parity and can be legalized by routing
//! through the centroid.

use serde::Serialize;

use dualsub_types::{CentroidDigit, FlowRuleViolation, Node, ValidationError};

/// Edges that are always legal regardless of parity.
pub const ALLOWED_DIRECT: [(Node, Node); 5] = [
    (Node::S1, Node::S2),
    (Node::S5, Node::S6),
    (Node::S3, Node::S0),
    (Node::S7, Node::S4),
    (Node::S1, Node::S0),
];

#[must_use]
pub fn allowed_direct(src: Node, dst: Node) -> bool {
    ALLOWED_DIRECT.contains(&(src, dst))
}

#[must_use]
pub fn transition_allowed(src: Node, dst: Node) -> bool {
    if src == dst {
        return true;
    }
    if allowed_direct(src, dst) {
        return true;
    }
    if src.is_even() && !dst.is_even() {
        return false;
    }
    src.parity() == dst.parity()
}

/// Map primes to nodes, rejecting anything outside the base basis.
pub fn nodes_for_primes(primes: &[u64]) -> Result<Vec<Node>, ValidationError> {
    primes
        .iter()
        .map(|&p| Node::for_prime(p).ok_or(ValidationError::UnsupportedPrime(p)))
        .collect()
}

/// Per-position centroid flags: true where parity changes from the previous node.
#[must_use]
pub fn derive_via_flags(nodes: &[Node]) -> Vec<bool> {
    let mut flags = vec![false; nodes.len()];
    for (i, pair) in nodes.windows(2).enumerate() {
        flags[i + 1] = pair[0].parity() != pair[1].parity();
    }
    flags
}

// ============================================================================
// Sequence validation
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EdgeVerdict {
    pub src: Node,
    pub dst: Node,
    pub allowed: bool,
    /// The edge changes parity and may be routed through the centroid.
    pub via_centroid: bool,
}

/// Every consecutive edge of a prime sequence with its legality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionCheck {
    pub nodes: Vec<Node>,
    pub edges: Vec<EdgeVerdict>,
    pub via_flags: Vec<bool>,
}

impl TransitionCheck {
    #[must_use]
    pub fn is_lawful(&self) -> bool {
        self.edges.iter().all(|edge| edge.allowed)
    }

    /// Illegal edges in sequence order.
    #[must_use]
    pub fn violations(&self) -> Vec<FlowRuleViolation> {
        self.edges
            .iter()
            .filter(|edge| !edge.allowed)
            .map(|edge| FlowRuleViolation {
                src: edge.src,
                dst: edge.dst,
            })
            .collect()
    }

    #[must_use]
    pub fn first_violation(&self) -> Option<FlowRuleViolation> {
        self.violations().into_iter().next()
    }
}

/// Evaluate every edge of `primes` as a path through the automaton.
pub fn validate_prime_sequence(primes: &[u64]) -> Result<TransitionCheck, ValidationError> {
    let nodes = nodes_for_primes(primes)?;
    let via_flags = derive_via_flags(&nodes);
    let edges = nodes
        .windows(2)
        .map(|pair| EdgeVerdict {
            src: pair[0],
            dst: pair[1],
            allowed: transition_allowed(pair[0], pair[1]),
            via_centroid: pair[0].parity() != pair[1].parity(),
        })
        .collect();
    Ok(TransitionCheck {
        nodes,
        edges,
        via_flags,
    })
}

// ============================================================================
// Traversal
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeKind {
    Persistence,
    Work,
    HeatDump,
    ElectricDissipation,
    Mediated,
}

impl EdgeKind {
    #[must_use]
    pub fn classify(src: Node, dst: Node) -> Self {
        match (src, dst) {
            _ if src == dst => EdgeKind::Persistence,
            (Node::S1, Node::S2) | (Node::S5, Node::S6) => EdgeKind::Work,
            (Node::S3, Node::S0) | (Node::S7, Node::S4) => EdgeKind::HeatDump,
            (Node::S1, Node::S0) => EdgeKind::ElectricDissipation,
            _ => EdgeKind::Mediated,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            EdgeKind::Persistence => "persistence",
            EdgeKind::Work => "work",
            EdgeKind::HeatDump => "heat-dump",
            EdgeKind::ElectricDissipation => "electric-dissipation",
            EdgeKind::Mediated => "mediated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TraversalEdge {
    pub src: Node,
    pub dst: Node,
    pub via_centroid: bool,
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Traversal {
    pub edges: Vec<TraversalEdge>,
    pub centroid_flips: u64,
    pub final_centroid: CentroidDigit,
}

/// Walk `depth` steps from `start`, always taking the lowest-indexed legal
/// destination.
#[must_use]
pub fn traverse(start: Node, depth: usize, centroid: CentroidDigit) -> Traversal {
    let mut current = start;
    let mut centroid = centroid;
    let mut flips = 0;
    let mut edges = Vec::with_capacity(depth);

    for _ in 0..depth {
        // `current -> current` is always legal, so a destination always exists.
        let dst = Node::ALL
            .into_iter()
            .find(|&dst| transition_allowed(current, dst))
            .unwrap_or(current);
        let via_centroid = current.is_even() && !dst.is_even() && !allowed_direct(current, dst);
        if via_centroid {
            centroid = centroid.flipped();
            flips += 1;
        }
        edges.push(TraversalEdge {
            src: current,
            dst,
            via_centroid,
            kind: EdgeKind::classify(current, dst),
        });
        current = dst;
    }

    Traversal {
        edges,
        centroid_flips: flips,
        final_centroid: centroid,
    }
}
