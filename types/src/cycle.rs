//! Automorphism cycle reports and the vector-pair operations they carry.

use serde::{Deserialize, Serialize};

use crate::node::{CentroidDigit, Node, Parity};

/// Two coordinates of the latent space: an even index and its odd partner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VectorPair {
    pub even: usize,
    pub odd: usize,
}

impl VectorPair {
    /// Pair base index `index` with `index + 1` (even) or `index - 1` (odd).
    ///
    /// Returns `None` when the partner falls outside `0..dimension`.
    #[must_use]
    pub fn for_index(index: usize, dimension: usize) -> Option<Self> {
        let partner = if index % 2 == 0 {
            index.checked_add(1)?
        } else {
            index.checked_sub(1)?
        };
        if index >= dimension || partner >= dimension {
            return None;
        }
        Some(Self {
            even: index.min(partner),
            odd: index.max(partner),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairOperation {
    /// Swap the two coordinates.
    Permutation,
    /// Quarter turn in the pair's plane: `(e, o) -> (-o, e)`.
    Rotor,
}

impl PairOperation {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            PairOperation::Permutation => "swap_pair",
            PairOperation::Rotor => "quarter_turn",
        }
    }
}

/// A tagged operation bound to the vector pair it acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PairOp {
    pub kind: PairOperation,
    pub pair: VectorPair,
}

impl PairOp {
    #[must_use]
    pub fn permutation(pair: VectorPair) -> Self {
        Self {
            kind: PairOperation::Permutation,
            pair,
        }
    }

    #[must_use]
    pub fn rotor(pair: VectorPair) -> Self {
        Self {
            kind: PairOperation::Rotor,
            pair,
        }
    }

    /// Apply in place. Vectors too short for the pair are left untouched.
    pub fn apply(self, vector: &mut [f64]) {
        let VectorPair { even, odd } = self.pair;
        if even >= vector.len() || odd >= vector.len() {
            return;
        }
        match self.kind {
            PairOperation::Permutation => vector.swap(even, odd),
            PairOperation::Rotor => {
                let (even_val, odd_val) = (vector[even], vector[odd]);
                vector[even] = -odd_val;
                vector[odd] = even_val;
            }
        }
    }
}

/// One position of an anchor batch as seen by the automorphism service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleStep {
    pub prime: u64,
    pub node: Node,
    pub parity: Parity,
    /// Centroid after this step.
    pub centroid: CentroidDigit,
    pub via_centroid: bool,
    pub permutation: Option<PairOp>,
    pub rotor: Option<PairOp>,
    pub cycle_index: u64,
}

/// Summary of the centroid cycle enforced for one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleResult {
    pub initial_centroid: CentroidDigit,
    pub final_centroid: CentroidDigit,
    pub flips: u64,
    pub steps: Vec<CycleStep>,
}

impl CycleResult {
    /// A no-op cycle anchored at `centroid`.
    #[must_use]
    pub fn empty(centroid: CentroidDigit) -> Self {
        Self {
            initial_centroid: centroid,
            final_centroid: centroid,
            flips: 0,
            steps: Vec::new(),
        }
    }

    /// Operations in application order: permutation then rotor, step by step.
    #[must_use]
    pub fn operations(&self) -> Vec<PairOp> {
        self.steps
            .iter()
            .flat_map(|step| step.permutation.into_iter().chain(step.rotor))
            .collect()
    }
}
