//! Centroid routing for parity-changing steps.
//!
//! Walking an anchor batch, every odd-parity node reached via the centroid
//! flips the ambient centroid bit and queues a swap-then-quarter-turn on its
//! base-vector pair. The queued operations act on `x` and every readout row.

use std::time::{SystemTime, UNIX_EPOCH};

use dualsub_types::{
    BASE_DIMENSION, CentroidDigit, CycleResult, CycleStep, PairOp, ValidationError, VectorPair,
};

use crate::error::Result;
use crate::flow_rule::{derive_via_flags, nodes_for_primes};
use crate::inference::InferenceStore;

/// Source of the ambient centroid at the start of a cycle.
pub trait CentroidProvider: Send + Sync {
    fn centroid(&self) -> CentroidDigit;
}

impl<F> CentroidProvider for F
where
    F: Fn() -> CentroidDigit + Send + Sync,
{
    fn centroid(&self) -> CentroidDigit {
        self()
    }
}

/// `wall_clock_ms mod 2`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WallClockCentroid;

impl CentroidProvider for WallClockCentroid {
    fn centroid(&self) -> CentroidDigit {
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        CentroidDigit::from_millis(ms)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedCentroid(pub CentroidDigit);

impl CentroidProvider for FixedCentroid {
    fn centroid(&self) -> CentroidDigit {
        self.0
    }
}

pub struct CycleAutomorphismService {
    centroid: Box<dyn CentroidProvider>,
}

impl Default for CycleAutomorphismService {
    fn default() -> Self {
        Self::new(WallClockCentroid)
    }
}

impl std::fmt::Debug for CycleAutomorphismService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CycleAutomorphismService").finish_non_exhaustive()
    }
}

impl CycleAutomorphismService {
    pub fn new(centroid: impl CentroidProvider + 'static) -> Self {
        Self {
            centroid: Box::new(centroid),
        }
    }

    /// No-op cycle anchored at the current ambient centroid.
    #[must_use]
    pub fn empty_cycle(&self) -> CycleResult {
        CycleResult::empty(self.centroid.centroid())
    }

    /// Flags recomputed purely from parity changes between consecutive primes.
    pub fn derive_via_flags(&self, primes: &[u64]) -> Result<Vec<bool>, ValidationError> {
        Ok(derive_via_flags(&nodes_for_primes(primes)?))
    }

    /// Compute the cycle for `primes` without touching any state.
    ///
    /// `via_flags` shorter than `primes` are treated as `false` past their end.
    pub fn plan(&self, primes: &[u64], via_flags: &[bool]) -> Result<CycleResult, ValidationError> {
        if primes.is_empty() {
            return Ok(self.empty_cycle());
        }
        let nodes = nodes_for_primes(primes)?;

        let initial = self.centroid.centroid();
        let mut centroid = initial;
        let mut flips = 0;
        let mut cycle_index = 0;
        let mut steps = Vec::with_capacity(primes.len());

        for (idx, (&prime, node)) in primes.iter().zip(nodes).enumerate() {
            let via_centroid = via_flags.get(idx).copied().unwrap_or(false);
            let mut ops = None;

            if via_centroid && !node.is_even() {
                flips += 1;
                cycle_index += 1;
                centroid = centroid.flipped();
                ops = VectorPair::for_index(node.index(), BASE_DIMENSION)
                    .map(|pair| (PairOp::permutation(pair), PairOp::rotor(pair)));
            }

            steps.push(CycleStep {
                prime,
                node,
                parity: node.parity(),
                centroid,
                via_centroid,
                permutation: ops.map(|(permutation, _)| permutation),
                rotor: ops.map(|(_, rotor)| rotor),
                cycle_index,
            });
        }

        Ok(CycleResult {
            initial_centroid: initial,
            final_centroid: centroid,
            flips,
            steps,
        })
    }

    /// Plan the cycle and, when `mutate` is set and any pair was queued,
    /// apply it to the entity's stored inference state.
    pub fn enforce(
        &self,
        inference: &InferenceStore,
        entity: &str,
        primes: &[u64],
        via_flags: &[bool],
        mutate: bool,
    ) -> Result<CycleResult> {
        let cycle = self.plan(primes, via_flags)?;
        let ops = cycle.operations();
        if mutate && !ops.is_empty() {
            inference.mutate_state(entity, |snapshot| snapshot.apply_ops(&ops))?;
            tracing::debug!(entity = %entity, flips = cycle.flips, "Applied centroid cycle");
        }
        Ok(cycle)
    }
}
