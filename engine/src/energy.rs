//! Mixed continuous/discrete surprise of a batch against the latent state.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::inference::dot;

/// Energy of one anchor batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EnergyBreakdown {
    pub total: f64,
    pub continuous: f64,
    pub discrete: f64,
    /// `lambda_weight * discrete`.
    pub weighted_discrete: f64,
    pub lambda_weight: f64,
}

impl EnergyBreakdown {
    #[must_use]
    pub fn zero(lambda_weight: f64) -> Self {
        Self {
            total: 0.0,
            continuous: 0.0,
            discrete: 0.0,
            weighted_discrete: 0.0,
            lambda_weight,
        }
    }
}

/// `0.5 * Σ (R_p · x - Δ)^2 + λ * Σ |Δ|`.
///
/// Deltas whose prime has no readout row count toward the discrete term only.
#[must_use]
pub fn mixed_energy(
    x: &[f64],
    readouts: &BTreeMap<u64, Vec<f64>>,
    deltas: &[(u64, f64)],
    lambda_weight: f64,
) -> EnergyBreakdown {
    let mut continuous = 0.0;
    let mut discrete = 0.0;
    for &(prime, delta) in deltas {
        if let Some(row) = readouts.get(&prime) {
            let residual = dot(row, x) - delta;
            continuous += 0.5 * residual * residual;
        }
        discrete += delta.abs();
    }
    let weighted_discrete = lambda_weight * discrete;
    EnergyBreakdown {
        total: continuous + weighted_discrete,
        continuous,
        discrete,
        weighted_discrete,
        lambda_weight,
    }
}
