//! Per-entity latent state and readout rows.
//!
//! Each observation `(prime, delta)` takes one gradient step on
//! `0.5 * (R_p · x - delta)^2` for both `x` and `R_p`, using the pre-step
//! values for both gradients. Touched rows and `x` are renormalized to unit
//! length unless they are exactly zero.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use dualsub_store::{Namespace, OrderedKeyValueStore, WriteBatch};
use dualsub_types::{BASE_DIMENSION, BASE_PRIMES, PairOp, base_index};

use crate::error::{LedgerError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceSnapshot {
    pub x: Vec<f64>,
    #[serde(rename = "R")]
    pub readouts: BTreeMap<u64, Vec<f64>>,
}

impl Default for InferenceSnapshot {
    /// Zero latent vector, one-hot readout row per base prime.
    fn default() -> Self {
        Self {
            x: vec![0.0; BASE_DIMENSION],
            readouts: BASE_PRIMES
                .iter()
                .enumerate()
                .map(|(idx, &p)| (p, unit_row(idx)))
                .collect(),
        }
    }
}

impl InferenceSnapshot {
    /// Resize `x` and rows to the base dimension and add any missing default rows.
    fn conform(&mut self) {
        self.x.resize(BASE_DIMENSION, 0.0);
        for row in self.readouts.values_mut() {
            row.resize(BASE_DIMENSION, 0.0);
        }
        for (idx, &p) in BASE_PRIMES.iter().enumerate() {
            self.readouts.entry(p).or_insert_with(|| unit_row(idx));
        }
    }

    /// Apply pair operations to `x` and every readout row, in order.
    pub fn apply_ops(&mut self, ops: &[PairOp]) {
        for &op in ops {
            op.apply(&mut self.x);
            for row in self.readouts.values_mut() {
                op.apply(row);
            }
        }
    }

    /// One gradient step per observation. Primes outside the basis are ignored.
    ///
    /// Returns whether any observation was applied.
    pub fn apply_observations(&mut self, observations: &[(u64, f64)], learning_rate: f64) -> bool {
        let mut touched = false;
        for &(prime, value) in observations {
            let Some(idx) = base_index(prime) else {
                continue;
            };
            let row = self.readouts.entry(prime).or_insert_with(|| unit_row(idx));
            let error = dot(row, &self.x) - value;
            let row_pre = row.clone();
            let x_pre = self.x.clone();
            for j in 0..BASE_DIMENSION {
                self.x[j] -= learning_rate * error * row_pre[j];
                row[j] -= learning_rate * error * x_pre[j];
            }
            normalize(row);
            touched = true;
        }
        if touched {
            normalize(&mut self.x);
        }
        touched
    }
}

/// Loads, steps and persists [`InferenceSnapshot`]s under `inf:{entity}`.
#[derive(Clone)]
pub struct InferenceStore {
    store: Arc<dyn OrderedKeyValueStore>,
    learning_rate: f64,
}

impl InferenceStore {
    const KEY_PREFIX: &'static str = "inf:";

    #[must_use]
    pub fn new(store: Arc<dyn OrderedKeyValueStore>, learning_rate: f64) -> Self {
        Self {
            store,
            learning_rate,
        }
    }

    #[must_use]
    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub(crate) fn key(entity: &str) -> Vec<u8> {
        format!("{}{entity}", Self::KEY_PREFIX).into_bytes()
    }

    /// Current state for `entity`; defaults when nothing is stored.
    pub fn snapshot(&self, entity: &str) -> Result<InferenceSnapshot> {
        let key = Self::key(entity);
        let Some(raw) = self.store.get(Namespace::Inference, &key)? else {
            return Ok(InferenceSnapshot::default());
        };
        let mut snapshot: InferenceSnapshot = serde_json::from_slice(&raw)
            .map_err(|e| LedgerError::corrupt(Namespace::Inference, &key, e.to_string()))?;
        snapshot.conform();
        Ok(snapshot)
    }

    /// Apply `observations` and persist. An empty slice changes nothing.
    pub fn update(&self, entity: &str, observations: &[(u64, f64)]) -> Result<InferenceSnapshot> {
        let mut snapshot = self.snapshot(entity)?;
        if snapshot.apply_observations(observations, self.learning_rate) {
            self.persist(entity, &snapshot)?;
        }
        Ok(snapshot)
    }

    /// Load, mutate in place, persist. No normalization is applied.
    pub fn mutate_state(
        &self,
        entity: &str,
        mutate: impl FnOnce(&mut InferenceSnapshot),
    ) -> Result<InferenceSnapshot> {
        let mut snapshot = self.snapshot(entity)?;
        mutate(&mut snapshot);
        self.persist(entity, &snapshot)?;
        Ok(snapshot)
    }

    /// Queue `snapshot` into `batch` instead of writing it directly.
    pub(crate) fn stage(
        entity: &str,
        snapshot: &InferenceSnapshot,
        batch: &mut WriteBatch,
    ) -> Result<()> {
        batch.put(
            Namespace::Inference,
            Self::key(entity),
            serde_json::to_vec(snapshot)?,
        );
        Ok(())
    }

    fn persist(&self, entity: &str, snapshot: &InferenceSnapshot) -> Result<()> {
        let mut batch = WriteBatch::new();
        Self::stage(entity, snapshot, &mut batch)?;
        self.store.write(batch)?;
        Ok(())
    }
}

fn unit_row(idx: usize) -> Vec<f64> {
    let mut row = vec![0.0; BASE_DIMENSION];
    if let Some(slot) = row.get_mut(idx) {
        *slot = 1.0;
    }
    row
}

#[must_use]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[must_use]
pub fn l2_norm(v: &[f64]) -> f64 {
    v.iter().map(|c| c * c).sum::<f64>().sqrt()
}

/// Scale to unit length. A zero vector is left unchanged.
pub fn normalize(v: &mut [f64]) {
    let norm = l2_norm(v);
    if norm == 0.0 {
        return;
    }
    for c in v.iter_mut() {
        *c /= norm;
    }
}
