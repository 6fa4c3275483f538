//! The ledger orchestrator.
//!
//! # Anchor sequence
//!
//! ```text
//! validate entity + primes
//!   -> flow-rule check (policy: auto-route or reject)
//!   -> [entity lock]
//!   -> plan centroid cycle, apply pair ops to the loaded snapshot
//!   -> energy of the legalized, pre-gradient snapshot (cached)
//!   -> gradient step (optional)
//!   -> append events (write-ahead, fsync)
//!   -> one WriteBatch: factors + postings + inference snapshot
//! ```

mod keys;
mod slots;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use dualsub_config::{FlowPolicy, LedgerConfig, StorageBackend};
use dualsub_store::{EventLog, MemoryStore, Namespace, OrderedKeyValueStore, SqliteStore, WriteBatch};
use dualsub_types::{
    BASE_DIMENSION, BASE_PRIMES, CycleResult, Event, FlowRuleViolation, Lawfulness,
    ValidationError, base_index, validate_entity,
};

use crate::automorphism::{CentroidProvider, CycleAutomorphismService};
use crate::blob::BlobKey;
use crate::checksum::{merkle_root, to_hex};
use crate::energy::{EnergyBreakdown, mixed_energy};
use crate::error::{LedgerError, Result};
use crate::flow_rule::validate_prime_sequence;
use crate::inference::{InferenceSnapshot, InferenceStore};
use crate::rotation::{ExponentRotation, RotationOutcome};
use crate::symbols::TokenPrimeTable;

pub use slots::{AnchorWithText, BodyWrite};

// ============================================================================
// Options and reports
// ============================================================================

/// Tunables resolved from [`LedgerConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LedgerOptions {
    pub learning_rate: f64,
    pub lambda_weight: f64,
    pub flow_policy: FlowPolicy,
    pub default_lawfulness: Lawfulness,
    pub symbol_capacity: usize,
}

impl Default for LedgerOptions {
    fn default() -> Self {
        Self {
            learning_rate: dualsub_config::DEFAULT_LEARNING_RATE,
            lambda_weight: dualsub_config::DEFAULT_LAMBDA_WEIGHT,
            flow_policy: FlowPolicy::default(),
            default_lawfulness: Lawfulness::default(),
            symbol_capacity: dualsub_config::DEFAULT_SYMBOL_CAPACITY,
        }
    }
}

impl LedgerOptions {
    pub fn from_config(config: &LedgerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            learning_rate: config.inference.learning_rate,
            lambda_weight: config.energy.lambda_weight,
            flow_policy: config.flow.policy,
            default_lawfulness: Lawfulness::new(i64::from(config.slots.default_lawfulness))?,
            symbol_capacity: config.symbols.capacity,
        })
    }
}

/// Result of one anchor call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnchorReport {
    pub cycle: CycleResult,
    pub energy: EnergyBreakdown,
    /// Illegal edges that were routed through the centroid.
    pub violations: Vec<FlowRuleViolation>,
}

/// A prime whose logged deltas disagree with its stored exponent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReplayDrift {
    pub prime: u64,
    pub logged: i64,
    pub stored: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub entity: String,
    pub events: usize,
    pub drift: Vec<ReplayDrift>,
}

impl ReplayReport {
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.drift.is_empty()
    }
}

/// An anchor's log lines and store writes, not yet applied.
struct StagedAnchor {
    report: AnchorReport,
    events: Vec<Event>,
    batch: WriteBatch,
}

// ============================================================================
// Ledger
// ============================================================================

pub struct Ledger {
    store: Arc<dyn OrderedKeyValueStore>,
    events: EventLog,
    inference: InferenceStore,
    automorphism: CycleAutomorphismService,
    symbols: TokenPrimeTable,
    options: LedgerOptions,
    last_energy: Mutex<HashMap<String, EnergyBreakdown>>,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("events", &self.events)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Ledger {
    /// Open the store and event log named by `config`.
    ///
    /// An event log that cannot be opened fails here; there is no fallback
    /// location.
    pub fn open(config: &LedgerConfig) -> Result<Self> {
        let options = LedgerOptions::from_config(config)?;

        let store: Arc<dyn OrderedKeyValueStore> = match config.storage.backend {
            StorageBackend::Sqlite => Arc::new(SqliteStore::open(config.database_path()?)?),
            StorageBackend::Memory => Arc::new(MemoryStore::new()),
        };

        let events = match config.event_log_path()? {
            Some(path) => EventLog::open(&path)
                .map_err(|source| LedgerError::EventLogUnavailable { path, source })?,
            None => EventLog::in_memory(),
        };

        tracing::info!(
            backend = config.storage.backend.as_str(),
            policy = options.flow_policy.as_str(),
            "Opened ledger"
        );
        Ok(Self::with_store(store, events, options))
    }

    /// Ephemeral ledger with default options.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::with_store(
            Arc::new(MemoryStore::new()),
            EventLog::in_memory(),
            LedgerOptions::default(),
        )
    }

    #[must_use]
    pub fn with_store(
        store: Arc<dyn OrderedKeyValueStore>,
        events: EventLog,
        options: LedgerOptions,
    ) -> Self {
        Self {
            inference: InferenceStore::new(Arc::clone(&store), options.learning_rate),
            symbols: TokenPrimeTable::new(Arc::clone(&store), options.symbol_capacity),
            store,
            events,
            automorphism: CycleAutomorphismService::default(),
            options,
            last_energy: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the wall-clock centroid source.
    #[must_use]
    pub fn with_centroid(mut self, provider: impl CentroidProvider + 'static) -> Self {
        self.automorphism = CycleAutomorphismService::new(provider);
        self
    }

    #[must_use]
    pub fn options(&self) -> &LedgerOptions {
        &self.options
    }

    #[must_use]
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    #[must_use]
    pub fn symbols(&self) -> &TokenPrimeTable {
        &self.symbols
    }

    #[must_use]
    pub fn automorphism(&self) -> &CycleAutomorphismService {
        &self.automorphism
    }

    /// Serialize on `entity` across every ledger sharing this store.
    fn with_entity_lock<T>(&self, entity: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        self.store.key_locks().with_lock(entity, f)
    }

    // ========================================================================
    // Anchoring
    // ========================================================================

    /// Record `(prime, delta)` changes for `entity`.
    ///
    /// Only the eight base primes are accepted. Illegal edges are handled per
    /// the configured [`FlowPolicy`].
    pub fn anchor(
        &self,
        entity: &str,
        factors: &[(u64, i64)],
        update_inference: bool,
    ) -> Result<AnchorReport> {
        validate_entity(entity)?;
        self.with_entity_lock(entity, || {
            self.anchor_locked(entity, factors, update_inference)
        })
    }

    /// Move each listed prime to an absolute target exponent.
    ///
    /// Zero deltas are dropped; the rest are anchored with inference updates.
    pub fn anchor_batch(&self, entity: &str, targets: &[(u64, i64)]) -> Result<AnchorReport> {
        validate_entity(entity)?;
        self.with_entity_lock(entity, || self.anchor_batch_locked(entity, targets))
    }

    fn anchor_batch_locked(&self, entity: &str, targets: &[(u64, i64)]) -> Result<AnchorReport> {
        let mut current: HashMap<u64, i64> = HashMap::new();
        let mut deltas = Vec::with_capacity(targets.len());
        for &(prime, target) in targets {
            let value = match current.get(&prime) {
                Some(&value) => value,
                None => self.read_factor(entity, prime)?,
            };
            let delta = target
                .checked_sub(value)
                .ok_or(ValidationError::ExponentOverflow(prime))?;
            current.insert(prime, target);
            if delta != 0 {
                deltas.push((prime, delta));
            }
        }
        self.anchor_locked(entity, &deltas, true)
    }

    fn anchor_locked(
        &self,
        entity: &str,
        factors: &[(u64, i64)],
        update_inference: bool,
    ) -> Result<AnchorReport> {
        let staged = self.stage_anchor(entity, factors, update_inference)?;
        self.commit_anchor(entity, staged)
    }

    /// Everything an anchor would write, computed without writing it.
    fn stage_anchor(
        &self,
        entity: &str,
        factors: &[(u64, i64)],
        update_inference: bool,
    ) -> Result<StagedAnchor> {
        let primes: Vec<u64> = factors.iter().map(|&(p, _)| p).collect();
        let check = validate_prime_sequence(&primes)?;
        let violations = check.violations();
        if let Some(&first) = violations.first() {
            match self.options.flow_policy {
                FlowPolicy::Reject => return Err(first.into()),
                FlowPolicy::AutoRoute => tracing::warn!(
                    entity = %entity,
                    count = violations.len(),
                    first = %first,
                    "Routing illegal transitions via centroid"
                ),
            }
        }

        let cycle = self.automorphism.plan(&primes, &check.via_flags)?;
        if factors.is_empty() {
            return Ok(StagedAnchor {
                report: AnchorReport {
                    cycle,
                    energy: EnergyBreakdown::zero(self.options.lambda_weight),
                    violations,
                },
                events: Vec::new(),
                batch: WriteBatch::new(),
            });
        }

        let mut snapshot = self.inference.snapshot(entity)?;
        let ops = cycle.operations();
        snapshot.apply_ops(&ops);

        let observations: Vec<(u64, f64)> = factors.iter().map(|&(p, d)| (p, d as f64)).collect();
        let energy = mixed_energy(
            &snapshot.x,
            &snapshot.readouts,
            &observations,
            self.options.lambda_weight,
        );
        let stepped =
            update_inference && snapshot.apply_observations(&observations, self.options.learning_rate);

        let timestamp_ms = now_ms();
        let events: Vec<Event> = factors
            .iter()
            .zip(&cycle.steps)
            .map(|(&(prime, delta), step)| Event {
                entity: entity.to_string(),
                prime,
                delta,
                timestamp_ms,
                via_centroid: step.via_centroid,
                centroid_digit: step.centroid,
                cycle_index: step.cycle_index,
            })
            .collect();

        let mut batch = WriteBatch::new();
        let mut updated: BTreeMap<u64, i64> = BTreeMap::new();
        for &(prime, delta) in factors {
            let value = match updated.get(&prime) {
                Some(&value) => value,
                None => self.read_factor(entity, prime)?,
            };
            let next = value
                .checked_add(delta)
                .ok_or(ValidationError::ExponentOverflow(prime))?;
            updated.insert(prime, next);
        }
        for (&prime, &value) in &updated {
            let encoded = value.to_string();
            batch.put(Namespace::Factors, keys::factor_key(entity, prime), encoded.clone());
            batch.put(Namespace::Postings, keys::posting_key(prime, entity), encoded);
        }
        if stepped || !ops.is_empty() {
            InferenceStore::stage(entity, &snapshot, &mut batch)?;
        }

        Ok(StagedAnchor {
            report: AnchorReport {
                cycle,
                energy,
                violations,
            },
            events,
            batch,
        })
    }

    /// Log first, then land the batch in one write.
    fn commit_anchor(&self, entity: &str, staged: StagedAnchor) -> Result<AnchorReport> {
        let StagedAnchor {
            report,
            events,
            batch,
        } = staged;
        if !events.is_empty() {
            self.events.append(&events)?;
        }
        self.store.write(batch)?;
        self.cache_energy(entity, report.energy);

        tracing::debug!(
            entity = %entity,
            factors = events.len(),
            flips = report.cycle.flips,
            energy = report.energy.total,
            "Anchored"
        );
        Ok(report)
    }

    fn cache_energy(&self, entity: &str, energy: EnergyBreakdown) {
        self.last_energy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entity.to_string(), energy);
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Current exponent of `prime` for `entity` (0 when never anchored).
    pub fn factor(&self, entity: &str, prime: u64) -> Result<i64> {
        self.read_factor(entity, prime)
    }

    fn read_factor(&self, entity: &str, prime: u64) -> Result<i64> {
        let key = keys::factor_key(entity, prime);
        match self.store.get(Namespace::Factors, &key)? {
            None => Ok(0),
            Some(raw) => keys::parse_exponent(&raw)
                .ok_or_else(|| LedgerError::corrupt(Namespace::Factors, &key, "not an integer")),
        }
    }

    /// All stored exponents for `entity`, ascending by prime.
    pub fn factors(&self, entity: &str) -> Result<Vec<(u64, i64)>> {
        let mut factors = Vec::new();
        for (key, value) in self.factor_rows(entity)? {
            let prime = keys::prime_suffix(&key, &keys::factor_prefix(entity))
                .ok_or_else(|| LedgerError::corrupt(Namespace::Factors, &key, "no prime suffix"))?;
            let exponent = keys::parse_exponent(&value)
                .ok_or_else(|| LedgerError::corrupt(Namespace::Factors, &key, "not an integer"))?;
            factors.push((prime, exponent));
        }
        factors.sort_unstable_by_key(|&(prime, _)| prime);
        Ok(factors)
    }

    /// Factor rows of `entity` in store (byte) order.
    fn factor_rows(&self, entity: &str) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let prefix = keys::factor_prefix(entity);
        Ok(self
            .store
            .scan_prefix(Namespace::Factors, &prefix)?
            .into_iter()
            .filter(|(key, _)| keys::prime_suffix(key, &prefix).is_some())
            .collect())
    }

    /// The eight base exponents in basis order.
    pub fn base_vector(&self, entity: &str) -> Result<[i64; BASE_DIMENSION]> {
        let mut exponents = [0; BASE_DIMENSION];
        for (prime, exponent) in self.factors(entity)? {
            if let Some(idx) = base_index(prime) {
                exponents[idx] = exponent;
            }
        }
        Ok(exponents)
    }

    /// Entities carrying every prime in `primes`, weighted by their smallest
    /// exponent among them. Sorted by entity id.
    pub fn query(&self, primes: &[u64]) -> Result<Vec<(String, i64)>> {
        let Some((&first, rest)) = primes.split_first() else {
            return Ok(Vec::new());
        };

        let mut hits = self.postings(first)?;
        for &prime in rest {
            if hits.is_empty() {
                break;
            }
            let postings = self.postings(prime)?;
            hits.retain(|entity, weight| match postings.get(entity) {
                Some(&w) => {
                    *weight = (*weight).min(w);
                    true
                }
                None => false,
            });
        }
        Ok(hits.into_iter().collect())
    }

    fn postings(&self, prime: u64) -> Result<BTreeMap<String, i64>> {
        let prefix = keys::posting_prefix(prime);
        let mut postings = BTreeMap::new();
        for (key, value) in self.store.scan_prefix(Namespace::Postings, &prefix)? {
            let Some(entity) = key
                .strip_prefix(prefix.as_slice())
                .and_then(|rest| std::str::from_utf8(rest).ok())
            else {
                tracing::warn!(prime, "Skipping posting with non-UTF-8 entity");
                continue;
            };
            let weight = keys::parse_exponent(&value)
                .ok_or_else(|| LedgerError::corrupt(Namespace::Postings, &key, "not an integer"))?;
            postings.insert(entity.to_string(), weight);
        }
        Ok(postings)
    }

    /// Merkle root over `key || value` of each factor row, in byte order of
    /// the key. Lowercase hex.
    pub fn checksum(&self, entity: &str) -> Result<String> {
        let rows = self.factor_rows(entity)?;
        let leaves = rows.into_iter().map(|(mut key, value)| {
            key.extend_from_slice(&value);
            key
        });
        Ok(to_hex(&merkle_root(leaves)))
    }

    pub fn inference_state(&self, entity: &str) -> Result<InferenceSnapshot> {
        self.inference.snapshot(entity)
    }

    /// Energy of the most recent anchor for `entity` on this ledger instance.
    #[must_use]
    pub fn last_energy(&self, entity: &str) -> Option<EnergyBreakdown> {
        self.last_energy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(entity)
            .copied()
    }

    // ========================================================================
    // Rotation, blobs, replay
    // ========================================================================

    /// Rotate the base exponent vector through `rotation` and anchor the
    /// result as absolute targets.
    pub fn rotate_with(
        &self,
        entity: &str,
        rotation: &impl ExponentRotation,
    ) -> Result<RotationOutcome> {
        validate_entity(entity)?;
        self.with_entity_lock(entity, || {
            let original_checksum = self.checksum(entity)?;
            let exponents = rotation.rotate(self.base_vector(entity)?);
            let targets: Vec<(u64, i64)> = BASE_PRIMES.into_iter().zip(exponents).collect();
            self.anchor_batch_locked(entity, &targets)?;
            Ok(RotationOutcome {
                original_checksum,
                rotated_checksum: self.checksum(entity)?,
                exponents,
            })
        })
    }

    pub fn put_blob(&self, key: &BlobKey, value: &str) -> Result<()> {
        self.store
            .put(Namespace::Blobs, key.as_bytes(), value.as_bytes())?;
        Ok(())
    }

    pub fn get_blob(&self, key: &BlobKey) -> Result<Option<String>> {
        self.store
            .get(Namespace::Blobs, key.as_bytes())?
            .map(|raw| {
                String::from_utf8(raw)
                    .map_err(|_| LedgerError::corrupt(Namespace::Blobs, key.as_bytes(), "not UTF-8"))
            })
            .transpose()
    }

    /// Compare per-prime sums of logged deltas with the stored exponents.
    pub fn verify_replay(&self, entity: &str) -> Result<ReplayReport> {
        validate_entity(entity)?;
        self.with_entity_lock(entity, || {
            let events = self.events.events_for(entity)?;
            let mut logged: BTreeMap<u64, i64> = BTreeMap::new();
            for event in &events {
                let sum = logged.entry(event.prime).or_default();
                *sum = sum.saturating_add(event.delta);
            }

            let stored: BTreeMap<u64, i64> = self.factors(entity)?.into_iter().collect();
            let drift = logged
                .keys()
                .chain(stored.keys())
                .copied()
                .collect::<std::collections::BTreeSet<u64>>()
                .into_iter()
                .filter_map(|prime| {
                    let logged = logged.get(&prime).copied().unwrap_or(0);
                    let stored = stored.get(&prime).copied().unwrap_or(0);
                    (logged != stored).then_some(ReplayDrift {
                        prime,
                        logged,
                        stored,
                    })
                })
                .collect::<Vec<_>>();

            if !drift.is_empty() {
                tracing::warn!(entity = %entity, primes = drift.len(), "Event log and factors disagree");
            }
            Ok(ReplayReport {
                entity: entity.to_string(),
                events: events.len(),
                drift,
            })
        })
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
