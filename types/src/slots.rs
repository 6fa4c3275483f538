//! The structured per-entity document: S1/S2 facets, body shards, lawfulness
//! and the ℝ-substrate metrics that gate S2 writes.
//!
//! Everything in here is pure validation and bookkeeping; persistence lives in
//! the engine.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ValidationError;
use crate::primes::is_body_prime;

/// S1 facets are keyed by the first four base primes.
pub const S1_KEYS: [u64; 4] = [2, 3, 5, 7];
/// S2 facets are keyed by the last four base primes.
pub const S2_KEYS: [u64; 4] = [11, 13, 17, 19];

// ============================================================================
// Tiers & lawfulness
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotTier {
    S1,
    S2,
    #[serde(rename = "body")]
    Body,
}

impl SlotTier {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SlotTier::S1 => "S1",
            SlotTier::S2 => "S2",
            SlotTier::Body => "body",
        }
    }

    /// Minimum lawfulness an entity needs before this tier accepts writes.
    #[must_use]
    pub fn required_lawfulness(self) -> u8 {
        match self {
            SlotTier::S1 => 1,
            SlotTier::Body => 2,
            SlotTier::S2 => 3,
        }
    }
}

impl fmt::Display for SlotTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gating level 0..=3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Lawfulness(u8);

impl Lawfulness {
    pub const MAX: u8 = 3;

    pub fn new(level: i64) -> Result<Self, ValidationError> {
        u8::try_from(level)
            .ok()
            .filter(|&l| l <= Self::MAX)
            .map(Self)
            .ok_or(ValidationError::InvalidLawfulness(level))
    }

    #[must_use]
    pub fn level(self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn permits(self, tier: SlotTier) -> bool {
        self.0 >= tier.required_lawfulness()
    }
}

impl Default for Lawfulness {
    fn default() -> Self {
        Self(1)
    }
}

impl TryFrom<u8> for Lawfulness {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(i64::from(value))
    }
}

impl From<Lawfulness> for u8 {
    fn from(value: Lawfulness) -> Self {
        value.0
    }
}

/// Which tier the document as a whole has reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentTier {
    #[default]
    S1,
    S2,
}

// ============================================================================
// ℝ-substrate metrics
// ============================================================================

/// Metric deltas reported by the continuous substrate.
///
/// Fields are optional so that documents written without a metric can be
/// loaded and reported as incomplete rather than silently defaulted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RMetrics {
    #[serde(rename = "dE", default, skip_serializing_if = "Option::is_none")]
    pub d_e: Option<f64>,
    #[serde(rename = "dDrift", default, skip_serializing_if = "Option::is_none")]
    pub d_drift: Option<f64>,
    #[serde(rename = "dRetention", default, skip_serializing_if = "Option::is_none")]
    pub d_retention: Option<f64>,
    #[serde(rename = "K", default, skip_serializing_if = "Option::is_none")]
    pub k: Option<f64>,
}

impl Default for RMetrics {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0)
    }
}

impl RMetrics {
    #[must_use]
    pub fn new(d_e: f64, d_drift: f64, d_retention: f64, k: f64) -> Self {
        Self {
            d_e: Some(d_e),
            d_drift: Some(d_drift),
            d_retention: Some(d_retention),
            k: Some(k),
        }
    }

    /// A metrics update that touches nothing.
    #[must_use]
    pub fn unset() -> Self {
        Self {
            d_e: None,
            d_drift: None,
            d_retention: None,
            k: None,
        }
    }

    /// Names of the metrics that have no value.
    #[must_use]
    pub fn missing(&self) -> Vec<&'static str> {
        [
            ("dE", self.d_e),
            ("dDrift", self.d_drift),
            ("dRetention", self.d_retention),
            ("K", self.k),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.is_none().then_some(name))
        .collect()
    }

    /// Names of the S2 thresholds the present values fail.
    ///
    /// All four comparisons are strict except `K ≥ 0`; NaN fails every one.
    #[must_use]
    pub fn unmet_thresholds(&self) -> Vec<&'static str> {
        let mut failed = Vec::new();
        if !self.d_e.is_some_and(|v| v < 0.0) {
            failed.push("ΔE < 0");
        }
        if !self.d_drift.is_some_and(|v| v < 0.0) {
            failed.push("ΔDrift < 0");
        }
        if !self.d_retention.is_some_and(|v| v > 0.0) {
            failed.push("ΔRetention > 0");
        }
        if !self.k.is_some_and(|v| v >= 0.0) {
            failed.push("K ≥ 0");
        }
        failed
    }

    pub fn check_s2_gate(&self) -> Result<(), ValidationError> {
        let missing = self.missing();
        if !missing.is_empty() {
            return Err(ValidationError::MissingMetrics(missing));
        }
        let failed = self.unmet_thresholds();
        if !failed.is_empty() {
            return Err(ValidationError::MetricThresholds(failed));
        }
        Ok(())
    }

    /// Overwrite every metric that `update` carries a value for.
    pub fn merge(&mut self, update: &RMetrics) {
        if update.d_e.is_some() {
            self.d_e = update.d_e;
        }
        if update.d_drift.is_some() {
            self.d_drift = update.d_drift;
        }
        if update.d_retention.is_some() {
            self.d_retention = update.d_retention;
        }
        if update.k.is_some() {
            self.k = update.k;
        }
    }
}

// ============================================================================
// Body shards
// ============================================================================

/// Free text stored under an extended prime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyShard {
    #[serde(default = "default_content_type")]
    pub content_type: String,
    pub text: String,
    /// `sha256:<hex>` of `text`.
    pub hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<u64>,
    /// Caller metadata (`kind`, `version`, `provenance`, `lawfulness_level`, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_content_type() -> String {
    "text/plain".to_string()
}

impl BodyShard {
    const RESERVED: [&'static str; 4] = ["content_type", "text", "hash", "updated_at"];

    pub fn new(
        text: impl Into<String>,
        content_type: Option<String>,
        mut extra: Map<String, Value>,
        hash: String,
        updated_at: u64,
    ) -> Result<Self, ValidationError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(ValidationError::EmptyBodyText);
        }
        if let Some(level) = extra.get("lawfulness_level")
            && !level.is_null()
        {
            let raw = level.as_i64().unwrap_or(-1);
            Lawfulness::new(raw)?;
        }
        for key in Self::RESERVED {
            extra.remove(key);
        }
        Ok(Self {
            content_type: content_type.unwrap_or_else(default_content_type),
            text,
            hash,
            updated_at: Some(updated_at),
            extra,
        })
    }
}

// ============================================================================
// Document
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Slots {
    #[serde(rename = "S1", default)]
    pub s1: BTreeMap<u64, Value>,
    #[serde(rename = "S2", default)]
    pub s2: BTreeMap<u64, Value>,
    #[serde(default)]
    pub body: BTreeMap<u64, BodyShard>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotsDocument {
    pub entity: String,
    pub version: String,
    #[serde(default)]
    pub tier: DocumentTier,
    #[serde(default)]
    pub lawfulness: Lawfulness,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub meta: Map<String, Value>,
    #[serde(default)]
    pub slots: Slots,
    #[serde(default)]
    pub r_metrics: RMetrics,
}

impl SlotsDocument {
    pub const VERSION: &'static str = "1.1";

    #[must_use]
    pub fn new(entity: impl Into<String>, lawfulness: Lawfulness, now: impl Into<String>) -> Self {
        let now = now.into();
        Self {
            entity: entity.into(),
            version: Self::VERSION.to_string(),
            tier: DocumentTier::S1,
            lawfulness,
            created_at: now.clone(),
            updated_at: now,
            meta: Map::new(),
            slots: Slots::default(),
            r_metrics: RMetrics::default(),
        }
    }

    pub fn require_tier(&self, tier: SlotTier) -> Result<(), ValidationError> {
        if self.lawfulness.permits(tier) {
            Ok(())
        } else {
            Err(ValidationError::TierNotPermitted {
                tier,
                required: tier.required_lawfulness(),
                current: self.lawfulness.level(),
            })
        }
    }

    pub fn touch(&mut self, now: impl Into<String>) {
        self.updated_at = now.into();
    }

    /// Body primes named by any S1 facet's `write_primes`, ascending.
    #[must_use]
    pub fn write_primes(&self) -> Vec<u64> {
        let primes: BTreeSet<u64> = self
            .slots
            .s1
            .values()
            .filter_map(|facet| facet.get("write_primes").and_then(Value::as_array))
            .flatten()
            .filter_map(Value::as_u64)
            .collect();
        primes.into_iter().collect()
    }
}

// ============================================================================
// Facet validation
// ============================================================================

pub fn validate_s1_facets(facets: &BTreeMap<u64, Value>) -> Result<(), ValidationError> {
    for (&key, facet) in facets {
        if !S1_KEYS.contains(&key) {
            return Err(ValidationError::InvalidSlotKey {
                tier: SlotTier::S1,
                key,
                allowed: "primes 2, 3, 5, 7",
            });
        }
        if let Some(write_primes) = facet.get("write_primes") {
            check_prime_list("write_primes", write_primes)?;
        }
    }
    Ok(())
}

pub fn validate_s2_facets(facets: &BTreeMap<u64, Value>) -> Result<(), ValidationError> {
    for (&key, facet) in facets {
        if !S2_KEYS.contains(&key) {
            return Err(ValidationError::InvalidSlotKey {
                tier: SlotTier::S2,
                key,
                allowed: "primes 11, 13, 17, 19",
            });
        }
        if let Some(summary_ref) = facet.get("summary_ref")
            && !summary_ref.is_null()
        {
            check_body_prime("summary_ref", summary_ref)?;
        }
        if let Some(refs) = facet.get("refs") {
            check_prime_list("refs", refs)?;
        }
    }
    Ok(())
}

pub fn validate_body_key(prime: u64) -> Result<(), ValidationError> {
    if is_body_prime(prime) {
        Ok(())
    } else {
        Err(ValidationError::InvalidSlotKey {
            tier: SlotTier::Body,
            key: prime,
            allowed: "primes >= 23",
        })
    }
}

fn check_prime_list(field: &'static str, value: &Value) -> Result<(), ValidationError> {
    let Some(entries) = value.as_array() else {
        return Err(ValidationError::InvalidReferencePrime {
            field,
            value: value.to_string(),
        });
    };
    entries
        .iter()
        .try_for_each(|entry| check_body_prime(field, entry))
}

fn check_body_prime(field: &'static str, value: &Value) -> Result<(), ValidationError> {
    match value.as_u64() {
        Some(prime) if is_body_prime(prime) => Ok(()),
        _ => Err(ValidationError::InvalidReferencePrime {
            field,
            value: value.to_string(),
        }),
    }
}
