//! Structured slot documents and their lawfulness gates.
//!
//! Every write loads the document under the entity lock, applies the change
//! to a copy and persists only if the whole change validated.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};

use dualsub_store::Namespace;
use dualsub_types::{
    BodyShard, DEFAULT_BODY_PRIME, DocumentTier, Lawfulness, RMetrics, SlotTier, SlotsDocument,
    ValidationError, validate_body_key, validate_entity, validate_s1_facets, validate_s2_facets,
};

use super::{AnchorReport, Ledger, keys, now_ms};
use crate::checksum::{sha256, to_hex};
use crate::error::{LedgerError, Result};

/// Content for one body shard.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BodyWrite {
    pub text: String,
    /// Defaults to `text/plain`.
    pub content_type: Option<String>,
    /// Free-form shard metadata (`kind`, `version`, `provenance`, ...).
    pub metadata: Map<String, Value>,
}

impl BodyWrite {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnchorWithText {
    pub anchor: AnchorReport,
    /// Body primes that received the text, ascending.
    pub body_primes: Vec<u64>,
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

fn body_hash(text: &str) -> String {
    format!("sha256:{}", to_hex(&sha256(text.as_bytes())))
}

impl Ledger {
    /// The slot document for `entity`, or a fresh default if none was written.
    pub fn entity_document(&self, entity: &str) -> Result<SlotsDocument> {
        validate_entity(entity)?;
        self.load_document(entity)
    }

    fn load_document(&self, entity: &str) -> Result<SlotsDocument> {
        let key = keys::slots_key(entity);
        match self.store.get(Namespace::Slots, &key)? {
            None => Ok(SlotsDocument::new(
                entity,
                self.options.default_lawfulness,
                now_rfc3339(),
            )),
            Some(raw) => serde_json::from_slice(&raw)
                .map_err(|e| LedgerError::corrupt(Namespace::Slots, &key, e.to_string())),
        }
    }

    fn store_document(&self, document: &SlotsDocument) -> Result<()> {
        let raw = serde_json::to_vec(document)?;
        self.store
            .put(Namespace::Slots, &keys::slots_key(&document.entity), &raw)?;
        Ok(())
    }

    /// Load, stamp, edit and persist. Nothing is written if `edit` fails.
    fn edit_document<T>(
        &self,
        entity: &str,
        edit: impl FnOnce(&mut SlotsDocument) -> Result<T>,
    ) -> Result<T> {
        validate_entity(entity)?;
        self.with_entity_lock(entity, || {
            let mut document = self.load_document(entity)?;
            document.touch(now_rfc3339());
            let out = edit(&mut document)?;
            self.store_document(&document)?;
            Ok(out)
        })
    }

    /// Merge S1 facets (keys 2, 3, 5, 7). Requires lawfulness >= 1.
    pub fn write_s1_slots(
        &self,
        entity: &str,
        facets: BTreeMap<u64, Value>,
    ) -> Result<SlotsDocument> {
        validate_s1_facets(&facets)?;
        self.edit_document(entity, |document| {
            document.require_tier(SlotTier::S1)?;
            document.slots.s1.extend(facets);
            Ok(document.clone())
        })
    }

    /// Store `body` under the extended prime `prime`. Requires lawfulness >= 2.
    pub fn update_body_slot(&self, entity: &str, prime: u64, body: BodyWrite) -> Result<BodyShard> {
        validate_body_key(prime)?;
        self.edit_document(entity, |document| {
            document.require_tier(SlotTier::Body)?;
            let shard = BodyShard::new(
                body.text.as_str(),
                body.content_type,
                body.metadata,
                body_hash(&body.text),
                now_ms(),
            )?;
            document.slots.body.insert(prime, shard.clone());
            tracing::debug!(entity = %entity, prime, "Updated body slot");
            Ok(shard)
        })
    }

    /// Merge S2 facets (keys 11, 13, 17, 19) after folding `metrics` into the
    /// stored r_metrics. Requires lawfulness 3 and a passing metric gate.
    pub fn update_s2_slots(
        &self,
        entity: &str,
        facets: BTreeMap<u64, Value>,
        metrics: Option<RMetrics>,
    ) -> Result<SlotsDocument> {
        validate_s2_facets(&facets)?;
        self.edit_document(entity, |document| {
            document.require_tier(SlotTier::S2)?;
            let mut merged = document.r_metrics;
            if let Some(update) = metrics {
                merged.merge(&update);
            }
            merged.check_s2_gate()?;
            document.r_metrics = merged;
            document.slots.s2.extend(facets);
            document.tier = DocumentTier::S2;
            Ok(document.clone())
        })
    }

    pub fn update_lawfulness(&self, entity: &str, level: i64) -> Result<Lawfulness> {
        let lawfulness = Lawfulness::new(level)?;
        self.edit_document(entity, |document| {
            document.lawfulness = lawfulness;
            Ok(lawfulness)
        })
    }

    /// Overwrite whichever metrics `metrics` carries. Not gated.
    pub fn update_r_metrics(&self, entity: &str, metrics: RMetrics) -> Result<RMetrics> {
        self.edit_document(entity, |document| {
            document.r_metrics.merge(&metrics);
            Ok(document.r_metrics)
        })
    }

    /// Anchor `factors`, then store `text` in every body slot named by the S1
    /// facets' `write_primes` (or prime 23 when none are named).
    ///
    /// The body gate and the text are checked before anything is written.
    /// Factors, postings, inference and the slot document land in one batch.
    pub fn anchor_with_text(
        &self,
        entity: &str,
        factors: &[(u64, i64)],
        text: &str,
        update_inference: bool,
    ) -> Result<AnchorWithText> {
        validate_entity(entity)?;
        if text.trim().is_empty() {
            return Err(ValidationError::EmptyBodyText.into());
        }
        self.with_entity_lock(entity, || {
            let mut document = self.load_document(entity)?;
            document.require_tier(SlotTier::Body)?;

            let mut body_primes = document.write_primes();
            if body_primes.is_empty() {
                body_primes.push(DEFAULT_BODY_PRIME);
            }
            let hash = body_hash(text);
            let updated_at = now_ms();
            let mut shards = Vec::with_capacity(body_primes.len());
            for &prime in &body_primes {
                validate_body_key(prime)?;
                let shard = BodyShard::new(text, None, Map::new(), hash.clone(), updated_at)?;
                shards.push((prime, shard));
            }

            let mut staged = self.stage_anchor(entity, factors, update_inference)?;
            document.slots.body.extend(shards);
            document.touch(now_rfc3339());
            staged.batch.put(
                Namespace::Slots,
                keys::slots_key(entity),
                serde_json::to_vec(&document)?,
            );
            let anchor = self.commit_anchor(entity, staged)?;
            Ok(AnchorWithText {
                anchor,
                body_primes,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automorphism::FixedCentroid;
    use crate::ledger::LedgerOptions;
    use dualsub_store::{EventLog, KeyLocks, KvPair, MemoryStore, OrderedKeyValueStore, WriteBatch};
    use dualsub_types::CentroidDigit;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn ledger() -> Ledger {
        Ledger::in_memory().with_centroid(FixedCentroid(CentroidDigit::Zero))
    }

    fn good_metrics() -> RMetrics {
        RMetrics::new(-0.1, -0.2, 0.3, 0.0)
    }

    #[test]
    fn document_is_lazy_until_written() {
        let ledger = ledger();
        let document = ledger.entity_document("e").unwrap();
        assert_eq!(document.lawfulness, Lawfulness::default());
        assert_eq!(document.version, "1.1");
        assert!(ledger.store.get(Namespace::Slots, b"slots:e").unwrap().is_none());
    }

    #[test]
    fn s1_requires_lawfulness_one() {
        let ledger = ledger();
        ledger.update_lawfulness("e", 0).unwrap();
        let facets = BTreeMap::from([(2, json!({"title": "t"}))]);
        let err = ledger.write_s1_slots("e", facets.clone()).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation(ValidationError::TierNotPermitted { .. })
        ));
        ledger.update_lawfulness("e", 1).unwrap();
        let document = ledger.write_s1_slots("e", facets).unwrap();
        assert_eq!(document.slots.s1[&2]["title"], "t");
    }

    #[test]
    fn s1_rejects_non_s1_keys() {
        let err = ledger()
            .write_s1_slots("e", BTreeMap::from([(11, json!({}))]))
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation(ValidationError::InvalidSlotKey { key: 11, .. })
        ));
    }

    #[test]
    fn body_hash_is_prefixed_sha256() {
        let ledger = ledger();
        ledger.update_lawfulness("e", 2).unwrap();
        let shard = ledger.update_body_slot("e", 29, BodyWrite::text("abc")).unwrap();
        assert_eq!(
            shard.hash,
            "sha256:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(shard.content_type, "text/plain");
        assert_eq!(ledger.entity_document("e").unwrap().slots.body[&29], shard);
    }

    #[test]
    fn body_rejects_composite_small_and_empty() {
        let ledger = ledger();
        ledger.update_lawfulness("e", 2).unwrap();
        assert!(ledger.update_body_slot("e", 25, BodyWrite::text("x")).is_err());
        assert!(ledger.update_body_slot("e", 19, BodyWrite::text("x")).is_err());
        let err = ledger.update_body_slot("e", 23, BodyWrite::text("  ")).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation(ValidationError::EmptyBodyText)
        ));
        assert!(ledger.entity_document("e").unwrap().slots.body.is_empty());
    }

    #[test]
    fn s2_gate_is_strict_on_retention() {
        let ledger = ledger();
        ledger.update_lawfulness("e", 3).unwrap();
        let facets = BTreeMap::from([(11, json!({"summary": "s"}))]);

        let flat = RMetrics::new(-0.1, -0.2, 0.0, 0.0);
        let err = ledger
            .update_s2_slots("e", facets.clone(), Some(flat))
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation(ValidationError::MetricThresholds(_))
        ));
        let document = ledger.entity_document("e").unwrap();
        assert!(document.slots.s2.is_empty());
        assert_eq!(document.tier, DocumentTier::S1);

        let rising = RMetrics::new(-0.1, -0.2, 0.0001, 0.0);
        let document = ledger.update_s2_slots("e", facets, Some(rising)).unwrap();
        assert_eq!(document.tier, DocumentTier::S2);
        assert_eq!(document.r_metrics, rising);
    }

    #[test]
    fn s2_uses_stored_metrics_when_none_given() {
        let ledger = ledger();
        ledger.update_lawfulness("e", 3).unwrap();
        ledger.update_r_metrics("e", good_metrics()).unwrap();
        let document = ledger
            .update_s2_slots("e", BTreeMap::from([(13, json!({}))]), None)
            .unwrap();
        assert!(document.slots.s2.contains_key(&13));
    }

    #[test]
    fn invalid_lawfulness_is_rejected() {
        let ledger = ledger();
        assert!(matches!(
            ledger.update_lawfulness("e", 4).unwrap_err(),
            LedgerError::Validation(ValidationError::InvalidLawfulness(4))
        ));
        assert!(ledger.update_lawfulness("e", -1).is_err());
    }

    #[test]
    fn anchor_with_text_fans_out_to_write_primes() {
        let ledger = ledger();
        ledger.update_lawfulness("e", 2).unwrap();
        ledger
            .write_s1_slots("e", BTreeMap::from([(2, json!({"write_primes": [31, 29]}))]))
            .unwrap();
        let out = ledger.anchor_with_text("e", &[(2, 1)], "hello", true).unwrap();
        assert_eq!(out.body_primes, vec![29, 31]);
        let document = ledger.entity_document("e").unwrap();
        assert_eq!(document.slots.body[&29].text, "hello");
        assert_eq!(document.slots.body[&31].text, "hello");
        assert_eq!(ledger.factor("e", 2).unwrap(), 1);
    }

    #[test]
    fn anchor_with_text_checks_body_gate_first() {
        let ledger = ledger();
        let err = ledger.anchor_with_text("e", &[(2, 1)], "hello", true).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation(ValidationError::TierNotPermitted { .. })
        ));
        assert_eq!(ledger.factor("e", 2).unwrap(), 0);
        assert!(ledger.events().read_all().unwrap().is_empty());
    }

    #[test]
    fn body_slots_accept_primes_near_u64_max() {
        let ledger = ledger();
        ledger.update_lawfulness("e", 2).unwrap();
        ledger
            .update_body_slot("e", 18_446_744_073_709_551_557, BodyWrite::text("far"))
            .unwrap();
        assert!(matches!(
            ledger
                .update_body_slot("e", u64::MAX, BodyWrite::text("far"))
                .unwrap_err(),
            LedgerError::Validation(_)
        ));
        ledger
            .write_s1_slots(
                "e",
                BTreeMap::from([(2, json!({"write_primes": [18_446_744_073_709_551_557u64]}))]),
            )
            .unwrap();
        let out = ledger.anchor_with_text("e", &[(2, 1)], "hi", false).unwrap();
        assert_eq!(out.body_primes, vec![18_446_744_073_709_551_557]);
    }

    /// Rejects any batch that touches slot documents once `fail` is set.
    #[derive(Debug, Default)]
    struct SlotWritesFail {
        inner: MemoryStore,
        fail: AtomicBool,
    }

    impl OrderedKeyValueStore for SlotWritesFail {
        fn get(&self, namespace: Namespace, key: &[u8]) -> anyhow::Result<Option<Vec<u8>>> {
            self.inner.get(namespace, key)
        }

        fn scan_prefix(&self, namespace: Namespace, prefix: &[u8]) -> anyhow::Result<Vec<KvPair>> {
            self.inner.scan_prefix(namespace, prefix)
        }

        fn write(&self, batch: WriteBatch) -> anyhow::Result<()> {
            if self.fail.load(Ordering::SeqCst)
                && batch.iter().any(|(ns, _, _)| ns == Namespace::Slots)
            {
                anyhow::bail!("disk full");
            }
            self.inner.write(batch)
        }

        fn key_locks(&self) -> &KeyLocks {
            self.inner.key_locks()
        }
    }

    #[test]
    fn anchor_with_text_is_all_or_nothing() {
        let store = Arc::new(SlotWritesFail::default());
        let ledger = Ledger::with_store(
            Arc::clone(&store) as Arc<dyn OrderedKeyValueStore>,
            EventLog::in_memory(),
            LedgerOptions::default(),
        )
        .with_centroid(FixedCentroid(CentroidDigit::Zero));
        ledger.update_lawfulness("e", 2).unwrap();

        store.fail.store(true, Ordering::SeqCst);
        assert!(ledger.anchor_with_text("e", &[(2, 1)], "hello", true).is_err());
        assert_eq!(ledger.factor("e", 2).unwrap(), 0);
        assert!(ledger.entity_document("e").unwrap().slots.body.is_empty());

        store.fail.store(false, Ordering::SeqCst);
        ledger.anchor_with_text("e", &[(2, 1)], "hello", true).unwrap();
        assert_eq!(ledger.factor("e", 2).unwrap(), 1);
        assert_eq!(
            ledger.entity_document("e").unwrap().slots.body[&DEFAULT_BODY_PRIME].text,
            "hello"
        );
    }

    #[test]
    fn anchor_with_text_defaults_to_prime_23() {
        let ledger = ledger();
        ledger.update_lawfulness("e", 2).unwrap();
        let out = ledger.anchor_with_text("e", &[], "note", false).unwrap();
        assert_eq!(out.body_primes, vec![DEFAULT_BODY_PRIME]);
    }
}
