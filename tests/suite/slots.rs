//! Slot documents: lawfulness gating, the S2 metric gate and body shards.

use std::collections::BTreeMap;

use dualsub_engine::types::{DocumentTier, RMetrics, ValidationError};
use dualsub_engine::{BodyWrite, LedgerError};
use serde_json::json;

use crate::common::memory_ledger;

fn s1_facets() -> BTreeMap<u64, serde_json::Value> {
    BTreeMap::from([(3, json!({"title": "Ledger", "write_primes": [29]}))])
}

fn s2_facets() -> BTreeMap<u64, serde_json::Value> {
    BTreeMap::from([(17, json!({"summary_ref": 29, "refs": [31, 37]}))])
}

#[test]
fn s1_write_waits_for_lawfulness_one() {
    let ledger = memory_ledger();
    ledger.update_lawfulness("e", 0).expect("lower lawfulness");
    assert!(ledger.write_s1_slots("e", s1_facets()).is_err());
    assert!(ledger.entity_document("e").expect("doc").slots.s1.is_empty());

    ledger.update_lawfulness("e", 1).expect("raise lawfulness");
    let document = ledger.write_s1_slots("e", s1_facets()).expect("S1 write");
    assert_eq!(document.slots.s1[&3]["title"], "Ledger");
    assert_eq!(document.write_primes(), vec![29]);
}

#[test]
fn s2_gate_treats_zero_retention_as_failing() {
    let ledger = memory_ledger();
    ledger.update_lawfulness("e", 3).expect("lawfulness");

    let err = ledger
        .update_s2_slots("e", s2_facets(), Some(RMetrics::new(-1.0, -0.5, 0.0, 0.2)))
        .unwrap_err();
    let LedgerError::Validation(ValidationError::MetricThresholds(failed)) = err else {
        panic!("expected threshold failure, got {err:?}");
    };
    assert_eq!(failed, vec!["ΔRetention > 0"]);
    assert_eq!(
        ledger.entity_document("e").expect("doc").tier,
        DocumentTier::S1
    );

    let document = ledger
        .update_s2_slots("e", s2_facets(), Some(RMetrics::new(-1.0, -0.5, 0.0001, 0.2)))
        .expect("S2 write");
    assert_eq!(document.tier, DocumentTier::S2);
    assert_eq!(document.slots.s2[&17]["refs"], json!([31, 37]));
}

#[test]
fn s2_requires_lawfulness_three() {
    let ledger = memory_ledger();
    ledger.update_lawfulness("e", 2).expect("lawfulness");
    let err = ledger
        .update_s2_slots("e", s2_facets(), Some(RMetrics::new(-1.0, -1.0, 1.0, 1.0)))
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::Validation(ValidationError::TierNotPermitted { required: 3, current: 2, .. })
    ));
    // The rejected metrics were not merged either.
    assert_eq!(
        ledger.entity_document("e").expect("doc").r_metrics,
        RMetrics::default()
    );
}

#[test]
fn s2_refs_must_be_body_primes() {
    let ledger = memory_ledger();
    ledger.update_lawfulness("e", 3).expect("lawfulness");
    let facets = BTreeMap::from([(11, json!({"refs": [7]}))]);
    assert!(ledger
        .update_s2_slots("e", facets, Some(RMetrics::new(-1.0, -1.0, 1.0, 1.0)))
        .is_err());
}

#[test]
fn body_metadata_round_trips() {
    let ledger = memory_ledger();
    ledger.update_lawfulness("e", 2).expect("lawfulness");
    let metadata = json!({"kind": "note", "version": 2, "provenance": "import", "lawfulness_level": 2});
    let body = BodyWrite {
        text: "# Title".to_string(),
        content_type: Some("text/markdown".to_string()),
        metadata: metadata.as_object().cloned().unwrap_or_default(),
    };
    ledger.update_body_slot("e", 41, body).expect("body write");

    let shard = &ledger.entity_document("e").expect("doc").slots.body[&41];
    assert_eq!(shard.content_type, "text/markdown");
    assert_eq!(shard.extra["kind"], "note");
    assert_eq!(shard.extra["version"], 2);
    assert_eq!(shard.extra["provenance"], "import");
    assert!(shard.hash.starts_with("sha256:"));
    assert!(shard.updated_at.is_some());
}

#[test]
fn body_metadata_lawfulness_is_checked() {
    let ledger = memory_ledger();
    ledger.update_lawfulness("e", 2).expect("lawfulness");
    let body = BodyWrite {
        text: "x".to_string(),
        content_type: None,
        metadata: json!({"lawfulness_level": 9}).as_object().cloned().unwrap_or_default(),
    };
    assert!(ledger.update_body_slot("e", 23, body).is_err());
}

#[test]
fn anchor_with_text_writes_factors_and_bodies() {
    let ledger = memory_ledger();
    ledger.update_lawfulness("e", 2).expect("lawfulness");
    ledger.write_s1_slots("e", s1_facets()).expect("S1 write");

    let out = ledger
        .anchor_with_text("e", &[(3, 2)], "observed text", true)
        .expect("anchor with text");
    assert_eq!(out.body_primes, vec![29]);
    assert_eq!(ledger.factor("e", 3).expect("factor"), 2);
    assert_eq!(
        ledger.entity_document("e").expect("doc").slots.body[&29].text,
        "observed text"
    );
}

#[test]
fn anchor_with_empty_text_changes_nothing() {
    let ledger = memory_ledger();
    ledger.update_lawfulness("e", 2).expect("lawfulness");
    assert!(ledger.anchor_with_text("e", &[(3, 2)], " ", true).is_err());
    assert_eq!(ledger.factor("e", 3).expect("factor"), 0);
}
