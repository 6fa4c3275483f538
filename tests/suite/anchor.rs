//! Anchoring: exponent accumulation, energy and the inference update.

use std::sync::Arc;
use std::thread;

use dualsub_engine::types::{CentroidDigit, ValidationError};
use dualsub_engine::{
    EventLog, FixedCentroid, FlowPolicy, Ledger, LedgerError, LedgerOptions, MemoryStore,
    OrderedKeyValueStore,
};

use crate::common::{assert_unit, memory_ledger};

#[test]
fn consecutive_anchors_add_up() {
    let ledger = memory_ledger();
    for &(p, d1, d2) in &[(2, 3, 4), (7, -2, 5), (19, 1, -1)] {
        ledger.anchor("e", &[(p, d1)], true).expect("first anchor");
        ledger.anchor("e", &[(p, d2)], true).expect("second anchor");
        assert_eq!(ledger.factor("e", p).expect("factor"), d1 + d2);
    }
}

#[test]
fn anchor_reports_energy_before_the_gradient_step() {
    let ledger = memory_ledger();
    let report = ledger.anchor("e", &[(2, 2)], true).expect("anchor");
    // Zero latent state: residual -2, |delta| 2, lambda 0.5.
    assert_eq!(report.energy.continuous, 2.0);
    assert_eq!(report.energy.discrete, 2.0);
    assert_eq!(report.energy.total, 3.0);
    assert_eq!(ledger.last_energy("e"), Some(report.energy));
    assert_eq!(ledger.last_energy("other"), None);
}

#[test]
fn energy_cache_is_per_ledger() {
    let a = memory_ledger();
    let b = memory_ledger();
    a.anchor("e", &[(3, 1)], false).expect("anchor");
    assert!(a.last_energy("e").is_some());
    assert!(b.last_energy("e").is_none());
}

#[test]
fn inference_vectors_stay_unit_length() {
    let ledger = memory_ledger();
    ledger
        .anchor("e", &[(2, 3), (5, -1), (11, 2)], true)
        .expect("anchor");
    ledger.anchor("e", &[(5, 4)], true).expect("anchor");
    let state = ledger.inference_state("e").expect("state");
    assert_unit(&state.x);
    for p in [2, 5, 11] {
        assert_unit(&state.readouts[&p]);
    }
}

#[test]
fn inference_is_untouched_without_update_or_cycle() {
    let ledger = memory_ledger();
    ledger.anchor("e", &[(2, 3), (5, 1)], false).expect("anchor");
    let state = ledger.inference_state("e").expect("state");
    assert_eq!(state, Default::default());
}

#[test]
fn centroid_cycle_rotates_stored_state_without_gradient() {
    let ledger = memory_ledger();
    ledger.anchor("e", &[(2, 1)], true).expect("seed x");
    let before = ledger.inference_state("e").expect("state");
    assert!(before.x[0] > 0.0);

    // 2 -> 3 crosses parity; pair (0, 1) is swapped then quarter-turned.
    let report = ledger.anchor("e", &[(2, 0), (3, 0)], false).expect("anchor");
    assert_eq!(report.cycle.flips, 1);
    let after = ledger.inference_state("e").expect("state");
    assert_eq!(after.x[0], -before.x[0]);
    assert_eq!(after.x[1], before.x[1]);
    assert_eq!(after.readouts[&2][0], -1.0);
}

#[test]
fn anchor_batch_moves_to_targets() {
    let ledger = memory_ledger();
    ledger.anchor("e", &[(2, 5), (3, 1)], true).expect("anchor");
    ledger
        .anchor_batch("e", &[(2, 1), (3, 1), (17, 6)])
        .expect("batch");
    assert_eq!(
        ledger.factors("e").expect("factors"),
        vec![(2, 1), (3, 1), (17, 6)]
    );
    let report = ledger.verify_replay("e").expect("replay");
    assert!(report.is_consistent(), "{:?}", report.drift);
}

#[test]
fn extended_primes_cannot_be_anchored() {
    let ledger = memory_ledger();
    let err = ledger.anchor("e", &[(29, 1)], true).unwrap_err();
    assert!(matches!(
        err,
        LedgerError::Validation(ValidationError::UnsupportedPrime(29))
    ));
}

#[test]
fn overflowing_exponent_is_rejected_atomically() {
    let ledger = memory_ledger();
    ledger.anchor("e", &[(2, i64::MAX)], false).expect("anchor");
    let err = ledger.anchor("e", &[(3, 1), (2, 1)], false).unwrap_err();
    assert!(matches!(
        err,
        LedgerError::Validation(ValidationError::ExponentOverflow(2))
    ));
    assert_eq!(ledger.factor("e", 3).expect("factor"), 0);
    assert_eq!(ledger.events().events_for("e").expect("events").len(), 1);
}

#[test]
fn reject_policy_surfaces_the_first_illegal_edge() {
    let options = LedgerOptions {
        flow_policy: FlowPolicy::Reject,
        ..LedgerOptions::default()
    };
    let ledger = Ledger::with_store(Arc::new(MemoryStore::new()), EventLog::in_memory(), options)
        .with_centroid(FixedCentroid(CentroidDigit::Zero));

    ledger.anchor("e", &[(3, 1), (5, 1)], true).expect("S1->S2 is direct");
    let err = ledger.anchor("e", &[(5, 1), (7, 1)], true).unwrap_err();
    assert_eq!(err.to_string(), "flow-rule violation: S2->S3");
    assert_eq!(ledger.factor("e", 7).expect("factor"), 0);
}

#[test]
fn concurrent_anchors_on_one_entity_serialize() {
    let ledger = memory_ledger();
    thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                for _ in 0..25 {
                    ledger.anchor("shared", &[(13, 1)], true).expect("anchor");
                }
            });
        }
    });
    assert_eq!(ledger.factor("shared", 13).expect("factor"), 200);
    assert_eq!(ledger.events().events_for("shared").expect("events").len(), 200);
}

#[test]
fn ledgers_sharing_a_store_serialize_on_the_entity() {
    let store: Arc<dyn OrderedKeyValueStore> = Arc::new(MemoryStore::new());
    let ledgers = [(), ()].map(|()| {
        Ledger::with_store(Arc::clone(&store), EventLog::in_memory(), LedgerOptions::default())
            .with_centroid(FixedCentroid(CentroidDigit::Zero))
    });
    thread::scope(|scope| {
        for worker in 0..4 {
            let ledgers = &ledgers;
            scope.spawn(move || {
                for i in 0..500 {
                    ledgers[(worker + i) % 2]
                        .anchor("shared", &[(13, 1)], false)
                        .expect("anchor");
                }
            });
        }
    });
    assert_eq!(ledgers[0].factor("shared", 13).expect("factor"), 2000);
    assert_eq!(ledgers[1].factor("shared", 13).expect("factor"), 2000);
    assert!(store.key_locks().is_empty());
}

#[test]
fn entity_locks_are_released_after_use() {
    let store: Arc<dyn OrderedKeyValueStore> = Arc::new(MemoryStore::new());
    let ledger =
        Ledger::with_store(Arc::clone(&store), EventLog::in_memory(), LedgerOptions::default())
            .with_centroid(FixedCentroid(CentroidDigit::Zero));
    for i in 0..50 {
        ledger.anchor(&format!("entity-{i}"), &[(2, 1)], true).expect("anchor");
    }
    ledger.update_lawfulness("entity-0", 2).expect("lawfulness");
    ledger.verify_replay("entity-1").expect("replay");
    assert!(store.key_locks().is_empty());
}
