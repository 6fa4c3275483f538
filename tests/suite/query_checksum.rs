//! Posting intersection and the Merkle checksum over factor rows.

use dualsub_engine::checksum::{merkle_root, sha256, to_hex};

use crate::common::memory_ledger;

#[test]
fn query_intersects_and_takes_minimum_weight() {
    let ledger = memory_ledger();
    ledger.anchor("alice", &[(2, 3), (3, 1)], true).expect("alice");
    ledger.anchor("bob", &[(2, 2)], true).expect("bob");

    assert_eq!(
        ledger.query(&[2, 3]).expect("query"),
        vec![("alice".to_string(), 1)]
    );
    assert_eq!(
        ledger.query(&[2]).expect("query"),
        vec![("alice".to_string(), 3), ("bob".to_string(), 2)]
    );
    assert!(ledger.query(&[19]).expect("query").is_empty());
    assert!(ledger.query(&[]).expect("query").is_empty());
}

#[test]
fn checksum_is_stable_until_a_factor_changes() {
    let ledger = memory_ledger();
    ledger.anchor("e", &[(2, 1), (11, 4)], true).expect("anchor");
    let first = ledger.checksum("e").expect("checksum");
    assert_eq!(first, ledger.checksum("e").expect("checksum"));
    assert_eq!(first.len(), 64);

    ledger.anchor("e", &[(11, 1)], true).expect("anchor");
    let second = ledger.checksum("e").expect("checksum");
    assert_ne!(first, second);

    ledger.anchor("e", &[(11, -1)], true).expect("anchor");
    assert_eq!(ledger.checksum("e").expect("checksum"), first);
}

#[test]
fn checksum_hashes_rows_in_byte_order() {
    let ledger = memory_ledger();
    ledger.anchor("e", &[(2, 1), (11, 4)], false).expect("anchor");
    // "e:11" sorts before "e:2".
    let expected = to_hex(&merkle_root([b"e:114".as_slice(), b"e:21".as_slice()]));
    assert_eq!(ledger.checksum("e").expect("checksum"), expected);
}

#[test]
fn checksum_of_unknown_entity_is_hash_of_nothing() {
    let ledger = memory_ledger();
    assert_eq!(
        ledger.checksum("nobody").expect("checksum"),
        to_hex(&sha256(b""))
    );
}

#[test]
fn checksum_ignores_other_namespaces() {
    let ledger = memory_ledger();
    ledger.anchor("e", &[(2, 1)], false).expect("anchor");
    let before = ledger.checksum("e").expect("checksum");
    ledger.update_lawfulness("e", 3).expect("lawfulness");
    ledger.anchor("e:2", &[(3, 1)], false).expect("lookalike entity");
    assert_eq!(ledger.checksum("e").expect("checksum"), before);
}
