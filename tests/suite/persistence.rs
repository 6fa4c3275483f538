//! SQLite-backed ledgers: durability across reopen, the event log on disk and
//! configuration failures.

use std::fs;

use dualsub_engine::{BlobKey, Ledger, LedgerConfig, LedgerError};

use crate::common::{open_sqlite, sqlite_config, sqlite_ledger};

#[test]
fn state_survives_reopen() {
    let (dir, ledger) = sqlite_ledger();
    ledger.anchor("alice", &[(2, 3), (3, 1)], true).expect("anchor");
    ledger.update_lawfulness("alice", 2).expect("lawfulness");
    let checksum = ledger.checksum("alice").expect("checksum");
    let state = ledger.inference_state("alice").expect("state");
    drop(ledger);

    let reopened = open_sqlite(dir.path());
    assert_eq!(
        reopened.factors("alice").expect("factors"),
        vec![(2, 3), (3, 1)]
    );
    assert_eq!(reopened.checksum("alice").expect("checksum"), checksum);
    assert_eq!(
        reopened.query(&[2, 3]).expect("query"),
        vec![("alice".to_string(), 1)]
    );
    assert_eq!(
        reopened
            .entity_document("alice")
            .expect("doc")
            .lawfulness
            .level(),
        2
    );
    let reloaded = reopened.inference_state("alice").expect("state");
    for (a, b) in reloaded.x.iter().zip(&state.x) {
        assert!((a - b).abs() < 1e-12);
    }
    // The energy cache is instance state, not persisted.
    assert!(reopened.last_energy("alice").is_none());
}

#[test]
fn event_log_is_one_json_line_per_delta() {
    let (dir, ledger) = sqlite_ledger();
    ledger.anchor("e", &[(2, 1), (3, -2)], true).expect("anchor");
    ledger.anchor("e", &[(5, 4)], true).expect("anchor");

    let raw = fs::read_to_string(dir.path().join("event.log")).expect("read log");
    let lines: Vec<&str> = raw.lines().collect();
    assert_eq!(lines.len(), 3);
    let second: serde_json::Value = serde_json::from_str(lines[1]).expect("json line");
    assert_eq!(second["entity"], "e");
    assert_eq!(second["prime"], 3);
    assert_eq!(second["delta"], -2);
    assert_eq!(second["via_centroid"], true);
    assert_eq!(second["cycle_index"], 1);
}

#[test]
fn replay_matches_across_reopen() {
    let (dir, ledger) = sqlite_ledger();
    ledger.anchor("e", &[(7, 2), (11, 1)], true).expect("anchor");
    ledger.anchor_batch("e", &[(7, -3)]).expect("batch");
    drop(ledger);

    let report = open_sqlite(dir.path()).verify_replay("e").expect("replay");
    assert!(report.is_consistent(), "{:?}", report.drift);
    assert_eq!(report.events, 3);
}

#[test]
fn torn_log_tail_is_skipped() {
    let (dir, ledger) = sqlite_ledger();
    ledger.anchor("e", &[(2, 1)], true).expect("anchor");
    drop(ledger);

    let log = dir.path().join("event.log");
    let mut raw = fs::read_to_string(&log).expect("read log");
    raw.push_str(r#"{"entity":"e","prime":2,"de"#);
    fs::write(&log, raw).expect("write torn tail");

    let reopened = open_sqlite(dir.path());
    reopened.anchor("e", &[(2, 1)], true).expect("anchor after tear");
    assert_eq!(reopened.events().events_for("e").expect("events").len(), 2);
    assert!(reopened.verify_replay("e").expect("replay").is_consistent());
}

#[test]
fn unusable_event_log_fails_open() {
    let dir = tempfile::tempdir().expect("temp dir");
    // A directory cannot be opened for appending.
    let occupied = dir.path().join("event.log");
    fs::create_dir(&occupied).expect("create dir in the log's place");

    let err = Ledger::open(&sqlite_config(dir.path())).unwrap_err();
    let LedgerError::EventLogUnavailable { path, .. } = err else {
        panic!("expected EventLogUnavailable, got {err:?}");
    };
    assert_eq!(path, occupied);
}

#[test]
fn invalid_config_is_rejected_at_open() {
    let mut config = LedgerConfig::in_memory();
    config.inference.learning_rate = 0.0;
    assert!(matches!(
        Ledger::open(&config).unwrap_err(),
        LedgerError::Config(_)
    ));
}

#[test]
fn memory_config_keeps_everything_in_process() {
    let ledger = Ledger::open(&LedgerConfig::in_memory()).expect("memory ledger");
    ledger.anchor("e", &[(2, 1)], true).expect("anchor");
    assert!(ledger.events().path().is_none());
    assert_eq!(ledger.factor("e", 2).expect("factor"), 1);
}

#[test]
fn blobs_and_symbols_persist() {
    let (dir, ledger) = sqlite_ledger();
    let key = BlobKey::from_hex("00112233445566778899aabbccddeeff").expect("key");
    ledger.put_blob(&key, "raw payload").expect("put blob");
    let prime = ledger.symbols().get_or_assign("Prime Ledger").expect("token");
    drop(ledger);

    let reopened = open_sqlite(dir.path());
    assert_eq!(
        reopened.get_blob(&key).expect("get blob").as_deref(),
        Some("raw payload")
    );
    assert_eq!(
        reopened.symbols().lookup("prime   ledger").expect("lookup"),
        Some(prime)
    );
}
