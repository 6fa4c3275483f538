//! Shared test utilities and fixtures
//!
//! Common infrastructure for integration tests.

#![allow(dead_code)]

use std::path::Path;

use dualsub_engine::types::CentroidDigit;
use dualsub_engine::{FixedCentroid, Ledger, LedgerConfig, StorageBackend};
use tempfile::TempDir;

/// In-memory ledger whose cycles always start at centroid 0.
pub fn memory_ledger() -> Ledger {
    Ledger::in_memory().with_centroid(FixedCentroid(CentroidDigit::Zero))
}

/// Config pointing the SQLite store and event log into `dir`.
pub fn sqlite_config(dir: &Path) -> LedgerConfig {
    let mut config = LedgerConfig::default();
    config.storage.backend = StorageBackend::Sqlite;
    config.storage.data_dir = Some(dir.join("data").display().to_string());
    config.storage.event_log = Some(dir.join("event.log").display().to_string());
    config
}

pub fn open_sqlite(dir: &Path) -> Ledger {
    Ledger::open(&sqlite_config(dir))
        .expect("open sqlite ledger")
        .with_centroid(FixedCentroid(CentroidDigit::Zero))
}

/// A scratch directory plus a SQLite-backed ledger living in it.
pub fn sqlite_ledger() -> (TempDir, Ledger) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let ledger = open_sqlite(dir.path());
    (dir, ledger)
}

pub fn assert_unit(v: &[f64]) {
    let norm = v.iter().map(|c| c * c).sum::<f64>().sqrt();
    assert!((norm - 1.0).abs() < 1e-9, "norm was {norm}");
}
