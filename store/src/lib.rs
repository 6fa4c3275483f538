//! Persistence substrate for the dual-substrate ledger.
//!
//! This crate provides:
//! - The `OrderedKeyValueStore` interface every ledger namespace is built on
//! - A SQLite implementation (durable) and a `BTreeMap` implementation (tests,
//!   ephemeral ledgers), chosen at construction time
//! - Atomic multi-namespace write batches
//! - Per-entity locks owned by each store instance
//! - The append-only, newline-delimited JSON event log
//!
//! # Architecture
//!
//! ```text
//! dyn OrderedKeyValueStore
//! ├── SqliteStore  (kv table, BLOB keys, memcmp ordering)
//! └── MemoryStore  (RwLock<BTreeMap<Namespace, BTreeMap<..>>>)
//!
//! EventLog
//! ├── file   (append-only, fsync per batch)
//! └── memory
//! ```

mod event_log;
mod kv;
mod locks;
mod memory;
mod secure_fs;
mod sqlite;

pub use event_log::EventLog;
pub use kv::{KvPair, Namespace, OrderedKeyValueStore, WriteBatch};
pub use locks::KeyLocks;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
