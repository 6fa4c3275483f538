//! In-process ordered store. Nothing survives the process.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{PoisonError, RwLock};

use anyhow::Result;

use crate::kv::{KvPair, Namespace, OrderedKeyValueStore, WriteBatch};
use crate::locks::KeyLocks;

type Table = BTreeMap<Vec<u8>, Vec<u8>>;

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<BTreeMap<Namespace, Table>>,
    locks: KeyLocks,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows stored under `namespace`.
    #[must_use]
    pub fn len(&self, namespace: Namespace) -> usize {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&namespace)
            .map_or(0, BTreeMap::len)
    }
}

impl OrderedKeyValueStore for MemoryStore {
    fn get(&self, namespace: Namespace, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tables
            .get(&namespace)
            .and_then(|table| table.get(key))
            .cloned())
    }

    fn scan_prefix(&self, namespace: Namespace, prefix: &[u8]) -> Result<Vec<KvPair>> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        let Some(table) = tables.get(&namespace) else {
            return Ok(Vec::new());
        };
        Ok(table
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    fn write(&self, batch: WriteBatch) -> Result<()> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        for (namespace, key, value) in batch.iter() {
            tables
                .entry(namespace)
                .or_default()
                .insert(key.to_vec(), value.to_vec());
        }
        Ok(())
    }

    fn key_locks(&self) -> &KeyLocks {
        &self.locks
    }
}
