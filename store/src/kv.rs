use std::fmt;

use anyhow::Result;

use crate::locks::KeyLocks;

/// Independent keyspaces sharing one physical store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Namespace {
    Factors,
    Postings,
    Slots,
    Inference,
    Blobs,
    Symbols,
}

impl Namespace {
    pub const ALL: [Namespace; 6] = [
        Namespace::Factors,
        Namespace::Postings,
        Namespace::Slots,
        Namespace::Inference,
        Namespace::Blobs,
        Namespace::Symbols,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::Factors => "factors",
            Namespace::Postings => "postings",
            Namespace::Slots => "slots",
            Namespace::Inference => "inference",
            Namespace::Blobs => "blobs",
            Namespace::Symbols => "symbols",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type KvPair = (Vec<u8>, Vec<u8>);

/// Puts that must land together or not at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    puts: Vec<(Namespace, Vec<u8>, Vec<u8>)>,
}

impl WriteBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, namespace: Namespace, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.puts.push((namespace, key.into(), value.into()));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.puts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.puts.is_empty()
    }

    /// Puts in insertion order. Later puts to the same key win.
    pub fn iter(&self) -> impl Iterator<Item = (Namespace, &[u8], &[u8])> {
        self.puts
            .iter()
            .map(|(ns, key, value)| (*ns, key.as_slice(), value.as_slice()))
    }
}

/// Byte-key/byte-value store with lexicographic prefix iteration.
///
/// Implementations must give read-your-writes visibility within a process and
/// apply a [`WriteBatch`] atomically. Checksums depend on `scan_prefix`
/// returning rows in byte order of the key, never a semantic order.
pub trait OrderedKeyValueStore: Send + Sync {
    fn get(&self, namespace: Namespace, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// All rows of `namespace` whose key starts with `prefix`, ascending by key bytes.
    fn scan_prefix(&self, namespace: Namespace, prefix: &[u8]) -> Result<Vec<KvPair>>;

    fn write(&self, batch: WriteBatch) -> Result<()>;

    /// Per-entity locks shared by every handle to this store.
    fn key_locks(&self) -> &KeyLocks;

    fn put(&self, namespace: Namespace, key: &[u8], value: &[u8]) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.put(namespace, key, value);
        self.write(batch)
    }
}

/// Smallest key greater than every key starting with `prefix`.
///
/// `None` when no such bound exists (empty prefix or all `0xFF`).
pub(crate) fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut bound = prefix.to_vec();
    while let Some(last) = bound.pop() {
        if last < u8::MAX {
            bound.push(last + 1);
            return Some(bound);
        }
    }
    None
}
