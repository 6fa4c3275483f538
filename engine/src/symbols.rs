//! Bounded token → prime assignment.
//!
//! Tokens are normalized (lowercase, whitespace collapsed) and handed the
//! next unused prime from a fixed list, in first-seen order. Assignments are
//! stored in the symbols namespace and never change.

use std::sync::{Arc, Mutex, PoisonError};

use dualsub_store::{Namespace, OrderedKeyValueStore, WriteBatch};
use dualsub_types::{ValidationError, first_primes};

use crate::error::{LedgerError, Result};

const TOKEN_PREFIX: &str = "tp:token:";
const NEXT_INDEX_KEY: &[u8] = b"tp:next_index";

pub struct TokenPrimeTable {
    store: Arc<dyn OrderedKeyValueStore>,
    primes: Vec<u64>,
    assign: Mutex<()>,
}

impl TokenPrimeTable {
    #[must_use]
    pub fn new(store: Arc<dyn OrderedKeyValueStore>, capacity: usize) -> Self {
        Self {
            store,
            primes: first_primes(capacity),
            assign: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.primes.len()
    }

    /// Prime already assigned to `token`, if any.
    pub fn lookup(&self, token: &str) -> Result<Option<u64>> {
        let key = token_key(&normalize_token(token)?);
        self.read_prime(&key)
    }

    /// Prime for `token`, assigning the next free one on first sight.
    pub fn get_or_assign(&self, token: &str) -> Result<u64> {
        let key = token_key(&normalize_token(token)?);
        if let Some(prime) = self.read_prime(&key)? {
            return Ok(prime);
        }

        let _guard = self.assign.lock().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have assigned it while we waited.
        if let Some(prime) = self.read_prime(&key)? {
            return Ok(prime);
        }

        let next = self.assigned()?;
        let Some(&prime) = self.primes.get(next) else {
            return Err(LedgerError::ResourceExhausted {
                resource: "token prime table",
                capacity: self.capacity(),
            });
        };

        let mut batch = WriteBatch::new();
        batch.put(Namespace::Symbols, key, prime.to_string());
        batch.put(Namespace::Symbols, NEXT_INDEX_KEY, (next + 1).to_string());
        self.store.write(batch)?;
        tracing::debug!(prime, index = next, "Assigned token prime");
        Ok(prime)
    }

    pub fn primes_for_tokens<'a>(
        &self,
        tokens: impl IntoIterator<Item = &'a str>,
    ) -> Result<Vec<u64>> {
        tokens
            .into_iter()
            .map(|token| self.get_or_assign(token))
            .collect()
    }

    /// Number of primes handed out so far.
    pub fn assigned(&self) -> Result<usize> {
        match self.store.get(Namespace::Symbols, NEXT_INDEX_KEY)? {
            None => Ok(0),
            Some(raw) => parse_decimal(&raw)
                .ok_or_else(|| LedgerError::corrupt(Namespace::Symbols, NEXT_INDEX_KEY, "not a counter")),
        }
    }

    fn read_prime(&self, key: &[u8]) -> Result<Option<u64>> {
        self.store
            .get(Namespace::Symbols, key)?
            .map(|raw| {
                parse_decimal(&raw)
                    .ok_or_else(|| LedgerError::corrupt(Namespace::Symbols, key, "not a prime"))
            })
            .transpose()
    }
}

/// Lowercase and collapse runs of whitespace to one space.
pub fn normalize_token(token: &str) -> Result<String, ValidationError> {
    let normalized = token
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ");
    if normalized.is_empty() {
        Err(ValidationError::EmptyToken)
    } else {
        Ok(normalized)
    }
}

fn token_key(normalized: &str) -> Vec<u8> {
    format!("{TOKEN_PREFIX}{normalized}").into_bytes()
}

fn parse_decimal<T: std::str::FromStr>(raw: &[u8]) -> Option<T> {
    std::str::from_utf8(raw).ok()?.parse().ok()
}
