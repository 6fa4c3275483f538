use std::path::PathBuf;

use dualsub_config::ConfigError;
use dualsub_store::Namespace;
use dualsub_types::{FlowRuleViolation, ValidationError};
use thiserror::Error;

/// Everything a ledger operation can fail with.
///
/// Validation and flow-rule failures are raised before any state changes.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    FlowRuleViolation(#[from] FlowRuleViolation),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{resource} exhausted (capacity {capacity})")]
    ResourceExhausted {
        resource: &'static str,
        capacity: usize,
    },
    #[error("event log unavailable at {}: {source}", path.display())]
    EventLogUnavailable {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to encode ledger record: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
    #[error("corrupt {namespace} record {key:?}: {reason}")]
    CorruptRecord {
        namespace: Namespace,
        key: String,
        reason: String,
    },
}

impl LedgerError {
    pub(crate) fn corrupt(namespace: Namespace, key: &[u8], reason: impl Into<String>) -> Self {
        LedgerError::CorruptRecord {
            namespace,
            key: String::from_utf8_lossy(key).into_owned(),
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = LedgerError> = std::result::Result<T, E>;
