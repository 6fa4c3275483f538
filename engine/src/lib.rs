//! Ledger engine for the dual-substrate prime-exponent ledger.
//!
//! The discrete substrate is the per-entity exponent vector and its event
//! log; the continuous substrate is the learned latent state in
//! [`inference`]. [`Ledger`] ties them together: every anchor passes the
//! flow rule, is legalized through the centroid cycle, scored by the mixed
//! energy and then persisted.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

pub mod automorphism;
pub mod blob;
pub mod checksum;
pub mod energy;
mod error;
pub mod flow_rule;
pub mod inference;
mod ledger;
pub mod rotation;
pub mod symbols;
pub mod valuation;

pub use automorphism::{CentroidProvider, CycleAutomorphismService, FixedCentroid, WallClockCentroid};
pub use blob::BlobKey;
pub use energy::EnergyBreakdown;
pub use error::{LedgerError, Result};
pub use flow_rule::{EdgeKind, TransitionCheck, Traversal, traverse, validate_prime_sequence};
pub use inference::{InferenceSnapshot, InferenceStore};
pub use ledger::{
    AnchorReport, AnchorWithText, BodyWrite, Ledger, LedgerOptions, ReplayDrift, ReplayReport,
};
pub use rotation::{ExponentRotation, RotationOutcome};
pub use symbols::TokenPrimeTable;
pub use valuation::{Valuation, v_p};

pub use dualsub_config::{FlowPolicy, LedgerConfig, StorageBackend};
pub use dualsub_store::{EventLog, MemoryStore, Namespace, OrderedKeyValueStore, SqliteStore};
pub use dualsub_types as types;
