//! Core domain types for the dual-substrate ledger.
//!
//! This crate contains pure domain types with no IO and minimal dependencies.
//! Everything here can be used from any layer: storage, configuration and the
//! engine all speak in these terms.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

mod cycle;
mod error;
mod event;
mod node;
mod primes;
mod slots;

pub use cycle::{CycleResult, CycleStep, PairOp, PairOperation, VectorPair};
pub use error::{FlowRuleViolation, ValidationError};
pub use event::Event;
pub use node::{CentroidDigit, Node, Parity};
pub use primes::{
    BASE_DIMENSION, BASE_PRIMES, DEFAULT_BODY_PRIME, MIN_BODY_PRIME, base_index, first_primes,
    is_base_prime, is_body_prime, is_prime,
};
pub use slots::{
    BodyShard, DocumentTier, Lawfulness, RMetrics, S1_KEYS, S2_KEYS, SlotTier, Slots,
    SlotsDocument, validate_body_key, validate_s1_facets, validate_s2_facets,
};

// ============================================================================
// Entity ids
// ============================================================================

/// Validate an entity id before it is used to build storage keys.
///
/// Entity ids are opaque; the only requirement is that they are non-empty
/// after trimming.
pub fn validate_entity(entity: &str) -> Result<(), ValidationError> {
    if entity.trim().is_empty() {
        Err(ValidationError::EmptyEntity)
    } else {
        Ok(())
    }
}
