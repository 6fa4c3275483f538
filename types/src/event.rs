use serde::{Deserialize, Serialize};

use crate::node::CentroidDigit;

/// One line of the append-only event log.
///
/// Events are never mutated or deleted. Summing `delta` over every event for
/// an `(entity, prime)` pair reproduces the stored factor exponent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub entity: String,
    pub prime: u64,
    pub delta: i64,
    pub timestamp_ms: u64,
    pub via_centroid: bool,
    pub centroid_digit: CentroidDigit,
    pub cycle_index: u64,
}
