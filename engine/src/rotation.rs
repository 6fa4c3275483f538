//! Seam for the external exponent-rotation utility.

use dualsub_types::BASE_DIMENSION;

/// Maps the eight base exponents of an entity to a new absolute vector.
///
/// The ledger treats the numeric method as opaque and only anchors the
/// returned targets.
pub trait ExponentRotation {
    fn rotate(&self, exponents: [i64; BASE_DIMENSION]) -> [i64; BASE_DIMENSION];
}

impl<F> ExponentRotation for F
where
    F: Fn([i64; BASE_DIMENSION]) -> [i64; BASE_DIMENSION],
{
    fn rotate(&self, exponents: [i64; BASE_DIMENSION]) -> [i64; BASE_DIMENSION] {
        self(exponents)
    }
}

/// Checksums on either side of a rotation.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RotationOutcome {
    pub original_checksum: String,
    pub rotated_checksum: String,
    pub exponents: [i64; BASE_DIMENSION],
}
