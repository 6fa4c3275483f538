use serde::Serialize;
use thiserror::Error;

use crate::node::Node;
use crate::slots::SlotTier;

/// An edge that the flow rule forbids unless it is routed via the centroid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[error("flow-rule violation: {src}->{dst}")]
pub struct FlowRuleViolation {
    pub src: Node,
    pub dst: Node,
}

/// Input rejected before any state was touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("entity id must not be empty")]
    EmptyEntity,
    #[error("prime {0} is not one of the eight base primes")]
    UnsupportedPrime(u64),
    #[error("lawfulness must be between 0 and 3 (got {0})")]
    InvalidLawfulness(i64),
    #[error("{tier} writes require lawfulness >= {required} (entity is at {current})")]
    TierNotPermitted {
        tier: SlotTier,
        required: u8,
        current: u8,
    },
    #[error("{tier} slots must be keyed by {allowed} (got {key})")]
    InvalidSlotKey {
        tier: SlotTier,
        key: u64,
        allowed: &'static str,
    },
    #[error("{field} must reference primes >= 23 (got {value})")]
    InvalidReferencePrime { field: &'static str, value: String },
    #[error("body text must not be empty")]
    EmptyBodyText,
    #[error("missing r_metrics values for: {}", .0.join(", "))]
    MissingMetrics(Vec<&'static str>),
    #[error("r_metrics thresholds not met: {}", .0.join(", "))]
    MetricThresholds(Vec<&'static str>),
    #[error("blob key must be 16 bytes of hex (got {0:?})")]
    InvalidBlobKey(String),
    #[error("exponent for prime {0} would overflow")]
    ExponentOverflow(u64),
    #[error("token must contain non-whitespace characters")]
    EmptyToken,
    #[error("valuation base must be a prime greater than 1 (got {0})")]
    InvalidValuationBase(u64),
}
