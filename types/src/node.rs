use std::fmt;

use serde::{Deserialize, Serialize};

use crate::primes::{BASE_PRIMES, base_index};

/// One of the eight flow-rule states. `S{i}` corresponds to `BASE_PRIMES[i]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Node {
    S0,
    S1,
    S2,
    S3,
    S4,
    S5,
    S6,
    S7,
}

impl Node {
    pub const ALL: [Node; 8] = [
        Node::S0,
        Node::S1,
        Node::S2,
        Node::S3,
        Node::S4,
        Node::S5,
        Node::S6,
        Node::S7,
    ];

    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    #[must_use]
    pub fn for_prime(prime: u64) -> Option<Self> {
        base_index(prime).and_then(Self::from_index)
    }

    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub fn prime(self) -> u64 {
        BASE_PRIMES[self.index()]
    }

    #[must_use]
    pub fn parity(self) -> Parity {
        if self.index() % 2 == 0 {
            Parity::Even
        } else {
            Parity::Odd
        }
    }

    #[must_use]
    pub fn is_even(self) -> bool {
        self.parity() == Parity::Even
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Node::S0 => "S0",
            Node::S1 => "S1",
            Node::S2 => "S2",
            Node::S3 => "S3",
            Node::S4 => "S4",
            Node::S5 => "S5",
            Node::S6 => "S6",
            Node::S7 => "S7",
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    Even,
    Odd,
}

impl Parity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Parity::Even => "even",
            Parity::Odd => "odd",
        }
    }
}

/// The ambient centroid parity bit. Serialized as `0` / `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum CentroidDigit {
    #[default]
    Zero,
    One,
}

impl CentroidDigit {
    /// Centroid implied by a millisecond clock reading: `ms mod 2`.
    #[must_use]
    pub fn from_millis(ms: u128) -> Self {
        if ms % 2 == 0 { Self::Zero } else { Self::One }
    }

    #[must_use]
    pub fn flipped(self) -> Self {
        match self {
            Self::Zero => Self::One,
            Self::One => Self::Zero,
        }
    }

    #[must_use]
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Zero => 0,
            Self::One => 1,
        }
    }
}

impl From<CentroidDigit> for u8 {
    fn from(value: CentroidDigit) -> Self {
        value.as_u8()
    }
}

impl TryFrom<u8> for CentroidDigit {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Zero),
            1 => Ok(Self::One),
            other => Err(format!("centroid digit must be 0 or 1 (got {other})")),
        }
    }
}

impl fmt::Display for CentroidDigit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}
