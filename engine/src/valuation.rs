//! p-adic valuation helpers.

use dualsub_types::ValidationError;

/// Exponent of `p` in `n`. Zero is divisible by every power.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Valuation {
    Finite(u32),
    Infinite,
}

pub fn v_p(n: i64, p: u64) -> Result<Valuation, ValidationError> {
    if p <= 1 {
        return Err(ValidationError::InvalidValuationBase(p));
    }
    if n == 0 {
        return Ok(Valuation::Infinite);
    }
    let mut n = n.unsigned_abs();
    let mut exponent = 0;
    while n % p == 0 {
        n /= p;
        exponent += 1;
    }
    Ok(Valuation::Finite(exponent))
}

pub fn is_divisible(n: i64, p: u64) -> Result<bool, ValidationError> {
    Ok(v_p(n, p)? > Valuation::Finite(0))
}
