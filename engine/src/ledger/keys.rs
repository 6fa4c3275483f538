//! Key encodings for the ledger namespaces.
//!
//! Entity ids may themselves contain `:`, so readers only accept rows whose
//! remainder after the prefix is a plain decimal number.

pub(crate) fn factor_prefix(entity: &str) -> Vec<u8> {
    format!("{entity}:").into_bytes()
}

pub(crate) fn factor_key(entity: &str, prime: u64) -> Vec<u8> {
    format!("{entity}:{prime}").into_bytes()
}

pub(crate) fn posting_prefix(prime: u64) -> Vec<u8> {
    format!("{prime}:").into_bytes()
}

pub(crate) fn posting_key(prime: u64, entity: &str) -> Vec<u8> {
    format!("{prime}:{entity}").into_bytes()
}

pub(crate) fn slots_key(entity: &str) -> Vec<u8> {
    format!("slots:{entity}").into_bytes()
}

/// Prime encoded after `prefix`, if the remainder is all ASCII digits.
pub(crate) fn prime_suffix(key: &[u8], prefix: &[u8]) -> Option<u64> {
    let rest = key.strip_prefix(prefix)?;
    if rest.is_empty() || !rest.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(rest).ok()?.parse().ok()
}

/// Decimal exponent value as stored in factor and posting rows.
pub(crate) fn parse_exponent(value: &[u8]) -> Option<i64> {
    std::str::from_utf8(value).ok()?.trim().parse().ok()
}
