//! Binary Merkle root over byte rows.
//!
//! Leaves are `sha256(row)`. Each layer hashes adjacent pairs as
//! `sha256(left || right)`, pairing an odd trailing node with itself. No rows
//! yields `sha256("")`.

use sha2::{Digest, Sha256};

pub type Hash = [u8; 32];

#[must_use]
pub fn sha256(data: &[u8]) -> Hash {
    Sha256::digest(data).into()
}

#[must_use]
pub fn merkle_root<I, R>(rows: I) -> Hash
where
    I: IntoIterator<Item = R>,
    R: AsRef<[u8]>,
{
    let mut layer: Vec<Hash> = rows.into_iter().map(|row| sha256(row.as_ref())).collect();
    if layer.is_empty() {
        return sha256(b"");
    }
    while layer.len() > 1 {
        layer = layer
            .chunks(2)
            .map(|pair| {
                let left = &pair[0];
                let right = pair.get(1).unwrap_or(left);
                let mut hasher = Sha256::new();
                hasher.update(left);
                hasher.update(right);
                hasher.finalize().into()
            })
            .collect();
    }
    layer[0]
}

#[must_use]
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
