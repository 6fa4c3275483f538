//! The fixed prime basis and primality helpers.

/// The eight base primes. Position in this array is the base-vector index.
pub const BASE_PRIMES: [u64; 8] = [2, 3, 5, 7, 11, 13, 17, 19];

/// Length of the latent vector and of every readout row.
pub const BASE_DIMENSION: usize = BASE_PRIMES.len();

/// Smallest prime usable as a body slot key.
pub const MIN_BODY_PRIME: u64 = 23;

/// Body slot used when an anchor carries text but no S1 facet names a target.
pub const DEFAULT_BODY_PRIME: u64 = MIN_BODY_PRIME;

/// Witnesses that make Miller-Rabin deterministic for every `u64`.
const MILLER_RABIN_BASES: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];

/// Deterministic Miller-Rabin primality test over the full `u64` range.
#[must_use]
pub fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    for p in MILLER_RABIN_BASES {
        if n % p == 0 {
            return n == p;
        }
    }

    // n - 1 = d * 2^s with d odd
    let s = (n - 1).trailing_zeros();
    let d = (n - 1) >> s;

    MILLER_RABIN_BASES.iter().all(|&a| {
        let mut x = pow_mod(a, d, n);
        if x == 1 || x == n - 1 {
            return true;
        }
        for _ in 1..s {
            x = mul_mod(x, x, n);
            if x == n - 1 {
                return true;
            }
        }
        false
    })
}

fn mul_mod(a: u64, b: u64, m: u64) -> u64 {
    ((u128::from(a) * u128::from(b)) % u128::from(m)) as u64
}

fn pow_mod(mut base: u64, mut exp: u64, m: u64) -> u64 {
    let mut acc = 1;
    base %= m;
    while exp > 0 {
        if exp & 1 == 1 {
            acc = mul_mod(acc, base, m);
        }
        base = mul_mod(base, base, m);
        exp >>= 1;
    }
    acc
}

/// Index of `prime` within [`BASE_PRIMES`], if it is a base prime.
#[must_use]
pub fn base_index(prime: u64) -> Option<usize> {
    BASE_PRIMES.iter().position(|&p| p == prime)
}

#[must_use]
pub fn is_base_prime(prime: u64) -> bool {
    base_index(prime).is_some()
}

/// Extended primes (>= 23) address structured body content.
#[must_use]
pub fn is_body_prime(n: u64) -> bool {
    n >= MIN_BODY_PRIME && is_prime(n)
}

/// The first `count` primes in ascending order.
#[must_use]
pub fn first_primes(count: usize) -> Vec<u64> {
    let mut primes: Vec<u64> = Vec::with_capacity(count);
    let mut candidate = 2u64;
    while primes.len() < count {
        let composite = primes
            .iter()
            .take_while(|&&p| p * p <= candidate)
            .any(|&p| candidate % p == 0);
        if !composite {
            primes.push(candidate);
        }
        candidate += 1;
    }
    primes
}
