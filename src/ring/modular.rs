//! Word-sized modular arithmetic for the NTT primes of the chain.

use num_integer::Integer;

/// Barrett reduction of a double-word value modulo `m`.
///
/// `barrett_k` is `floor(2^64 / m)`. The single-word trick is exact for
/// `m <= 2^32` and `a < m^2`; wider chain primes go through `u128` division.
#[inline(always)]
pub fn barrett_reduce(a: u128, m: u64, barrett_k: u64) -> u64 {
    if m > (1u64 << 32) {
        (a % m as u128) as u64
    } else {
        let q_hat = ((a * barrett_k as u128) >> 64) as u64;
        let r = (a as u64).wrapping_sub(q_hat.wrapping_mul(m));
        if r >= m { r.wrapping_sub(m) } else { r }
    }
}

/// `floor(2^64 / m)`, the Barrett constant of `m`.
#[inline]
pub fn barrett_constant(m: u64) -> u64 {
    debug_assert!(m > 1, "modulus must be > 1");
    ((1u128 << 64) / m as u128) as u64
}

/// `(a + b) mod m` for reduced inputs.
#[inline(always)]
pub fn mod_add(a: u64, b: u64, m: u64) -> u64 {
    let sum = a as u128 + b as u128;
    if sum >= m as u128 { (sum - m as u128) as u64 } else { sum as u64 }
}

/// `(a - b) mod m` for reduced inputs.
#[inline(always)]
pub fn mod_sub(a: u64, b: u64, m: u64) -> u64 {
    if a >= b { a - b } else { m - b + a }
}

#[inline(always)]
pub fn mod_neg(a: u64, m: u64) -> u64 {
    if a == 0 { 0 } else { m - a }
}

#[inline(always)]
pub fn mod_mul(a: u64, b: u64, m: u64, barrett_k: u64) -> u64 {
    barrett_reduce(a as u128 * b as u128, m, barrett_k)
}

/// `base^exp mod m`.
pub fn mod_pow(mut base: u64, mut exp: u64, m: u64) -> u64 {
    if m == 1 {
        return 0;
    }
    let bk = barrett_constant(m);
    let mut result = 1u64;
    base %= m;
    while exp > 0 {
        if exp & 1 == 1 {
            result = mod_mul(result, base, m, bk);
        }
        exp >>= 1;
        base = mod_mul(base, base, m, bk);
    }
    result
}

/// `a^{-1} mod m`, or `None` when `a` is not a unit.
pub fn mod_inv(a: u64, m: u64) -> Option<u64> {
    if m == 1 {
        return Some(0);
    }
    let egcd = (a as i128 % m as i128).extended_gcd(&(m as i128));
    if egcd.gcd != 1 {
        return None;
    }
    Some(egcd.x.rem_euclid(m as i128) as u64)
}

/// Reduce a signed integer into `[0, m)`.
#[inline]
pub fn reduce_i64(v: i64, m: u64) -> u64 {
    (v as i128).rem_euclid(m as i128) as u64
}

/// Centered representative of `x mod m` in `(-m/2, m/2]`.
#[inline]
pub fn center(x: u64, m: u64) -> i64 {
    let x = x % m;
    if x > m / 2 { x as i64 - m as i64 } else { x as i64 }
}

/// Multiplicative order of `a` modulo `m`, `None` if `a` is not a unit.
pub fn mult_order(a: u64, m: u64) -> Option<u64> {
    if m < 2 || a.gcd(&m) != 1 {
        return None;
    }
    let bk = barrett_constant(m);
    let a = a % m;
    let mut acc = a;
    let mut order = 1;
    while acc != 1 {
        acc = mod_mul(acc, a, m, bk);
        order += 1;
    }
    Some(order)
}
