use std::sync::Arc;

use crate::error::Result;
use crate::params::{Context, ContextBuilder};

/// Tiny context for tests and examples: n=32, p=7, six ciphertext primes
/// (one half-size), three digits.
///
/// Chain: 4193089, then the 40-bit primes 1099511626049, 1099511625409, ...
/// all ≡ 1 (mod 64). No security whatsoever.
pub fn toy_context() -> Result<Arc<Context>> {
    ContextBuilder::new()
        .ring_degree(32)
        .plaintext_prime(7)
        .ctxt_primes(6)
        .num_digits(3)
        .build()
}

/// Same chain as [`toy_context`] with plaintext space 2^3, for bit
/// extraction.
pub fn toy_binary_context() -> Result<Arc<Context>> {
    ContextBuilder::new()
        .ring_degree(32)
        .plaintext_prime(2)
        .hensel_exponent(3)
        .ctxt_primes(6)
        .num_digits(3)
        .build()
}

/// n=1024, p=65537, eight ciphertext primes. Sized for benchmarks.
pub fn small_context() -> Result<Arc<Context>> {
    ContextBuilder::new()
        .ring_degree(1024)
        .plaintext_prime(65537)
        .ctxt_primes(8)
        .prime_bits(45)
        .num_digits(3)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_build() {
        let toy = toy_context().unwrap();
        assert_eq!(toy.ptxt_space, 7);
        let bin = toy_binary_context().unwrap();
        assert_eq!(bin.ptxt_space, 8);
        assert_eq!(bin.chain.prime(0).unwrap(), toy.chain.prime(0).unwrap());
        let small = small_context().unwrap();
        assert_eq!(small.chain.ctxt_primes().len(), 8);
        assert!(small.chain.special_primes().len() >= 2);
    }
}
