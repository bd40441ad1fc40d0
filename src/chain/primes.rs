use primality_test::is_prime;

use crate::error::{Result, StrataError};

/// Walks downward from `2^bit_size + 1` through NTT-friendly primes,
/// i.e. primes `q ≡ 1 (mod 2n)`.
pub struct NttPrimeGenerator {
    size: f64,
    step: u64,
    prev_prime: u64,
}

impl NttPrimeGenerator {
    /// `bit_size` must leave room for the `2n` step; 62 bits at most.
    pub fn new(bit_size: u32, ring_degree: usize) -> Result<Self> {
        let step = 2 * ring_degree as u64;
        if bit_size > 62 || (1u64 << bit_size) < step {
            return Err(StrataError::InvalidParam(format!(
                "cannot generate {bit_size}-bit primes for ring degree {ring_degree}"
            )));
        }
        Ok(Self {
            size: bit_size as f64,
            step,
            prev_prime: (1u64 << bit_size) + 1 - step,
        })
    }

    /// Next prime below the previous one, skipping any `skip` rejects.
    pub fn next_downstream_prime(&mut self, skip: impl Fn(u64) -> bool) -> Result<u64> {
        loop {
            if self.prev_prime < self.step || self.size - (self.prev_prime as f64).log2() >= 0.5 {
                return Err(StrataError::InvalidParam(format!(
                    "no more {}-bit primes ≡ 1 mod {}",
                    self.size, self.step
                )));
            }
            let candidate = self.prev_prime;
            self.prev_prime -= self.step;
            if is_prime(candidate) && !skip(candidate) {
                return Ok(candidate);
            }
        }
    }
}
