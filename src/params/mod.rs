pub mod presets;

use std::sync::Arc;

use num_integer::Integer;
use primality_test::is_prime;
use tracing::debug;

use crate::chain::{ModulusChain, NttPrimeGenerator, PrimeSet};
use crate::error::{Result, StrataError};
use crate::ring::modular::mult_order;

/// Everything a ciphertext shares with its siblings: the ring, the
/// plaintext space and the modulus chain.
#[derive(Clone, Debug)]
pub struct Context {
    /// `n = phi(m)`, the ring is Z[X]/(X^n + 1).
    pub ring_degree: usize,
    /// Cyclotomic index, `2n`.
    pub m: u64,
    /// Plaintext prime.
    pub p: u64,
    /// Hensel lifting exponent; the native plaintext space is `p^r`.
    pub r: u32,
    pub ptxt_space: u64,
    /// Order of `p` in Z_m^*, when `p` is a unit there.
    pub ord_p: Option<u64>,
    /// Standard deviation of fresh encryption noise.
    pub stdev: f64,
    pub chain: ModulusChain,
}

impl Context {
    pub fn phi_m(&self) -> usize {
        self.ring_degree
    }

    /// Whether `k`, taken mod m, is a unit modulo m.
    pub fn in_zm_star(&self, k: u64) -> bool {
        (k % self.m).gcd(&self.m) == 1
    }
}

/// Builder for [`Context`].
///
/// The chain is laid out as an optional half-size prime at index 0, the
/// remaining full-size ciphertext primes, then as many special primes as
/// key switching needs for the chosen digit count.
pub struct ContextBuilder {
    ring_degree: usize,
    p: u64,
    r: u32,
    stdev: f64,
    ctxt_primes: usize,
    prime_bits: u32,
    half_size_prime: bool,
    num_digits: usize,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self {
            ring_degree: 1024,
            p: 2,
            r: 1,
            stdev: 3.2,
            ctxt_primes: 6,
            prime_bits: 40,
            half_size_prime: true,
            num_digits: 3,
        }
    }

    pub fn ring_degree(mut self, n: usize) -> Self {
        self.ring_degree = n;
        self
    }

    pub fn plaintext_prime(mut self, p: u64) -> Self {
        self.p = p;
        self
    }

    pub fn hensel_exponent(mut self, r: u32) -> Self {
        self.r = r;
        self
    }

    pub fn stdev(mut self, stdev: f64) -> Self {
        self.stdev = stdev;
        self
    }

    /// Number of ciphertext primes, the half-size prime included.
    pub fn ctxt_primes(mut self, count: usize) -> Self {
        self.ctxt_primes = count;
        self
    }

    pub fn prime_bits(mut self, bits: u32) -> Self {
        self.prime_bits = bits;
        self
    }

    pub fn half_size_prime(mut self, enabled: bool) -> Self {
        self.half_size_prime = enabled;
        self
    }

    pub fn num_digits(mut self, digits: usize) -> Self {
        self.num_digits = digits;
        self
    }

    fn half_bits(&self) -> u32 {
        self.prime_bits / 2 + 2
    }

    pub fn build(self) -> Result<Arc<Context>> {
        if !self.ring_degree.is_power_of_two() || self.ring_degree < 16 {
            return Err(StrataError::InvalidRingDegree(self.ring_degree));
        }
        if !is_prime(self.p) {
            return Err(StrataError::InvalidParam(format!("plaintext modulus {} is not prime", self.p)));
        }
        if self.r == 0 {
            return Err(StrataError::InvalidParam("Hensel exponent must be at least 1".into()));
        }
        if !(20..=60).contains(&self.prime_bits) {
            return Err(StrataError::InvalidParam(format!("prime size {} out of [20, 60]", self.prime_bits)));
        }
        if self.ctxt_primes == 0 {
            return Err(StrataError::InvalidParam("need at least one ciphertext prime".into()));
        }
        if self.num_digits == 0 || self.num_digits > self.ctxt_primes {
            return Err(StrataError::InvalidParam(format!(
                "{} digits for {} ciphertext primes",
                self.num_digits, self.ctxt_primes
            )));
        }
        if !(self.stdev > 0.0) {
            return Err(StrataError::InvalidParam("noise width must be positive".into()));
        }
        let smallest_bits = if self.half_size_prime { self.half_bits() } else { self.prime_bits };
        let ptxt_space = self
            .p
            .checked_pow(self.r)
            .filter(|&t| t < 1u64 << (smallest_bits - 1))
            .ok_or_else(|| {
                StrataError::InvalidParam(format!("plaintext space {}^{} is too large for the chain", self.p, self.r))
            })?;

        let n = self.ring_degree;
        let m = 2 * n as u64;
        let p = self.p;
        let mut chain = ModulusChain::new(n)?;

        let mut full_size = self.ctxt_primes;
        if self.half_size_prime {
            let mut gen = NttPrimeGenerator::new(self.half_bits(), n)?;
            let q = gen.next_downstream_prime(|q| q == p)?;
            chain.add_prime(q, false)?;
            chain.mark_half_size_prime()?;
            full_size -= 1;
        }

        let mut gen = NttPrimeGenerator::new(self.prime_bits, n)?;
        for _ in 0..full_size {
            let q = gen.next_downstream_prime(|q| q == p || chain.contains_modulus(q))?;
            chain.add_prime(q, false)?;
        }

        let digits = partition_digits(&chain, self.num_digits);
        chain.set_digits(digits)?;

        // ln P > max digit + ln σ + ln(12 * digits) / 2 keeps the key-switching
        // noise below the mod-switching noise for every key weight.
        let max_digit = chain
            .digits()
            .iter()
            .map(|d| chain.log_of_product(d))
            .fold(0.0f64, f64::max);
        let target = max_digit + self.stdev.ln() + 0.5 * (12.0 * chain.digits().len() as f64).ln();
        while chain.log_of_product(chain.special_primes()) <= target {
            let q = gen.next_downstream_prime(|q| q == p || chain.contains_modulus(q))?;
            chain.add_prime(q, true)?;
        }

        debug!(
            n,
            ptxt_space,
            ctxt = %chain.ctxt_primes(),
            specials = %chain.special_primes(),
            digits = chain.digits().len(),
            "built modulus chain"
        );

        Ok(Arc::new(Context {
            ring_degree: n,
            m,
            p,
            r: self.r,
            ptxt_space,
            ord_p: mult_order(p, m),
            stdev: self.stdev,
            chain,
        }))
    }
}

/// Split the ciphertext primes into consecutive digits of roughly equal
/// size. The half-size prime makes the first digit a little shorter, and
/// the last digit absorbs whatever is left.
fn partition_digits(chain: &ModulusChain, n_digits: usize) -> Vec<PrimeSet> {
    let ctxt = chain.ctxt_primes();
    if n_digits <= 1 {
        return vec![ctxt.clone()];
    }
    let dsize = chain.log_of_product(ctxt) / n_digits as f64;
    let mut target = if chain.contains_small_prime() { dsize - chain.ln_prime(0) / 3.0 } else { dsize };

    let mut remaining = ctxt.clone();
    let mut digits = Vec::with_capacity(n_digits);
    let mut size_so_far = 0.0;
    for _ in 0..n_digits - 1 {
        let mut digit = PrimeSet::new();
        while size_so_far < target {
            let Some(i) = remaining.first() else { break };
            remaining.remove(i);
            digit.insert(i);
            size_so_far += chain.ln_prime(i);
        }
        if !digit.is_empty() {
            digits.push(digit);
        }
        target += dsize;
    }
    if !remaining.is_empty() {
        digits.push(remaining);
    }
    digits
}
