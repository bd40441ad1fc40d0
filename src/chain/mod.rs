//! The modulus chain: every NTT prime of the context, tagged as either a
//! ciphertext prime or a special (key-switching) prime, plus the digit
//! partition of the ciphertext primes.

pub mod prime_set;
pub mod primes;

use std::sync::Arc;

use concrete_ntt::prime64::Plan;
use num_bigint::BigUint;
use num_traits::One;

use crate::error::{Result, StrataError};
use crate::ring::ntt::make_plan;

pub use prime_set::PrimeSet;
pub use primes::NttPrimeGenerator;

/// One chain prime with its transform plan.
#[derive(Clone, Debug)]
pub struct Modulus {
    pub q: u64,
    pub ln_q: f64,
    pub plan: Arc<Plan>,
}

#[derive(Clone, Debug)]
pub struct ModulusChain {
    ring_degree: usize,
    moduli: Vec<Modulus>,
    ctxt_primes: PrimeSet,
    special_primes: PrimeSet,
    digits: Vec<PrimeSet>,
    half_size_prime: bool,
}

impl ModulusChain {
    pub fn new(ring_degree: usize) -> Result<Self> {
        if !ring_degree.is_power_of_two() || ring_degree < 16 {
            return Err(StrataError::InvalidRingDegree(ring_degree));
        }
        Ok(Self {
            ring_degree,
            moduli: Vec::new(),
            ctxt_primes: PrimeSet::new(),
            special_primes: PrimeSet::new(),
            digits: Vec::new(),
            half_size_prime: false,
        })
    }

    /// Append a prime and return its index.
    ///
    /// Ciphertext primes must all precede the special primes, so the
    /// ciphertext primes always occupy the index interval starting at 0.
    pub fn add_prime(&mut self, q: u64, special: bool) -> Result<usize> {
        if self.contains_modulus(q) {
            return Err(StrataError::InvalidParam(format!("prime {q} is already in the chain")));
        }
        if !special && !self.special_primes.is_empty() {
            return Err(StrataError::InvalidParam(
                "ciphertext primes must be added before special primes".into(),
            ));
        }
        let plan = make_plan(self.ring_degree, q)?;
        let index = self.moduli.len();
        self.moduli.push(Modulus { q, ln_q: (q as f64).ln(), plan });
        if special {
            self.special_primes.insert(index);
        } else {
            self.ctxt_primes.insert(index);
        }
        Ok(index)
    }

    /// Mark prime 0 as the (roughly) half-size prime of the chain.
    pub fn mark_half_size_prime(&mut self) -> Result<()> {
        if !self.ctxt_primes.contains(0) {
            return Err(StrataError::InvalidParam("half-size prime must be ciphertext prime 0".into()));
        }
        self.half_size_prime = true;
        Ok(())
    }

    /// Install the digit partition used by key switching.
    ///
    /// The digits must be non-empty, pairwise disjoint, and cover exactly
    /// the ciphertext primes, in increasing index order.
    pub fn set_digits(&mut self, digits: Vec<PrimeSet>) -> Result<()> {
        let mut covered = PrimeSet::new();
        let mut prev_last = None;
        for digit in &digits {
            let (Some(first), Some(last)) = (digit.first(), digit.last()) else {
                return Err(StrataError::InvalidParam("empty digit".into()));
            };
            if !digit.is_disjoint(&covered) || prev_last.is_some_and(|p| p >= first) {
                return Err(StrataError::InvalidParam(format!("digit {digit} overlaps its predecessor")));
            }
            covered.insert_all(digit);
            prev_last = Some(last);
        }
        if covered != self.ctxt_primes {
            return Err(StrataError::InvalidParam(format!(
                "digits cover {covered}, ciphertext primes are {}",
                self.ctxt_primes
            )));
        }
        self.digits = digits;
        Ok(())
    }

    pub fn ring_degree(&self) -> usize {
        self.ring_degree
    }

    pub fn len(&self) -> usize {
        self.moduli.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moduli.is_empty()
    }

    pub fn modulus(&self, i: usize) -> Result<&Modulus> {
        self.moduli
            .get(i)
            .ok_or_else(|| StrataError::InvalidParam(format!("no prime at chain index {i}")))
    }

    pub fn prime(&self, i: usize) -> Result<u64> {
        Ok(self.modulus(i)?.q)
    }

    pub fn ln_prime(&self, i: usize) -> f64 {
        self.moduli.get(i).map_or(0.0, |m| m.ln_q)
    }

    pub fn plan(&self, i: usize) -> Result<Arc<Plan>> {
        Ok(Arc::clone(&self.modulus(i)?.plan))
    }

    pub fn ctxt_primes(&self) -> &PrimeSet {
        &self.ctxt_primes
    }

    pub fn special_primes(&self) -> &PrimeSet {
        &self.special_primes
    }

    pub fn all_primes(&self) -> PrimeSet {
        self.ctxt_primes.union(&self.special_primes)
    }

    pub fn digits(&self) -> &[PrimeSet] {
        &self.digits
    }

    pub fn contains_small_prime(&self) -> bool {
        self.half_size_prime
    }

    pub fn contains_modulus(&self, q: u64) -> bool {
        self.moduli.iter().any(|m| m.q == q)
    }

    /// `ln` of the product of the primes in `s`.
    pub fn log_of_product(&self, s: &PrimeSet) -> f64 {
        s.iter().map(|i| self.ln_prime(i)).sum()
    }

    /// Exact product of the primes in `s`; 1 for the empty set.
    pub fn product_of_primes(&self, s: &PrimeSet) -> BigUint {
        s.iter()
            .filter_map(|i| self.moduli.get(i))
            .fold(BigUint::one(), |acc, m| acc * m.q)
    }

    /// `prod(s) mod t` without building the full product.
    pub fn product_mod(&self, s: &PrimeSet, t: u64) -> u64 {
        if t == 1 {
            return 0;
        }
        s.iter()
            .filter_map(|i| self.moduli.get(i))
            .fold(1u64, |acc, m| ((acc as u128 * (m.q % t) as u128) % t as u128) as u64)
    }

    /// A ciphertext prime set is valid when its special part is all or
    /// nothing of the special primes and its ciphertext part is a
    /// non-empty interval starting at index 0 or 1.
    pub fn verify_prime_set(&self, s: &PrimeSet) -> bool {
        let specials = s.intersection(&self.special_primes);
        if !specials.is_empty() && specials != self.special_primes {
            return false;
        }
        let ctxt = s.difference(&self.special_primes);
        if !ctxt.is_subset(&self.ctxt_primes) || !ctxt.is_interval() {
            return false;
        }
        matches!(ctxt.first(), Some(0) | Some(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_chain() -> ModulusChain {
        let mut chain = ModulusChain::new(32).unwrap();
        chain.add_prime(4193089, false).unwrap();
        chain.mark_half_size_prime().unwrap();
        for q in [1099511626049, 1099511625409, 1099511623297] {
            chain.add_prime(q, false).unwrap();
        }
        chain.add_prime(1099511622593, true).unwrap();
        chain.add_prime(1099511622529, true).unwrap();
        chain
    }

    #[test]
    fn test_roles_and_products() {
        let chain = toy_chain();
        assert_eq!(chain.ctxt_primes(), &PrimeSet::interval(0, 3));
        assert_eq!(chain.special_primes(), &PrimeSet::interval(4, 5));
        let s = PrimeSet::interval(0, 1);
        assert_eq!(chain.product_of_primes(&s), BigUint::from(4193089u64) * 1099511626049u64);
        assert_eq!(chain.product_mod(&s, 7), (4193089u128 * 1099511626049 % 7) as u64);
        let expected = (4193089f64).ln() + (1099511626049f64).ln();
        assert!((chain.log_of_product(&s) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_append_rules() {
        let mut chain = toy_chain();
        assert!(chain.add_prime(1099511626049, true).is_err());
        assert!(chain.add_prime(1099511621249, false).is_err());
        assert!(chain.add_prime(17, true).is_err());
    }

    #[test]
    fn test_verify_prime_set() {
        let chain = toy_chain();
        assert!(chain.verify_prime_set(&PrimeSet::interval(0, 3)));
        assert!(chain.verify_prime_set(&PrimeSet::interval(1, 2)));
        assert!(chain.verify_prime_set(&PrimeSet::interval(0, 5)));
        assert!(!chain.verify_prime_set(&PrimeSet::interval(2, 3)));
        assert!(!chain.verify_prime_set(&PrimeSet::interval(0, 4)));
        assert!(!chain.verify_prime_set(&PrimeSet::interval(4, 5)));
        assert!(!chain.verify_prime_set(&[0, 2].into_iter().collect()));
    }

    #[test]
    fn test_digits_must_partition() {
        let mut chain = toy_chain();
        assert!(chain.set_digits(vec![PrimeSet::interval(0, 1), PrimeSet::interval(2, 3)]).is_ok());
        assert!(chain.set_digits(vec![PrimeSet::interval(0, 1)]).is_err());
        assert!(chain.set_digits(vec![PrimeSet::interval(0, 2), PrimeSet::interval(2, 3)]).is_err());
    }
}
