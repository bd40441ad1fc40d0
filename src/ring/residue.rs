use num_bigint::{BigInt, BigUint};
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::Rng;
use zeroize::Zeroize;

use crate::chain::{ModulusChain, PrimeSet};
use crate::error::{Result, StrataError, Violation};
use crate::ring::modular::{barrett_constant, mod_inv, mod_mul, mod_sub};
use crate::ring::ntt::NttPoly;
use crate::ring::poly::CoeffPoly;
use crate::sampling::uniform::sample_uniform_residues;

/// A ring element held as one NTT residue per prime of a [`PrimeSet`].
///
/// `residues[k]` is the residue modulo the `k`-th index of `prime_set` in
/// increasing order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResiduePoly {
    prime_set: PrimeSet,
    residues: Vec<NttPoly>,
}

/// `x mod q` for any sign of `x`.
pub(crate) fn reduce_bigint(x: &BigInt, q: u64) -> u64 {
    let r = x.mod_floor(&BigInt::from(q));
    r.magnitude().iter_u64_digits().next().unwrap_or(0)
}

/// Centered CRT reconstruction, coefficient by coefficient.
///
/// `rows[k]` holds the coefficient-form residues modulo `moduli[k]`. The
/// result lies in `(-Q/2, Q/2]` for `Q = prod(moduli)`.
pub(crate) fn crt_centered(rows: &[Vec<u64>], moduli: &[u64], n: usize) -> Vec<BigInt> {
    if moduli.is_empty() {
        return vec![BigInt::zero(); n];
    }
    let q: BigUint = moduli.iter().fold(BigUint::one(), |acc, &m| acc * m);
    let half = &q >> 1u32;
    let basis: Vec<BigUint> = moduli
        .iter()
        .map(|&m| {
            let q_star = &q / m;
            let q_star_mod = (&q_star % m).iter_u64_digits().next().unwrap_or(0);
            // every chain prime is coprime to the others
            let inv = mod_inv(q_star_mod, m).unwrap_or(0);
            q_star * inv
        })
        .collect();

    (0..n)
        .map(|j| {
            let mut acc = BigUint::zero();
            for (row, b) in rows.iter().zip(&basis) {
                acc += b * row[j];
            }
            let x = acc % &q;
            if x > half {
                BigInt::from(x) - BigInt::from(q.clone())
            } else {
                BigInt::from(x)
            }
        })
        .collect()
}

impl Zeroize for ResiduePoly {
    fn zeroize(&mut self) {
        for r in &mut self.residues {
            r.evals.zeroize();
        }
    }
}

impl ResiduePoly {
    pub fn zero(chain: &ModulusChain, prime_set: &PrimeSet) -> Result<Self> {
        let residues = prime_set
            .iter()
            .map(|i| Ok(NttPoly::zero(chain.plan(i)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { prime_set: prime_set.clone(), residues })
    }

    /// Embed small signed coefficients.
    pub fn from_signed(chain: &ModulusChain, prime_set: &PrimeSet, coeffs: &[i64]) -> Result<Self> {
        Self::check_degree(chain, coeffs.len())?;
        let residues = prime_set
            .iter()
            .map(|i| NttPoly::from_signed(coeffs, chain.plan(i)?))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { prime_set: prime_set.clone(), residues })
    }

    /// Embed arbitrary-size integer coefficients.
    pub fn from_bigints(chain: &ModulusChain, prime_set: &PrimeSet, coeffs: &[BigInt]) -> Result<Self> {
        Self::check_degree(chain, coeffs.len())?;
        let residues = prime_set
            .iter()
            .map(|i| {
                let q = chain.prime(i)?;
                let poly = CoeffPoly {
                    coeffs: coeffs.iter().map(|c| reduce_bigint(c, q)).collect(),
                    modulus: q,
                };
                NttPoly::from_coeff_poly(&poly, chain.plan(i)?)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { prime_set: prime_set.clone(), residues })
    }

    /// Embed a plaintext through its centered coefficients.
    pub fn from_plaintext(chain: &ModulusChain, prime_set: &PrimeSet, pt: &CoeffPoly) -> Result<Self> {
        Self::from_signed(chain, prime_set, &pt.centered_coeffs())
    }

    /// The constant polynomial `c`.
    pub fn constant(chain: &ModulusChain, prime_set: &PrimeSet, c: i64) -> Result<Self> {
        let mut coeffs = vec![0i64; chain.ring_degree()];
        coeffs[0] = c;
        Self::from_signed(chain, prime_set, &coeffs)
    }

    /// Rebuild from coefficient-form rows, one per prime of `prime_set`.
    pub fn from_coeff_rows(chain: &ModulusChain, prime_set: &PrimeSet, rows: Vec<Vec<u64>>) -> Result<Self> {
        if rows.len() != prime_set.len() {
            return Err(StrataError::DimensionMismatch { expected: prime_set.len(), got: rows.len() });
        }
        let residues = prime_set
            .iter()
            .zip(rows)
            .map(|(i, row)| {
                Self::check_degree(chain, row.len())?;
                let q = chain.prime(i)?;
                if let Some(bad) = row.iter().find(|&&c| c >= q) {
                    return Err(StrataError::InvalidParam(format!("residue {bad} is not reduced mod {q}")));
                }
                NttPoly::from_coeff_poly(&CoeffPoly { coeffs: row, modulus: q }, chain.plan(i)?)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { prime_set: prime_set.clone(), residues })
    }

    /// Uniformly random element over `prime_set`, residue by residue.
    pub fn sample_uniform<R: Rng>(chain: &ModulusChain, prime_set: &PrimeSet, rng: &mut R) -> Result<Self> {
        let n = chain.ring_degree();
        let residues = prime_set
            .iter()
            .map(|i| {
                let plan = chain.plan(i)?;
                let evals = sample_uniform_residues(n, plan.modulus(), rng);
                Ok(NttPoly { evals, modulus: plan.modulus(), plan })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { prime_set: prime_set.clone(), residues })
    }

    fn check_degree(chain: &ModulusChain, len: usize) -> Result<()> {
        if len != chain.ring_degree() {
            return Err(StrataError::DimensionMismatch { expected: chain.ring_degree(), got: len });
        }
        Ok(())
    }

    pub fn prime_set(&self) -> &PrimeSet {
        &self.prime_set
    }

    pub fn residues(&self) -> &[NttPoly] {
        &self.residues
    }

    pub fn is_zero(&self) -> bool {
        self.residues.iter().all(NttPoly::is_zero)
    }

    /// Coefficient-form residues, one row per prime.
    pub fn to_coeff_rows(&self) -> Vec<Vec<u64>> {
        self.residues.iter().map(|r| r.to_coeff_poly().coeffs).collect()
    }

    /// The centered integer coefficients modulo `prod(prime_set)`.
    pub fn to_centered_bigints(&self) -> Vec<BigInt> {
        let rows = self.to_coeff_rows();
        let moduli: Vec<u64> = self.residues.iter().map(|r| r.modulus).collect();
        let n = self.residues.first().map_or(0, NttPoly::len);
        crt_centered(&rows, &moduli, n)
    }

    fn zip_with(&self, other: &Self, f: impl Fn(&NttPoly, &NttPoly) -> Result<NttPoly>) -> Result<Self> {
        if self.prime_set != other.prime_set {
            return Err(StrataError::ModulusMismatch);
        }
        let residues = self
            .residues
            .iter()
            .zip(&other.residues)
            .map(|(a, b)| f(a, b))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { prime_set: self.prime_set.clone(), residues })
    }

    pub fn add(&self, other: &Self) -> Result<Self> {
        self.zip_with(other, NttPoly::add)
    }

    pub fn sub(&self, other: &Self) -> Result<Self> {
        self.zip_with(other, NttPoly::sub)
    }

    pub fn mul(&self, other: &Self) -> Result<Self> {
        self.zip_with(other, NttPoly::mul)
    }

    pub fn neg(&self) -> Self {
        Self {
            prime_set: self.prime_set.clone(),
            residues: self.residues.iter().map(NttPoly::neg).collect(),
        }
    }

    pub fn scalar_mul(&self, c: u64) -> Self {
        Self {
            prime_set: self.prime_set.clone(),
            residues: self.residues.iter().map(|r| r.scalar_mul(c)).collect(),
        }
    }

    /// Multiply by an integer constant of any size.
    pub fn scalar_mul_bigint(&self, c: &BigInt) -> Self {
        Self {
            prime_set: self.prime_set.clone(),
            residues: self.residues.iter().map(|r| r.scalar_mul(reduce_bigint(c, r.modulus))).collect(),
        }
    }

    pub fn automorph(&self, k: u64) -> Result<Self> {
        let residues = self.residues.iter().map(|r| r.automorph(k)).collect::<Result<Vec<_>>>()?;
        Ok(Self { prime_set: self.prime_set.clone(), residues })
    }

    /// `self^e`, `e >= 1`.
    pub fn power(&self, e: u32) -> Result<Self> {
        let mut acc = self.clone();
        for _ in 1..e {
            acc = acc.mul(self)?;
        }
        Ok(acc)
    }

    /// Keep only the residues indexed by `s`, which must be a subset.
    pub fn restrict_to(&self, s: &PrimeSet) -> Result<Self> {
        if !s.is_subset(&self.prime_set) {
            return Err(Violation::MalformedPrimeSet(s.clone()).into());
        }
        let residues = self
            .prime_set
            .iter()
            .zip(&self.residues)
            .filter(|(i, _)| s.contains(*i))
            .map(|(_, r)| r.clone())
            .collect();
        Ok(Self { prime_set: s.clone(), residues })
    }

    /// Drop the residues indexed by `s`. No scaling.
    pub fn remove_primes(&mut self, s: &PrimeSet) {
        let keep = self.prime_set.difference(s);
        let residues = self
            .prime_set
            .iter()
            .zip(self.residues.drain(..))
            .filter(|(i, _)| keep.contains(*i))
            .map(|(_, r)| r)
            .collect();
        self.residues = residues;
        self.prime_set = keep;
    }

    /// Merge in residues for new primes, produced per index by `fill`.
    fn extend_with(&mut self, new_primes: &PrimeSet, mut fill: impl FnMut(usize) -> Result<NttPoly>) -> Result<()> {
        let target = self.prime_set.union(new_primes);
        let mut old = self.prime_set.iter().zip(self.residues.drain(..)).peekable();
        let mut residues = Vec::with_capacity(target.len());
        for i in target.iter() {
            match old.peek() {
                Some((j, _)) if *j == i => {
                    if let Some((_, r)) = old.next() {
                        residues.push(r);
                    }
                }
                _ => residues.push(fill(i)?),
            }
        }
        drop(old);
        self.residues = residues;
        self.prime_set = target;
        Ok(())
    }

    /// Exact lift: add residues for the primes of `s` without changing the
    /// centered integer value.
    pub fn add_primes(&mut self, chain: &ModulusChain, s: &PrimeSet) -> Result<()> {
        let new_primes = s.difference(&self.prime_set);
        if new_primes.is_empty() {
            return Ok(());
        }
        let lifted = self.to_centered_bigints();
        self.extend_with(&new_primes, |i| {
            let q = chain.prime(i)?;
            let coeffs = lifted.iter().map(|c| reduce_bigint(c, q)).collect();
            NttPoly::from_coeff_poly(&CoeffPoly { coeffs, modulus: q }, chain.plan(i)?)
        })
    }

    /// Mod-up: multiply by `prod(s \ prime_set)` and add zero residues for
    /// those primes. Returns `ln prod(s \ prime_set)`.
    pub fn add_primes_and_scale(&mut self, chain: &ModulusChain, s: &PrimeSet) -> Result<f64> {
        let new_primes = s.difference(&self.prime_set);
        if new_primes.is_empty() {
            return Ok(0.0);
        }
        for r in &mut self.residues {
            let factor = chain.product_mod(&new_primes, r.modulus);
            *r = r.scalar_mul(factor);
        }
        self.extend_with(&new_primes, |i| Ok(NttPoly::zero(chain.plan(i)?)))?;
        Ok(chain.log_of_product(&new_primes))
    }

    /// Exact scale-down by `P = prod(prime_set \ keep)` that preserves the
    /// value modulo `t`.
    ///
    /// `x` becomes `(x - d') / P` over `keep`, where `d' ≡ x (mod P)`,
    /// `d' ≡ 0 (mod t)`, and `d'` is the small lift `d + P*u` of the
    /// centered remainder `d`.
    pub fn scale_down_to_set(&mut self, chain: &ModulusChain, keep: &PrimeSet, t: u64) -> Result<()> {
        let keep = self.prime_set.intersection(keep);
        if keep.is_empty() {
            return Err(Violation::EmptyIntersection.into());
        }
        let dropped = self.prime_set.difference(&keep);
        if dropped.is_empty() {
            return Ok(());
        }

        let mut delta = self.restrict_to(&dropped)?.to_centered_bigints();
        let p_big = BigInt::from(chain.product_of_primes(&dropped));
        if t > 1 {
            let p_mod_t = chain.product_mod(&dropped, t);
            let p_inv = mod_inv(p_mod_t, t).ok_or(Violation::PlaintextSpaceShape(t))?;
            let t_big = BigInt::from(t);
            let half_t = BigInt::from(t / 2);
            for d in delta.iter_mut() {
                // u = -d * P^{-1} mod t, centered
                let d_mod_t = reduce_bigint(d, t);
                let mut u = BigInt::from(mod_sub(0, (d_mod_t as u128 * p_inv as u128 % t as u128) as u64, t));
                if u > half_t {
                    u -= &t_big;
                }
                *d += &p_big * u;
            }
        }

        let mut scaled = Vec::with_capacity(keep.len());
        for (i, r) in self.prime_set.iter().zip(&self.residues) {
            if !keep.contains(i) {
                continue;
            }
            let q = r.modulus;
            let correction = CoeffPoly {
                coeffs: delta.iter().map(|d| reduce_bigint(d, q)).collect(),
                modulus: q,
            };
            let correction = NttPoly::from_coeff_poly(&correction, chain.plan(i)?)?;
            let p_inv = mod_inv(reduce_bigint(&p_big, q), q)
                .ok_or_else(|| StrataError::InvalidParam(format!("chain prime {q} divides the dropped product")))?;
            scaled.push(r.sub(&correction)?.scalar_mul(p_inv));
        }
        self.residues = scaled;
        self.prime_set = keep;
        Ok(())
    }

    /// Split into the key-switching digits of the first `n_digits` digits.
    ///
    /// With `D_i` the product of the whole chain digit `i`, the result
    /// satisfies `self = sum_i B_i * d_i` where `B_i = D_0 * ... * D_{i-1}`,
    /// and each `d_i` is centered modulo the part of digit `i` inside
    /// `prime_set`. Each digit is returned over `prime_set ∪ specials`.
    pub fn break_into_digits(&self, chain: &ModulusChain, n_digits: usize) -> Result<Vec<ResiduePoly>> {
        let specials = chain.special_primes();
        if !self.prime_set.is_disjoint(specials) {
            return Err(Violation::MalformedPrimeSet(self.prime_set.clone()).into());
        }
        let digits = chain.digits();
        if n_digits > digits.len() {
            return Err(StrataError::InvalidParam(format!(
                "{n_digits} digits requested, chain has {}",
                digits.len()
            )));
        }
        let covered: PrimeSet = digits[..n_digits].iter().flat_map(|d| d.iter()).collect();
        if !self.prime_set.is_subset(&covered) {
            return Err(Violation::MalformedPrimeSet(self.prime_set.clone()).into());
        }

        let n = chain.ring_degree();
        let target = self.prime_set.union(specials);
        let indices: Vec<usize> = self.prime_set.iter().collect();
        let moduli: Vec<u64> = self.residues.iter().map(|r| r.modulus).collect();
        let mut rows = self.to_coeff_rows();
        let mut out = Vec::with_capacity(n_digits);

        for digit in &digits[..n_digits] {
            let here: Vec<usize> = (0..indices.len()).filter(|&k| digit.contains(indices[k])).collect();
            let digit_rows: Vec<Vec<u64>> = here.iter().map(|&k| rows[k].clone()).collect();
            let digit_moduli: Vec<u64> = here.iter().map(|&k| moduli[k]).collect();
            let value = crt_centered(&digit_rows, &digit_moduli, n);
            out.push(Self::from_bigints(chain, &target, &value)?);

            // rem <- (rem - d_i) / D_i on the primes past this digit
            let d_full = chain.product_of_primes(digit);
            for k in 0..indices.len() {
                if indices[k] <= digit.last().unwrap_or(0) {
                    continue;
                }
                let q = moduli[k];
                let d_inv = mod_inv((&d_full % q).iter_u64_digits().next().unwrap_or(0), q)
                    .ok_or(StrataError::ModulusMismatch)?;
                let bk = barrett_constant(q);
                for (c, v) in rows[k].iter_mut().zip(&value) {
                    let diff = mod_sub(*c, reduce_bigint(v, q), q);
                    *c = mod_mul(diff, d_inv, q, bk);
                }
            }
        }
        Ok(out)
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::Signed;
    use crate::params::presets::toy_context;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn small_coeffs(n: usize, seed: u64) -> Vec<i64> {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        (0..n).map(|_| rng.random_range(-1000i64..=1000)).collect()
    }

    #[test]
    fn test_crt_roundtrip() {
        let ctx = toy_context().unwrap();
        let chain = &ctx.chain;
        let coeffs = small_coeffs(chain.ring_degree(), 1);
        let x = ResiduePoly::from_signed(chain, chain.ctxt_primes(), &coeffs).unwrap();
        let back: Vec<i64> = x.to_centered_bigints().iter().map(|c| i64::try_from(c).unwrap()).collect();
        assert_eq!(back, coeffs);
    }

    #[test]
    fn test_add_primes_and_scale() {
        let ctx = toy_context().unwrap();
        let chain = &ctx.chain;
        let coeffs = small_coeffs(chain.ring_degree(), 2);
        let s = PrimeSet::interval(0, 2);
        let mut x = ResiduePoly::from_signed(chain, &s, &coeffs).unwrap();
        let f = x.add_primes_and_scale(chain, &PrimeSet::interval(0, 3)).unwrap();
        assert!((f - chain.ln_prime(3)).abs() < 1e-12);
        let q3 = BigInt::from(chain.prime(3).unwrap());
        let expected: Vec<BigInt> = coeffs.iter().map(|&c| BigInt::from(c) * &q3).collect();
        assert_eq!(x.to_centered_bigints(), expected);
    }

    #[test]
    fn test_add_primes_is_exact_lift() {
        let ctx = toy_context().unwrap();
        let chain = &ctx.chain;
        let coeffs = small_coeffs(chain.ring_degree(), 3);
        let mut x = ResiduePoly::from_signed(chain, &PrimeSet::interval(1, 2), &coeffs).unwrap();
        x.add_primes(chain, &PrimeSet::interval(0, 4)).unwrap();
        let direct = ResiduePoly::from_signed(chain, &PrimeSet::interval(0, 4), &coeffs).unwrap();
        assert_eq!(x, direct);
    }

    #[test]
    fn test_scale_down_preserves_value_mod_t() {
        let ctx = toy_context().unwrap();
        let chain = &ctx.chain;
        let t = 7u64;
        let mut rng = ChaCha20Rng::seed_from_u64(4);
        let full = PrimeSet::interval(0, 3);
        let x = ResiduePoly::sample_uniform(chain, &full, &mut rng).unwrap();
        let before = x.to_centered_bigints();

        let mut y = x.clone();
        let keep = PrimeSet::interval(0, 1);
        y.scale_down_to_set(chain, &keep, t).unwrap();
        assert_eq!(y.prime_set(), &keep);

        let dropped = full.difference(&keep);
        let p = BigInt::from(chain.product_of_primes(&dropped));
        let p_mod_t = chain.product_mod(&dropped, t);
        let after = y.to_centered_bigints();
        for (a, b) in before.iter().zip(&after) {
            // x ≡ P * y (mod t), and y ≈ x / P
            let lhs = reduce_bigint(a, t);
            let rhs = (reduce_bigint(b, t) * p_mod_t) % t;
            assert_eq!(lhs, rhs);
            let err = (a - b * &p).abs();
            assert!(err <= &p * BigInt::from(t));
        }
    }

    #[test]
    fn test_break_into_digits_recombines() {
        let ctx = toy_context().unwrap();
        let chain = &ctx.chain;
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let s = PrimeSet::interval(1, 4);
        let x = ResiduePoly::sample_uniform(chain, &s, &mut rng).unwrap();
        let n_digits = chain.digits().iter().take_while(|d| d.first().is_some_and(|f| f <= 4)).count();
        let digits = x.break_into_digits(chain, n_digits).unwrap();
        assert_eq!(digits.len(), n_digits);

        let target = s.union(chain.special_primes());
        let mut acc = ResiduePoly::zero(chain, &target).unwrap();
        let mut b = BigInt::one();
        for (i, d) in digits.iter().enumerate() {
            assert_eq!(d.prime_set(), &target);
            acc = acc.add(&d.scalar_mul_bigint(&b)).unwrap();
            b *= BigInt::from(chain.product_of_primes(&chain.digits()[i]));
        }
        assert_eq!(acc.restrict_to(&s).unwrap(), x);
    }

    #[test]
    fn test_ring_ops_need_matching_sets() {
        let ctx = toy_context().unwrap();
        let chain = &ctx.chain;
        let a = ResiduePoly::constant(chain, &PrimeSet::interval(0, 1), 3).unwrap();
        let b = ResiduePoly::constant(chain, &PrimeSet::interval(0, 2), 3).unwrap();
        assert!(matches!(a.add(&b), Err(StrataError::ModulusMismatch)));
        let c = a.mul(&a).unwrap();
        assert_eq!(c, ResiduePoly::constant(chain, &PrimeSet::interval(0, 1), 9).unwrap());
    }
}
