use std::sync::Arc;

use concrete_ntt::prime64::Plan;

use crate::error::{Result, StrataError};
use crate::ring::modular::{barrett_constant, mod_add, mod_mul, mod_neg, mod_sub};
use crate::ring::poly::CoeffPoly;

/// One residue of a ring element: a polynomial over Z_q[X]/(X^n + 1)
/// held in evaluation form.
///
/// The plan is shared with every other residue mod the same prime.
#[derive(Clone, Debug)]
pub struct NttPoly {
    pub evals: Vec<u64>,
    pub modulus: u64,
    pub plan: Arc<Plan>,
}

/// Build the negacyclic transform for `(n, q)`.
///
/// concrete-ntt needs `n` a power of two, at least 16, and a prime
/// `q ≡ 1 (mod 2n)`.
pub fn make_plan(n: usize, modulus: u64) -> Result<Arc<Plan>> {
    if !n.is_power_of_two() || n < 16 {
        return Err(StrataError::InvalidRingDegree(n));
    }
    let plan = Plan::try_new(n, modulus).ok_or_else(|| {
        StrataError::InvalidParam(format!(
            "no NTT plan for n={n}, q={modulus} (need prime q ≡ 1 mod {})",
            2 * n
        ))
    })?;
    Ok(Arc::new(plan))
}

impl NttPoly {
    pub fn zero(plan: Arc<Plan>) -> Self {
        Self {
            evals: vec![0u64; plan.ntt_size()],
            modulus: plan.modulus(),
            plan,
        }
    }

    /// Forward transform of a coefficient-form polynomial.
    pub fn from_coeff_poly(poly: &CoeffPoly, plan: Arc<Plan>) -> Result<Self> {
        if poly.modulus != plan.modulus() {
            return Err(StrataError::ModulusMismatch);
        }
        if poly.len() != plan.ntt_size() {
            return Err(StrataError::DimensionMismatch {
                expected: plan.ntt_size(),
                got: poly.len(),
            });
        }
        let mut evals = poly.coeffs.clone();
        plan.fwd(&mut evals);
        Ok(Self { evals, modulus: poly.modulus, plan })
    }

    /// Forward transform of small signed coefficients.
    pub fn from_signed(coeffs: &[i64], plan: Arc<Plan>) -> Result<Self> {
        let poly = CoeffPoly::from_signed(coeffs, plan.modulus());
        Self::from_coeff_poly(&poly, plan)
    }

    /// Inverse transform back to coefficient form.
    pub fn to_coeff_poly(&self) -> CoeffPoly {
        let mut coeffs = self.evals.clone();
        self.plan.inv(&mut coeffs);
        self.plan.normalize(&mut coeffs);
        CoeffPoly { coeffs, modulus: self.modulus }
    }

    pub fn len(&self) -> usize {
        self.evals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.evals.is_empty()
    }

    fn check_compatible(&self, other: &Self) -> Result<()> {
        if self.modulus != other.modulus || self.len() != other.len() {
            return Err(StrataError::ModulusMismatch);
        }
        Ok(())
    }

    fn zip_with(&self, other: &Self, f: impl Fn(u64, u64) -> u64) -> Result<Self> {
        self.check_compatible(other)?;
        let evals = self.evals.iter().zip(&other.evals).map(|(&a, &b)| f(a, b)).collect();
        Ok(Self { evals, modulus: self.modulus, plan: Arc::clone(&self.plan) })
    }

    pub fn add(&self, other: &Self) -> Result<Self> {
        let q = self.modulus;
        self.zip_with(other, |a, b| mod_add(a, b, q))
    }

    pub fn sub(&self, other: &Self) -> Result<Self> {
        let q = self.modulus;
        self.zip_with(other, |a, b| mod_sub(a, b, q))
    }

    /// Pointwise product, i.e. negacyclic polynomial multiplication.
    pub fn mul(&self, other: &Self) -> Result<Self> {
        let q = self.modulus;
        let bk = barrett_constant(q);
        self.zip_with(other, |a, b| mod_mul(a, b, q, bk))
    }

    pub fn neg(&self) -> Self {
        let q = self.modulus;
        let evals = self.evals.iter().map(|&a| mod_neg(a, q)).collect();
        Self { evals, modulus: q, plan: Arc::clone(&self.plan) }
    }

    pub fn scalar_mul(&self, scalar: u64) -> Self {
        let q = self.modulus;
        let s = scalar % q;
        let bk = barrett_constant(q);
        let evals = self.evals.iter().map(|&a| mod_mul(a, s, q, bk)).collect();
        Self { evals, modulus: q, plan: Arc::clone(&self.plan) }
    }

    /// Apply `X -> X^k` for odd `k`, going through coefficient form.
    pub fn automorph(&self, k: u64) -> Result<Self> {
        let image = self.to_coeff_poly().automorph(k)?;
        Self::from_coeff_poly(&image, Arc::clone(&self.plan))
    }

    pub fn is_zero(&self) -> bool {
        self.evals.iter().all(|&e| e == 0)
    }
}

impl PartialEq for NttPoly {
    fn eq(&self, other: &Self) -> bool {
        self.modulus == other.modulus && self.evals == other.evals
    }
}

impl Eq for NttPoly {}
