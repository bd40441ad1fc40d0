use crate::error::{Result, StrataError};
use crate::ring::modular::{barrett_constant, center, mod_add, mod_mul, mod_neg, mod_sub, reduce_i64};

/// Polynomial in coefficient form over Z_q[X]/(X^n + 1).
///
/// Also the plaintext type: a plaintext is a `CoeffPoly` whose modulus is
/// the plaintext space.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoeffPoly {
    pub coeffs: Vec<u64>,
    pub modulus: u64,
}

impl CoeffPoly {
    pub fn zero(n: usize, modulus: u64) -> Self {
        Self { coeffs: vec![0u64; n], modulus }
    }

    /// Coefficients are reduced mod q.
    pub fn from_coeffs(coeffs: Vec<u64>, modulus: u64) -> Self {
        let coeffs = coeffs.into_iter().map(|c| c % modulus).collect();
        Self { coeffs, modulus }
    }

    pub fn from_signed(coeffs: &[i64], modulus: u64) -> Self {
        let coeffs = coeffs.iter().map(|&c| reduce_i64(c, modulus)).collect();
        Self { coeffs, modulus }
    }

    /// The constant polynomial `c`.
    pub fn constant(n: usize, c: i64, modulus: u64) -> Self {
        let mut p = Self::zero(n, modulus);
        if let Some(first) = p.coeffs.first_mut() {
            *first = reduce_i64(c, modulus);
        }
        p
    }

    pub fn len(&self) -> usize {
        self.coeffs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coeffs.is_empty()
    }

    fn check_compatible(&self, other: &Self) -> Result<()> {
        if self.len() != other.len() {
            return Err(StrataError::DimensionMismatch { expected: self.len(), got: other.len() });
        }
        if self.modulus != other.modulus {
            return Err(StrataError::ModulusMismatch);
        }
        Ok(())
    }

    pub fn add(&self, other: &Self) -> Result<Self> {
        self.check_compatible(other)?;
        let q = self.modulus;
        let coeffs = self.coeffs.iter().zip(&other.coeffs).map(|(&a, &b)| mod_add(a, b, q)).collect();
        Ok(Self { coeffs, modulus: q })
    }

    pub fn sub(&self, other: &Self) -> Result<Self> {
        self.check_compatible(other)?;
        let q = self.modulus;
        let coeffs = self.coeffs.iter().zip(&other.coeffs).map(|(&a, &b)| mod_sub(a, b, q)).collect();
        Ok(Self { coeffs, modulus: q })
    }

    pub fn neg(&self) -> Self {
        let q = self.modulus;
        Self { coeffs: self.coeffs.iter().map(|&a| mod_neg(a, q)).collect(), modulus: q }
    }

    /// Schoolbook negacyclic product. Used for plaintext arithmetic only.
    pub fn mul_naive(&self, other: &Self) -> Result<Self> {
        self.check_compatible(other)?;
        let n = self.len();
        let q = self.modulus;
        let bk = barrett_constant(q);
        let mut result = vec![0u64; n];

        for (i, &a) in self.coeffs.iter().enumerate() {
            if a == 0 {
                continue;
            }
            for (j, &b) in other.coeffs.iter().enumerate() {
                if b == 0 {
                    continue;
                }
                let prod = mod_mul(a, b, q, bk);
                let idx = i + j;
                if idx < n {
                    result[idx] = mod_add(result[idx], prod, q);
                } else {
                    // X^n = -1
                    result[idx - n] = mod_sub(result[idx - n], prod, q);
                }
            }
        }

        Ok(Self { coeffs: result, modulus: q })
    }

    pub fn scalar_mul(&self, scalar: u64) -> Self {
        let q = self.modulus;
        let bk = barrett_constant(q);
        let s = scalar % q;
        Self { coeffs: self.coeffs.iter().map(|&c| mod_mul(c, s, q, bk)).collect(), modulus: q }
    }

    /// The Galois automorphism `X -> X^k` of Z_q[X]/(X^n + 1), `k` odd.
    ///
    /// Coefficient `i` moves to `i*k mod 2n`, negated when it lands past `n`.
    pub fn automorph(&self, k: u64) -> Result<Self> {
        let n = self.len();
        let two_n = 2 * n as u64;
        if k % 2 == 0 {
            return Err(StrataError::InvalidParam(format!("automorphism exponent {k} must be odd")));
        }
        let k = k % two_n;
        let q = self.modulus;
        let mut result = vec![0u64; n];
        for (i, &c) in self.coeffs.iter().enumerate() {
            let dest = (i as u64 * k % two_n) as usize;
            if dest < n {
                result[dest] = c;
            } else {
                result[dest - n] = mod_neg(c, q);
            }
        }
        Ok(Self { coeffs: result, modulus: q })
    }

    pub fn is_zero(&self) -> bool {
        self.coeffs.iter().all(|&c| c == 0)
    }

    /// Centered representatives in `(-q/2, q/2]`.
    pub fn centered_coeffs(&self) -> Vec<i64> {
        self.coeffs.iter().map(|&c| center(c, self.modulus)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_sub() {
        let a = CoeffPoly::from_coeffs(vec![1, 2, 3, 4], 17);
        let b = CoeffPoly::from_coeffs(vec![5, 6, 7, 8], 17);
        let c = a.add(&b).unwrap();
        assert_eq!(c.coeffs, vec![6, 8, 10, 12]);
        assert_eq!(c.sub(&b).unwrap(), a);
    }

    #[test]
    fn test_mul_naive_wraparound() {
        // X^3 * X^3 = -X^2 in Z_17[X]/(X^4 + 1)
        let a = CoeffPoly::from_coeffs(vec![0, 0, 0, 1], 17);
        assert_eq!(a.mul_naive(&a).unwrap().coeffs, vec![0, 0, 16, 0]);
    }

    #[test]
    fn test_automorph() {
        // X -> X^3 in Z_17[X]/(X^4 + 1): X^2 -> X^6 = -X^2, X^3 -> X^9 = X
        let a = CoeffPoly::from_coeffs(vec![1, 0, 1, 1], 17);
        assert_eq!(a.automorph(3).unwrap().coeffs, vec![1, 1, 16, 0]);
        assert!(a.automorph(2).is_err());
    }

    #[test]
    fn test_automorph_composes() {
        let a = CoeffPoly::from_signed(&[3, -1, 4, 1, -5, 9, 2, 6], 97);
        let both = a.automorph(3).unwrap().automorph(5).unwrap();
        assert_eq!(both, a.automorph(15).unwrap());
        assert_eq!(a.automorph(1).unwrap(), a);
    }

    #[test]
    fn test_centered_coeffs() {
        let a = CoeffPoly::from_coeffs(vec![0, 1, 16, 9], 17);
        assert_eq!(a.centered_coeffs(), vec![0, 1, -1, -8]);
    }
}
