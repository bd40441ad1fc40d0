use num_integer::Integer;
use tracing::instrument;

use crate::error::{Result, StrataError, Violation};
use crate::ring::modular::mod_inv;
use crate::ring::poly::CoeffPoly;

use super::Ciphertext;

fn max_power_of_s(ct: &Ciphertext) -> u32 {
    ct.parts.iter().map(|p| p.handle.power_of_s()).max().unwrap_or(0)
}

fn binomial(n: u32, k: u32) -> f64 {
    (1..=k).fold(1.0, |acc, i| acc * (n - k + i) as f64 / i as f64)
}

impl Ciphertext {
    /// All pairwise products of the parts of `c1` and `c2`, which must share
    /// a prime set. The extra factor `f = Q mod t` of the product is
    /// cancelled by `f^{-1} mod t`.
    pub(crate) fn tensor_product(c1: &Ciphertext, c2: &Ciphertext) -> Result<Ciphertext> {
        if c1.prime_set != c2.prime_set {
            return Err(Violation::MalformedPrimeSet(c2.prime_set.clone()).into());
        }
        let t = c1.ptxt_space;
        let mut f = c1.ptxt_factor();
        if f != 1 {
            f = mod_inv(f, t).ok_or(Violation::PlaintextSpaceShape(t))?;
        }

        let mut out = c1.blank_like(c1.prime_set.clone());
        for p1 in &c1.parts {
            for p2 in &c2.parts {
                let handle = p1.handle.mul(&p2.handle)?;
                let mut poly = p1.poly.mul(&p2.poly)?;
                if f != 1 {
                    poly = poly.scalar_mul(f);
                }
                out.add_part(poly, handle, false, false)?;
            }
        }

        let n1 = max_power_of_s(c1);
        let n2 = max_power_of_s(c2);
        out.noise_var = c1.noise_var * c2.noise_var * binomial(n1 + n2, n2);
        if f != 1 {
            out.noise_var *= (f as f64) * (f as f64);
        }
        Ok(out)
    }

    /// Tensor product without relinearization. Both operands first drop to
    /// the lower of their base levels; squaring doubles the estimate.
    #[instrument(skip_all)]
    pub fn mul(&self, other: &Ciphertext) -> Result<Ciphertext> {
        if self.is_empty() {
            return Ok(self.clone());
        }
        let g = self.ptxt_space.gcd(&other.ptxt_space);
        if g <= 1 {
            return Err(Violation::PlaintextSpaceMismatch(self.ptxt_space, other.ptxt_space).into());
        }
        let mut lhs = self.clone();
        lhs.ptxt_space = g;

        if std::ptr::eq(self, other) {
            let lvl = lhs.find_base_level()?;
            lhs.mod_down_to_level_in_place(lvl)?;
            let mut out = Self::tensor_product(&lhs, &lhs)?;
            out.noise_var *= 2.0;
            return Ok(out);
        }

        self.check_same_key(other)?;
        let lvl = lhs.find_base_level()?.min(other.find_base_level()?);
        lhs.mod_down_to_level_in_place(lvl)?;
        if lhs.prime_set == other.prime_set {
            Self::tensor_product(&lhs, other)
        } else {
            let mut rhs = other.clone();
            rhs.mod_down_to_level_in_place(lvl)?;
            Self::tensor_product(&lhs, &rhs)
        }
    }

    /// Multiply and relinearize back to canonical form.
    pub fn multiply_by(&self, other: &Ciphertext) -> Result<Ciphertext> {
        let prod = self.mul(other)?;
        let key_id = prod.key_id().unwrap_or(0);
        prod.relinearize(key_id)
    }

    pub fn square(&self) -> Result<Ciphertext> {
        self.multiply_by(self)
    }

    /// `self * c1 * c2` with a single relinearization at the end. The
    /// operand at the highest level is multiplied in first.
    pub fn multiply_by_2(&self, c1: &Ciphertext, c2: &Ciphertext) -> Result<Ciphertext> {
        if self.is_empty() {
            return Ok(self.clone());
        }
        let lvl = self.find_base_level()?;
        let lvl1 = c1.find_base_level()?;
        let lvl2 = c2.find_base_level()?;

        let prod = if lvl < lvl1 && lvl < lvl2 {
            let pair = c1.mul(c2)?;
            self.mul(&pair)?
        } else {
            let (first, second) = if lvl < lvl2 { (c2, c1) } else { (c1, c2) };
            self.mul(first)?.mul(second)?
        };
        let key_id = prod.key_id().unwrap_or(0);
        prod.relinearize(key_id)
    }

    /// The low `r` bits of a plaintext mod `2^e`, one ciphertext per bit.
    /// Bit `i` lives in plaintext space `2^(e-i)` and only its parity
    /// is meaningful. `r = 0` or `r > e` extracts all `e` bits.
    pub fn extract_bits(&self, r: usize) -> Result<Vec<Ciphertext>> {
        if self.context.p != 2 {
            return Err(StrataError::InvalidParam(format!(
                "bit extraction needs p = 2, context has p = {}",
                self.context.p
            )));
        }
        let e = self.ptxt_space.trailing_zeros() as usize;
        let r = if r == 0 || r > e { e } else { r };

        let mut bits = Vec::with_capacity(r);
        let mut lifts: Vec<Ciphertext> = Vec::with_capacity(r);
        for i in 0..r {
            let mut cur = self.clone();
            for lift in lifts.iter_mut() {
                // b^(2^k) ≡ b (mod 2^(k+1)) for the bit b
                *lift = lift.square()?;
                cur = cur.sub(lift)?.divide_by_2()?;
            }
            lifts.push(cur.clone());
            bits.push(cur);
        }
        Ok(bits)
    }
}

/// Replace `v[i]` by `v[0] * ... * v[i]`, in logarithmic depth.
pub fn incremental_product(v: &mut [Ciphertext]) -> Result<()> {
    let n = v.len();
    if n <= 1 {
        return Ok(());
    }
    // largest power of two strictly below n
    let n1 = 1usize << (usize::BITS - 1 - (n - 1).leading_zeros());
    incremental_product(&mut v[..n1])?;
    incremental_product(&mut v[n1..])?;
    let prefix = v[n1 - 1].clone();
    for ct in &mut v[n1..] {
        *ct = ct.multiply_by(&prefix)?;
    }
    Ok(())
}

/// `sum_i a[i] * b[i]` over the common prefix, relinearized.
pub fn inner_product(a: &[Ciphertext], b: &[Ciphertext]) -> Result<Ciphertext> {
    let n = a.len().min(b.len());
    if n == 0 {
        return Err(StrataError::InvalidParam("inner product of empty vectors".into()));
    }
    let mut acc = a[0].multiply_by(&b[0])?;
    for (x, y) in a[1..n].iter().zip(&b[1..n]) {
        acc = acc.add(&x.multiply_by(y)?)?;
    }
    Ok(acc)
}

/// `sum_i a[i] * b[i]` with plaintext right-hand sides.
pub fn inner_product_plain(a: &[Ciphertext], b: &[CoeffPoly]) -> Result<Ciphertext> {
    let n = a.len().min(b.len());
    if n == 0 {
        return Err(StrataError::InvalidParam("inner product of empty vectors".into()));
    }
    let mut acc = a[0].mult_by_poly(&b[0], None)?;
    for (x, y) in a[1..n].iter().zip(&b[1..n]) {
        acc = acc.add(&x.mult_by_poly(y, None)?)?;
    }
    Ok(acc)
}
