use std::sync::Arc;

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::One;

use crate::error::{Result, Violation};
use crate::keys::handle::SkHandle;
use crate::ring::modular::{center, reduce_i64};
use crate::ring::poly::CoeffPoly;
use crate::ring::ResiduePoly;

use super::{Ciphertext, CtxtPart};

impl Ciphertext {
    /// Merge `poly` into the part with the same handle, or append it.
    ///
    /// With `match_prime_set`, primes of `poly` that the ciphertext lacks
    /// are first added to every existing part by exact lifting. A `poly`
    /// over fewer primes than the ciphertext is lifted the same way.
    pub(crate) fn add_part(
        &mut self,
        mut poly: ResiduePoly,
        handle: SkHandle,
        match_prime_set: bool,
        negative: bool,
    ) -> Result<()> {
        let context = Arc::clone(&self.context);
        let chain = &context.chain;

        if match_prime_set && !self.parts.is_empty() {
            let missing = poly.prime_set().difference(&self.prime_set);
            if !missing.is_empty() {
                for part in &mut self.parts {
                    part.poly.add_primes(chain, &missing)?;
                }
                self.prime_set.insert_all(&missing);
            }
        }

        if self.parts.is_empty() {
            self.prime_set = poly.prime_set().clone();
        } else {
            if !poly.prime_set().is_subset(&self.prime_set) {
                return Err(Violation::MalformedPrimeSet(poly.prime_set().clone()).into());
            }
            if poly.prime_set() != &self.prime_set {
                poly.add_primes(chain, &self.prime_set)?;
            }
        }

        match self.part_index(&handle) {
            Some(j) => {
                let cur = &self.parts[j].poly;
                self.parts[j].poly = if negative { cur.sub(&poly)? } else { cur.add(&poly)? };
            }
            None => {
                let poly = if negative { poly.neg() } else { poly };
                self.parts.push(CtxtPart::new(poly, handle));
            }
        }
        self.check_prime_set()
    }

    /// Homomorphic addition. Whichever side has fewer primes is mod-upped
    /// to the union, and the noise variances add.
    pub fn add(&self, other: &Ciphertext) -> Result<Ciphertext> {
        self.add_ctxt(other, false)
    }

    pub fn sub(&self, other: &Ciphertext) -> Result<Ciphertext> {
        self.add_ctxt(other, true)
    }

    fn add_ctxt(&self, other: &Ciphertext, negative: bool) -> Result<Ciphertext> {
        self.check_same_key(other)?;
        if other.is_empty() {
            return Ok(self.clone());
        }
        if self.is_empty() {
            return Ok(if negative { other.negate() } else { other.clone() });
        }
        let g = self.ptxt_space.gcd(&other.ptxt_space);
        if g <= 1 {
            return Err(Violation::PlaintextSpaceMismatch(self.ptxt_space, other.ptxt_space).into());
        }

        let mut out = self.clone();
        out.ptxt_space = g;
        out.mod_up_in_place(&other.prime_set)?;

        let mut rhs = other.clone();
        rhs.ptxt_space = g;
        rhs.mod_up_in_place(&out.prime_set)?;

        for part in rhs.parts {
            out.add_part(part.poly, part.handle, false, negative)?;
        }
        out.noise_var += rhs.noise_var;
        Ok(out)
    }

    pub fn negate(&self) -> Ciphertext {
        let mut out = self.clone();
        for part in &mut out.parts {
            part.poly = part.poly.neg();
        }
        out
    }

    /// Add an integer constant. Its noise contribution is the squared
    /// centered value.
    pub fn add_constant(&self, c: i64) -> Result<Ciphertext> {
        let t = self.ptxt_space;
        let c = center(reduce_i64(c, t), t);
        let poly = ResiduePoly::constant(&self.context.chain, &self.prime_set, c)?;
        self.add_scaled_constant(poly, (c as f64) * (c as f64))
    }

    /// Add a plaintext polynomial, whose modulus must be a multiple of the
    /// plaintext space. `size` defaults to `phi * t^2 / 4`.
    pub fn add_poly(&self, pt: &CoeffPoly, size: Option<f64>) -> Result<Ciphertext> {
        let poly = self.embed_plaintext(pt)?;
        let t = self.ptxt_space as f64;
        let size = size.unwrap_or(self.context.phi_m() as f64 * t * t / 4.0);
        self.add_scaled_constant(poly, size)
    }

    fn add_scaled_constant(&self, poly: ResiduePoly, size: f64) -> Result<Ciphertext> {
        let f = self.ptxt_factor();
        let mut out = self.clone();
        out.noise_var += size * (f as f64) * (f as f64);
        let poly = if f == 1 { poly } else { poly.scalar_mul(f) };
        out.add_part(poly, SkHandle::one(), false, false)?;
        Ok(out)
    }

    /// Multiply by an integer constant; noise scales by its centered square.
    pub fn mult_by_constant(&self, c: i64) -> Result<Ciphertext> {
        let t = self.ptxt_space;
        let c = center(reduce_i64(c, t), t);
        let mut out = self.clone();
        let big = BigInt::from(c);
        for part in &mut out.parts {
            part.poly = part.poly.scalar_mul_bigint(&big);
        }
        out.noise_var *= (c as f64) * (c as f64);
        Ok(out)
    }

    /// Multiply by a plaintext polynomial. `size` is its expected squared
    /// norm and defaults to `phi * t^2 / 4`.
    pub fn mult_by_poly(&self, pt: &CoeffPoly, size: Option<f64>) -> Result<Ciphertext> {
        if self.is_empty() {
            return Ok(self.clone());
        }
        let poly = self.embed_plaintext(pt)?;
        let t = self.ptxt_space as f64;
        let size = size.unwrap_or(self.context.phi_m() as f64 * t * (t / 4.0));
        let mut out = self.clone();
        for part in &mut out.parts {
            part.poly = part.poly.mul(&poly)?;
        }
        out.noise_var *= size;
        Ok(out)
    }

    /// Divide the plaintext by two, halving the plaintext space. Only
    /// valid for an even plaintext space above 2 holding an even value.
    pub fn divide_by_2(&self) -> Result<Ciphertext> {
        let t = self.ptxt_space;
        if t % 2 != 0 || t <= 2 {
            return Err(Violation::PlaintextSpaceShape(t).into());
        }
        let q = BigInt::from(self.context.chain.product_of_primes(&self.prime_set));
        let two_inv = (q + BigInt::one()) >> 1u32;
        let mut out = self.clone();
        for part in &mut out.parts {
            part.poly = part.poly.scalar_mul_bigint(&two_inv);
        }
        out.noise_var /= 4.0;
        out.ptxt_space = t / 2;
        Ok(out)
    }

    /// Plaintext reduced mod `t` and embedded over the current prime set.
    fn embed_plaintext(&self, pt: &CoeffPoly) -> Result<ResiduePoly> {
        let t = self.ptxt_space;
        if pt.modulus % t != 0 {
            return Err(Violation::PlaintextSpaceMismatch(t, pt.modulus).into());
        }
        let reduced = CoeffPoly::from_coeffs(pt.coeffs.iter().map(|c| c % t).collect(), t);
        ResiduePoly::from_plaintext(&self.context.chain, &self.prime_set, &reduced)
    }
}
