use std::sync::Arc;

use num_integer::Integer;
use tracing::{debug, instrument};

use crate::error::{Result, Violation};
use crate::keys::handle::SkHandle;
use crate::keys::switching::KeySwitchMatrix;
use crate::ring::ResiduePoly;

use super::Ciphertext;

impl Ciphertext {
    /// Bring every part back to the constant or base handle of `key_id`.
    ///
    /// The result lives over the special primes as well; noise grows by
    /// `P^2` plus the key-switching term and shrinks back on the next
    /// mod-down.
    ///
    /// A ciphertext already in canonical form for `key_id` comes back
    /// unchanged, without the lift to the special primes HElib performs.
    #[instrument(skip(self))]
    pub fn relinearize(&self, key_id: usize) -> Result<Ciphertext> {
        if self.is_empty() || self.in_canonical_form(key_id) {
            return Ok(self.clone());
        }
        let context = Arc::clone(&self.context);
        let chain = &context.chain;
        let specials = chain.special_primes();

        let mut src = self.clone();
        if !src.prime_set.is_disjoint(specials) {
            let target = src.prime_set.difference(specials);
            src.mod_down_in_place(&target)?;
        }

        let mut out = src.blank_like(src.prime_set.union(specials));
        out.noise_var = src.noise_var * (2.0 * chain.log_of_product(specials)).exp();

        for part in &src.parts {
            if part.handle.is_one() || part.handle.is_base(Some(key_id)) {
                let mut poly = part.poly.clone();
                poly.add_primes_and_scale(chain, specials)?;
                out.add_part(poly, part.handle, true, false)?;
                continue;
            }
            let w = src
                .pub_key
                .find_matrix(&part.handle, key_id)
                .ok_or(Violation::MissingSwitchMatrix { from: part.handle, to_key: key_id })?;
            let g = out.ptxt_space.gcd(&w.ptxt_space);
            if g <= 1 {
                return Err(Violation::PlaintextSpaceMismatch(out.ptxt_space, w.ptxt_space).into());
            }
            out.ptxt_space = g;
            out.key_switch_part(&part.poly, w)?;
        }
        debug!(noise_var = out.noise_var, "relinearized");
        Ok(out)
    }

    /// Switch one part from `w.from` to key `w.to_key_id` and accumulate
    /// the result into `self`, which must be over `set ∪ specials`.
    pub(crate) fn key_switch_part(&mut self, poly: &ResiduePoly, w: &KeySwitchMatrix) -> Result<()> {
        let context = Arc::clone(&self.context);
        let chain = &context.chain;
        let specials = chain.special_primes();
        let set = poly.prime_set();

        let digits = chain.digits();
        let n_digits = digits
            .iter()
            .rposition(|d| !d.is_disjoint(set))
            .map(|i| i + 1)
            .ok_or(Violation::EmptyIntersection)?;

        let phi = context.phi_m() as f64;
        // the matrix errors are multiples of its own plaintext space
        let t = w.ptxt_space as f64;
        let sigma2 = context.stdev * context.stdev;
        let added: f64 = digits[..n_digits]
            .iter()
            .map(|d| d.intersection(set))
            .filter(|s| !s.is_empty())
            .map(|s| phi * t * t * (2.0 * chain.log_of_product(&s)).exp() * sigma2 / 4.0)
            .sum();

        // what is left after dividing by P must stay below the rounding
        // noise of a fresh ciphertext
        let h = self.pub_key.key_weight(w.from.key_id())? as f64;
        let noise = added.ln() - 2.0 * chain.log_of_product(specials);
        let budget = h.ln() + 2.0 * t.ln() + phi.ln() - 12f64.ln();
        if noise >= budget {
            return Err(Violation::KeySwitchNoiseBudget { noise, budget }.into());
        }

        let pieces = poly.break_into_digits(chain, n_digits)?;
        let target = set.union(specials);
        let mut hidden = w.hidden_columns(chain);
        for (d, b) in pieces.iter().zip(&w.b) {
            let a = hidden.next_column()?.restrict_to(&target)?;
            let b = b.restrict_to(&target)?;
            self.add_part(d.mul(&a)?, SkHandle::base(w.to_key_id), true, false)?;
            self.add_part(d.mul(&b)?, SkHandle::one(), true, false)?;
        }
        self.noise_var += added;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ciphertext::testutil::Fixture;
    use crate::chain::PrimeSet;

    #[test]
    fn test_relinearize_square() {
        let mut fx = Fixture::toy();
        let a = fx.encrypt(&fx.plaintext(&[3, 1]));
        let sq = a.mul(&a).unwrap();
        assert!(!sq.in_canonical_form(0));

        let lin = sq.relinearize(0).unwrap();
        assert!(lin.in_canonical_form(0));
        assert_eq!(lin.num_parts(), 2);
        let specials = fx.ctx.chain.special_primes();
        assert!(specials.is_subset(lin.prime_set()));
        assert!(lin.verify_prime_set());
        assert_eq!(fx.decrypt(&lin), fx.plaintext(&[2, 6, 1]));

        let p2 = (2.0 * fx.ctx.chain.log_of_product(specials)).exp();
        assert!(lin.noise_var() > sq.noise_var() * p2);
    }

    #[test]
    fn test_canonical_is_untouched() {
        let mut fx = Fixture::toy();
        let a = fx.encrypt(&fx.plaintext(&[1]));
        assert_eq!(a.relinearize(0).unwrap(), a);
    }

    #[test]
    fn test_relinearize_after_mod_down() {
        let mut fx = Fixture::toy();
        let a = fx.encrypt(&fx.plaintext(&[2, 2])).mod_down_to_set(&PrimeSet::interval(0, 3)).unwrap();
        let lin = a.mul(&a).unwrap().relinearize(0).unwrap();
        assert_eq!(fx.decrypt(&lin), fx.plaintext(&[4, 1, 4]));
        let rest = lin.mod_down_to_set(fx.ctx.chain.ctxt_primes()).unwrap();
        assert!(rest.prime_set().is_disjoint(fx.ctx.chain.special_primes()));
        assert_eq!(fx.decrypt(&rest), fx.plaintext(&[4, 1, 4]));
    }

    #[test]
    fn test_missing_matrix() {
        let mut fx = Fixture::toy();
        let a = fx.encrypt(&fx.plaintext(&[1]));
        let cube = a.mul(&a).unwrap().mul(&a).unwrap();
        let err = cube.relinearize(0).unwrap_err();
        assert!(matches!(
            err.violation(),
            Some(Violation::MissingSwitchMatrix { from, to_key: 0 }) if from.power_of_s() == 3
        ));
    }
}
